//! Ed25519 message signing.
//!
//! The private key arrives as 128 hex characters: a 32-byte seed followed
//! by the 32-byte public key. Decoded bytes sit in a [`Zeroizing`] buffer so
//! they are wiped on every exit path, including failed construction.

use ed25519_dalek::{Signature, Signer, SigningKey, KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{FarcasterError, Result};

/// Length of the hex-encoded private key.
pub const PRIVATE_KEY_HEX_LENGTH: usize = KEYPAIR_LENGTH * 2;

/// BLAKE3 digest length used for message hashes.
pub const HASH_LENGTH: usize = 32;

/// Check length and alphabet without decoding.
pub fn validate_private_key_hex(private_key_hex: &str) -> Result<()> {
    if private_key_hex.len() != PRIVATE_KEY_HEX_LENGTH {
        return Err(FarcasterError::signing(format!(
            "private key must be {} hex characters, got {}",
            PRIVATE_KEY_HEX_LENGTH,
            private_key_hex.len()
        )));
    }
    if !private_key_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FarcasterError::signing(
            "private key contains non-hex characters",
        ));
    }
    Ok(())
}

/// Holds the key pair for the lifetime of a client. The private half is
/// never exposed; `SigningKey` wipes itself on drop.
pub struct SigningEngine {
    signing_key: SigningKey,
}

impl std::fmt::Debug for SigningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningEngine")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl SigningEngine {
    pub fn new(private_key_hex: &str) -> Result<Self> {
        validate_private_key_hex(private_key_hex)?;

        let mut keypair = Zeroizing::new([0u8; KEYPAIR_LENGTH]);
        hex::decode_to_slice(private_key_hex, keypair.as_mut_slice())
            .map_err(|e| FarcasterError::signing(format!("private key decode failed: {e}")))?;

        let signing_key = SigningKey::from_keypair_bytes(&keypair).map_err(|_| {
            FarcasterError::signing("public key half does not match the private seed")
        })?;

        debug!(
            public_key = %hex::encode(signing_key.verifying_key().as_bytes()),
            "signing key loaded"
        );
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.public_key()))
    }

    /// BLAKE3 digest of serialized message bytes.
    pub fn hash(data: &[u8]) -> [u8; HASH_LENGTH] {
        *blake3::hash(data).as_bytes()
    }

    pub fn sign(&self, hash: &[u8; HASH_LENGTH]) -> Signature {
        self.signing_key.sign(hash)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ed25519_dalek::Verifier;

    pub(crate) fn test_key_hex() -> String {
        hex::encode(SigningKey::from_bytes(&[7u8; 32]).to_keypair_bytes())
    }

    #[test]
    fn test_valid_key_round_trips_public_half() {
        let key = test_key_hex();
        let engine = SigningEngine::new(&key).unwrap();
        assert_eq!(hex::encode(engine.public_key()), key[64..]);
        assert!(engine.public_key_hex().starts_with("0x"));
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        let key = test_key_hex();
        assert!(SigningEngine::new(&key[..127]).is_err());
        assert!(SigningEngine::new(&format!("{key}0")).is_err());
        assert!(SigningEngine::new("").is_err());
    }

    #[test]
    fn test_rejects_non_hex() {
        let mut key = test_key_hex();
        key.replace_range(10..11, "g");
        let err = SigningEngine::new(&key).unwrap_err();
        assert!(matches!(err, FarcasterError::Signing(_)));
    }

    #[test]
    fn test_rejects_mismatched_public_half() {
        let seed = hex::encode([7u8; 32]);
        let other_public = hex::encode(SigningKey::from_bytes(&[9u8; 32]).verifying_key().to_bytes());
        let err = SigningEngine::new(&format!("{seed}{other_public}")).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_signature_verifies_against_hash() {
        let engine = SigningEngine::new(&test_key_hex()).unwrap();
        let hash = SigningEngine::hash(b"hello farcaster");
        let signature = engine.sign(&hash);
        engine
            .signing_key
            .verifying_key()
            .verify(&hash, &signature)
            .unwrap();
        assert_ne!(hash, SigningEngine::hash(b"hello farcaster!"));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let engine = SigningEngine::new(&test_key_hex()).unwrap();
        let rendered = format!("{engine:?}");
        assert!(!rendered.contains(&test_key_hex()[..64]));
    }
}
