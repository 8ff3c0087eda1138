//! Protocol message model for the writes this client performs.

use chrono::Utc;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::types::CastId;

/// Message kinds. Names match the hub's JSON enum strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "MESSAGE_TYPE_CAST_ADD")]
    CastAdd,
    #[serde(rename = "MESSAGE_TYPE_CAST_REMOVE")]
    CastRemove,
    #[serde(rename = "MESSAGE_TYPE_REACTION_ADD")]
    ReactionAdd,
    #[serde(rename = "MESSAGE_TYPE_REACTION_REMOVE")]
    ReactionRemove,
    #[serde(rename = "MESSAGE_TYPE_LINK_ADD")]
    LinkAdd,
    #[serde(rename = "MESSAGE_TYPE_LINK_REMOVE")]
    LinkRemove,
    #[serde(rename = "MESSAGE_TYPE_USER_DATA_ADD")]
    UserDataAdd,
    #[serde(rename = "MESSAGE_TYPE_USER_DATA_REMOVE")]
    UserDataRemove,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FarcasterNetwork {
    #[serde(rename = "FARCASTER_NETWORK_MAINNET")]
    Mainnet,
    #[serde(rename = "FARCASTER_NETWORK_TESTNET")]
    Testnet,
    #[serde(rename = "FARCASTER_NETWORK_DEVNET")]
    Devnet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionType {
    #[serde(rename = "REACTION_TYPE_LIKE")]
    Like,
    #[serde(rename = "REACTION_TYPE_RECAST")]
    Recast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserDataType {
    #[serde(rename = "USER_DATA_TYPE_PFP")]
    Pfp,
    #[serde(rename = "USER_DATA_TYPE_DISPLAY")]
    Display,
    #[serde(rename = "USER_DATA_TYPE_BIO")]
    Bio,
    #[serde(rename = "USER_DATA_TYPE_URL")]
    Url,
    #[serde(rename = "USER_DATA_TYPE_USERNAME")]
    Username,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Embed {
    Url(String),
    CastId(CastId),
}

/// Where a cast hangs: under another cast, or under a channel URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CastParent {
    #[serde(rename = "parentCastId")]
    Cast(CastId),
    #[serde(rename = "parentUrl")]
    Url(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CastAddBody {
    pub text: String,
    pub mentions: Vec<u64>,
    pub mentions_positions: Vec<u32>,
    pub embeds: Vec<Embed>,
    #[serde(flatten)]
    pub parent: Option<CastParent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CastRemoveBody {
    pub target_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionBody {
    #[serde(rename = "type")]
    pub reaction_type: ReactionType,
    pub target_cast_id: CastId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkBody {
    #[serde(rename = "type")]
    pub link_type: String,
    pub target_fid: u64,
}

impl LinkBody {
    pub fn follow(target_fid: u64) -> Self {
        Self {
            link_type: "follow".to_string(),
            target_fid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserDataBody {
    #[serde(rename = "type")]
    pub data_type: UserDataType,
    pub value: String,
}

/// Closed set of message payloads; the variant decides the message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    CastAdd(CastAddBody),
    CastRemove(CastRemoveBody),
    ReactionAdd(ReactionBody),
    ReactionRemove(ReactionBody),
    LinkAdd(LinkBody),
    LinkRemove(LinkBody),
    UserDataAdd(UserDataBody),
    UserDataRemove(UserDataBody),
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::CastAdd(_) => MessageType::CastAdd,
            Self::CastRemove(_) => MessageType::CastRemove,
            Self::ReactionAdd(_) => MessageType::ReactionAdd,
            Self::ReactionRemove(_) => MessageType::ReactionRemove,
            Self::LinkAdd(_) => MessageType::LinkAdd,
            Self::LinkRemove(_) => MessageType::LinkRemove,
            Self::UserDataAdd(_) => MessageType::UserDataAdd,
            Self::UserDataRemove(_) => MessageType::UserDataRemove,
        }
    }

    /// JSON key the hub expects the body under.
    fn field_name(&self) -> &'static str {
        match self {
            Self::CastAdd(_) => "castAddBody",
            Self::CastRemove(_) => "castRemoveBody",
            Self::ReactionAdd(_) | Self::ReactionRemove(_) => "reactionBody",
            Self::LinkAdd(_) | Self::LinkRemove(_) => "linkBody",
            Self::UserDataAdd(_) | Self::UserDataRemove(_) => "userDataBody",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageData {
    kind: MessageType,
    pub fid: u64,
    pub timestamp: u64,
    pub network: FarcasterNetwork,
    body: MessageBody,
}

impl MessageData {
    pub fn new(fid: u64, timestamp: u64, network: FarcasterNetwork, body: MessageBody) -> Self {
        Self {
            kind: body.message_type(),
            fid,
            timestamp,
            network,
            body,
        }
    }

    /// Stamp with the current Unix time on mainnet.
    pub fn now(fid: u64, body: MessageBody) -> Self {
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        Self::new(fid, timestamp, FarcasterNetwork::Mainnet, body)
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }
}

impl Serialize for MessageData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("type", &self.kind)?;
        map.serialize_entry("fid", &self.fid)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("network", &self.network)?;
        let key = self.body.field_name();
        match &self.body {
            MessageBody::CastAdd(b) => map.serialize_entry(key, b)?,
            MessageBody::CastRemove(b) => map.serialize_entry(key, b)?,
            MessageBody::ReactionAdd(b) | MessageBody::ReactionRemove(b) => {
                map.serialize_entry(key, b)?
            }
            MessageBody::LinkAdd(b) | MessageBody::LinkRemove(b) => map.serialize_entry(key, b)?,
            MessageBody::UserDataAdd(b) | MessageBody::UserDataRemove(b) => {
                map.serialize_entry(key, b)?
            }
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HashScheme {
    #[serde(rename = "HASH_SCHEME_BLAKE3")]
    Blake3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignatureScheme {
    #[serde(rename = "SIGNATURE_SCHEME_ED25519")]
    Ed25519,
}

/// Signed message as POSTed to `/v1/submitMessage`. Byte fields are
/// `0x`-prefixed hex.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope<'a> {
    pub data: &'a MessageData,
    pub data_bytes: String,
    pub hash: String,
    pub hash_scheme: HashScheme,
    pub signature: String,
    pub signature_scheme: SignatureScheme,
    pub signer: String,
}
