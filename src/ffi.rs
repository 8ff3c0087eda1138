//! C ABI for embedding the hub client.
//!
//! Clients cross the boundary as opaque `FarcasterClient` pointers. Every
//! string returned to the caller is owned by the caller and must be passed
//! to [`fc_free_string`] exactly once. Failures are logged and surface as a
//! null return; no Rust error type crosses the boundary.

#![allow(unsafe_code)]

use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, error, warn};
use zeroize::Zeroizing;

use crate::client::FarcasterClient;
use crate::config::ClientConfig;
use crate::defaults;
use crate::error::{FarcasterError, Result};

/// Addresses below this are never handed out by the allocator.
const MIN_VALID_ADDRESS: usize = 0x1000;

/// Handles returned by `fc_client_create*` and not yet destroyed.
static LIVE_CLIENTS: Mutex<BTreeSet<usize>> = Mutex::new(BTreeSet::new());

/// Strings handed to the caller and not yet freed.
static OUTSTANDING_STRINGS: Mutex<BTreeSet<usize>> = Mutex::new(BTreeSet::new());

fn registry(set: &Mutex<BTreeSet<usize>>) -> MutexGuard<'_, BTreeSet<usize>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

fn plausible<T>(ptr: *const T) -> bool {
    !ptr.is_null() && ptr as usize >= MIN_VALID_ADDRESS
}

/// Helper to convert C string to Rust string
fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if !plausible(ptr) {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(str::to_string) }
}

/// Helper to convert Rust string to a caller-owned C string
fn string_to_cstr(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => {
            let raw = cs.into_raw();
            registry(&OUTSTANDING_STRINGS).insert(raw as usize);
            raw
        }
        Err(_) => {
            error!("result contains an interior NUL byte");
            ptr::null_mut()
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(FarcasterError::Serialization)
}

/// Run `op` against a registered client, converting errors and panics
/// into a null return.
fn with_client<F>(client: *mut FarcasterClient, operation: &'static str, op: F) -> *mut c_char
where
    F: FnOnce(&mut FarcasterClient) -> Result<String>,
{
    if !registry(&LIVE_CLIENTS).contains(&(client as usize)) {
        warn!(operation, "called with an unknown client handle");
        return ptr::null_mut();
    }
    let client = unsafe { &mut *client };

    match catch_unwind(AssertUnwindSafe(|| op(client))) {
        Ok(Ok(output)) => string_to_cstr(output),
        Ok(Err(err)) => {
            error!(operation, error = %err, kind = ?err.kind(), "operation failed");
            ptr::null_mut()
        }
        Err(_) => {
            error!(operation, "panic caught at FFI boundary");
            ptr::null_mut()
        }
    }
}

fn create_client(fid: u64, private_key_hex: *const c_char, hub_url: String) -> *mut FarcasterClient {
    let Some(key) = cstr_to_string(private_key_hex).map(Zeroizing::new) else {
        warn!("fc_client_create: private key is null or not UTF-8");
        return ptr::null_mut();
    };

    let built = catch_unwind(AssertUnwindSafe(|| {
        ClientConfig::new(hub_url, fid, key.as_str()).and_then(FarcasterClient::new)
    }));
    match built {
        Ok(Ok(client)) => {
            let raw = Box::into_raw(Box::new(client));
            registry(&LIVE_CLIENTS).insert(raw as usize);
            debug!(fid, "client handle created");
            raw
        }
        Ok(Err(err)) => {
            error!(fid, error = %err, "fc_client_create failed");
            ptr::null_mut()
        }
        Err(_) => {
            error!(fid, "panic caught while creating client");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Client lifecycle
// ============================================================================

/// Create a client against the default hub. Returns null on failure.
///
/// # Safety
/// `private_key_hex` must be a valid null-terminated C string. The handle
/// must be released with `fc_client_destroy`.
#[no_mangle]
pub extern "C" fn fc_client_create(fid: u64, private_key_hex: *const c_char) -> *mut FarcasterClient {
    create_client(fid, private_key_hex, defaults::HUB_URL.to_string())
}

/// Create a client against a specific hub base URL. Returns null on failure.
///
/// # Safety
/// Both string arguments must be valid null-terminated C strings.
#[no_mangle]
pub extern "C" fn fc_client_create_with_hub(
    fid: u64,
    private_key_hex: *const c_char,
    hub_url: *const c_char,
) -> *mut FarcasterClient {
    let Some(hub_url) = cstr_to_string(hub_url) else {
        warn!("fc_client_create_with_hub: hub URL is null or not UTF-8");
        return ptr::null_mut();
    };
    create_client(fid, private_key_hex, hub_url)
}

/// Destroy a client: signing key, then HTTP pool, then limiter state.
/// No-op on null, unknown or already destroyed handles.
#[no_mangle]
pub extern "C" fn fc_client_destroy(client: *mut FarcasterClient) {
    if client.is_null() {
        warn!("fc_client_destroy called with null");
        return;
    }
    if !registry(&LIVE_CLIENTS).remove(&(client as usize)) {
        warn!("fc_client_destroy called with an unknown or already destroyed handle");
        return;
    }
    let dropped = catch_unwind(AssertUnwindSafe(|| drop(unsafe { Box::from_raw(client) })));
    if dropped.is_err() {
        error!("panic caught while destroying client");
    }
}

// ============================================================================
// Cast operations
// ============================================================================

/// Post a cast, optionally under a channel. `channel_url` may be null.
/// Returns the hub response body.
///
/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_post_cast(
    client: *mut FarcasterClient,
    text: *const c_char,
    channel_url: *const c_char,
) -> *mut c_char {
    let Some(text) = cstr_to_string(text) else {
        warn!("fc_post_cast: text is null or not UTF-8");
        return ptr::null_mut();
    };
    let channel_url = if channel_url.is_null() {
        None
    } else {
        let Some(url) = cstr_to_string(channel_url) else {
            warn!("fc_post_cast: channel URL is not a valid UTF-8 string");
            return ptr::null_mut();
        };
        Some(url)
    };
    with_client(client, "fc_post_cast", |c| c.post_cast(&text, channel_url.as_deref()))
}

/// Casts under a channel as a JSON array.
///
/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_get_casts_by_channel(
    client: *mut FarcasterClient,
    channel_url: *const c_char,
    limit: u32,
) -> *mut c_char {
    let Some(channel_url) = cstr_to_string(channel_url) else {
        warn!("fc_get_casts_by_channel: channel URL is null or not UTF-8");
        return ptr::null_mut();
    };
    with_client(client, "fc_get_casts_by_channel", |c| {
        to_json(&c.get_casts_by_channel(&channel_url, limit)?)
    })
}

// ============================================================================
// Reaction operations
// ============================================================================

fn reaction(
    client: *mut FarcasterClient,
    operation: &'static str,
    cast_hash: *const c_char,
    cast_fid: u64,
    apply: fn(&mut FarcasterClient, &str, u64) -> Result<String>,
) -> *mut c_char {
    let Some(hash) = cstr_to_string(cast_hash) else {
        warn!(operation, "cast hash is null or not UTF-8");
        return ptr::null_mut();
    };
    with_client(client, operation, |c| apply(c, &hash, cast_fid))
}

/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_like_cast(
    client: *mut FarcasterClient,
    cast_hash: *const c_char,
    cast_fid: u64,
) -> *mut c_char {
    reaction(client, "fc_like_cast", cast_hash, cast_fid, FarcasterClient::like_cast)
}

/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_recast_cast(
    client: *mut FarcasterClient,
    cast_hash: *const c_char,
    cast_fid: u64,
) -> *mut c_char {
    reaction(client, "fc_recast_cast", cast_hash, cast_fid, FarcasterClient::recast_cast)
}

/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_unlike_cast(
    client: *mut FarcasterClient,
    cast_hash: *const c_char,
    cast_fid: u64,
) -> *mut c_char {
    reaction(client, "fc_unlike_cast", cast_hash, cast_fid, FarcasterClient::unlike_cast)
}

/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_unrecast_cast(
    client: *mut FarcasterClient,
    cast_hash: *const c_char,
    cast_fid: u64,
) -> *mut c_char {
    reaction(client, "fc_unrecast_cast", cast_hash, cast_fid, FarcasterClient::unrecast_cast)
}

// ============================================================================
// Follow operations
// ============================================================================

/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_follow_user(client: *mut FarcasterClient, target_fid: u64) -> *mut c_char {
    with_client(client, "fc_follow_user", |c| c.follow_user(target_fid))
}

/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_unfollow_user(client: *mut FarcasterClient, target_fid: u64) -> *mut c_char {
    with_client(client, "fc_unfollow_user", |c| c.unfollow_user(target_fid))
}

/// Follower FIDs as a JSON array.
///
/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_get_followers(client: *mut FarcasterClient, fid: u64) -> *mut c_char {
    with_client(client, "fc_get_followers", |c| to_json(&c.get_followers(fid)?))
}

/// Followed FIDs as a JSON array.
///
/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_get_following(client: *mut FarcasterClient, fid: u64) -> *mut c_char {
    with_client(client, "fc_get_following", |c| to_json(&c.get_following(fid)?))
}

// ============================================================================
// User operations
// ============================================================================

/// User profile as a JSON object.
///
/// # Safety
/// The returned string must be freed with `fc_free_string`.
#[no_mangle]
pub extern "C" fn fc_get_user_profile(client: *mut FarcasterClient, fid: u64) -> *mut c_char {
    with_client(client, "fc_get_user_profile", |c| to_json(&c.get_user_profile(fid)?))
}

// ============================================================================
// Memory management
// ============================================================================

/// Free a string returned by this library. Null, foreign and already
/// freed pointers are ignored with a warning.
#[no_mangle]
pub extern "C" fn fc_free_string(s: *mut c_char) {
    if !plausible(s.cast_const()) {
        warn!("fc_free_string called with an invalid pointer");
        return;
    }
    if !registry(&OUTSTANDING_STRINGS).remove(&(s as usize)) {
        warn!("fc_free_string called with a string not owned by the caller");
        return;
    }
    drop(unsafe { CString::from_raw(s) });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::tests::test_key_hex;

    fn key() -> CString {
        CString::new(test_key_hex()).unwrap()
    }

    #[test]
    fn test_create_and_destroy() {
        let key = key();
        let client = fc_client_create(42, key.as_ptr());
        assert!(!client.is_null());
        assert!(registry(&LIVE_CLIENTS).contains(&(client as usize)));
        fc_client_destroy(client);
        assert!(!registry(&LIVE_CLIENTS).contains(&(client as usize)));
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let short = CString::new("abcd").unwrap();
        assert!(fc_client_create(42, short.as_ptr()).is_null());
        assert!(fc_client_create(42, ptr::null()).is_null());
        assert!(fc_client_create(0, key().as_ptr()).is_null());

        let hub = CString::new("ftp://hub").unwrap();
        assert!(fc_client_create_with_hub(42, key().as_ptr(), hub.as_ptr()).is_null());
        assert!(fc_client_create_with_hub(42, key().as_ptr(), ptr::null()).is_null());
    }

    #[test]
    fn test_destroy_is_safe_on_null_and_repeat() {
        fc_client_destroy(ptr::null_mut());
        let client = fc_client_create(42, key().as_ptr());
        fc_client_destroy(client);
        fc_client_destroy(client);
        fc_client_destroy(0x10 as *mut FarcasterClient);
    }

    #[test]
    fn test_operations_on_unknown_handle_return_null() {
        let text = CString::new("gm").unwrap();
        assert!(fc_post_cast(ptr::null_mut(), text.as_ptr(), ptr::null()).is_null());
        assert!(fc_follow_user(0x2000 as *mut FarcasterClient, 7).is_null());
    }

    #[test]
    fn test_null_arguments_return_null() {
        let client = fc_client_create(42, key().as_ptr());
        assert!(fc_post_cast(client, ptr::null(), ptr::null()).is_null());
        assert!(fc_like_cast(client, ptr::null(), 1).is_null());
        assert!(fc_get_casts_by_channel(client, ptr::null(), 10).is_null());
        fc_client_destroy(client);
    }

    #[test]
    fn test_post_cast_rejects_undecodable_channel() {
        let mut server = mockito::Server::new();
        let submit = server.mock("POST", "/v1/submitMessage").expect(0).create();

        let hub = CString::new(server.url()).unwrap();
        let client = fc_client_create_with_hub(42, key().as_ptr(), hub.as_ptr());
        assert!(!client.is_null());

        let text = CString::new("gm").unwrap();
        let channel = CStr::from_bytes_with_nul(b"ht\xffx\0").unwrap();
        assert!(fc_post_cast(client, text.as_ptr(), channel.as_ptr()).is_null());

        submit.assert();
        fc_client_destroy(client);
    }

    #[test]
    fn test_free_string_guards() {
        fc_free_string(ptr::null_mut());
        fc_free_string(0x8 as *mut c_char);

        let owned = string_to_cstr("[1,2,3]".to_string());
        assert!(registry(&OUTSTANDING_STRINGS).contains(&(owned as usize)));
        fc_free_string(owned);
        assert!(!registry(&OUTSTANDING_STRINGS).contains(&(owned as usize)));
        fc_free_string(owned);

        let foreign = CString::new("not ours").unwrap();
        fc_free_string(foreign.as_ptr() as *mut c_char);
        assert_eq!(foreign.to_str().unwrap(), "not ours");
    }

    #[test]
    fn test_interior_nul_yields_null() {
        assert!(string_to_cstr("a\0b".to_string()).is_null());
    }
}
