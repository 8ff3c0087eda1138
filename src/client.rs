//! Blocking client for the Farcaster hub HTTP API.
//!
//! Every operation takes `&mut self`: a client serves one call at a time,
//! and the transient arena is reset at the start of each call.

use std::io::Read;
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::arena::{ArenaManager, ArenaStats};
use crate::config::ClientConfig;
use crate::defaults;
use crate::error::{FarcasterError, Result};
use crate::message::{
    CastAddBody, CastParent, CastRemoveBody, Embed, HashScheme, LinkBody, MessageBody,
    MessageData, ReactionBody, ReactionType, SignatureScheme, SignedEnvelope, UserDataBody,
    UserDataType,
};
use crate::rate_limit::RateLimiter;
use crate::signer::SigningEngine;
use crate::types::{
    user_from_messages, Cast, CastId, ClientStats, Fid, HubErrorBody, HubMessage,
    HubMessagePage, User,
};

const USER_AGENT: &str = concat!("elizaos-farcaster-hub/", env!("CARGO_PKG_VERSION"));

// Rate limiter keys, one per hub endpoint.
const CASTS_BY_FID: &str = "castsByFid";
const CASTS_BY_PARENT: &str = "castsByParent";
const LINKS_BY_TARGET_FID: &str = "linksByTargetFid";
const LINKS_BY_FID: &str = "linksByFid";
const USER_DATA_BY_FID: &str = "userDataByFid";
const SUBMIT_MESSAGE: &str = "submitMessage";

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("URL pattern compiles"))
}

/// URLs found in cast text, in order, capped at the embed limit.
pub fn extract_embed_urls(text: &str) -> Vec<String> {
    url_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', '!', '?']).to_string())
        .take(defaults::MAX_EMBEDS)
        .collect()
}

/// Trim cast text and check it against the protocol length limit.
pub fn validate_cast_text(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(FarcasterError::invalid_message("cast text is empty"));
    }
    if text.len() > defaults::MAX_CAST_LENGTH {
        return Err(FarcasterError::invalid_message(format!(
            "cast text is {} bytes, limit is {}",
            text.len(),
            defaults::MAX_CAST_LENGTH
        )));
    }
    Ok(text)
}

fn validate_cast_hash(hash: &str) -> Result<()> {
    let digits = hash.strip_prefix("0x").unwrap_or(hash);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FarcasterError::invalid_message(format!(
            "invalid cast hash '{hash}'"
        )));
    }
    Ok(())
}

fn validate_fid(fid: Fid) -> Result<()> {
    if fid == 0 {
        return Err(FarcasterError::invalid_message("FID must be positive"));
    }
    Ok(())
}

fn reaction_body(reaction_type: ReactionType, hash: &str, author: Fid) -> Result<ReactionBody> {
    validate_cast_hash(hash)?;
    validate_fid(author)?;
    Ok(ReactionBody {
        reaction_type,
        target_cast_id: CastId::new(hash, author),
    })
}

/// Hub reads answer either `{"messages": [...]}` or a bare array.
fn parse_messages(body: &[u8]) -> Result<Vec<HubMessage<'_>>> {
    let first = body.iter().find(|b| !b.is_ascii_whitespace());
    let parsed = if first == Some(&b'[') {
        serde_json::from_slice::<Vec<HubMessage<'_>>>(body)
    } else {
        serde_json::from_slice::<HubMessagePage<'_>>(body).map(|page| page.messages)
    };
    parsed.map_err(|e| {
        warn!(error = %e, "malformed hub response");
        FarcasterError::JsonParse(e)
    })
}

fn http_error(status: StatusCode, body: &[u8]) -> FarcasterError {
    let detail = serde_json::from_slice::<HubErrorBody<'_>>(body)
        .ok()
        .and_then(|e| e.details.or(e.err_code))
        .map(|d| d.into_owned());
    let message = detail.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });
    FarcasterError::http(status.as_u16(), message)
}

fn cast_footprint(cast: &Cast) -> usize {
    std::mem::size_of::<Cast>()
        + cast.hash.len()
        + cast.text.len()
        + cast.parent_hash.as_ref().map_or(0, String::len)
        + cast.parent_url.as_ref().map_or(0, String::len)
        + cast.mentions.len() * std::mem::size_of::<Fid>()
        + cast.embeds.iter().map(String::len).sum::<usize>()
}

fn user_footprint(user: &User) -> usize {
    std::mem::size_of::<User>()
        + user.username.len()
        + user.display_name.len()
        + user.bio.len()
        + user.avatar_url.len()
        + user.url.as_ref().map_or(0, String::len)
}

/// Farcaster hub client.
///
/// Reads go straight to the hub's message endpoints; writes are signed
/// locally and posted to `/v1/submitMessage`.
pub struct FarcasterClient {
    // Fields drop in declaration order: key material first, then the
    // connection pool, then limiter state.
    signer: SigningEngine,
    http: Client,
    rate_limiter: RateLimiter,
    config: ClientConfig,
    arena: ArenaManager,
    stats: ClientStats,
}

impl FarcasterClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let signer = SigningEngine::new(config.private_key_hex())?;
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()?;
        let rate_limiter = RateLimiter::new(*config.rate_limit());

        info!(
            fid = config.fid(),
            hub = config.base_url(),
            signer = %signer.public_key_hex(),
            "Farcaster hub client created"
        );

        Ok(Self {
            signer,
            http,
            rate_limiter,
            config,
            arena: ArenaManager::new(),
            stats: ClientStats::default(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn fid(&self) -> Fid {
        self.config.fid()
    }

    pub fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Casts authored by `fid`, newest first as the hub orders them.
    pub fn get_casts_by_fid(&mut self, fid: Fid, limit: u32) -> Result<Vec<Cast>> {
        self.arena.reset_transient();
        let arena = self.arena.transient();
        arena.uri.push_str(&format!(
            "{}/v1/castsByFid?fid={}&limit={}",
            self.config.base_url(),
            fid,
            limit
        ));
        debug!(fid, limit, "fetching casts by fid");
        self.fetch(CASTS_BY_FID)?;
        self.copy_casts()
    }

    /// Casts posted under a channel URL.
    pub fn get_casts_by_channel(&mut self, channel_url: &str, limit: u32) -> Result<Vec<Cast>> {
        if channel_url.trim().is_empty() {
            return Err(FarcasterError::invalid_message("channel URL is empty"));
        }
        self.arena.reset_transient();
        let arena = self.arena.transient();
        arena.uri.push_str(&format!("{}/v1/castsByParent?url=", self.config.base_url()));
        arena
            .uri
            .extend(form_urlencoded::byte_serialize(channel_url.as_bytes()));
        arena.uri.push_str(&format!("&limit={limit}"));
        debug!(channel_url, limit, "fetching casts by channel");
        self.fetch(CASTS_BY_PARENT)?;
        self.copy_casts()
    }

    /// FIDs that follow `fid`.
    pub fn get_followers(&mut self, fid: Fid) -> Result<Vec<Fid>> {
        self.arena.reset_transient();
        let arena = self.arena.transient();
        arena.uri.push_str(&format!(
            "{}/v1/linksByTargetFid?target_fid={}&link_type=follow",
            self.config.base_url(),
            fid
        ));
        self.fetch(LINKS_BY_TARGET_FID)?;

        let followers: Vec<Fid> = parse_messages(&self.arena.transient().body)?
            .iter()
            .filter(|m| m.follow_link().is_some())
            .map(|m| m.data.fid)
            .collect();
        self.arena
            .note_persisted(followers.len() * std::mem::size_of::<Fid>());
        debug!(fid, count = followers.len(), "fetched followers");
        Ok(followers)
    }

    /// FIDs that `fid` follows.
    pub fn get_following(&mut self, fid: Fid) -> Result<Vec<Fid>> {
        self.arena.reset_transient();
        let arena = self.arena.transient();
        arena.uri.push_str(&format!(
            "{}/v1/linksByFid?fid={}&link_type=follow",
            self.config.base_url(),
            fid
        ));
        self.fetch(LINKS_BY_FID)?;

        let following: Vec<Fid> = parse_messages(&self.arena.transient().body)?
            .iter()
            .filter_map(|m| m.follow_link().map(|link| link.target_fid))
            .collect();
        self.arena
            .note_persisted(following.len() * std::mem::size_of::<Fid>());
        debug!(fid, count = following.len(), "fetched following");
        Ok(following)
    }

    /// Profile assembled from the user's user-data messages.
    pub fn get_user_profile(&mut self, fid: Fid) -> Result<User> {
        self.arena.reset_transient();
        let arena = self.arena.transient();
        arena.uri.push_str(&format!(
            "{}/v1/userDataByFid?fid={}",
            self.config.base_url(),
            fid
        ));
        self.fetch(USER_DATA_BY_FID)?;

        let user = {
            let messages = parse_messages(&self.arena.transient().body)?;
            user_from_messages(fid, &messages)
        };
        self.arena.note_persisted(user_footprint(&user));
        debug!(fid, username = %user.username, "fetched user profile");
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Publish a cast, optionally under a channel URL. URLs in the text
    /// become embeds. Returns the hub's response body.
    pub fn post_cast(&mut self, text: &str, channel_url: Option<&str>) -> Result<String> {
        let text = validate_cast_text(text)?;
        let body = CastAddBody {
            text: text.to_string(),
            embeds: extract_embed_urls(text).into_iter().map(Embed::Url).collect(),
            parent: channel_url
                .filter(|url| !url.trim().is_empty())
                .map(|url| CastParent::Url(url.to_string())),
            ..CastAddBody::default()
        };
        self.submit_body(MessageBody::CastAdd(body))
    }

    pub fn reply_to_cast(&mut self, text: &str, parent: CastId) -> Result<String> {
        let text = validate_cast_text(text)?;
        validate_cast_hash(&parent.hash)?;
        validate_fid(parent.fid)?;
        let body = CastAddBody {
            text: text.to_string(),
            embeds: extract_embed_urls(text).into_iter().map(Embed::Url).collect(),
            parent: Some(CastParent::Cast(parent)),
            ..CastAddBody::default()
        };
        self.submit_body(MessageBody::CastAdd(body))
    }

    pub fn remove_cast(&mut self, hash: &str) -> Result<String> {
        validate_cast_hash(hash)?;
        self.submit_body(MessageBody::CastRemove(CastRemoveBody {
            target_hash: hash.to_string(),
        }))
    }

    pub fn like_cast(&mut self, hash: &str, author: Fid) -> Result<String> {
        let body = reaction_body(ReactionType::Like, hash, author)?;
        self.submit_body(MessageBody::ReactionAdd(body))
    }

    pub fn unlike_cast(&mut self, hash: &str, author: Fid) -> Result<String> {
        let body = reaction_body(ReactionType::Like, hash, author)?;
        self.submit_body(MessageBody::ReactionRemove(body))
    }

    pub fn recast_cast(&mut self, hash: &str, author: Fid) -> Result<String> {
        let body = reaction_body(ReactionType::Recast, hash, author)?;
        self.submit_body(MessageBody::ReactionAdd(body))
    }

    pub fn unrecast_cast(&mut self, hash: &str, author: Fid) -> Result<String> {
        let body = reaction_body(ReactionType::Recast, hash, author)?;
        self.submit_body(MessageBody::ReactionRemove(body))
    }

    pub fn follow_user(&mut self, target: Fid) -> Result<String> {
        validate_fid(target)?;
        self.submit_body(MessageBody::LinkAdd(LinkBody::follow(target)))
    }

    pub fn unfollow_user(&mut self, target: Fid) -> Result<String> {
        validate_fid(target)?;
        self.submit_body(MessageBody::LinkRemove(LinkBody::follow(target)))
    }

    pub fn set_user_data(&mut self, data_type: UserDataType, value: &str) -> Result<String> {
        if data_type == UserDataType::Unknown {
            return Err(FarcasterError::invalid_message("unsupported user data type"));
        }
        self.submit_body(MessageBody::UserDataAdd(UserDataBody {
            data_type,
            value: value.to_string(),
        }))
    }

    /// Serialize, hash, sign and POST a message. Nothing is sent unless
    /// every step before the POST succeeds.
    pub fn submit_message(&mut self, data: &MessageData) -> Result<String> {
        self.arena.reset_transient();
        self.admit(SUBMIT_MESSAGE)?;

        let arena = self.arena.transient();
        arena.uri.push_str(&format!("{}/v1/submitMessage", self.config.base_url()));
        serde_json::to_writer(&mut arena.payload, data).map_err(FarcasterError::Serialization)?;

        let hash = SigningEngine::hash(&arena.payload);
        let signature = self.signer.sign(&hash);
        let envelope = SignedEnvelope {
            data,
            data_bytes: format!("0x{}", hex::encode(&arena.payload)),
            hash: format!("0x{}", hex::encode(hash)),
            hash_scheme: HashScheme::Blake3,
            signature: format!("0x{}", hex::encode(signature.to_bytes())),
            signature_scheme: SignatureScheme::Ed25519,
            signer: self.signer.public_key_hex(),
        };
        serde_json::to_writer(&mut arena.envelope, &envelope)
            .map_err(FarcasterError::Serialization)?;

        let bytes_sent = arena.envelope.len() as u64;
        let request = self
            .http
            .post(arena.uri.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(arena.envelope.clone());

        debug!(kind = ?data.kind(), hash = %envelope.hash, bytes = bytes_sent, "submitting message");
        self.send(request, bytes_sent)?;

        let response = self.arena.persist_body()?;
        info!(kind = ?data.kind(), fid = data.fid, "message accepted by hub");
        Ok(response)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn submit_body(&mut self, body: MessageBody) -> Result<String> {
        let data = MessageData::now(self.config.fid(), body);
        self.submit_message(&data)
    }

    fn admit(&mut self, key: &str) -> Result<()> {
        if let Err(err) = self.rate_limiter.check_limit(key) {
            self.stats.record_rate_limit_hit();
            return Err(err);
        }
        Ok(())
    }

    /// GET the URI already built in the arena.
    fn fetch(&mut self, key: &str) -> Result<()> {
        self.admit(key)?;
        let arena = self.arena.transient();
        let bytes_sent = arena.uri.len() as u64;
        let request = self
            .http
            .get(arena.uri.as_str())
            .header(ACCEPT, "application/json");
        self.send(request, bytes_sent)
    }

    fn send(&mut self, request: RequestBuilder, bytes_sent: u64) -> Result<()> {
        let started = Instant::now();
        let outcome = self.receive(request);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let bytes_received = self.arena.transient().body.len() as u64;
        self.stats
            .record(elapsed_ms, bytes_sent, bytes_received, outcome.is_ok());
        if let Err(err) = &outcome {
            warn!(error = %err, elapsed_ms, "hub request failed");
        }
        outcome
    }

    /// Read the response body into the arena, bounded by `max_response_size`.
    fn receive(&mut self, request: RequestBuilder) -> Result<()> {
        let response = request.send()?;
        let status = response.status();
        let limit = self.config.max_response_size();

        let declared = response.content_length().unwrap_or(0);
        if declared > limit as u64 {
            return Err(FarcasterError::ResponseTooLarge { limit });
        }

        let arena = self.arena.transient();
        arena.reserve_body(declared as usize)?;
        let read = response
            .take((limit as u64).saturating_add(1))
            .read_to_end(&mut arena.body)?;
        if read > limit {
            return Err(FarcasterError::ResponseTooLarge { limit });
        }

        if !status.is_success() {
            return Err(http_error(status, &arena.body));
        }
        Ok(())
    }

    fn copy_casts(&mut self) -> Result<Vec<Cast>> {
        let casts: Vec<Cast> = parse_messages(&self.arena.transient().body)?
            .iter()
            .filter_map(|m| m.to_cast())
            .collect();
        self.arena
            .note_persisted(casts.iter().map(cast_footprint).sum());
        debug!(count = casts.len(), "copied casts out of arena");
        Ok(casts)
    }
}

impl Drop for FarcasterClient {
    fn drop(&mut self) {
        debug!(fid = self.config.fid(), "Farcaster hub client released");
    }
}
