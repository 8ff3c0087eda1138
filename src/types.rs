//! Domain values returned to callers, plus the borrowed hub response shapes
//! they are copied out of.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{MessageType, UserDataType};

pub type Fid = u64;

// ============================================================================
// Domain Types
// ============================================================================

/// Cast identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastId {
    /// Author FID
    pub fid: Fid,
    /// Cast hash
    pub hash: String,
}

impl CastId {
    /// Create a new cast ID.
    pub fn new(hash: impl Into<String>, fid: Fid) -> Self {
        Self {
            fid,
            hash: hash.into(),
        }
    }
}

/// Engagement counts for a cast. Hub message endpoints do not report
/// these, so they stay zero unless a caller fills them in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastCounts {
    pub likes: u32,
    pub recasts: u32,
    pub replies: u32,
}

/// A Farcaster cast (post).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cast {
    /// Cast hash (unique identifier)
    pub hash: String,
    /// Parent cast hash if this is a reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_hash: Option<String>,
    /// Parent author FID if this is a reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_fid: Option<Fid>,
    /// Channel URL the cast was posted under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<String>,
    /// Author FID
    pub author: Fid,
    pub text: String,
    /// Seconds, as stamped on the message
    pub timestamp: u64,
    #[serde(default)]
    pub mentions: Vec<Fid>,
    /// URLs embedded in the cast
    #[serde(default)]
    pub embeds: Vec<String>,
    #[serde(default)]
    pub counts: CastCounts,
}

impl Cast {
    /// Check if this cast is a reply.
    pub fn is_reply(&self) -> bool {
        self.parent_hash.is_some()
    }

    /// Message timestamp as a UTC datetime.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.timestamp).ok()?, 0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounts {
    pub followers: u32,
    pub following: u32,
}

/// Farcaster user profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub fid: Fid,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub counts: UserCounts,
}

impl User {
    /// Create a new profile with minimal information.
    pub fn new(fid: Fid) -> Self {
        Self {
            fid,
            ..Self::default()
        }
    }
}

/// Lifetime request counters for one client.
///
/// Counters track HTTP round trips, not operation outcomes. A request fails
/// on a transport error, a non-2xx status or an oversized body. A 2xx reply
/// whose body then fails to parse still counts as successful, so
/// `failed_requests` can be lower than the number of failed operations.
/// Calls rejected by the rate limiter only bump `rate_limit_hits`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClientStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rate_limit_hits: u64,
    pub avg_response_time_ms: f64,
}

impl ClientStats {
    /// Fold one completed HTTP call into the counters.
    pub fn record(&mut self, elapsed_ms: f64, bytes_sent: u64, bytes_received: u64, success: bool) {
        self.total_requests += 1;
        if !success {
            self.failed_requests += 1;
        }
        self.bytes_sent += bytes_sent;
        self.bytes_received += bytes_received;
        self.avg_response_time_ms +=
            (elapsed_ms - self.avg_response_time_ms) / self.total_requests as f64;
    }

    pub fn record_rate_limit_hit(&mut self) {
        self.rate_limit_hits += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        (self.total_requests - self.failed_requests) as f64 / self.total_requests as f64
    }
}

// ============================================================================
// Hub Response Types
// These borrow from the response body held in the transient arena.
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct HubMessagePage<'a> {
    #[serde(borrow, default)]
    pub messages: Vec<HubMessage<'a>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HubMessage<'a> {
    #[serde(borrow)]
    pub data: HubMessageData<'a>,
    #[serde(borrow, default)]
    pub hash: Cow<'a, str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HubMessageData<'a> {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub fid: Fid,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(borrow, default)]
    pub cast_add_body: Option<HubCastAddBody<'a>>,
    #[serde(borrow, default)]
    pub link_body: Option<HubLinkBody<'a>>,
    #[serde(borrow, default)]
    pub user_data_body: Option<HubUserDataBody<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HubCastAddBody<'a> {
    #[serde(borrow, default)]
    pub text: Cow<'a, str>,
    #[serde(default)]
    pub mentions: Vec<Fid>,
    #[serde(borrow, default)]
    pub parent_cast_id: Option<HubCastId<'a>>,
    #[serde(default)]
    pub parent_url: Option<String>,
    #[serde(borrow, default)]
    pub embeds: Vec<HubEmbed<'a>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HubCastId<'a> {
    #[serde(default)]
    pub fid: Fid,
    #[serde(borrow)]
    pub hash: Cow<'a, str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HubEmbed<'a> {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(borrow, default)]
    pub cast_id: Option<HubCastId<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HubLinkBody<'a> {
    #[serde(rename = "type", borrow, default)]
    pub link_type: Cow<'a, str>,
    #[serde(default)]
    pub target_fid: Fid,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HubUserDataBody<'a> {
    #[serde(rename = "type")]
    pub data_type: UserDataType,
    #[serde(borrow, default)]
    pub value: Cow<'a, str>,
}

/// Hub error payload, e.g. `{"errCode": "bad_request.validation_failure", "details": ".."}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HubErrorBody<'a> {
    #[serde(borrow, default)]
    pub err_code: Option<Cow<'a, str>>,
    #[serde(borrow, default)]
    pub details: Option<Cow<'a, str>>,
}

impl HubMessage<'_> {
    /// Copy a cast-add message out of the arena. Other kinds yield `None`.
    pub(crate) fn to_cast(&self) -> Option<Cast> {
        if self.data.kind != MessageType::CastAdd {
            return None;
        }
        let body = self.data.cast_add_body.as_ref()?;
        Some(Cast {
            hash: self.hash.to_string(),
            parent_hash: body.parent_cast_id.as_ref().map(|p| p.hash.to_string()),
            parent_fid: body.parent_cast_id.as_ref().map(|p| p.fid),
            parent_url: body.parent_url.clone(),
            author: self.data.fid,
            text: body.text.to_string(),
            timestamp: self.data.timestamp,
            mentions: body.mentions.clone(),
            embeds: body.embeds.iter().filter_map(|e| e.url.clone()).collect(),
            counts: CastCounts::default(),
        })
    }

    pub(crate) fn follow_link(&self) -> Option<&HubLinkBody<'_>> {
        if self.data.kind != MessageType::LinkAdd {
            return None;
        }
        self.data
            .link_body
            .as_ref()
            .filter(|link| link.link_type == "follow")
    }
}

/// Fold user-data messages into a profile. Later messages win.
pub(crate) fn user_from_messages(fid: Fid, messages: &[HubMessage<'_>]) -> User {
    let mut user = User::new(fid);
    for message in messages {
        if message.data.kind != MessageType::UserDataAdd {
            continue;
        }
        let Some(body) = message.data.user_data_body.as_ref() else {
            continue;
        };
        let value = body.value.to_string();
        match body.data_type {
            UserDataType::Username => user.username = value,
            UserDataType::Display => user.display_name = value,
            UserDataType::Bio => user.bio = value,
            UserDataType::Pfp => user.avatar_url = value,
            UserDataType::Url => user.url = Some(value),
            UserDataType::Unknown => {}
        }
    }
    user
}
