//! Event payloads: a two-level tagged union.
//!
//! The outer case names the kind of stream the event belongs to. The inner
//! content case names what the event does within that stream. Both levels
//! must be set for a client-built event; miniblock headers are node-built
//! and carry no content case.

use serde::{Deserialize, Serialize};

use crate::stream::StreamId;
use crate::types::{Address, EventHash};

/// Outer payload case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "case", content = "value", rename_all = "camelCase")]
pub enum Payload {
    SpacePayload(SpacePayload),
    ChannelPayload(ChannelPayload),
    UserPayload(UserPayload),
    MemberPayload(MemberPayload),
    MiniblockHeader(MiniblockHeader),
}

impl Payload {
    /// Name of the outer case.
    pub fn case(&self) -> &'static str {
        match self {
            Payload::SpacePayload(_) => "spacePayload",
            Payload::ChannelPayload(_) => "channelPayload",
            Payload::UserPayload(_) => "userPayload",
            Payload::MemberPayload(_) => "memberPayload",
            Payload::MiniblockHeader(_) => "miniblockHeader",
        }
    }

    /// Name of the inner content case, if one is set.
    pub fn content_case(&self) -> Option<&'static str> {
        match self {
            Payload::SpacePayload(p) => p.content.as_ref().map(SpaceContent::case),
            Payload::ChannelPayload(p) => p.content.as_ref().map(ChannelContent::case),
            Payload::UserPayload(p) => p.content.as_ref().map(UserContent::case),
            Payload::MemberPayload(p) => p.content.as_ref().map(MemberContent::case),
            Payload::MiniblockHeader(_) => None,
        }
    }

    pub fn as_miniblock_header(&self) -> Option<&MiniblockHeader> {
        match self {
            Payload::MiniblockHeader(h) => Some(h),
            _ => None,
        }
    }

    pub fn is_miniblock_header(&self) -> bool {
        matches!(self, Payload::MiniblockHeader(_))
    }

    /// Shorthand for a channel message payload.
    pub fn channel_message(ciphertext: impl Into<String>) -> Self {
        Payload::ChannelPayload(ChannelPayload {
            content: Some(ChannelContent::Message(EncryptedData::new(ciphertext))),
        })
    }
}

/// Opaque message body. Encryption happens above this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub ciphertext: String,
    pub algorithm: String,
    pub session_id: String,
}

impl EncryptedData {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            algorithm: String::new(),
            session_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MembershipOp {
    Invite,
    Join,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub op: MembershipOp,
    pub user_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpacePayload {
    pub content: Option<SpaceContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "case", content = "value", rename_all = "camelCase")]
pub enum SpaceContent {
    Inception { stream_id: StreamId, name: String },
    Channel { channel_id: StreamId, deleted: bool },
}

impl SpaceContent {
    fn case(&self) -> &'static str {
        match self {
            SpaceContent::Inception { .. } => "inception",
            SpaceContent::Channel { .. } => "channel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPayload {
    pub content: Option<ChannelContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "case", content = "value", rename_all = "camelCase")]
pub enum ChannelContent {
    Inception { stream_id: StreamId, space_id: StreamId },
    Message(EncryptedData),
    Redaction { event_id: EventHash },
}

impl ChannelContent {
    fn case(&self) -> &'static str {
        match self {
            ChannelContent::Inception { .. } => "inception",
            ChannelContent::Message(_) => "message",
            ChannelContent::Redaction { .. } => "redaction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    pub content: Option<UserContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "case", content = "value", rename_all = "camelCase")]
pub enum UserContent {
    Inception { stream_id: StreamId },
    UserMembership { stream_id: StreamId, op: MembershipOp },
}

impl UserContent {
    fn case(&self) -> &'static str {
        match self {
            UserContent::Inception { .. } => "inception",
            UserContent::UserMembership { .. } => "userMembership",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPayload {
    pub content: Option<MemberContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "case", content = "value", rename_all = "camelCase")]
pub enum MemberContent {
    Membership(Membership),
    Username(EncryptedData),
    DisplayName(EncryptedData),
}

impl MemberContent {
    fn case(&self) -> &'static str {
        match self {
            MemberContent::Membership(_) => "membership",
            MemberContent::Username(_) => "username",
            MemberContent::DisplayName(_) => "displayName",
        }
    }
}

/// Header of a miniblock, written by the node that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniblockHeader {
    pub miniblock_num: u64,
    pub prev_miniblock_hash: Option<EventHash>,
    pub timestamp_ms: i64,
    pub event_hashes: Vec<EventHash>,
    pub snapshot: Option<Snapshot>,
    pub event_num_offset: u64,
    pub prev_snapshot_miniblock_num: u64,
}

/// Member-scoped value with the hash of the event that set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedData {
    pub data: EncryptedData,
    pub event_hash: EventHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMember {
    pub user_address: Address,
    pub username: Option<WrappedData>,
    pub display_name: Option<WrappedData>,
}

/// Materialized stream state as of a snapshot miniblock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub members: Vec<SnapshotMember>,
}

impl Snapshot {
    /// Hashes of events referenced by the snapshot, usernames first.
    pub fn event_ids(&self) -> Vec<String> {
        let usernames = self
            .members
            .iter()
            .filter_map(|m| m.username.as_ref())
            .map(|w| w.event_hash.to_hex());
        let display_names = self
            .members
            .iter()
            .filter_map(|m| m.display_name.as_ref())
            .map(|w| w.event_hash.to_hex());
        usernames.chain(display_names).collect()
    }
}
