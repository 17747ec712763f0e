//! Streams and their locally held state.
//!
//! A stream is an append-only log of signed events, partitioned into
//! miniblocks. [`StreamStateView`] holds the contiguous span of miniblocks a
//! client has materialized: it is initialized from a stream response,
//! extended forward by sync updates and backward by scrollback.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use crate::envelope::ParsedEvent;
use crate::error::ValidationError;
use crate::miniblock::{miniblock_span, ParsedMiniblock, ParsedStreamResponse, SyncCookie};
use crate::payload::{MiniblockHeader, Snapshot};
use crate::types::{Address, EventHash};

/// Stream id prefixes by stream kind.
pub mod prefix {
    pub const SPACE: u8 = 0x10;
    pub const CHANNEL: u8 = 0x20;
    pub const USER: u8 = 0xa8;
}

/// A 32-byte stream identifier. The first byte is the stream kind prefix.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub [u8; 32]);

impl StreamId {
    /// A fresh random id with the given kind prefix.
    pub fn random(kind: u8) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes[1..]);
        bytes[0] = kind;
        Self(bytes)
    }

    /// The per-user stream id for `address` under the given kind prefix.
    pub fn for_user(kind: u8, address: &Address) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0] = kind;
        bytes[1..21].copy_from_slice(address.as_bytes());
        Self(bytes)
    }

    /// The kind prefix byte.
    pub const fn kind(&self) -> u8 {
        self.0[0]
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// The zero stream ID (sentinel).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for StreamId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for StreamId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The span of miniblocks held locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiniblockInfo {
    /// Lowest miniblock number held.
    pub min: u64,
    /// Highest miniblock number held.
    pub max: u64,
    /// Whether `min` is the genesis block.
    pub terminus_reached: bool,
}

/// A remote event placed on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub hash_str: String,
    pub event_num: u64,
    /// Set once the event is sealed into a miniblock.
    pub miniblock_num: Option<u64>,
    pub confirmed_event_num: Option<u64>,
    pub created_at_epoch_ms: i64,
    pub creator_user_id: String,
    pub remote_event: ParsedEvent,
}

impl TimelineEvent {
    fn from_parsed(parsed: ParsedEvent, event_num: u64, confirmed_in: Option<u64>) -> Self {
        Self {
            hash_str: parsed.hash_str.clone(),
            event_num,
            miniblock_num: confirmed_in,
            confirmed_event_num: confirmed_in.map(|_| event_num),
            created_at_epoch_ms: parsed.event.created_at_epoch_ms,
            creator_user_id: parsed.creator_user_id.clone(),
            remote_event: parsed,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.miniblock_num.is_some()
    }
}

/// Result of applying a page of older miniblocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrependOutcome {
    /// Events were placed at the front of the timeline.
    Prepended { events: usize, duplicates: usize },
    /// The page was not older than the held span and was ignored.
    Ignored,
}

/// Locally materialized state of one stream.
#[derive(Debug, Clone)]
pub struct StreamStateView {
    pub stream_id: StreamId,
    pub miniblock_info: Option<MiniblockInfo>,
    pub prev_snapshot_miniblock_num: u64,
    pub snapshot: Option<Snapshot>,
    pub sync_cookie: Option<SyncCookie>,
    pub prev_miniblock_hash: Option<EventHash>,
    /// Non-header events, oldest first.
    pub timeline: Vec<TimelineEvent>,
    last_event_num: u64,
    known: HashSet<String>,
}

impl StreamStateView {
    /// An empty, uninitialized view.
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            miniblock_info: None,
            prev_snapshot_miniblock_num: 0,
            snapshot: None,
            sync_cookie: None,
            prev_miniblock_hash: None,
            timeline: Vec::new(),
            last_event_num: 0,
            known: HashSet::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.miniblock_info.is_some()
    }

    /// The oldest event on the timeline.
    pub fn first_event(&self) -> Option<&TimelineEvent> {
        self.timeline.first()
    }

    /// Whether an event with this hash has been applied.
    pub fn contains(&self, hash_str: &str) -> bool {
        self.known.contains(hash_str)
    }

    fn require_info(&self) -> Result<MiniblockInfo, ValidationError> {
        self.miniblock_info.ok_or_else(|| {
            ValidationError::BadBlock(format!("stream {} is not initialized", self.stream_id))
        })
    }

    /// Replace all state with a fresh stream response.
    ///
    /// On error the view is left as it was.
    pub fn initialize(&mut self, response: ParsedStreamResponse) -> Result<(), ValidationError> {
        let ParsedStreamResponse {
            stream_and_cookie,
            snapshot,
            prev_snapshot_miniblock_num,
            ..
        } = response;

        let (first, to_exclusive, last) = match (
            miniblock_span(&stream_and_cookie.miniblocks)?,
            stream_and_cookie.miniblocks.last(),
        ) {
            (Some((first, to_exclusive)), Some(last)) => (first, to_exclusive, last),
            _ => {
                return Err(ValidationError::BadBlock(format!(
                    "stream {} has no miniblocks",
                    self.stream_id
                )))
            }
        };
        let info = MiniblockInfo {
            min: first,
            max: to_exclusive - 1,
            terminus_reached: first == 0,
        };
        let last_event_num = last
            .header
            .event_num_offset
            .checked_add(last.events.len() as u64)
            .ok_or_else(|| event_num_overflow(last.miniblock_num()))?;
        let last_hash = last.hash;

        let mut next = Self::new(self.stream_id);
        next.miniblock_info = Some(info);
        next.prev_snapshot_miniblock_num = prev_snapshot_miniblock_num.min(first);
        next.snapshot = Some(snapshot);
        next.timeline = next.confirmed_events(stream_and_cookie.miniblocks)?.0;
        next.last_event_num = last_event_num;
        next.prev_miniblock_hash = stream_and_cookie
            .next_sync_cookie
            .prev_miniblock_hash
            .or(Some(last_hash));

        next.append_minipool(stream_and_cookie.events)?;
        next.sync_cookie = Some(stream_and_cookie.next_sync_cookie);
        *self = next;

        debug!(
            stream_id = %self.stream_id,
            min = info.min,
            max = info.max,
            events = self.timeline.len(),
            "stream initialized"
        );
        Ok(())
    }

    /// Flatten miniblocks into confirmed timeline events, skipping headers and
    /// hashes already known. Registers the new hashes.
    ///
    /// Event numbers are checked before any hash is registered.
    fn confirmed_events(
        &mut self,
        miniblocks: Vec<ParsedMiniblock>,
    ) -> Result<(Vec<TimelineEvent>, usize), ValidationError> {
        let mut numbered = Vec::new();
        for mb in miniblocks {
            let num = mb.header.miniblock_num;
            let offset = mb.header.event_num_offset;
            for (i, parsed) in mb.events.into_iter().enumerate() {
                if parsed.event.payload.is_miniblock_header() {
                    continue;
                }
                let event_num = offset
                    .checked_add(i as u64)
                    .ok_or_else(|| event_num_overflow(num))?;
                numbered.push((parsed, event_num, num));
            }
        }

        let mut out = Vec::with_capacity(numbered.len());
        let mut duplicates = 0;
        for (parsed, event_num, num) in numbered {
            if !self.known.insert(parsed.hash_str.clone()) {
                duplicates += 1;
                continue;
            }
            out.push(TimelineEvent::from_parsed(parsed, event_num, Some(num)));
        }
        Ok((out, duplicates))
    }

    fn append_minipool(&mut self, events: Vec<ParsedEvent>) -> Result<usize, ValidationError> {
        let mut incoming = 0u64;
        for parsed in &events {
            match parsed.event.payload.as_miniblock_header() {
                Some(header) => {
                    header
                        .event_num_offset
                        .checked_add(header.event_hashes.len() as u64)
                        .ok_or_else(|| event_num_overflow(header.miniblock_num))?;
                }
                None => incoming += 1,
            }
        }
        if self.last_event_num.checked_add(incoming).is_none() {
            return Err(ValidationError::BadBlock(format!(
                "stream {} event numbers overflow",
                self.stream_id
            )));
        }

        let mut appended = 0;
        for parsed in events {
            if let Some(header) = parsed.event.payload.as_miniblock_header().cloned() {
                self.apply_header(&header, parsed.hash);
                continue;
            }
            if !self.known.insert(parsed.hash_str.clone()) {
                continue;
            }
            let event_num = self.last_event_num;
            self.last_event_num += 1;
            self.timeline
                .push(TimelineEvent::from_parsed(parsed, event_num, None));
            appended += 1;
        }
        Ok(appended)
    }

    fn apply_header(&mut self, header: &MiniblockHeader, hash: EventHash) {
        for (i, h) in header.event_hashes.iter().enumerate() {
            let hash_str = h.to_hex();
            match self.timeline.iter_mut().rev().find(|e| e.hash_str == hash_str) {
                Some(e) => {
                    e.miniblock_num = Some(header.miniblock_num);
                    e.confirmed_event_num = header.event_num_offset.checked_add(i as u64);
                }
                None => warn!(stream_id = %self.stream_id, event = %hash_str, "miniblock event not found"),
            }
        }
        if let Some(info) = self.miniblock_info.as_mut() {
            info.max = info.max.max(header.miniblock_num);
        }
        self.prev_miniblock_hash = Some(hash);
    }

    /// Apply events received from sync. Returns the number appended.
    ///
    /// Updates whose cookie is behind the held span are ignored.
    pub fn append_events(
        &mut self,
        events: Vec<ParsedEvent>,
        next_sync_cookie: SyncCookie,
    ) -> Result<usize, ValidationError> {
        let info = self.require_info()?;
        if next_sync_cookie.minipool_gen <= info.max {
            warn!(
                stream_id = %self.stream_id,
                minipool_gen = next_sync_cookie.minipool_gen,
                max = info.max,
                "sync update is behind the held span, ignoring"
            );
            return Ok(0);
        }
        let appended = self.append_minipool(events)?;
        self.sync_cookie = Some(next_sync_cookie);
        Ok(appended)
    }

    /// Place older miniblocks in front of the held span.
    ///
    /// `miniblocks` must be consecutive, oldest first, and reach the held
    /// span: a page ending below `min` would leave a hole and is rejected,
    /// as is a terminal page that does not start at the genesis block.
    /// Duplicate event hashes are dropped and header events never reach the
    /// timeline. On error the view is left as it was.
    pub fn prepend_events(
        &mut self,
        miniblocks: Vec<ParsedMiniblock>,
        terminus: bool,
    ) -> Result<PrependOutcome, ValidationError> {
        let info = self.require_info()?;

        let (from, to_exclusive) = match miniblock_span(&miniblocks)? {
            Some(span) => span,
            None if terminus && info.min != 0 => {
                return Err(ValidationError::BadBlock(format!(
                    "stream {}: empty terminal page, held span starts at {}",
                    self.stream_id, info.min
                )));
            }
            None => {
                if terminus {
                    self.set_terminus(info);
                }
                return Ok(PrependOutcome::Prepended {
                    events: 0,
                    duplicates: 0,
                });
            }
        };

        if from >= info.min {
            warn!(
                stream_id = %self.stream_id,
                from,
                min = info.min,
                "prepended span is not older than the held span, ignoring"
            );
            return Ok(PrependOutcome::Ignored);
        }
        if to_exclusive < info.min {
            return Err(ValidationError::BadBlock(format!(
                "stream {}: prepended span [{}, {}) leaves a gap below {}",
                self.stream_id, from, to_exclusive, info.min
            )));
        }
        if terminus && from != 0 {
            return Err(ValidationError::BadBlock(format!(
                "stream {}: terminal page starts at {}",
                self.stream_id, from
            )));
        }
        if to_exclusive > info.min {
            warn!(
                stream_id = %self.stream_id,
                to_exclusive,
                min = info.min,
                "prepended span overlaps the held span"
            );
        }

        let prev_snapshot = miniblocks
            .first()
            .map_or(from, |f| f.header.prev_snapshot_miniblock_num);
        let (prepended, duplicates) = self.confirmed_events(miniblocks)?;

        self.miniblock_info = Some(MiniblockInfo {
            min: from,
            terminus_reached: terminus,
            ..info
        });
        self.prev_snapshot_miniblock_num = prev_snapshot.min(from);

        if duplicates > 0 {
            warn!(stream_id = %self.stream_id, duplicates, "duplicate events found in prepended miniblocks");
        }
        let events = prepended.len();
        self.timeline.splice(0..0, prepended);

        Ok(PrependOutcome::Prepended { events, duplicates })
    }

    fn set_terminus(&mut self, info: MiniblockInfo) {
        self.miniblock_info = Some(MiniblockInfo {
            terminus_reached: true,
            ..info
        });
    }
}

fn event_num_overflow(miniblock_num: u64) -> ValidationError {
    ValidationError::BadBlock(format!(
        "miniblock {} event numbers are out of range",
        miniblock_num
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Wallet;
    use crate::error::ErrorCode;
    use crate::envelope::{envelope_from_event, make_event, unpack_envelope, StreamEvent, UnpackOptions};
    use crate::miniblock::ParsedStreamAndCookie;
    use crate::payload::{MiniblockHeader, Payload};
    use crate::signer::{make_undelegated_context, SignerContext};
    use std::sync::Arc;

    fn ctx() -> SignerContext {
        make_undelegated_context(Arc::new(Wallet::generate())).unwrap()
    }

    fn message(user: &SignerContext, text: &str) -> ParsedEvent {
        let env = make_event(user, Payload::channel_message(text), None).unwrap();
        unpack_envelope(&env, &UnpackOptions::default()).unwrap()
    }

    fn block(
        node: &SignerContext,
        num: u64,
        offset: u64,
        prev_snapshot: u64,
        body: Vec<ParsedEvent>,
    ) -> ParsedMiniblock {
        let header = MiniblockHeader {
            miniblock_num: num,
            prev_miniblock_hash: None,
            timestamp_ms: 0,
            event_hashes: body.iter().map(|e| e.hash).collect(),
            snapshot: Some(Snapshot::default()),
            event_num_offset: offset,
            prev_snapshot_miniblock_num: prev_snapshot,
        };
        let event = StreamEvent {
            creator_address: node.creator_address,
            salt: vec![num as u8],
            prev_miniblock_hash: None,
            payload: Payload::MiniblockHeader(header.clone()),
            created_at_epoch_ms: 0,
            delegate_sig: None,
            delegate_expiry_epoch_ms: 0,
        };
        let header_event =
            unpack_envelope(&envelope_from_event(node, &event).unwrap(), &UnpackOptions::default())
                .unwrap();
        let mut events = body;
        let hash = header_event.hash;
        events.push(header_event);
        ParsedMiniblock {
            hash,
            header,
            events,
        }
    }

    fn response(miniblocks: Vec<ParsedMiniblock>, minipool: Vec<ParsedEvent>) -> ParsedStreamResponse {
        let prev_snapshot_miniblock_num = miniblocks[0].header.prev_snapshot_miniblock_num;
        let next = miniblocks.last().unwrap().miniblock_num() + 1;
        ParsedStreamResponse {
            stream_and_cookie: ParsedStreamAndCookie {
                events: minipool,
                next_sync_cookie: SyncCookie {
                    minipool_gen: next,
                    ..Default::default()
                },
                miniblocks,
            },
            snapshot: Snapshot::default(),
            prev_snapshot_miniblock_num,
            event_ids: vec![],
        }
    }

    #[test]
    fn test_stream_id_kind() {
        let id = StreamId::random(prefix::CHANNEL);
        assert_eq!(id.kind(), prefix::CHANNEL);
        assert_ne!(id, StreamId::random(prefix::CHANNEL));

        let addr = Address([7; 20]);
        let user = StreamId::for_user(prefix::USER, &addr);
        assert_eq!(&user.0[1..21], addr.as_bytes());
        assert_eq!(StreamId::from_hex(&user.to_hex()).unwrap(), user);
    }

    #[test]
    fn test_initialize() {
        let node = ctx();
        let user = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        assert!(!view.is_initialized());

        let a = message(&user, "a");
        let b = message(&user, "b");
        let pool = message(&user, "pool");
        view.initialize(response(
            vec![block(&node, 5, 20, 2, vec![a.clone()]), block(&node, 6, 22, 2, vec![b])],
            vec![pool.clone()],
        ))
        .unwrap();

        let info = view.miniblock_info.unwrap();
        assert_eq!((info.min, info.max, info.terminus_reached), (5, 6, false));
        assert_eq!(view.prev_snapshot_miniblock_num, 2);
        assert_eq!(view.timeline.len(), 3);
        assert_eq!(view.first_event().unwrap().hash_str, a.hash_str);
        assert_eq!(view.timeline[0].event_num, 20);
        assert_eq!(view.timeline[0].miniblock_num, Some(5));
        // Minipool events continue numbering after the last header
        assert_eq!(view.timeline[2].event_num, 24);
        assert!(!view.timeline[2].is_confirmed());
        assert!(view.contains(&pool.hash_str));
    }

    #[test]
    fn test_initialize_genesis_is_terminus() {
        let node = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        view.initialize(response(vec![block(&node, 0, 0, 0, vec![])], vec![]))
            .unwrap();
        assert!(view.miniblock_info.unwrap().terminus_reached);
        assert!(view.first_event().is_none());
    }

    #[test]
    fn test_prepend_moves_span_back() {
        let node = ctx();
        let user = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        let newer = message(&user, "newer");
        view.initialize(response(vec![block(&node, 4, 10, 2, vec![newer.clone()])], vec![]))
            .unwrap();

        let old1 = message(&user, "old1");
        let old2 = message(&user, "old2");
        let outcome = view
            .prepend_events(
                vec![
                    block(&node, 2, 6, 0, vec![old1.clone()]),
                    block(&node, 3, 8, 0, vec![old2, newer.clone()]),
                ],
                false,
            )
            .unwrap();

        assert_eq!(
            outcome,
            PrependOutcome::Prepended {
                events: 2,
                duplicates: 1
            }
        );
        let info = view.miniblock_info.unwrap();
        assert_eq!(info.min, 2);
        assert!(!info.terminus_reached);
        assert_eq!(view.prev_snapshot_miniblock_num, 0);
        assert_eq!(view.first_event().unwrap().hash_str, old1.hash_str);
        assert_eq!(view.timeline.len(), 3);
        assert!(view
            .timeline
            .iter()
            .all(|e| !e.remote_event.event.payload.is_miniblock_header()));
    }

    #[test]
    fn test_prepend_not_older_is_ignored() {
        let node = ctx();
        let user = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        view.initialize(response(vec![block(&node, 4, 10, 2, vec![])], vec![]))
            .unwrap();

        let outcome = view
            .prepend_events(vec![block(&node, 4, 10, 2, vec![message(&user, "x")])], true)
            .unwrap();
        assert_eq!(outcome, PrependOutcome::Ignored);
        assert_eq!(view.miniblock_info.unwrap().min, 4);
        assert!(view.timeline.is_empty());
    }

    #[test]
    fn test_prepend_empty_terminus() {
        let node = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        view.initialize(response(vec![block(&node, 3, 0, 3, vec![])], vec![]))
            .unwrap();

        // Blocks 0..3 are still missing.
        let err = view.prepend_events(vec![], true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);
        assert!(!view.miniblock_info.unwrap().terminus_reached);

        let genesis = (0..3).map(|n| block(&node, n, 0, 0, vec![])).collect();
        view.prepend_events(genesis, true).unwrap();
        let info = view.miniblock_info.unwrap();
        assert_eq!(info.min, 0);
        assert!(info.terminus_reached);
    }

    #[test]
    fn test_prepend_gapped_page() {
        let node = ctx();
        let user = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        let kept = message(&user, "kept");
        view.initialize(response(vec![block(&node, 10, 30, 10, vec![kept])], vec![]))
            .unwrap();

        // Ends below the held span.
        let early = message(&user, "early");
        let err = view
            .prepend_events(
                vec![block(&node, 0, 0, 0, vec![early.clone()]), block(&node, 1, 1, 0, vec![])],
                true,
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);

        // Reaches the held span but skips block 8.
        let err = view
            .prepend_events(
                vec![block(&node, 7, 20, 0, vec![early.clone()]), block(&node, 9, 25, 0, vec![])],
                false,
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);

        // Terminal, but not from the genesis block.
        let err = view
            .prepend_events(vec![block(&node, 9, 25, 0, vec![early.clone()])], true)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);

        let info = view.miniblock_info.unwrap();
        assert_eq!((info.min, info.terminus_reached), (10, false));
        assert_eq!(view.timeline.len(), 1);
        assert!(!view.contains(&early.hash_str));
    }

    #[test]
    fn test_prepend_out_of_range_numbers() {
        let node = ctx();
        let user = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        view.initialize(response(vec![block(&node, 4, 10, 2, vec![])], vec![]))
            .unwrap();

        let old = message(&user, "old");
        let err = view
            .prepend_events(vec![block(&node, u64::MAX, 8, 0, vec![])], false)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);

        let crowded = vec![message(&user, "a"), message(&user, "b")];
        let err = view
            .prepend_events(
                vec![
                    block(&node, 2, 6, 0, vec![old.clone()]),
                    block(&node, 3, u64::MAX, 0, crowded),
                ],
                false,
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);

        assert_eq!(view.miniblock_info.unwrap().min, 4);
        assert!(view.timeline.is_empty());
        // A rejected page leaves no hashes behind, so a good one still applies.
        assert!(!view.contains(&old.hash_str));
        let outcome = view
            .prepend_events(
                vec![block(&node, 2, 6, 0, vec![old.clone()]), block(&node, 3, 8, 0, vec![])],
                false,
            )
            .unwrap();
        assert_eq!(
            outcome,
            PrependOutcome::Prepended {
                events: 1,
                duplicates: 0
            }
        );
    }

    #[test]
    fn test_initialize_out_of_range_numbers() {
        let node = ctx();
        let user = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        let a = message(&user, "a");
        view.initialize(response(vec![block(&node, 0, 0, 0, vec![a])], vec![]))
            .unwrap();
        let before = view.timeline.clone();

        let err = view
            .initialize(response(vec![block(&node, 1, u64::MAX, 0, vec![])], vec![]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);

        let err = view
            .initialize(response(
                vec![block(&node, 1, u64::MAX - 1, 0, vec![message(&user, "b")])],
                vec![],
            ))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);

        // Numbering ends exactly at the top, so the minipool cannot be numbered.
        let err = view
            .initialize(response(
                vec![block(&node, 1, u64::MAX - 2, 0, vec![message(&user, "c")])],
                vec![message(&user, "pool")],
            ))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadBlock);

        let info = view.miniblock_info.unwrap();
        assert_eq!((info.min, info.max), (0, 0));
        assert_eq!(view.timeline, before);
    }

    #[test]
    fn test_uninitialized_view_rejects_updates() {
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        assert!(view.prepend_events(vec![], false).is_err());
        assert!(view.append_events(vec![], SyncCookie::default()).is_err());
    }

    #[test]
    fn test_append_confirms_events() {
        let node = ctx();
        let user = ctx();
        let mut view = StreamStateView::new(StreamId::random(prefix::CHANNEL));
        view.initialize(response(vec![block(&node, 0, 0, 0, vec![])], vec![]))
            .unwrap();

        let a = message(&user, "a");
        let appended = view
            .append_events(
                vec![a.clone(), a.clone()],
                SyncCookie {
                    minipool_gen: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(appended, 1);
        assert!(!view.timeline[0].is_confirmed());

        let sealed = block(&node, 1, 1, 0, vec![a.clone()]);
        let header_event = sealed.events.last().unwrap().clone();
        view.append_events(
            vec![header_event.clone()],
            SyncCookie {
                minipool_gen: 2,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(view.timeline.len(), 1);
        assert_eq!(view.timeline[0].miniblock_num, Some(1));
        assert_eq!(view.timeline[0].confirmed_event_num, Some(1));
        assert_eq!(view.miniblock_info.unwrap().max, 1);
        assert_eq!(view.prev_miniblock_hash, Some(header_event.hash));

        // Stale cookie
        let stale = view
            .append_events(vec![message(&user, "late")], SyncCookie::default())
            .unwrap();
        assert_eq!(stale, 0);
    }
}
