//! Miniblock and stream response unpacking.
//!
//! A node serves a stream as a run of miniblocks followed by the minipool
//! (events not yet sealed into a block). Every envelope is verified; any
//! failure rejects the whole response.

use serde::{Deserialize, Serialize};

use crate::envelope::{unpack_envelope, unpack_envelopes, Envelope, ParsedEvent, UnpackOptions};
use crate::error::ValidationError;
use crate::payload::{MiniblockHeader, Snapshot};
use crate::stream::StreamId;
use crate::types::EventHash;

/// A sealed block of events. The header envelope is signed by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Miniblock {
    pub header: Option<Envelope>,
    pub events: Vec<Envelope>,
}

/// Opaque sync position. Passed back to the node unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCookie {
    pub stream_id: StreamId,
    pub minipool_gen: u64,
    pub prev_miniblock_hash: Option<EventHash>,
}

/// A stream as served by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAndCookie {
    pub miniblocks: Vec<Miniblock>,
    /// Minipool events.
    pub events: Vec<Envelope>,
    pub next_sync_cookie: SyncCookie,
}

/// A verified miniblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMiniblock {
    pub hash: EventHash,
    pub header: MiniblockHeader,
    /// Body events followed by the header event.
    pub events: Vec<ParsedEvent>,
}

impl ParsedMiniblock {
    pub fn miniblock_num(&self) -> u64 {
        self.header.miniblock_num
    }
}

/// The `[from, to_exclusive)` span covered by `miniblocks`, or `None` if empty.
///
/// Blocks must be numbered consecutively, oldest first.
pub fn miniblock_span(miniblocks: &[ParsedMiniblock]) -> Result<Option<(u64, u64)>, ValidationError> {
    let (first, last) = match (miniblocks.first(), miniblocks.last()) {
        (Some(f), Some(l)) => (f.miniblock_num(), l.miniblock_num()),
        _ => return Ok(None),
    };
    for pair in miniblocks.windows(2) {
        let (prev, next) = (pair[0].miniblock_num(), pair[1].miniblock_num());
        if prev.checked_add(1) != Some(next) {
            return Err(ValidationError::BadBlock(format!(
                "miniblock {} does not follow miniblock {}",
                next, prev
            )));
        }
    }
    let to_exclusive = last.checked_add(1).ok_or_else(|| {
        ValidationError::BadBlock(format!("miniblock number {} is out of range", last))
    })?;
    Ok(Some((first, to_exclusive)))
}

/// A verified stream response without snapshot extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStreamAndCookie {
    pub events: Vec<ParsedEvent>,
    pub next_sync_cookie: SyncCookie,
    pub miniblocks: Vec<ParsedMiniblock>,
}

/// A verified stream response ready to initialize a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStreamResponse {
    pub stream_and_cookie: ParsedStreamAndCookie,
    pub snapshot: Snapshot,
    pub prev_snapshot_miniblock_num: u64,
    pub event_ids: Vec<String>,
}

/// Verify a miniblock: its header, then every body event.
pub fn unpack_miniblock(
    miniblock: &Miniblock,
    opts: &UnpackOptions,
) -> Result<ParsedMiniblock, ValidationError> {
    let header_env = miniblock
        .header
        .as_ref()
        .ok_or_else(|| ValidationError::BadBlock("miniblock header is not set".into()))?;
    let header_event = unpack_envelope(header_env, opts)?;
    let header = match header_event.event.payload.as_miniblock_header() {
        Some(h) => h.clone(),
        None => {
            return Err(ValidationError::BadBlock(format!(
                "bad miniblock header: wrong case received: {}",
                header_event.event.payload.case()
            )))
        }
    };

    let mut events = unpack_envelopes(&miniblock.events, opts)?;
    let hash = header_event.hash;
    events.push(header_event);

    Ok(ParsedMiniblock {
        hash,
        header,
        events,
    })
}

/// Verify every miniblock and the minipool of a stream response.
pub fn unpack_stream_and_cookie(
    stream: &StreamAndCookie,
    opts: &UnpackOptions,
) -> Result<ParsedStreamAndCookie, ValidationError> {
    let miniblocks = stream
        .miniblocks
        .iter()
        .map(|mb| unpack_miniblock(mb, opts))
        .collect::<Result<Vec<_>, _>>()?;
    let events = unpack_envelopes(&stream.events, opts)?;

    Ok(ParsedStreamAndCookie {
        events,
        next_sync_cookie: stream.next_sync_cookie.clone(),
        miniblocks,
    })
}

/// Verify a full stream response.
///
/// The first miniblock must be a snapshot block; its header supplies the
/// snapshot and the previous snapshot number.
pub fn unpack_stream(
    stream: &StreamAndCookie,
    opts: &UnpackOptions,
) -> Result<ParsedStreamResponse, ValidationError> {
    if stream.miniblocks.is_empty() {
        return Err(ValidationError::BadBlock(format!(
            "bad stream: no blocks {}",
            stream.next_sync_cookie.stream_id
        )));
    }

    let stream_and_cookie = unpack_stream_and_cookie(stream, opts)?;
    let first = stream_and_cookie
        .miniblocks
        .first()
        .ok_or_else(|| ValidationError::BadBlock("bad stream: no blocks".into()))?;

    let snapshot = first.header.snapshot.clone().ok_or_else(|| {
        ValidationError::BadBlock(format!(
            "bad block: snapshot is undefined {}",
            stream.next_sync_cookie.stream_id
        ))
    })?;
    let prev_snapshot_miniblock_num = first.header.prev_snapshot_miniblock_num;

    let event_ids = stream_and_cookie
        .miniblocks
        .iter()
        .flat_map(|mb| mb.events.iter())
        .chain(stream_and_cookie.events.iter())
        .map(|e| e.hash_str.clone())
        .chain(snapshot.event_ids())
        .collect();

    Ok(ParsedStreamResponse {
        stream_and_cookie,
        snapshot,
        prev_snapshot_miniblock_num,
        event_ids,
    })
}

/// All events of a stream response in order: each miniblock's body then its
/// header, followed by the minipool.
pub fn unpack_stream_envelopes(
    stream: &StreamAndCookie,
    opts: &UnpackOptions,
) -> Result<Vec<ParsedEvent>, ValidationError> {
    let mut out = Vec::new();
    for mb in &stream.miniblocks {
        out.extend(unpack_envelopes(&mb.events, opts)?);
        let header = mb
            .header
            .as_ref()
            .ok_or_else(|| ValidationError::BadBlock("miniblock header is not set".into()))?;
        out.push(unpack_envelope(header, opts)?);
    }
    out.extend(unpack_envelopes(&stream.events, opts)?);
    Ok(out)
}
