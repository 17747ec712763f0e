//! Test fixtures and helpers.
//!
//! Deterministic wallets and signer contexts, plus a node-side builder that
//! produces chains of signed miniblocks the way a River node would.

use std::sync::Arc;

use bytes::Bytes;
use rand::RngCore;

use river_stream_core::envelope::SALT_LEN;
use river_stream_core::stream::prefix;
use river_stream_core::{
    envelope_from_event, make_signer_context, make_undelegated_context, Envelope, EventHash,
    Miniblock, MiniblockHeader, Payload, SignerContext, Snapshot, StreamAndCookie, StreamEvent,
    StreamId, SyncCookie, Wallet,
};

/// First timestamp handed out by [`StreamBuilder`].
pub const BASE_TIME_MS: i64 = 1_700_000_000_000;

/// Spacing between consecutive user events from [`StreamBuilder`].
pub const EVENT_SPACING_MS: i64 = 60_000;

/// A wallet whose private key is `[seed; 32]`.
pub fn wallet(seed: u8) -> Wallet {
    Wallet::from_seed(&[seed; 32]).expect("seed bytes form a valid secp256k1 scalar")
}

/// An undelegated context for a deterministic wallet.
pub fn context(seed: u8) -> SignerContext {
    make_undelegated_context(Arc::new(wallet(seed))).expect("wallet has a valid public key")
}

/// The context a test node signs miniblock headers with.
pub fn node_context() -> SignerContext {
    context(0x4e)
}

/// A user context.
pub fn user_context() -> SignerContext {
    context(0x11)
}

/// A context where `device_seed` signs on behalf of `primary_seed`.
pub fn delegated_context(primary_seed: u8, device_seed: u8, expiry_epoch_ms: Option<u64>) -> SignerContext {
    make_signer_context(
        &wallet(primary_seed),
        Arc::new(wallet(device_seed)),
        expiry_epoch_ms,
    )
    .expect("wallet has a valid public key")
}

/// A fixed channel stream id.
pub fn test_stream_id() -> StreamId {
    let mut bytes = [0x01u8; 32];
    bytes[0] = prefix::CHANNEL;
    StreamId::from_bytes(bytes)
}

fn salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

fn hash_of(envelope: &Envelope) -> EventHash {
    EventHash::try_from(envelope.hash.as_ref()).expect("envelope hash is 32 bytes")
}

/// Signs a user event with an explicit creation time.
pub fn user_event(
    user: &SignerContext,
    text: &str,
    created_at_epoch_ms: i64,
    prev_miniblock_hash: Option<EventHash>,
) -> Envelope {
    let event = StreamEvent {
        creator_address: user.creator_address,
        salt: salt(),
        prev_miniblock_hash,
        payload: Payload::channel_message(text),
        created_at_epoch_ms,
        delegate_sig: user
            .delegate_sig
            .map(|s| Bytes::copy_from_slice(s.as_bytes())),
        delegate_expiry_epoch_ms: if user.is_delegated() {
            user.delegate_expiry_epoch_ms
        } else {
            0
        },
    };
    envelope_from_event(user, &event).expect("signing with a test wallet")
}

/// Signs a miniblock header event.
pub fn header_envelope(node: &SignerContext, header: MiniblockHeader) -> Envelope {
    let event = StreamEvent {
        creator_address: node.creator_address,
        salt: header.miniblock_num.to_le_bytes().to_vec(),
        prev_miniblock_hash: None,
        created_at_epoch_ms: header.timestamp_ms,
        payload: Payload::MiniblockHeader(header),
        delegate_sig: None,
        delegate_expiry_epoch_ms: 0,
    };
    envelope_from_event(node, &event).expect("signing with a test wallet")
}

/// Builds standalone miniblocks with a given number of body events.
pub struct MiniblockFactory {
    node: SignerContext,
    user: SignerContext,
}

impl MiniblockFactory {
    pub fn new(node: SignerContext) -> Self {
        Self {
            node,
            user: user_context(),
        }
    }

    /// A miniblock numbered `num` with `event_count` channel messages.
    ///
    /// Block 0 carries an empty snapshot.
    pub fn miniblock(&self, num: u64, event_count: usize) -> Miniblock {
        let events: Vec<Envelope> = (0..event_count)
            .map(|i| {
                user_event(
                    &self.user,
                    &format!("block {} message {}", num, i),
                    BASE_TIME_MS + i as i64,
                    None,
                )
            })
            .collect();
        let header = MiniblockHeader {
            miniblock_num: num,
            prev_miniblock_hash: None,
            timestamp_ms: BASE_TIME_MS + num as i64,
            event_hashes: events.iter().map(hash_of).collect(),
            snapshot: (num == 0).then(Snapshot::default),
            event_num_offset: 0,
            prev_snapshot_miniblock_num: 0,
        };
        Miniblock {
            header: Some(header_envelope(&self.node, header)),
            events,
        }
    }
}

/// Builds a hash-linked chain of miniblocks from genesis, plus a minipool.
///
/// Every `snapshot_interval`-th block carries a snapshot and each header
/// points at the snapshot before it. User events are spaced
/// [`EVENT_SPACING_MS`] apart starting at [`BASE_TIME_MS`].
pub struct StreamBuilder {
    stream_id: StreamId,
    node: SignerContext,
    user: SignerContext,
    snapshot_interval: u64,
    miniblocks: Vec<Miniblock>,
    minipool: Vec<Envelope>,
    prev_hash: Option<EventHash>,
    last_snapshot: u64,
    event_num: u64,
    clock: i64,
}

impl StreamBuilder {
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            node: node_context(),
            user: user_context(),
            snapshot_interval: 10,
            miniblocks: Vec::new(),
            minipool: Vec::new(),
            prev_hash: None,
            last_snapshot: 0,
            event_num: 0,
            clock: BASE_TIME_MS,
        }
    }

    /// Blocks whose number is a multiple of `interval` carry a snapshot.
    pub fn snapshot_interval(mut self, interval: u64) -> Self {
        self.snapshot_interval = interval.max(1);
        self
    }

    /// Sign user events with this context.
    pub fn user(mut self, user: SignerContext) -> Self {
        self.user = user;
        self
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Seal the minipool plus `event_count` new messages into the next block.
    pub fn add_block(&mut self, event_count: usize) -> &mut Self {
        for _ in 0..event_count {
            self.add_minipool_event();
        }
        let num = self.miniblocks.len() as u64;
        let events = std::mem::take(&mut self.minipool);

        let is_snapshot = num % self.snapshot_interval == 0;
        let prev_snapshot_miniblock_num = self.last_snapshot;
        let header = MiniblockHeader {
            miniblock_num: num,
            prev_miniblock_hash: self.prev_hash,
            timestamp_ms: self.clock,
            event_hashes: events.iter().map(hash_of).collect(),
            snapshot: is_snapshot.then(Snapshot::default),
            event_num_offset: self.event_num,
            prev_snapshot_miniblock_num,
        };
        let header_env = header_envelope(&self.node, header);

        // Each block's events are followed by its header event.
        self.event_num += events.len() as u64 + 1;
        self.prev_hash = Some(hash_of(&header_env));
        if is_snapshot {
            self.last_snapshot = num;
        }
        self.miniblocks.push(Miniblock {
            header: Some(header_env),
            events,
        });
        self
    }

    /// Add `count` blocks of `events_per_block` messages each.
    pub fn add_blocks(&mut self, count: usize, events_per_block: usize) -> &mut Self {
        for _ in 0..count {
            self.add_block(events_per_block);
        }
        self
    }

    /// Add one unsealed message to the minipool.
    pub fn add_minipool_event(&mut self) -> &mut Self {
        let text = format!("message {}", self.event_num + self.minipool.len() as u64);
        let env = user_event(&self.user, &text, self.clock, self.prev_hash);
        self.clock += EVENT_SPACING_MS;
        self.minipool.push(env);
        self
    }

    pub fn miniblocks(&self) -> &[Miniblock] {
        &self.miniblocks
    }

    pub fn minipool(&self) -> &[Envelope] {
        &self.minipool
    }

    /// Creation time of the `n`-th user event, counting from zero.
    pub fn event_time(n: u64) -> i64 {
        BASE_TIME_MS + n as i64 * EVENT_SPACING_MS
    }

    /// What a node serves for this stream: blocks from the latest snapshot
    /// onward plus the minipool.
    pub fn stream_response(&self) -> StreamAndCookie {
        let start = (self.last_snapshot as usize).min(self.miniblocks.len());
        StreamAndCookie {
            miniblocks: self.miniblocks[start..].to_vec(),
            events: self.minipool.clone(),
            next_sync_cookie: SyncCookie {
                stream_id: self.stream_id,
                minipool_gen: self.miniblocks.len() as u64,
                prev_miniblock_hash: self.prev_hash,
            },
        }
    }
}

/// Envelope with the `hash` field replaced.
pub fn with_hash(envelope: &Envelope, hash: &[u8]) -> Envelope {
    Envelope {
        hash: Bytes::copy_from_slice(hash),
        ..envelope.clone()
    }
}
