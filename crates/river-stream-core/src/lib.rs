//! # River Stream Core
//!
//! Pure primitives for River streams: signing identities, event envelopes,
//! miniblock unpacking and the local stream state view.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`SignerContext`] - The identity that signs outgoing events
//! - [`Envelope`] - Wire form of a signed event
//! - [`ParsedEvent`] - A verified event
//! - [`ParsedMiniblock`] - A verified miniblock, header event last
//! - [`StreamStateView`] - The locally held span of a stream
//!
//! ## Canonicalization
//!
//! Events are encoded using deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod miniblock;
pub mod payload;
pub mod signer;
pub mod stream;
pub mod types;

pub use crypto::{
    delegate_hash, keccak256, personal_message_hash, river_hash, PublicKey,
    RecoverableSignature, Wallet,
};
pub use envelope::{
    envelope_from_event, make_event, make_events, unpack_envelope, unpack_envelopes, Envelope,
    ParsedEvent, StreamEvent, UnpackOptions,
};
pub use error::{CoreError, ErrorCode, ValidationError};
pub use miniblock::{
    miniblock_span, unpack_miniblock, unpack_stream, unpack_stream_and_cookie,
    unpack_stream_envelopes, Miniblock, ParsedMiniblock, ParsedStreamAndCookie,
    ParsedStreamResponse, StreamAndCookie, SyncCookie,
};
pub use payload::{MiniblockHeader, Payload, Snapshot};
pub use signer::{
    check_delegate_sig, make_signer_context, make_undelegated_context, DelegateScheme, Signer,
    SignerContext,
};
pub use stream::{MiniblockInfo, PrependOutcome, StreamId, StreamStateView, TimelineEvent};
pub use types::{Address, EventHash};
