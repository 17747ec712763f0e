//! Signed event envelopes.
//!
//! An envelope carries the canonical bytes of a [`StreamEvent`], the
//! protocol hash of those bytes, and a recoverable signature over the hash.
//! Verification recomputes the hash, recovers the signing key and ties it
//! to the event's creator, either directly or through a delegation.

use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::canonical::{decode_stream_event, encode_stream_event};
use crate::crypto::{river_hash, RecoverableSignature};
use crate::error::ValidationError;
use crate::payload::Payload;
use crate::signer::{check_delegate_sig, SignerContext};
use crate::types::{now_epoch_ms, Address, EventHash};

/// Length of the random salt mixed into every event.
pub const SALT_LEN: usize = 16;

/// Wire form of a signed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// 32-byte protocol hash of `event`.
    pub hash: Bytes,
    /// 65-byte recoverable signature over `hash`.
    pub signature: Bytes,
    /// Canonical bytes of the [`StreamEvent`].
    pub event: Bytes,
}

/// A stream event as signed by its creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub creator_address: Address,
    pub salt: Vec<u8>,
    pub prev_miniblock_hash: Option<EventHash>,
    pub payload: Payload,
    /// Informational only; not checked by verifiers.
    pub created_at_epoch_ms: i64,
    /// Raw delegation signature, parsed when the event is verified.
    pub delegate_sig: Option<Bytes>,
    pub delegate_expiry_epoch_ms: u64,
}

/// Options for [`unpack_envelope`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackOptions {
    /// Trust the envelope hash instead of recomputing it.
    pub disable_hash_validation: bool,
    /// Skip signature recovery and creator checks.
    pub disable_signature_validation: bool,
}

impl UnpackOptions {
    /// Options for data read back from local persistence.
    pub fn trusted() -> Self {
        Self {
            disable_hash_validation: true,
            disable_signature_validation: true,
        }
    }
}

/// A verified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub event: StreamEvent,
    pub hash: EventHash,
    pub hash_str: String,
    pub signature: Bytes,
    pub creator_user_id: String,
    pub prev_miniblock_hash_str: Option<String>,
}

impl ParsedEvent {
    fn new(event: StreamEvent, hash: EventHash, signature: Bytes) -> Self {
        let creator_user_id = event.creator_address.to_user_id();
        let prev_miniblock_hash_str = event.prev_miniblock_hash.map(|h| h.to_hex());
        Self {
            event,
            hash,
            hash_str: hash.to_hex(),
            signature,
            creator_user_id,
            prev_miniblock_hash_str,
        }
    }
}

fn new_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Build and sign an envelope for `payload`.
///
/// `prev_miniblock_hash`, when given, must be exactly 32 bytes.
pub fn make_event(
    context: &SignerContext,
    payload: Payload,
    prev_miniblock_hash: Option<&[u8]>,
) -> Result<Envelope, ValidationError> {
    if payload.content_case().is_none() {
        return Err(ValidationError::BadPayload(format!(
            "payload content can't be empty (case {})",
            payload.case()
        )));
    }

    let prev_miniblock_hash = prev_miniblock_hash
        .map(|h| {
            EventHash::try_from(h).map_err(|_| {
                ValidationError::BadHashFormat(format!(
                    "prev_miniblock_hash should be 32 bytes, got {}",
                    h.len()
                ))
            })
        })
        .transpose()?;

    let (delegate_sig, delegate_expiry_epoch_ms) = match context.delegate_sig {
        Some(sig) => (
            Some(Bytes::copy_from_slice(sig.as_bytes())),
            context.delegate_expiry_epoch_ms,
        ),
        None => (None, 0),
    };

    let event = StreamEvent {
        creator_address: context.creator_address,
        salt: new_salt(),
        prev_miniblock_hash,
        payload,
        created_at_epoch_ms: now_epoch_ms(),
        delegate_sig,
        delegate_expiry_epoch_ms,
    };

    sign_event(context, &event)
}

/// Sign an already-built event without payload shape checks.
///
/// Used for node-authored events such as miniblock headers.
pub fn envelope_from_event(
    context: &SignerContext,
    event: &StreamEvent,
) -> Result<Envelope, ValidationError> {
    sign_event(context, event)
}

fn sign_event(context: &SignerContext, event: &StreamEvent) -> Result<Envelope, ValidationError> {
    let bytes = encode_stream_event(event)?;
    let hash = river_hash(&bytes);
    let signature = context.signer.sign(hash.as_bytes())?;

    Ok(Envelope {
        hash: Bytes::copy_from_slice(hash.as_bytes()),
        signature: Bytes::copy_from_slice(signature.as_bytes()),
        event: Bytes::from(bytes),
    })
}

/// Sign one envelope per payload, all against the same miniblock.
pub fn make_events(
    context: &SignerContext,
    payloads: Vec<Payload>,
    prev_miniblock_hash: Option<&[u8]>,
) -> Result<Vec<Envelope>, ValidationError> {
    payloads
        .into_iter()
        .map(|p| make_event(context, p, prev_miniblock_hash))
        .collect()
}

/// Verify an envelope and decode its event.
pub fn unpack_envelope(
    envelope: &Envelope,
    opts: &UnpackOptions,
) -> Result<ParsedEvent, ValidationError> {
    if envelope.event.is_empty() {
        return Err(ValidationError::BadEvent("event base is not set".into()));
    }
    if envelope.hash.is_empty() {
        return Err(ValidationError::BadEvent("event hash is not set".into()));
    }
    if envelope.signature.is_empty() {
        return Err(ValidationError::BadEvent("event signature is not set".into()));
    }

    let hash = EventHash::try_from(envelope.hash.as_ref()).map_err(|_| {
        ValidationError::BadEventId(format!(
            "event hash should be 32 bytes, got {}",
            envelope.hash.len()
        ))
    })?;

    if !opts.disable_hash_validation && river_hash(&envelope.event) != hash {
        return Err(ValidationError::BadEventId("event id is not valid".into()));
    }

    let event = decode_stream_event(&envelope.event)
        .map_err(|e| ValidationError::BadEvent(e.to_string()))?;

    if !opts.disable_signature_validation {
        check_event_signature(&event, &hash, &envelope.signature)?;
    }

    Ok(ParsedEvent::new(event, hash, envelope.signature.clone()))
}

/// Check that `signature` over `hash` resolves to the event's creator.
pub fn check_event_signature(
    event: &StreamEvent,
    hash: &EventHash,
    signature: &[u8],
) -> Result<(), ValidationError> {
    let recovered = RecoverableSignature::from_slice(signature)
        .and_then(|sig| sig.recover(hash.as_bytes()))
        .map_err(|e| ValidationError::BadEventSignature(e.to_string()))?;

    match &event.delegate_sig {
        None => {
            if recovered.to_address() != event.creator_address {
                return Err(ValidationError::BadEventSignature(
                    "event signature is not valid".into(),
                ));
            }
        }
        Some(delegate_sig) => {
            check_delegate_sig(
                recovered.as_bytes(),
                &event.creator_address,
                delegate_sig,
                event.delegate_expiry_epoch_ms,
            )?;
        }
    }
    Ok(())
}

/// Unpack a batch, failing on the first bad envelope.
pub fn unpack_envelopes(
    envelopes: &[Envelope],
    opts: &UnpackOptions,
) -> Result<Vec<ParsedEvent>, ValidationError> {
    envelopes.iter().map(|e| unpack_envelope(e, opts)).collect()
}
