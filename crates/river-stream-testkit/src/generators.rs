//! Proptest generators for property-based testing.

use std::sync::Arc;

use proptest::prelude::*;

use river_stream_core::{
    envelope_from_event, make_undelegated_context, Envelope, EventHash, Payload, SignerContext,
    StreamEvent, StreamId, Wallet,
};

/// Generate a wallet from a random valid private key.
pub fn wallet() -> impl Strategy<Value = Wallet> {
    any::<[u8; 32]>().prop_filter_map("invalid secp256k1 scalar", |seed| {
        Wallet::from_seed(&seed).ok()
    })
}

/// Generate an undelegated signer context.
pub fn signer_context() -> impl Strategy<Value = SignerContext> {
    wallet().prop_filter_map("invalid public key", |w| {
        make_undelegated_context(Arc::new(w)).ok()
    })
}

/// Generate a random EventHash.
pub fn event_hash() -> impl Strategy<Value = EventHash> {
    any::<[u8; 32]>().prop_map(EventHash::from_bytes)
}

/// Generate a random StreamId.
pub fn stream_id() -> impl Strategy<Value = StreamId> {
    any::<[u8; 32]>().prop_map(StreamId::from_bytes)
}

/// Generate message text.
pub fn message_text() -> impl Strategy<Value = String> {
    "[ -~]{0,200}".prop_map(String::from)
}

/// Parameters for generating a signed channel message.
#[derive(Debug, Clone)]
pub struct EventParams {
    pub seed: [u8; 32],
    pub salt: Vec<u8>,
    pub text: String,
    pub created_at_epoch_ms: i64,
    pub prev_miniblock_hash: Option<[u8; 32]>,
}

impl Arbitrary for EventParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            wallet().prop_map(|w| w.seed()),
            prop::collection::vec(any::<u8>(), 16),
            message_text(),
            0i64..=1_900_000_000_000i64,
            any::<Option<[u8; 32]>>(),
        )
            .prop_map(|(seed, salt, text, ts, prev)| EventParams {
                seed,
                salt,
                text,
                created_at_epoch_ms: ts,
                prev_miniblock_hash: prev,
            })
            .boxed()
    }
}

impl EventParams {
    pub fn context(&self) -> SignerContext {
        let wallet = Wallet::from_seed(&self.seed).expect("seed generated from a valid wallet");
        make_undelegated_context(Arc::new(wallet)).expect("wallet has a valid public key")
    }

    pub fn event(&self) -> StreamEvent {
        StreamEvent {
            creator_address: self.context().creator_address,
            salt: self.salt.clone(),
            prev_miniblock_hash: self.prev_miniblock_hash.map(EventHash::from_bytes),
            payload: Payload::channel_message(self.text.clone()),
            created_at_epoch_ms: self.created_at_epoch_ms,
            delegate_sig: None,
            delegate_expiry_epoch_ms: 0,
        }
    }
}

/// Sign the event described by `params`.
pub fn envelope_from_params(params: &EventParams) -> Envelope {
    envelope_from_event(&params.context(), &params.event()).expect("signing with a test wallet")
}
