//! Golden test vectors.
//!
//! Known answers for the hashing and key derivation every River client must
//! agree on, plus the miniblock-hash length cases for event construction.

use river_stream_core::{keccak256, make_event, Payload, SignerContext, Wallet};

/// A keccak256 known answer.
#[derive(Debug, Clone)]
pub struct KeccakVector {
    pub name: &'static str,
    pub input: &'static [u8],
    pub expected_hex: &'static str,
}

/// A private key to checksummed address known answer.
#[derive(Debug, Clone)]
pub struct AddressVector {
    pub name: &'static str,
    /// Big-endian 32-byte private key.
    pub private_key: [u8; 32],
    pub expected_user_id: &'static str,
}

/// A previous-miniblock hash and whether event construction accepts it.
#[derive(Debug, Clone)]
pub struct PrevHashVector {
    pub name: &'static str,
    pub hash_hex: &'static str,
    pub accepted: bool,
}

/// A miniblock hash taken from a live stream.
pub const SCENARIO_MINIBLOCK_HASH: &str =
    "0x8dc27dbd6fc775e3a05c509c6eb1c63c4ab5bc6e7010bf9a9a80a42ae1ea56b0";

const fn scalar(last: u8) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[31] = last;
    key
}

pub fn keccak_vectors() -> Vec<KeccakVector> {
    vec![
        KeccakVector {
            name: "empty input",
            input: b"",
            expected_hex: "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470",
        },
        KeccakVector {
            name: "abc",
            input: b"abc",
            expected_hex: "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45",
        },
    ]
}

pub fn address_vectors() -> Vec<AddressVector> {
    vec![
        AddressVector {
            name: "private key 1",
            private_key: scalar(1),
            expected_user_id: "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf",
        },
        AddressVector {
            name: "private key 2",
            private_key: scalar(2),
            expected_user_id: "0x2B5AD5c4795c026514f8317c7a215E218DcCD6cF",
        },
    ]
}

pub fn prev_hash_vectors() -> Vec<PrevHashVector> {
    vec![
        PrevHashVector {
            name: "32 bytes",
            hash_hex: SCENARIO_MINIBLOCK_HASH,
            accepted: true,
        },
        PrevHashVector {
            name: "33 bytes",
            hash_hex: "0x8dc27dbd6fc775e3a05c509c6eb1c63c4ab5bc6e7010bf9a9a80a42ae1ea56b0ff",
            accepted: false,
        },
        PrevHashVector {
            name: "31 bytes",
            hash_hex: "0x8dc27dbd6fc775e3a05c509c6eb1c63c4ab5bc6e7010bf9a9a80a42ae1ea56",
            accepted: false,
        },
    ]
}

/// Decode a `0x`-prefixed hex string.
pub fn decode_hex(s: &str) -> Vec<u8> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).expect("vector hex is well formed")
}

/// Check every vector against this build. Returns `(name, passed, detail)`.
pub fn verify_all_vectors(context: &SignerContext) -> Vec<(String, bool, String)> {
    let mut out = Vec::new();

    for v in keccak_vectors() {
        let got = hex::encode(keccak256(v.input));
        out.push((v.name.to_string(), got == v.expected_hex, got));
    }

    for v in address_vectors() {
        let got = match Wallet::from_seed(&v.private_key) {
            Ok(w) => w.address().to_user_id(),
            Err(e) => e.to_string(),
        };
        out.push((v.name.to_string(), got == v.expected_user_id, got));
    }

    for v in prev_hash_vectors() {
        let hash = decode_hex(v.hash_hex);
        let result = make_event(context, Payload::channel_message("scenario"), Some(&hash));
        let detail = match &result {
            Ok(_) => "accepted".to_string(),
            Err(e) => e.to_string(),
        };
        out.push((v.name.to_string(), result.is_ok() == v.accepted, detail));
    }

    out
}
