//! Cryptographic primitives for River streams.
//!
//! Wraps secp256k1 recoverable ECDSA and keccak-256 with strong types, and
//! defines the protocol hashes built on top of them.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::error::CoreError;
use crate::types::{Address, EventHash};

const HASH_HEADER: &[u8; 8] = b"CSBLANCA";
const HASH_SEPARATOR: &[u8; 8] = b"ABCDEFG>";
const HASH_FOOTER: &[u8; 8] = b"<GFEDCBA";
const RIVER_SIG_HEADER: &[u8; 8] = b"RIVERSIG";

/// Length of an uncompressed SEC1 public key.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length of a recoverable signature (r ‖ s ‖ v).
pub const SIGNATURE_LEN: usize = 65;

/// keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// The protocol event hash.
///
/// keccak256(HEADER ‖ len(data) as u64 LE ‖ SEPARATOR ‖ data ‖ FOOTER)
pub fn river_hash(data: &[u8]) -> EventHash {
    let mut hasher = Keccak256::new();
    hasher.update(HASH_HEADER);
    hasher.update((data.len() as u64).to_le_bytes());
    hasher.update(HASH_SEPARATOR);
    hasher.update(data);
    hasher.update(HASH_FOOTER);
    EventHash(hasher.finalize().into())
}

/// EIP-191 personal message hash.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Preimage of the current delegation scheme: RIVERSIG ‖ device key ‖ expiry as u64 LE.
pub fn delegate_hash_src(device_public_key: &[u8], expiry_epoch_ms: u64) -> Vec<u8> {
    let mut buf =
        Vec::with_capacity(RIVER_SIG_HEADER.len() + device_public_key.len() + 8);
    buf.extend_from_slice(RIVER_SIG_HEADER);
    buf.extend_from_slice(device_public_key);
    buf.extend_from_slice(&expiry_epoch_ms.to_le_bytes());
    buf
}

/// The hash a primary key signs to delegate to a device key.
pub fn delegate_hash(device_public_key: &[u8], expiry_epoch_ms: u64) -> [u8; 32] {
    personal_message_hash(&delegate_hash_src(device_public_key, expiry_epoch_ms))
}

/// A 65-byte uncompressed secp256k1 public key (0x04 ‖ x ‖ y).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Parse a raw key. Only the uncompressed SEC1 form is accepted.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            CoreError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LEN,
                bytes.len()
            ))
        })?;
        if arr[0] != 0x04 {
            return Err(CoreError::InvalidPublicKey(
                "expected uncompressed point".into(),
            ));
        }
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The account address of this key.
    pub fn to_address(&self) -> Address {
        let digest = keccak256(&self.0[1..]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Address(out)
    }

    fn from_verifying_key(key: &VerifyingKey) -> Result<Self, CoreError> {
        let point = key.to_encoded_point(false);
        Self::from_slice(point.as_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 65-byte recoverable signature: r ‖ s ‖ v, with v in {0, 1}.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoverableSignature(pub [u8; SIGNATURE_LEN]);

impl RecoverableSignature {
    /// Parse a raw signature. A trailing v of 27/28 is normalized to 0/1.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut arr: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|_| {
            CoreError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                bytes.len()
            ))
        })?;
        if arr[64] >= 27 {
            arr[64] -= 27;
        }
        if arr[64] > 1 {
            return Err(CoreError::InvalidSignature(format!(
                "invalid recovery id {}",
                bytes[64]
            )));
        }
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Recover the signer's public key from a 32-byte prehash.
    pub fn recover(&self, hash: &[u8; 32]) -> Result<PublicKey, CoreError> {
        let sig = Signature::from_slice(&self.0[..64])
            .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
        let recid = RecoveryId::from_byte(self.0[64])
            .ok_or_else(|| CoreError::InvalidSignature("invalid recovery id".into()))?;
        let key = VerifyingKey::recover_from_prehash(hash, &sig, recid)
            .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
        PublicKey::from_verifying_key(&key)
    }

    /// Recover the signer's address from a 32-byte prehash.
    pub fn recover_address(&self, hash: &[u8; 32]) -> Result<Address, CoreError> {
        Ok(self.recover(hash)?.to_address())
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for RecoverableSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A secp256k1 key held in memory.
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
}

impl Wallet {
    /// Generate a new random wallet.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::random(&mut rng),
        }
    }

    /// Create from a 32-byte private key. Zero and out-of-range scalars are rejected.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CoreError> {
        let signing_key = SigningKey::from_slice(seed)
            .map_err(|e| CoreError::InvalidPublicKey(format!("invalid private key: {}", e)))?;
        Ok(Self { signing_key })
    }

    /// Get the uncompressed public key.
    pub fn public_key(&self) -> PublicKey {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let mut arr = [0u8; PUBLIC_KEY_LEN];
        arr.copy_from_slice(point.as_bytes());
        PublicKey(arr)
    }

    /// Get the account address.
    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    /// Sign a 32-byte prehash.
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, CoreError> {
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| CoreError::SigningFailed(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recid.to_byte();
        Ok(RecoverableSignature(out))
    }

    /// Sign `message` as an EIP-191 personal message.
    pub fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, CoreError> {
        self.sign_hash(&personal_message_hash(message))
    }

    /// Get the raw private key bytes (secret key material).
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wallet({:?})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(n: u8) -> [u8; 32] {
        let mut s = [0u8; 32];
        s[31] = n;
        s
    }

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_known_addresses() {
        let one = Wallet::from_seed(&seed(1)).unwrap();
        assert_eq!(
            one.address().to_user_id(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );

        let two = Wallet::from_seed(&seed(2)).unwrap();
        assert_eq!(
            two.address().to_user_id(),
            "0x2B5AD5c4795c026514f8317c7a215E218DcCD6cF"
        );
    }

    #[test]
    fn test_zero_seed_rejected() {
        assert!(Wallet::from_seed(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_sign_recover() {
        let wallet = Wallet::generate();
        let hash = keccak256(b"hello world");
        let sig = wallet.sign_hash(&hash).unwrap();

        let recovered = sig.recover(&hash).unwrap();
        assert_eq!(recovered, wallet.public_key());
        assert_eq!(sig.recover_address(&hash).unwrap(), wallet.address());

        // A different hash recovers some other key
        let other = keccak256(b"hello worlD");
        match sig.recover_address(&other) {
            Ok(addr) => assert_ne!(addr, wallet.address()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_signature_v_normalization() {
        let wallet = Wallet::from_seed(&seed(7)).unwrap();
        let hash = keccak256(b"v");
        let sig = wallet.sign_hash(&hash).unwrap();

        let mut legacy = sig.0;
        legacy[64] += 27;
        let parsed = RecoverableSignature::from_slice(&legacy).unwrap();
        assert_eq!(parsed, sig);

        let mut bad = sig.0;
        bad[64] = 5;
        assert!(RecoverableSignature::from_slice(&bad).is_err());
        assert!(RecoverableSignature::from_slice(&sig.0[..64]).is_err());
    }

    #[test]
    fn test_public_key_parsing() {
        let wallet = Wallet::generate();
        let pk = wallet.public_key();
        assert_eq!(PublicKey::from_slice(pk.as_bytes()).unwrap(), pk);

        assert!(PublicKey::from_slice(&pk.0[..33]).is_err());
        let mut compressed_prefix = pk.0;
        compressed_prefix[0] = 0x02;
        assert!(PublicKey::from_slice(&compressed_prefix).is_err());
    }

    #[test]
    fn test_river_hash_layout() {
        let data = b"payload";
        let mut pre = Vec::new();
        pre.extend_from_slice(b"CSBLANCA");
        pre.extend_from_slice(&(data.len() as u64).to_le_bytes());
        pre.extend_from_slice(b"ABCDEFG>");
        pre.extend_from_slice(data);
        pre.extend_from_slice(b"<GFEDCBA");
        assert_eq!(river_hash(data).0, keccak256(&pre));
        assert_ne!(river_hash(data).0, keccak256(data));
    }

    #[test]
    fn test_personal_message_hash_layout() {
        let msg = b"abc";
        let expected = keccak256(b"\x19Ethereum Signed Message:\n3abc");
        assert_eq!(personal_message_hash(msg), expected);
    }

    #[test]
    fn test_delegate_hash_src_layout() {
        let device = [0x04u8; 65];
        let src = delegate_hash_src(&device, 0x0102);
        assert_eq!(&src[..8], b"RIVERSIG");
        assert_eq!(&src[8..73], &device[..]);
        assert_eq!(&src[73..], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_wallet_debug_hides_key() {
        let wallet = Wallet::from_seed(&seed(1)).unwrap();
        let debug = format!("{:?}", wallet);
        assert!(debug.starts_with("Wallet(Address("));
        assert!(!debug.contains(&hex::encode(wallet.seed())));
    }
}
