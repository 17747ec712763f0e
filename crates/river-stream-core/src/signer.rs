//! Signing identity and key delegation.
//!
//! A user identity (the primary key) may delegate event signing to a device
//! key. The primary signs the device public key once; every event signed by
//! the device then carries that delegation signature so verifiers can tie
//! the device back to the user.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::crypto::{
    delegate_hash, personal_message_hash, PublicKey, RecoverableSignature, Wallet,
};
use crate::error::{CoreError, ValidationError};
use crate::types::Address;

/// A signing capability. The private key never leaves the implementor.
pub trait Signer: Send + Sync {
    /// Sign a 32-byte prehash.
    fn sign(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, CoreError>;

    /// The raw SEC1 public key of this signer.
    fn public_key(&self) -> Vec<u8>;
}

impl Signer for Wallet {
    fn sign(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, CoreError> {
        self.sign_hash(hash)
    }

    fn public_key(&self) -> Vec<u8> {
        Wallet::public_key(self).0.to_vec()
    }
}

/// Identity used to sign outgoing events.
#[derive(Clone)]
pub struct SignerContext {
    /// The key that signs events (the device key when delegated).
    pub signer: Arc<dyn Signer>,

    /// Address of the user identity events are attributed to.
    pub creator_address: Address,

    /// Signature by the user key over the device key, when delegated.
    pub delegate_sig: Option<RecoverableSignature>,

    /// Expiry bound into the delegation. Zero means no expiry.
    pub delegate_expiry_epoch_ms: u64,
}

impl SignerContext {
    /// Whether events are signed by a delegated device key.
    pub fn is_delegated(&self) -> bool {
        self.delegate_sig.is_some()
    }

    /// The creator address as a user id string.
    pub fn user_id(&self) -> String {
        self.creator_address.to_user_id()
    }
}

impl fmt::Debug for SignerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerContext")
            .field("creator_address", &self.creator_address)
            .field("delegated", &self.delegate_sig.is_some())
            .field("delegate_expiry_epoch_ms", &self.delegate_expiry_epoch_ms)
            .finish_non_exhaustive()
    }
}

fn parse_public_key(raw: &[u8]) -> Result<PublicKey, ValidationError> {
    PublicKey::from_slice(raw).map_err(|e| ValidationError::BadPublicKey(e.to_string()))
}

/// Build a context where `delegate` signs events on behalf of `primary`.
///
/// The device key of `delegate` must be a 65-byte uncompressed point.
pub fn make_signer_context(
    primary: &dyn Signer,
    delegate: Arc<dyn Signer>,
    expiry_epoch_ms: Option<u64>,
) -> Result<SignerContext, ValidationError> {
    let device_pub = parse_public_key(&delegate.public_key())?;
    let creator_address = parse_public_key(&primary.public_key())?.to_address();
    let expiry = expiry_epoch_ms.unwrap_or(0);

    let delegate_sig = primary
        .sign(&delegate_hash(device_pub.as_bytes(), expiry))
        .map_err(|e| ValidationError::BadDelegateSig(e.to_string()))?;

    Ok(SignerContext {
        signer: delegate,
        creator_address,
        delegate_sig: Some(delegate_sig),
        delegate_expiry_epoch_ms: expiry,
    })
}

/// Build a context where `signer` is the user identity itself.
pub fn make_undelegated_context(signer: Arc<dyn Signer>) -> Result<SignerContext, ValidationError> {
    let creator_address = parse_public_key(&signer.public_key())?.to_address();
    Ok(SignerContext {
        signer,
        creator_address,
        delegate_sig: None,
        delegate_expiry_epoch_ms: 0,
    })
}

/// A delegation signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateScheme {
    /// Personal-message signature over the bare device key.
    Legacy,
    /// Personal-message signature over RIVERSIG ‖ device key ‖ expiry.
    Current,
}

impl DelegateScheme {
    /// Schemes in the order verifiers try them.
    pub const ORDER: [DelegateScheme; 2] = [DelegateScheme::Legacy, DelegateScheme::Current];

    /// The hash the user key signed under this scheme.
    pub fn hash(&self, device_public_key: &[u8], expiry_epoch_ms: u64) -> [u8; 32] {
        match self {
            DelegateScheme::Legacy => personal_message_hash(device_public_key),
            DelegateScheme::Current => delegate_hash(device_public_key, expiry_epoch_ms),
        }
    }
}

/// Check that `delegate_sig` ties `device_public_key` to `creator_address`.
///
/// Returns the first scheme that matches.
pub fn check_delegate_sig(
    device_public_key: &[u8],
    creator_address: &Address,
    delegate_sig: &[u8],
    expiry_epoch_ms: u64,
) -> Result<DelegateScheme, ValidationError> {
    let sig = RecoverableSignature::from_slice(delegate_sig)
        .map_err(|e| ValidationError::BadDelegateSig(e.to_string()))?;

    for scheme in DelegateScheme::ORDER {
        let hash = scheme.hash(device_public_key, expiry_epoch_ms);
        match sig.recover_address(&hash) {
            Ok(addr) if addr == *creator_address => return Ok(scheme),
            Ok(_) => {}
            Err(e) => trace!(?scheme, error = %e, "delegate recovery failed"),
        }
    }

    Err(ValidationError::BadDelegateSig(format!(
        "delegate signature does not resolve to {}",
        creator_address.to_user_id()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    struct CompressedKeySigner(Wallet);

    impl Signer for CompressedKeySigner {
        fn sign(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, CoreError> {
            self.0.sign_hash(hash)
        }

        fn public_key(&self) -> Vec<u8> {
            self.0.public_key().0[..33].to_vec()
        }
    }

    #[test]
    fn test_delegated_context() {
        let user = Wallet::generate();
        let device = Wallet::generate();
        let ctx = make_signer_context(&user, Arc::new(device.clone()), None).unwrap();

        assert_eq!(ctx.creator_address, user.address());
        assert!(ctx.is_delegated());

        let scheme = check_delegate_sig(
            device.public_key().as_bytes(),
            &user.address(),
            ctx.delegate_sig.unwrap().as_bytes(),
            0,
        )
        .unwrap();
        assert_eq!(scheme, DelegateScheme::Current);
    }

    #[test]
    fn test_expiry_is_bound() {
        let user = Wallet::generate();
        let device = Wallet::generate();
        let ctx = make_signer_context(&user, Arc::new(device.clone()), Some(1_700_000_000_000))
            .unwrap();
        let sig = ctx.delegate_sig.unwrap();

        assert!(check_delegate_sig(
            device.public_key().as_bytes(),
            &user.address(),
            sig.as_bytes(),
            1_700_000_000_000,
        )
        .is_ok());

        let err = check_delegate_sig(
            device.public_key().as_bytes(),
            &user.address(),
            sig.as_bytes(),
            1_700_000_000_001,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadDelegateSig);
    }

    #[test]
    fn test_legacy_scheme_accepted() {
        let user = Wallet::generate();
        let device = Wallet::generate();
        let legacy = user.sign_message(device.public_key().as_bytes()).unwrap();

        let scheme = check_delegate_sig(
            device.public_key().as_bytes(),
            &user.address(),
            legacy.as_bytes(),
            0,
        )
        .unwrap();
        assert_eq!(scheme, DelegateScheme::Legacy);
    }

    #[test]
    fn test_cross_delegation_rejected() {
        let u1 = Wallet::generate();
        let d1 = Wallet::generate();
        let u2 = Wallet::generate();
        let d2 = Wallet::generate();

        let c1 = make_signer_context(&u1, Arc::new(d1.clone()), None).unwrap();
        let c2 = make_signer_context(&u2, Arc::new(d2.clone()), None).unwrap();

        // D1 with U2's delegation
        let err = check_delegate_sig(
            d1.public_key().as_bytes(),
            &u1.address(),
            c2.delegate_sig.unwrap().as_bytes(),
            0,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadDelegateSig);

        // D2 claiming U1
        let err = check_delegate_sig(
            d2.public_key().as_bytes(),
            &u1.address(),
            c1.delegate_sig.unwrap().as_bytes(),
            0,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadDelegateSig);
    }

    #[test]
    fn test_malformed_delegate_sig() {
        let user = Wallet::generate();
        let device = Wallet::generate();
        let err = check_delegate_sig(
            device.public_key().as_bytes(),
            &user.address(),
            &[0u8; 12],
            0,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadDelegateSig);
    }

    #[test]
    fn test_compressed_device_key_rejected() {
        let user = Wallet::generate();
        let device = CompressedKeySigner(Wallet::generate());
        let err = make_signer_context(&user, Arc::new(device), None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadPublicKey);
    }

    #[test]
    fn test_undelegated_context() {
        let user = Wallet::generate();
        let ctx = make_undelegated_context(Arc::new(user.clone())).unwrap();
        assert_eq!(ctx.creator_address, user.address());
        assert!(!ctx.is_delegated());
        assert_eq!(ctx.delegate_expiry_epoch_ms, 0);
        assert_eq!(ctx.user_id(), user.address().to_user_id());
    }
}
