//! Shared-secret message tagging.
//!
//! The client prepends a fixed tag (the hex SHA3-256 of a shared key) to every
//! serialized envelope; the broker accepts a frame only if it starts with
//! that exact tag and strips it before fan-out.
//!
//! This is a static prefix check, not a MAC: anyone who observes one tagged
//! frame can replay or forge others. Use it to keep stray clients out, not to
//! defend against an active attacker.

use std::sync::Arc;

use crate::error::ConfigError;
use crate::topic::hash;

/// Broker-side gate: returns the stripped frame when accepted, `None` when rejected.
pub type Gate = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Client-side signer applied to every outbound serialized envelope.
pub type Signer = Arc<dyn Fn(Vec<u8>) -> Vec<u8> + Send + Sync>;

/// The tag derived from a shared key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTag(Vec<u8>);

impl AuthTag {
    pub fn new(key: &str) -> Result<Self, ConfigError> {
        if key.is_empty() {
            return Err(ConfigError::EmptyAuthKey);
        }
        Ok(Self(hash(key).into_bytes()))
    }

    pub fn sign(&self, msg: Vec<u8>) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + msg.len());
        out.extend_from_slice(&self.0);
        out.extend(msg);
        out
    }

    pub fn verify(&self, msg: &[u8]) -> Option<Vec<u8>> {
        msg.strip_prefix(self.0.as_slice()).map(<[u8]>::to_vec)
    }
}

/// Build a broker [`Gate`] from a shared key.
pub fn gate_with_key(key: &str) -> Result<Gate, ConfigError> {
    let tag = AuthTag::new(key)?;
    Ok(Arc::new(move |msg: &[u8]| tag.verify(msg)))
}

/// Build a client [`Signer`] from a shared key.
pub fn signer_with_key(key: &str) -> Result<Signer, ConfigError> {
    let tag = AuthTag::new(key)?;
    Ok(Arc::new(move |msg: Vec<u8>| tag.sign(msg)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_a_config_error() {
        assert!(matches!(AuthTag::new(""), Err(ConfigError::EmptyAuthKey)));
        assert!(gate_with_key("").is_err());
        assert!(signer_with_key("").is_err());
    }

    #[test]
    fn gate_accepts_signed_and_strips_tag() {
        let sign = signer_with_key("hunter2").unwrap();
        let gate = gate_with_key("hunter2").unwrap();

        let signed = sign(b"{\"title\":\"x\"}".to_vec());
        assert_eq!(signed.len(), 64 + 13);
        assert_eq!(gate(&signed).as_deref(), Some(&b"{\"title\":\"x\"}"[..]));
    }

    #[test]
    fn gate_rejects_untagged_or_foreign_key() {
        let gate = gate_with_key("hunter2").unwrap();
        let other = signer_with_key("letmein").unwrap();

        assert!(gate(b"{\"title\":\"x\"}").is_none());
        assert!(gate(&other(b"{}".to_vec())).is_none());
    }
}
