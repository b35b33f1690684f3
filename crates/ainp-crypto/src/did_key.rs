//! # `did:key` Parsing
//!
//! The `did:key` method embeds the public key in the identifier tail:
//! `did:key:z<multibase-base58btc>`, where the decoded bytes start with the
//! two-byte multicodec prefix `0xED 0x01` (Ed25519) followed by the 32 key
//! bytes. Any other method or multicodec is unsupported for verification.

use crate::errors::CryptoError;
use crate::signatures::Ed25519PublicKey;
use ainp_types::Did;

/// Multicodec prefix for Ed25519 public keys.
const ED25519_MULTICODEC: [u8; 2] = [0xED, 0x01];

/// Multibase prefix for base58btc.
const MULTIBASE_BASE58BTC: char = 'z';

/// Recover the Ed25519 public key embedded in a `did:key` identifier.
///
/// # Errors
///
/// - `UnsupportedDid` for non-`key` methods, non-base58btc multibase, or
///   non-Ed25519 multicodec prefixes
/// - `MalformedDid` when the tail does not decode or has the wrong length
/// - `InvalidPublicKey` when the bytes are not a valid curve point
pub fn extract_public_key(did: &Did) -> Result<Ed25519PublicKey, CryptoError> {
    if did.method() != "key" {
        return Err(CryptoError::UnsupportedDid(did.to_string()));
    }
    let tail = did.method_id();
    let encoded = tail
        .strip_prefix(MULTIBASE_BASE58BTC)
        .ok_or_else(|| CryptoError::UnsupportedDid(did.to_string()))?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| CryptoError::MalformedDid(did.to_string()))?;

    if decoded.len() != 2 + 32 {
        return Err(CryptoError::MalformedDid(did.to_string()));
    }
    if decoded[..2] != ED25519_MULTICODEC {
        return Err(CryptoError::UnsupportedDid(did.to_string()));
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded[2..]);
    Ed25519PublicKey::from_bytes(key_bytes)
}

/// Derive the `did:key` identifier for a public key.
#[must_use]
pub fn did_for_public_key(public_key: &Ed25519PublicKey) -> Did {
    let mut bytes = Vec::with_capacity(34);
    bytes.extend_from_slice(&ED25519_MULTICODEC);
    bytes.extend_from_slice(public_key.as_bytes());
    let tail = bs58::encode(bytes).into_string();
    // "did:key:z<base58>" is well-formed by construction
    Did::parse(format!("did:key:{MULTIBASE_BASE58BTC}{tail}"))
        .unwrap_or_else(|_| unreachable!("constructed did:key is always well-formed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::Ed25519KeyPair;

    #[test]
    fn test_roundtrip_key_extraction() {
        let keypair = Ed25519KeyPair::from_seed([7u8; 32]);
        let did = did_for_public_key(&keypair.public_key());
        assert!(did.method_id().starts_with("z6Mk"));
        let recovered = extract_public_key(&did).unwrap();
        assert_eq!(recovered, keypair.public_key());
    }

    #[test]
    fn test_non_key_method_unsupported() {
        let did = Did::parse("did:web:example.com").unwrap();
        assert!(matches!(
            extract_public_key(&did),
            Err(CryptoError::UnsupportedDid(_))
        ));
    }

    #[test]
    fn test_wrong_multibase_unsupported() {
        let did = Did::parse("did:key:f00ff00f").unwrap();
        assert!(matches!(
            extract_public_key(&did),
            Err(CryptoError::UnsupportedDid(_))
        ));
    }

    #[test]
    fn test_bad_base58_malformed() {
        // '0' and 'I' are not in the base58btc alphabet
        let did = Did::parse("did:key:z0I0I").unwrap();
        assert!(matches!(
            extract_public_key(&did),
            Err(CryptoError::MalformedDid(_))
        ));
    }

    #[test]
    fn test_wrong_length_malformed() {
        let short = bs58::encode([0xED, 0x01, 0x02]).into_string();
        let did = Did::parse(format!("did:key:z{short}")).unwrap();
        assert!(matches!(
            extract_public_key(&did),
            Err(CryptoError::MalformedDid(_))
        ));
    }

    #[test]
    fn test_wrong_multicodec_unsupported() {
        // secp256k1 multicodec prefix 0xE7 0x01
        let mut bytes = vec![0xE7, 0x01];
        bytes.extend_from_slice(&[0u8; 32]);
        let tail = bs58::encode(bytes).into_string();
        let did = Did::parse(format!("did:key:z{tail}")).unwrap();
        assert!(matches!(
            extract_public_key(&did),
            Err(CryptoError::UnsupportedDid(_))
        ));
    }
}
