//! House key handling: parsing the raw private key, signing BlockCypher
//! digests and validating destination addresses.

use std::fmt;

use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use crate::core::error::WithdrawError;

/// Hex characters in a raw 32-byte secp256k1 key.
pub const PRIVATE_KEY_HEX_LEN: usize = 64;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Mainnet prefixes: `D` for P2PKH, `A` and `9` for P2SH.
const DOGE_ADDRESS_PREFIXES: [char; 3] = ['D', 'A', '9'];

/// The hot wallet's signing key.
pub struct HouseKey {
    secp: Secp256k1<All>,
    secret: SecretKey,
    public: PublicKey,
}

impl fmt::Debug for HouseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HouseKey")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl HouseKey {
    /// Parses a 64-character hex key.
    pub fn from_hex(raw: &str) -> Result<Self, WithdrawError> {
        let trimmed = raw.trim();
        if trimmed.len() != PRIVATE_KEY_HEX_LEN {
            return Err(WithdrawError::InvalidPrivateKey(format!(
                "expected {} hex characters, got {}",
                PRIVATE_KEY_HEX_LEN,
                trimmed.len()
            )));
        }

        let bytes = hex::decode(trimmed).map_err(|e| WithdrawError::InvalidPrivateKey(e.to_string()))?;
        let secret = SecretKey::from_slice(&bytes).map_err(|e| WithdrawError::InvalidPrivateKey(e.to_string()))?;
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);

        Ok(Self { secp, secret, public })
    }

    /// Compressed SEC1 public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Signs one 32-byte digest and returns the DER signature as hex.
    pub fn sign_digest(&self, digest_hex: &str) -> Result<String, WithdrawError> {
        let digest = hex::decode(digest_hex.trim())
            .map_err(|e| WithdrawError::Signing(format!("digest is not hex: {}", e)))?;
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| WithdrawError::Signing(format!("digest must be 32 bytes: {}", e)))?;
        let signature = self.secp.sign_ecdsa(&message, &self.secret);
        Ok(hex::encode(signature.serialize_der().to_vec()))
    }

    /// Signs every digest of a skeleton.
    ///
    /// Returns one signature and one public key per digest, in input order; all
    /// inputs belong to the house address so the public key repeats.
    pub fn sign_all(&self, tosign: &[String]) -> Result<(Vec<String>, Vec<String>), WithdrawError> {
        if tosign.is_empty() {
            return Err(WithdrawError::Signing("skeleton has nothing to sign".to_string()));
        }
        let signatures = tosign
            .iter()
            .map(|digest| self.sign_digest(digest))
            .collect::<Result<Vec<_>, _>>()?;
        let pubkey = self.public_key_hex();
        Ok((signatures, vec![pubkey; tosign.len()]))
    }
}

/// Cheap structural check of a DOGE mainnet address.
///
/// Catches typos and pasted garbage before any ledger activity; the blockchain
/// API still has the final word on checksum validity.
pub fn validate_doge_address(raw: &str) -> Result<String, WithdrawError> {
    let address = raw.trim();
    let invalid = |reason: &str| WithdrawError::InvalidAddress(format!("{}: {}", reason, address));

    if !(26..=35).contains(&address.len()) {
        return Err(invalid("wrong length"));
    }
    if !address.chars().all(|c| BASE58_ALPHABET.contains(c)) {
        return Err(invalid("not base58"));
    }
    match address.chars().next() {
        Some(first) if DOGE_ADDRESS_PREFIXES.contains(&first) => Ok(address.to_string()),
        _ => Err(invalid("not a dogecoin mainnet address")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::ecdsa::Signature;

    // Private key 1: public key is the generator point G
    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const G_COMPRESSED: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_key_length_is_checked_first() {
        let err = HouseKey::from_hex("abcd").unwrap_err();
        assert!(matches!(err, WithdrawError::InvalidPrivateKey(msg) if msg.contains("64")));

        let err = HouseKey::from_hex(&"zz".repeat(32)).unwrap_err();
        assert!(matches!(err, WithdrawError::InvalidPrivateKey(_)));

        // zero is not a valid scalar
        let err = HouseKey::from_hex(&"0".repeat(64)).unwrap_err();
        assert!(matches!(err, WithdrawError::InvalidPrivateKey(_)));
    }

    #[test]
    fn test_public_key_is_compressed() {
        let key = HouseKey::from_hex(KEY_ONE).unwrap();
        assert_eq!(key.public_key_hex(), G_COMPRESSED);
        assert!(!format!("{:?}", key).contains(KEY_ONE));
    }

    #[test]
    fn test_signatures_verify() {
        let key = HouseKey::from_hex(KEY_ONE).unwrap();
        let digest = "ab".repeat(32);
        let (sigs, pubkeys) = key.sign_all(&[digest.clone(), digest.clone()]).unwrap();
        assert_eq!(sigs.len(), 2);
        assert_eq!(pubkeys, vec![G_COMPRESSED.to_string(), G_COMPRESSED.to_string()]);

        let secp = Secp256k1::verification_only();
        let sig = Signature::from_der(&hex::decode(&sigs[0]).unwrap()).unwrap();
        let msg = Message::from_digest_slice(&hex::decode(&digest).unwrap()).unwrap();
        let pubkey = PublicKey::from_slice(&hex::decode(G_COMPRESSED).unwrap()).unwrap();
        assert!(secp.verify_ecdsa(&msg, &sig, &pubkey).is_ok());
    }

    #[test]
    fn test_bad_digests_are_rejected() {
        let key = HouseKey::from_hex(KEY_ONE).unwrap();
        assert!(matches!(key.sign_digest("abcd"), Err(WithdrawError::Signing(_))));
        assert!(matches!(key.sign_digest("xyz"), Err(WithdrawError::Signing(_))));
        assert!(matches!(key.sign_all(&[]), Err(WithdrawError::Signing(_))));
    }

    #[test]
    fn test_validate_doge_address() {
        assert!(validate_doge_address("DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L").is_ok());
        assert!(validate_doge_address("  DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L\n").is_ok());
        assert!(validate_doge_address("1BoatSLRHtKNngkdXEeobR76b53LETtpyT").is_err());
        assert!(validate_doge_address("DH5yaieqoZN36fDVciNyRueRGvGLR3mr0L").is_err()); // '0' not base58
        assert!(validate_doge_address("D123").is_err());
    }
}
