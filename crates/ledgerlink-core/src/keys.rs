//! Ephemeral transport key pairs

use curve25519_dalek::montgomery::MontgomeryPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Curve25519 key pair a client presents to the node's CURVE handshake.
///
/// A new pair is generated for every connection and the secret half is wiped
/// when the pair is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ClientKeyPair {
    public: [u8; 32],
    secret: [u8; 32],
}

impl ClientKeyPair {
    /// Generate a fresh random key pair
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::from_secret(secret)
    }

    /// Build a key pair from a secret scalar (clamped on use)
    pub fn from_secret(secret: [u8; 32]) -> Self {
        let public = MontgomeryPoint::mul_base_clamped(secret).to_bytes();
        Self { public, secret }
    }

    /// Public half
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// Secret half
    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Hex form of the public half, for logs
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public)
    }
}

impl std::fmt::Debug for ClientKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientKeyPair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pairs_are_distinct() {
        let a = ClientKeyPair::generate();
        let b = ClientKeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn public_key_is_derived_from_secret() {
        // RFC 7748 section 6.1, Alice's key pair
        let secret: [u8; 32] =
            hex::decode("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
                .unwrap()
                .try_into()
                .unwrap();
        let pair = ClientKeyPair::from_secret(secret);
        assert_eq!(
            pair.public_key_hex(),
            "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a"
        );
    }
}
