//! Ed25519 request signing
//!
//! Signatures are detached: they cover the canonical rendering of the request
//! and travel next to it in `signature` or `signatures`. A ledger identity is
//! the base58 encoding of the first 16 bytes of the signer's public key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::request::OutgoingRequest;

/// Bytes of the public key that make up a ledger identity
pub const IDENTITY_KEY_BYTES: usize = 16;

/// Encode bytes the way the ledger does
pub fn encode_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a base58 string
pub fn decode_base58(text: &str) -> Result<Vec<u8>> {
    Ok(bs58::decode(text).into_vec()?)
}

/// Ledger identity (DID) for a public key
pub fn identity_for(verifying_key: &VerifyingKey) -> String {
    encode_base58(&verifying_key.as_bytes()[..IDENTITY_KEY_BYTES])
}

/// A detached 64-byte Ed25519 signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachedSignature(Signature);

impl DetachedSignature {
    /// Raw signature bytes
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    /// Base58 text as carried in request payloads
    pub fn encode(&self) -> String {
        encode_base58(&self.0.to_bytes())
    }

    /// Parse the base58 text form
    pub fn decode(text: &str) -> Result<Self> {
        let bytes = decode_base58(text)?;
        let bytes: [u8; 64] = bytes.as_slice().try_into().map_err(|_| {
            LedgerError::crypto(format!(
                "invalid signature length: expected 64 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(Signature::from_bytes(&bytes)))
    }
}

/// Signing key for one ledger identity
#[derive(Clone)]
pub struct LedgerSigner {
    key: SigningKey,
}

impl std::fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSigner")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

impl LedgerSigner {
    /// Derive a signer from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// Load a signer from secret key bytes.
    ///
    /// Accepts a 32-byte seed or the 64-byte `seed || public key` layout used
    /// by libsodium. A 64-byte secret whose public half does not belong to the
    /// seed is rejected.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(bytes);
                Ok(Self::from_seed(&seed))
            }
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(bytes);
                let key = SigningKey::from_keypair_bytes(&keypair)?;
                Ok(Self { key })
            }
            other => Err(LedgerError::crypto(format!(
                "invalid signing key length: expected 32 or 64 bytes, got {other}"
            ))),
        }
    }

    /// Load a signer from a base58-encoded secret key
    pub fn from_base58_secret(text: &str) -> Result<Self> {
        Self::from_secret_bytes(&decode_base58(text)?)
    }

    /// Generate a fresh random signer
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Public verification key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Ledger identity (DID) of this signer
    pub fn identity(&self) -> String {
        identity_for(&self.verifying_key())
    }

    /// Full base58 public key
    pub fn verkey(&self) -> String {
        encode_base58(self.verifying_key().as_bytes())
    }

    /// Sign arbitrary bytes
    pub fn sign(&self, bytes: &[u8]) -> DetachedSignature {
        DetachedSignature(self.key.sign(bytes))
    }
}

/// Sign `bytes` with raw secret key material.
///
/// Fails with [`LedgerError::Crypto`] when the key is malformed.
pub fn sign(bytes: &[u8], secret_key: &[u8]) -> Result<DetachedSignature> {
    Ok(LedgerSigner::from_secret_bytes(secret_key)?.sign(bytes))
}

/// Return a copy of `request` with `signatures[identity]` added.
///
/// Existing entries are kept, so independent signers can each add their own
/// signature to the same request.
pub fn attach_signature(
    request: &OutgoingRequest,
    identity: &str,
    signer: &LedgerSigner,
) -> OutgoingRequest {
    let signature = signer.sign(&request.signing_input());
    debug!(identity, "attached multi-signature entry");
    request.with_signatures_entry(identity, signature.encode())
}

/// Return a copy of `request` with the single `signature` field set
pub fn attach_single_signature(request: &OutgoingRequest, signer: &LedgerSigner) -> OutgoingRequest {
    let signature = signer.sign(&request.signing_input());
    request.with_signature(signature.encode())
}

/// Verify one detached signature over `request` against a base58 verkey
pub fn verify(request: &OutgoingRequest, verkey: &str, encoded_signature: &str) -> Result<()> {
    let key_bytes = decode_base58(verkey)?;
    let key_bytes: [u8; 32] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| LedgerError::crypto("verkey must decode to 32 bytes"))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)?;
    let signature = DetachedSignature::decode(encoded_signature)?;
    verifying_key.verify(&request.signing_input(), &signature.0)?;
    Ok(())
}

/// Verify every `(identity, verkey)` pair has a valid entry in `signatures`
pub fn verify_signatures<'a>(
    request: &OutgoingRequest,
    signers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<()> {
    for (identity, verkey) in signers {
        let encoded = request
            .signature_for(identity)
            .ok_or_else(|| LedgerError::crypto(format!("no signature from {identity}")))?;
        verify(request, verkey, encoded)?;
    }
    Ok(())
}

/// Keys to sign an outgoing request with
#[derive(Debug, Clone, Default)]
pub struct SigningOptions {
    /// Key for the single `signature` field
    pub signature: Option<LedgerSigner>,
    /// `(identity, key)` pairs for the `signatures` map
    pub signatures: Vec<(String, LedgerSigner)>,
}

impl SigningOptions {
    /// No signing
    pub fn none() -> Self {
        Self::default()
    }

    /// Sign with a single key into `signature`
    pub fn single(signer: LedgerSigner) -> Self {
        Self {
            signature: Some(signer),
            signatures: Vec::new(),
        }
    }

    /// Add a multi-signature entry keyed by the signer's own identity
    pub fn with_signer(mut self, signer: LedgerSigner) -> Self {
        self.signatures.push((signer.identity(), signer));
        self
    }

    /// Add a multi-signature entry under an explicit identity
    pub fn with_identity(mut self, identity: impl Into<String>, signer: LedgerSigner) -> Self {
        self.signatures.push((identity.into(), signer));
        self
    }

    /// Whether any key is configured
    pub fn is_empty(&self) -> bool {
        self.signature.is_none() && self.signatures.is_empty()
    }

    /// Apply every configured signature to `request`.
    ///
    /// All signatures cover the same canonical bytes; the signature fields
    /// themselves are excluded from those bytes.
    pub fn apply(&self, request: &OutgoingRequest) -> OutgoingRequest {
        if self.is_empty() {
            return request.clone();
        }
        let input = request.signing_input();
        let mut signed = match &self.signature {
            Some(signer) => request.with_signature(signer.sign(&input).encode()),
            None => request.clone(),
        };
        for (identity, signer) in &self.signatures {
            signed = signed.with_signatures_entry(identity.as_str(), signer.sign(&input).encode());
        }
        signed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TRUSTEE1_SEED: &[u8; 32] = b"000000000000000000000000Trustee1";
    const STEWARD1_SEED: &[u8; 32] = b"000000000000000000000000Steward1";

    fn get_nym() -> OutgoingRequest {
        OutgoingRequest::from_value(json!({
            "identifier": "V4SGRU86Z58d6TV7PBUe6f",
            "operation": {"type": "105", "dest": "V4SGRU86Z58d6TV7PBUe6f"},
            "protocolVersion": 2,
            "reqId": 1514215425836443u64,
        }))
        .unwrap()
    }

    #[test]
    fn well_known_seeds_map_to_ledger_identities() {
        let trustee = LedgerSigner::from_seed(TRUSTEE1_SEED);
        assert_eq!(trustee.identity(), "V4SGRU86Z58d6TV7PBUe6f");
        assert_eq!(trustee.verkey(), "GJ1SzoWzavQYfNL9XkaJdrQejfztN4XqdsiV4ct3LXKL");

        let steward = LedgerSigner::from_seed(STEWARD1_SEED);
        assert_eq!(steward.identity(), "Th7MpTaRZVRYnPiabds81Y");
        assert_eq!(steward.verkey(), "FYmoFw55GeQH7SRFa37dkx1d2dZ3zUF8ckg7wmL7ofN4");
    }

    #[test]
    fn single_signature_matches_known_answer() {
        let signed = attach_single_signature(&get_nym(), &LedgerSigner::from_seed(TRUSTEE1_SEED));
        assert_eq!(
            signed.signature(),
            Some("RzXy1QnJyw5KXzhLVAHPQj1J4b5HnTsDXCX6RsfquPxpR1cK4iGBPZN4YKfGETisTKJmQQh7ovMigxvhckU33Pd")
        );
    }

    #[test]
    fn two_signers_accumulate_and_both_verify() {
        let trustee = LedgerSigner::from_seed(TRUSTEE1_SEED);
        let steward = LedgerSigner::from_seed(STEWARD1_SEED);

        let request = get_nym();
        let once = attach_signature(&request, &trustee.identity(), &trustee);
        let twice = attach_signature(&once, &steward.identity(), &steward);

        assert!(request.signers().is_empty());
        assert_eq!(once.signers().len(), 1);
        assert_eq!(twice.signers().len(), 2);
        assert_eq!(
            once.signature_for(&trustee.identity()),
            twice.signature_for(&trustee.identity())
        );

        let trustee_id = trustee.identity();
        let steward_id = steward.identity();
        let trustee_verkey = trustee.verkey();
        let steward_verkey = steward.verkey();
        verify_signatures(
            &twice,
            [
                (trustee_id.as_str(), trustee_verkey.as_str()),
                (steward_id.as_str(), steward_verkey.as_str()),
            ],
        )
        .unwrap();
    }

    #[test]
    fn signing_options_cover_the_same_bytes() {
        let trustee = LedgerSigner::from_seed(TRUSTEE1_SEED);
        let steward = LedgerSigner::from_seed(STEWARD1_SEED);
        let options = SigningOptions::single(trustee.clone()).with_signer(steward.clone());

        let signed = options.apply(&get_nym());

        verify(&signed, &trustee.verkey(), signed.signature().unwrap()).unwrap();
        verify(
            &signed,
            &steward.verkey(),
            signed.signature_for(&steward.identity()).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let trustee = LedgerSigner::from_seed(TRUSTEE1_SEED);
        let signed = attach_single_signature(&get_nym(), &trustee);
        let tampered = signed.with_field("protocolVersion", json!(1));

        let err = verify(&tampered, &trustee.verkey(), tampered.signature().unwrap()).unwrap_err();
        assert!(matches!(err, LedgerError::Crypto { .. }));
    }

    #[test]
    fn libsodium_secret_layout_is_accepted() {
        let trustee = LedgerSigner::from_seed(TRUSTEE1_SEED);
        let mut secret = TRUSTEE1_SEED.to_vec();
        secret.extend_from_slice(trustee.verifying_key().as_bytes());

        let loaded = LedgerSigner::from_secret_bytes(&secret).unwrap();
        assert_eq!(loaded.identity(), trustee.identity());
    }

    #[test]
    fn malformed_keys_fail_with_crypto_error() {
        assert!(matches!(
            sign(b"data", &[1u8; 12]),
            Err(LedgerError::Crypto { .. })
        ));

        let mut mismatched = TRUSTEE1_SEED.to_vec();
        mismatched.extend_from_slice(&[7u8; 32]);
        assert!(matches!(
            LedgerSigner::from_secret_bytes(&mismatched),
            Err(LedgerError::Crypto { .. })
        ));
    }
}
