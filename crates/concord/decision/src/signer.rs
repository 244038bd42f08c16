//! Pluggable party signatures.
//!
//! The decision engine only sees [`Signer`] and [`SignatureAuthority`]; the
//! keyed-digest authority stands in where no asymmetric keys are provisioned,
//! and the Ed25519 authority can replace it without touching engine logic.

use std::collections::HashMap;
use std::sync::Arc;

use concord_types::PartyId;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    Blake3Keyed,
    Ed25519,
}

/// A party's signature over an Evidence Package digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySignature {
    pub party_id: PartyId,
    pub scheme: SignatureScheme,
    /// Hex-encoded signature bytes.
    pub signature: String,
}

/// Signs on behalf of exactly one party.
pub trait Signer: Send + Sync {
    fn party_id(&self) -> &PartyId;
    fn sign(&self, payload: &[u8]) -> PartySignature;
}

/// Resolves signers and verifies signatures by party.
pub trait SignatureAuthority: Send + Sync {
    fn signer_for(&self, party_id: &PartyId) -> Option<Arc<dyn Signer>>;
    fn verify(&self, payload: &[u8], signature: &PartySignature, party_id: &PartyId) -> bool;
}

// ── Keyed BLAKE3 ─────────────────────────────────────────────────────

/// Per-party keyed BLAKE3 MACs.
#[derive(Default)]
pub struct DigestAuthority {
    keys: RwLock<HashMap<PartyId, [u8; 32]>>,
}

struct DigestSigner {
    party_id: PartyId,
    key: [u8; 32],
}

impl Signer for DigestSigner {
    fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    fn sign(&self, payload: &[u8]) -> PartySignature {
        PartySignature {
            party_id: self.party_id.clone(),
            scheme: SignatureScheme::Blake3Keyed,
            signature: blake3::keyed_hash(&self.key, payload).to_hex().to_string(),
        }
    }
}

impl DigestAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parties<'a>(parties: impl IntoIterator<Item = &'a PartyId>) -> Self {
        let authority = Self::new();
        for party in parties {
            authority.enroll(party);
        }
        authority
    }

    /// Issue a fresh random key for `party_id`, replacing any previous key.
    pub fn enroll(&self, party_id: &PartyId) {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        self.keys.write().insert(party_id.clone(), key);
    }
}

impl SignatureAuthority for DigestAuthority {
    fn signer_for(&self, party_id: &PartyId) -> Option<Arc<dyn Signer>> {
        let key = *self.keys.read().get(party_id)?;
        Some(Arc::new(DigestSigner {
            party_id: party_id.clone(),
            key,
        }))
    }

    fn verify(&self, payload: &[u8], signature: &PartySignature, party_id: &PartyId) -> bool {
        if signature.scheme != SignatureScheme::Blake3Keyed || &signature.party_id != party_id {
            return false;
        }
        let Some(key) = self.keys.read().get(party_id).copied() else {
            return false;
        };
        let expected = blake3::keyed_hash(&key, payload);
        match blake3::Hash::from_hex(&signature.signature) {
            Ok(given) => given == expected,
            Err(_) => false,
        }
    }
}

// ── Ed25519 ──────────────────────────────────────────────────────────

/// Ed25519 keys per party. Verification needs only the public half.
#[derive(Default)]
pub struct Ed25519Authority {
    signing: RwLock<HashMap<PartyId, SigningKey>>,
    verifying: RwLock<HashMap<PartyId, VerifyingKey>>,
}

struct Ed25519Signer {
    party_id: PartyId,
    key: SigningKey,
}

impl Signer for Ed25519Signer {
    fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    fn sign(&self, payload: &[u8]) -> PartySignature {
        use ed25519_dalek::Signer as _;
        let signature = self.key.sign(payload);
        PartySignature {
            party_id: self.party_id.clone(),
            scheme: SignatureScheme::Ed25519,
            signature: hex::encode(signature.to_bytes()),
        }
    }
}

impl Ed25519Authority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a key pair for `party_id` and return its public key.
    pub fn enroll(&self, party_id: &PartyId) -> VerifyingKey {
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        self.enroll_with_secret(party_id, &secret)
    }

    pub fn enroll_with_secret(&self, party_id: &PartyId, secret: &[u8; 32]) -> VerifyingKey {
        let key = SigningKey::from_bytes(secret);
        let public = key.verifying_key();
        self.signing.write().insert(party_id.clone(), key);
        self.verifying.write().insert(party_id.clone(), public);
        public
    }

    /// Register a party that signs elsewhere; only verification is possible.
    pub fn register_public_key(&self, party_id: &PartyId, key: VerifyingKey) {
        self.verifying.write().insert(party_id.clone(), key);
    }
}

impl SignatureAuthority for Ed25519Authority {
    fn signer_for(&self, party_id: &PartyId) -> Option<Arc<dyn Signer>> {
        let key = self.signing.read().get(party_id)?.clone();
        Some(Arc::new(Ed25519Signer {
            party_id: party_id.clone(),
            key,
        }))
    }

    fn verify(&self, payload: &[u8], signature: &PartySignature, party_id: &PartyId) -> bool {
        use ed25519_dalek::Verifier as _;
        if signature.scheme != SignatureScheme::Ed25519 || &signature.party_id != party_id {
            return false;
        }
        let Some(public) = self.verifying.read().get(party_id).copied() else {
            return false;
        };
        let Ok(bytes) = hex::decode(&signature.signature) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&bytes) else {
            return false;
        };
        public.verify(payload, &sig).is_ok()
    }
}
