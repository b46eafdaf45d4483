//! Cluster secret, bootstrap token codec and labeled key derivation.
//!
//! The whole trust hierarchy hangs off one 32-byte secret: the root CA
//! key, the node-CA key, the enrollment-token AEAD key and the consensus
//! cluster token are all derived from it with domain-separated HKDF
//! expansion. Any peer holding the secret reproduces identical key
//! material, which is what makes peer join a single out-of-band string.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::AeadCore;
use chacha20poly1305::KeyInit;
use chacha20poly1305::XChaCha20Poly1305;
use chacha20poly1305::XNonce;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::CredentialError;
use crate::NodeRole;

pub const SECRET_LEN: usize = 32;

/// Derivation label for the root CA seed.
pub const LABEL_ROOT_CA: &str = "CA";
/// Derivation label for the node CA seed.
pub const LABEL_NODE_CA: &str = "node-CA";
/// Derivation label for the enrollment-token AEAD key.
pub const LABEL_REGISTRY: &str = "REGISTRY";
/// Derivation label for the consensus ensemble token.
pub const LABEL_ETCD: &str = "etcd";

/// Associated data binding enrollment tokens to the datacenter claim.
const ENROLLMENT_AAD: &[u8] = b"DC";

/// The cluster secret plus its creation instant. Creation time is part
/// of the shared state because certificate NotBefore is pinned to it.
#[derive(Clone)]
pub struct ClusterSecret {
    secret: [u8; SECRET_LEN],
    created_at: SystemTime,
}

impl ClusterSecret {
    /// Generates a fresh secret; only the bootstrap peer does this.
    pub fn generate() -> Self {
        let mut secret = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        Self {
            secret,
            created_at: SystemTime::now(),
        }
    }

    /// Decodes the shareable `"{unix_millis}::{base64(secret)}"` form.
    pub fn decode(token: &str) -> Result<Self, CredentialError> {
        let (millis, raw) = token
            .trim()
            .split_once("::")
            .ok_or(CredentialError::MalformedToken)?;

        let millis: u64 = millis.parse().map_err(|_| CredentialError::MalformedToken)?;
        let decoded = BASE64
            .decode(raw)
            .map_err(|_| CredentialError::MalformedToken)?;
        let secret: [u8; SECRET_LEN] = decoded
            .try_into()
            .map_err(|_| CredentialError::MalformedToken)?;

        Ok(Self {
            secret,
            created_at: UNIX_EPOCH + Duration::from_millis(millis),
        })
    }

    /// The shareable bootstrap token handed to joining peers.
    pub fn encode(&self) -> String {
        let millis = self
            .created_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("{}::{}", millis, BASE64.encode(self.secret))
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Domain-separated expansion of the secret. Deterministic: every
    /// peer holding the secret derives the same bytes for a label.
    pub fn derive(&self, label: &str, len: usize) -> Vec<u8> {
        let hk = Hkdf::<Sha256>::from_prk(&self.secret)
            .expect("cluster secret is a valid HKDF pseudorandom key");
        let mut out = vec![0u8; len];
        hk.expand(label.as_bytes(), &mut out)
            .expect("derivation length fits HKDF output bound");
        out
    }

    /// Names the consensus ensemble so peers from different clusters
    /// refuse to form a quorum together.
    pub fn cluster_token(&self) -> String {
        BASE64.encode(self.derive(LABEL_ETCD, 32))
    }

    /// Seals an enrollment token for a freshly added node.
    pub fn seal_enrollment(&self, claims: &EnrollmentClaims) -> Result<String, CredentialError> {
        let key = self.derive(LABEL_REGISTRY, 32);
        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .expect("derived key has the AEAD key length");

        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let plaintext =
            serde_json::to_vec(claims).map_err(|e| CredentialError::Mint(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(
                &nonce,
                chacha20poly1305::aead::Payload {
                    msg: &plaintext,
                    aad: ENROLLMENT_AAD,
                },
            )
            .map_err(|_| CredentialError::Mint("enrollment token seal failed".into()))?;

        let mut framed = nonce.to_vec();
        framed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(framed))
    }

    /// Opens an enrollment token sealed by any peer of this cluster.
    pub fn open_enrollment(&self, token: &str) -> Result<EnrollmentClaims, CredentialError> {
        let framed = BASE64
            .decode(token.trim())
            .map_err(|_| CredentialError::TokenRejected)?;
        if framed.len() < 24 {
            return Err(CredentialError::TokenRejected);
        }
        let (nonce, ciphertext) = framed.split_at(24);

        let key = self.derive(LABEL_REGISTRY, 32);
        let cipher = XChaCha20Poly1305::new_from_slice(&key)
            .expect("derived key has the AEAD key length");
        let plaintext = cipher
            .decrypt(
                XNonce::from_slice(nonce),
                chacha20poly1305::aead::Payload {
                    msg: ciphertext,
                    aad: ENROLLMENT_AAD,
                },
            )
            .map_err(|_| CredentialError::TokenRejected)?;

        serde_json::from_slice(&plaintext).map_err(|_| CredentialError::TokenRejected)
    }
}

impl std::fmt::Debug for ClusterSecret {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        // The secret itself must never reach a log line.
        f.debug_struct("ClusterSecret")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Claims sealed into an enrollment token by `AddNode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentClaims {
    pub name: String,
    pub datacenter: String,
    pub location: String,
    pub role: NodeRole,
}
