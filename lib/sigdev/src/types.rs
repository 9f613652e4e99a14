//! Core domain types for signature devices.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cryptographic algorithm bound to a device at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "ECC")]
    Ecc,
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningAlgorithm::Rsa => write!(f, "RSA"),
            SigningAlgorithm::Ecc => write!(f, "ECC"),
        }
    }
}

/// A signing device: one keypair plus the chain state it has produced.
///
/// `signature_counter` and `last_signature` are only ever mutated inside a
/// locked signing transaction. The private key never leaves this record
/// except to be decoded on the signing path.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: Uuid,
    pub signing_algorithm: SigningAlgorithm,
    pub label: Option<String>,
    pub private_key_pem: String,
    pub public_key_pem: String,
    pub signature_counter: u64,
    pub last_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn new(
        id: Uuid,
        signing_algorithm: SigningAlgorithm,
        public_key_pem: String,
        private_key_pem: String,
        label: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            signing_algorithm,
            label,
            private_key_pem,
            public_key_pem,
            signature_counter: 0,
            last_signature: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filtering criteria for device queries.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    /// Restrict to these ids. Empty matches everything.
    pub ids: Vec<Uuid>,
    /// Maximum number of results. None means unbounded.
    pub limit: Option<usize>,
    /// Number of results to skip, for pagination.
    pub offset: usize,
}

/// Result of one signing transaction. Derived from the device mutation,
/// never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedData {
    /// Base64 signature over the submitted data.
    pub signature: String,
    /// Device counter after the increment.
    pub signature_counter: u64,
    /// Previous signature, or the base64 device id for the first signature.
    pub chain_link: String,
    /// The data that was signed.
    pub data: String,
}

/// Outcome of a sign request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    /// Empty input. Succeeds without taking the lock or touching the counter.
    NothingToSign,
    Signed(SignedData),
}
