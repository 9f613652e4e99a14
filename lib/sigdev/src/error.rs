//! Signature Device Error Types

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SigdevError {
    #[error("Device not found: {0}")]
    NotFound(Uuid),

    #[error("Device already exists: {0}")]
    DeviceExists(Uuid),

    #[error("Lock acquisition cancelled")]
    Cancelled,

    #[error("Key decode failed: {0}")]
    KeyDecode(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Signature verification failed: {0}")]
    Verification(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
