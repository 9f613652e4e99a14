//! sigdev - Signature Device Library
//!
//! Domain library for managed signing devices. Each device owns a keypair and
//! a monotonically increasing signature counter; every signature incorporates
//! the previous one (or the device identity for the first), forming a
//! tamper-evident chain. All mutating operations on a device are serialized
//! through a keyed lock so the counter advances exactly once per accepted
//! request and chain links are never skipped or duplicated.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod crypto;
pub mod error;
pub mod lock;
pub mod manager;
pub mod store;
pub mod types;

pub use crypto::KeyPair;
pub use error::SigdevError;
pub use lock::{KeyedLocker, LockGuard};
pub use manager::{DeviceManager, NewDevice};
pub use store::{DeviceStore, MemoryDeviceStore};
pub use types::{Device, DeviceFilter, SignOutcome, SignedData, SigningAlgorithm};
