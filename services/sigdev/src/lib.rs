//! Signature Device Service
//!
//! HTTP API over the sigdev library: device lifecycle plus the lock-coordinated
//! signing transaction. Devices hold a keypair and a tamper-evident signature
//! chain; concurrent sign requests against one device are serialized.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod handlers;
pub mod server;

pub use server::{create_router, run};
