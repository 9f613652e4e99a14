//! Device manager: the signing-transaction coordinator.
//!
//! `sign` and `delete` are the only operations that need lock coordination;
//! create, get and list pass straight through to the store. A signing
//! transaction holds the device's lock across the whole read-modify-write so
//! the counter advances exactly once per accepted request and chain links are
//! never skipped, duplicated or reordered.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::crypto::KeyPair;
use crate::error::SigdevError;
use crate::lock::KeyedLocker;
use crate::store::DeviceStore;
use crate::types::{Device, DeviceFilter, SignOutcome, SignedData, SigningAlgorithm};

/// Parameters for device creation.
#[derive(Debug, Clone)]
pub struct NewDevice {
    /// Caller-supplied id; a random one is assigned when absent.
    pub id: Option<Uuid>,
    pub signing_algorithm: SigningAlgorithm,
    pub label: Option<String>,
}

pub struct DeviceManager<S> {
    store: S,
    locker: KeyedLocker<Uuid>,
}

impl<S: DeviceStore> DeviceManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locker: KeyedLocker::new(),
        }
    }

    /// Builds a manager sharing an externally owned locker. Useful when the
    /// caller needs to coordinate additional operations on the same key space.
    pub fn with_locker(store: S, locker: KeyedLocker<Uuid>) -> Self {
        Self { store, locker }
    }

    /// Creates a device with a freshly generated keypair. Duplicate ids are
    /// rejected by the store's create, which checks atomically under its own
    /// write lock; a separate pre-check here would only race it.
    pub async fn create(&self, new: NewDevice) -> Result<Device, SigdevError> {
        let id = new.id.unwrap_or_else(Uuid::new_v4);

        let keypair = KeyPair::generate(new.signing_algorithm).inspect_err(|e| {
            tracing::error!("key pair generation failed: {}", e);
        })?;
        let (public_key_pem, private_key_pem) = keypair.to_pem()?;

        let device = Device::new(
            id,
            new.signing_algorithm,
            public_key_pem,
            private_key_pem,
            new.label,
        );

        self.store.create(device).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Device, SigdevError> {
        self.store.get(id).await
    }

    pub async fn list(&self, filter: DeviceFilter) -> Result<Vec<Device>, SigdevError> {
        self.store.list(filter).await
    }

    pub async fn count(&self, filter: DeviceFilter) -> Result<u64, SigdevError> {
        self.store.count(filter).await
    }

    /// Executes one signing transaction.
    ///
    /// Empty data succeeds trivially without taking the lock or touching any
    /// state. Otherwise the device's lock is acquired and held across
    /// read, chain-link computation, signing and the counter update, then
    /// released on every exit path when the guard drops. Cancellation is only
    /// observed while waiting for the lock; once granted, the transaction
    /// runs to completion.
    pub async fn sign(
        &self,
        device_id: Uuid,
        data: &str,
        cancel: &CancellationToken,
    ) -> Result<SignOutcome, SigdevError> {
        if data.is_empty() {
            return Ok(SignOutcome::NothingToSign);
        }

        let _held = self.locker.acquire(device_id, cancel).await?;

        let mut device = self.store.get(device_id).await?;

        let keypair =
            KeyPair::from_private_pem(device.signing_algorithm, &device.private_key_pem)
                .inspect_err(|e| {
                    tracing::error!(device_id = %device_id, "private key decode failed: {}", e);
                })?;

        let chain_link = match device.last_signature.clone() {
            Some(last) => last,
            None => encode_device_id(device_id),
        };

        let signature = keypair.sign(data.as_bytes()).inspect_err(|e| {
            tracing::error!(device_id = %device_id, "signing failed: {}", e);
        })?;

        device.signature_counter += 1;
        device.last_signature = Some(signature.clone());
        let signature_counter = device.signature_counter;

        // The computed signature must not be reported on a failed write; the
        // persisted device is unchanged and a retry starts from clean state.
        self.store.update(device).await.inspect_err(|e| {
            tracing::error!(device_id = %device_id, "device update failed: {}", e);
        })?;

        Ok(SignOutcome::Signed(SignedData {
            signature,
            signature_counter,
            chain_link,
            data: data.to_string(),
        }))
    }

    /// Deletes a device under the same lock key space as `sign`, so a delete
    /// never removes the device in the middle of another transaction's
    /// read-modify-write. Deleting an absent device is a success.
    pub async fn delete(
        &self,
        device_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), SigdevError> {
        let _held = self.locker.acquire(device_id, cancel).await?;
        self.store.delete(device_id).await
    }
}

/// Deterministic encoding of the device identity, used as the chain link for
/// a device's first signature: base64 over the 16 raw UUID bytes.
pub fn encode_device_id(device_id: Uuid) -> String {
    STANDARD.encode(device_id.as_bytes())
}
