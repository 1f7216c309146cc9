//! Per-device encode serialization

use super::strategy::{DeviceKey, EncodingStrategy};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Permits for every physical encoder
///
/// Each hardware device admits one encode at a time; software admits
/// `software_slots` concurrent encodes. Jobs waiting for a device queue on
/// its semaphore in arrival order.
#[derive(Debug)]
pub struct DeviceLocks {
    software: Arc<Semaphore>,
    hardware: Mutex<HashMap<DeviceKey, Arc<Semaphore>>>,
}

impl DeviceLocks {
    /// Create locks with the given number of software slots (at least one)
    pub fn new(software_slots: usize) -> Self {
        Self {
            software: Arc::new(Semaphore::new(software_slots.max(1))),
            hardware: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, key: DeviceKey) -> Arc<Semaphore> {
        if key == DeviceKey::Software {
            return self.software.clone();
        }
        // the map stays consistent across a poisoning panic
        let mut hardware = self.hardware.lock().unwrap_or_else(|e| e.into_inner());
        hardware
            .entry(key)
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Wait for the device `strategy` encodes on
    ///
    /// The permit is released when dropped.
    pub async fn acquire(&self, strategy: &EncodingStrategy) -> Result<OwnedSemaphorePermit> {
        let key = strategy.device_key();
        let semaphore = self.semaphore(key.clone());
        if semaphore.available_permits() == 0 {
            tracing::debug!(device = ?key, "waiting for encoder device");
        }
        semaphore.acquire_owned().await.map_err(|_| Error::Cancelled)
    }

    /// Permits currently free for `strategy`'s device
    pub fn available(&self, strategy: &EncodingStrategy) -> usize {
        self.semaphore(strategy.device_key()).available_permits()
    }
}
