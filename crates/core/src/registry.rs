//! Backend endpoint registry.
//!
//! Owns every configured endpoint, its availability flag, and the list of
//! endpoints waiting for health-check recovery. Round-robin selection is driven
//! by an atomic cursor; the recovery list sits behind a mutex so dispatch
//! workers and the health monitor can mutate it concurrently.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

const LOG_TARGET: &str = "balancer::registry";

#[derive(Debug)]
pub struct Endpoint {
    address: String,
    available: AtomicBool,
    evicted: AtomicBool,
    health_failures: AtomicU32,
}

impl Endpoint {
    fn new(address: String) -> Self {
        Self {
            address,
            available: AtomicBool::new(true),
            evicted: AtomicBool::new(false),
            health_failures: AtomicU32::new(0),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Evicted endpoints stay unavailable and are no longer probed.
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    pub fn health_failures(&self) -> u32 {
        self.health_failures.load(Ordering::Acquire)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry needs at least one endpoint")]
    Empty,
    #[error("no endpoint is currently available")]
    NoneAvailable,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct EndpointStatus {
    pub address: String,
    pub available: bool,
    pub evicted: bool,
    pub health_failures: u32,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub endpoints: Vec<EndpointStatus>,
    /// Addresses pending recovery, in the order they were marked.
    pub unavailable: Vec<String>,
}

#[derive(Debug)]
pub struct Registry {
    endpoints: Vec<Arc<Endpoint>>,
    unavailable: Mutex<Vec<Arc<Endpoint>>>,
    cursor: AtomicUsize,
}

impl Registry {
    pub fn new<I, S>(addresses: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<Arc<Endpoint>> = addresses
            .into_iter()
            .map(|a| Arc::new(Endpoint::new(a.into())))
            .collect();
        if endpoints.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self {
            endpoints,
            unavailable: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn get(&self, address: &str) -> Option<Arc<Endpoint>> {
        self.endpoints
            .iter()
            .find(|e| e.address == address)
            .cloned()
    }

    pub fn available_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_available()).count()
    }

    /// Next available endpoint in round-robin order.
    ///
    /// Each call claims one cursor step and scans a full lap from there, so
    /// concurrent callers cannot push each other past the available entries.
    /// A lap with no available candidate gives up with
    /// [`RegistryError::NoneAvailable`] rather than spinning.
    pub fn select_available(&self) -> Result<Arc<Endpoint>, RegistryError> {
        let len = self.endpoints.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..len {
            let candidate = &self.endpoints[start.wrapping_add(offset) % len];
            if candidate.is_available() {
                return Ok(Arc::clone(candidate));
            }
        }
        Err(RegistryError::NoneAvailable)
    }

    /// Returns `true` when this call flipped the endpoint to unavailable.
    pub fn mark_unavailable(&self, endpoint: &Arc<Endpoint>) -> bool {
        let mut unavailable = self.unavailable.lock();
        if endpoint.is_evicted() || !endpoint.available.swap(false, Ordering::AcqRel) {
            return false;
        }
        unavailable.push(Arc::clone(endpoint));
        tracing::debug!(target: LOG_TARGET, endpoint = %endpoint.address, "endpoint marked unavailable");
        true
    }

    /// Restores availability, resets the failure counter and drops the
    /// endpoint from the recovery list.
    pub fn mark_available(&self, endpoint: &Arc<Endpoint>) {
        let mut unavailable = self.unavailable.lock();
        unavailable.retain(|e| !Arc::ptr_eq(e, endpoint));
        endpoint.health_failures.store(0, Ordering::Release);
        endpoint.evicted.store(false, Ordering::Release);
        endpoint.available.store(true, Ordering::Release);
    }

    /// Counts one failed health probe and returns the new consecutive total.
    pub fn record_probe_failure(&self, endpoint: &Arc<Endpoint>) -> u32 {
        endpoint.health_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops the endpoint from the recovery list for good. It stays unavailable.
    pub fn evict(&self, endpoint: &Arc<Endpoint>) {
        let mut unavailable = self.unavailable.lock();
        unavailable.retain(|e| !Arc::ptr_eq(e, endpoint));
        endpoint.available.store(false, Ordering::Release);
        endpoint.evicted.store(true, Ordering::Release);
    }

    /// Copy of the recovery list, taken under the lock.
    pub fn unavailable(&self) -> Vec<Arc<Endpoint>> {
        self.unavailable.lock().clone()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let unavailable = self.unavailable.lock();
        RegistrySnapshot {
            endpoints: self
                .endpoints
                .iter()
                .map(|e| EndpointStatus {
                    address: e.address.clone(),
                    available: e.is_available(),
                    evicted: e.is_evicted(),
                    health_failures: e.health_failures(),
                })
                .collect(),
            unavailable: unavailable.iter().map(|e| e.address.clone()).collect(),
        }
    }
}
