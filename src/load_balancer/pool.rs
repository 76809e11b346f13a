//! Backend pool management.
//!
//! # Responsibilities
//! - Own the registry of active backends, keyed by identifier
//! - Select the least loaded backend and count it as in flight
//! - Hand backends over to quarantine (`sub`) and take them back (`append`)

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PoolError, PoolResult};
use crate::load_balancer::{
    backend::{BackendStatus, BackendTarget},
    handle::{build_client, HttpClient, ProxyHandle},
    least_conn::select_least_outstanding,
};
use crate::sync::Exclusive;

/// The live pool of backends eligible for dispatch.
///
/// Every operation is linearized by the pool's lock.
#[derive(Debug)]
pub struct LoadBalancer {
    registry: Exclusive<HashMap<String, BackendTarget>>,
    client: HttpClient,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::with_client(build_client())
    }

    /// Create a pool whose handles all share `client`.
    pub fn with_client(client: HttpClient) -> Self {
        Self {
            registry: Exclusive::new(HashMap::new()),
            client,
        }
    }

    /// Register a new backend built from its address.
    pub fn add(&self, id: &str) -> PoolResult<()> {
        let handle = ProxyHandle::new(id, self.client.clone())?;

        let mut registry = self.registry.lock();
        if registry.contains_key(id) {
            return Err(PoolError::AlreadyExists(id.to_string()));
        }
        registry.insert(id.to_string(), BackendTarget::new(id.to_string(), handle));
        drop(registry);

        tracing::info!(backend = %id, "Backend added to pool");
        Ok(())
    }

    /// Select the least loaded backend and count the request against it.
    pub fn get(&self) -> PoolResult<(String, ProxyHandle)> {
        self.registry.with(|registry| {
            let target = select_least_outstanding(registry.values_mut()).ok_or(PoolError::EmptyPool)?;
            let handle = target.acquire();
            Ok((target.id().to_string(), handle))
        })
    }

    /// Mark one in-flight request to `id` as complete.
    pub fn restore(&self, id: &str) -> PoolResult<()> {
        self.registry.with(|registry| match registry.get_mut(id) {
            Some(target) => {
                target.release();
                Ok(())
            }
            None => Err(PoolError::NotFound(id.to_string())),
        })
    }

    /// Remove `id` from the pool, returning its handle.
    pub fn sub(&self, id: &str) -> PoolResult<ProxyHandle> {
        let removed = self.registry.with(|registry| registry.remove(id));
        match removed {
            Some(target) => {
                tracing::info!(backend = %id, "Backend removed from pool");
                Ok(target.into_handle())
            }
            None => Err(PoolError::NotFound(id.to_string())),
        }
    }

    /// Reinsert a backend returning from quarantine with a fresh counter.
    pub fn append(&self, id: String, handle: ProxyHandle) -> PoolResult<()> {
        self.registry.with(|registry| {
            if registry.contains_key(&id) {
                return Err(PoolError::AlreadyExists(id));
            }
            registry.insert(id.clone(), BackendTarget::new(id, handle));
            Ok(())
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.with(|registry| registry.contains_key(id))
    }

    pub fn len(&self) -> usize {
        self.registry.with(|registry| registry.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status of every registered backend, sorted by identifier.
    pub fn snapshot(&self) -> Vec<BackendStatus> {
        let mut statuses: Vec<_> =
            self.registry.with(|registry| registry.values().map(BackendTarget::status).collect());
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Outstanding count for `id`, if registered.
    pub fn outstanding(&self, id: &str) -> Option<u64> {
        self.registry.with(|registry| registry.get(id).map(BackendTarget::outstanding))
    }
}

/// One request counted against a backend.
///
/// Dropping the guard marks the request complete, so a handler that is
/// cancelled midway (timeout, client gone) still gives the count back.
/// A backend being evicted must `disarm` first; its counter leaves with it.
#[derive(Debug)]
pub struct InFlight {
    balancer: Arc<LoadBalancer>,
    id: String,
    armed: bool,
}

impl InFlight {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.balancer.restore(&self.id) {
            tracing::debug!(backend = %self.id, error = %e, "Backend left the pool before restore");
        }
    }
}

impl LoadBalancer {
    /// `get`, with the count released when the returned guard drops.
    pub fn checkout(self: &Arc<Self>) -> PoolResult<(InFlight, ProxyHandle)> {
        let (id, handle) = self.get()?;
        let guard = InFlight {
            balancer: self.clone(),
            id,
            armed: true,
        };
        Ok((guard, handle))
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}
