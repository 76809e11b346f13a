//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single registered backend
//! - Track outstanding (in-flight) requests for least-outstanding selection

use serde::Serialize;

use crate::load_balancer::handle::ProxyHandle;

/// A backend registered in the load balancer.
#[derive(Debug)]
pub struct BackendTarget {
    id: String,
    handle: ProxyHandle,
    /// Requests dispatched and not yet completed. Restores that outpace
    /// selections may briefly push this below zero.
    outstanding: i64,
}

impl BackendTarget {
    /// Create a target with no requests in flight.
    pub fn new(id: String, handle: ProxyHandle) -> Self {
        Self {
            id,
            handle,
            outstanding: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> &ProxyHandle {
        &self.handle
    }

    /// Outstanding count as shown to operators, never negative.
    pub fn outstanding(&self) -> u64 {
        self.outstanding.max(0) as u64
    }

    /// Raw counter used for selection.
    pub(crate) fn load(&self) -> i64 {
        self.outstanding
    }

    /// Record a dispatch and hand out the handle.
    pub(crate) fn acquire(&mut self) -> ProxyHandle {
        self.outstanding += 1;
        self.handle.clone()
    }

    /// Record a completed request.
    pub(crate) fn release(&mut self) {
        self.outstanding -= 1;
    }

    pub fn into_handle(self) -> ProxyHandle {
        self.handle
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            id: self.id.clone(),
            outstanding: self.outstanding(),
        }
    }
}

/// Serializable view of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub id: String,
    pub outstanding: u64,
}
