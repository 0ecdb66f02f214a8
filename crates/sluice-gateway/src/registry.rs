//! Registry of live connections with a hard capacity.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What the gateway knows about a connected client
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub id: String,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(id: impl Into<String>, peer: SocketAddr) -> Self {
        Self {
            id: id.into(),
            peer,
            connected_at: Utc::now(),
        }
    }
}

/// Tracks connected clients. Slots are reserved atomically so concurrent
/// upgrades can never push the count past `max_connections`.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionInfo>,
    reserved: AtomicUsize,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            reserved: AtomicUsize::new(0),
            max_connections,
        }
    }

    /// Register a connection; returns `false` when the registry is full
    pub fn try_register(&self, info: ConnectionInfo) -> bool {
        let max = self.max_connections;
        let reserved = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok();
        if reserved {
            self.connections.insert(info.id.clone(), info);
        }
        reserved
    }

    pub fn remove(&self, id: &str) -> Option<ConnectionInfo> {
        let removed = self.connections.remove(id).map(|(_, info)| info);
        if removed.is_some() {
            self.reserved.fetch_sub(1, Ordering::SeqCst);
        }
        removed
    }

    pub fn list(&self) -> Vec<ConnectionInfo> {
        self.connections.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_connections
    }

    pub fn capacity(&self) -> usize {
        self.max_connections
    }
}
