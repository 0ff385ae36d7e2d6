//! Pseudo-TCP carrier session state
//!
//! Per-client sequence/acknowledgement bookkeeping for the carrier
//! connection. The carrier is never handed to a real TCP stack: no window
//! tracking, no retransmission, no FIN/RST handling.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Counters for one carrier session
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionState {
    /// Next sequence number the server will use on an emitted carrier segment
    pub seq: u32,
    /// Next sequence number the server expects from the client
    pub ack: u32,
}

/// One carrier session, keyed by the client endpoint.
///
/// The async mutex serializes emission per client: it is held from reading
/// the counters through the frame write and the counter advance, so carrier
/// segments leave in seq order.
#[derive(Debug, Default)]
pub struct Session {
    state: tokio::sync::Mutex<SessionState>,
}

impl Session {
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, SessionState> {
        self.state.lock().await
    }
}

/// All carrier sessions, keyed by client `ip:port`
#[derive(Debug, Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<SocketAddr, Arc<Session>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session for a client, creating a zeroed one on first sight
    pub fn session(&self, client: SocketAddr) -> Arc<Session> {
        let mut map = self.inner.lock().unwrap();
        map.entry(client).or_default().clone()
    }

    /// Current counters for a client, if a session exists
    pub async fn snapshot(&self, client: &SocketAddr) -> Option<SessionState> {
        let session = {
            let map = self.inner.lock().unwrap();
            map.get(client).cloned()
        }?;
        let state = session.lock().await;
        Some(*state)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
