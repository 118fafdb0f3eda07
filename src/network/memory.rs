//! In-process broker
//!
//! Lets several nodes inside one process gossip with each other. Taking the
//! broker offline drops every live connection, which is how outages are
//! simulated.

use crate::error::{BlockchainError, Result};
use crate::network::transport::{Connection, Inbox, Transport};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

struct BrokerState {
    online: bool,
    next_connection: u64,
    open: HashSet<u64>,
    // subject -> (connection id, sender)
    subscribers: HashMap<String, Vec<(u64, Sender<Vec<u8>>)>>,
}

#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> MemoryBroker {
        MemoryBroker {
            state: Arc::new(Mutex::new(BrokerState {
                online: true,
                next_connection: 0,
                open: HashSet::new(),
                subscribers: HashMap::new(),
            })),
        }
    }

    /// Going offline drops every open connection and its subscriptions
    pub fn set_online(&self, online: bool) {
        if let Ok(mut state) = self.lock() {
            state.online = online;
            if !online {
                state.open.clear();
                state.subscribers.clear();
            }
            info!("Memory broker is now {}", if online { "online" } else { "offline" });
        }
    }

    pub fn is_online(&self) -> bool {
        self.lock().map(|s| s.online).unwrap_or(false)
    }

    pub fn open_connections(&self) -> usize {
        self.lock().map(|s| s.open.len()).unwrap_or(0)
    }

    /// Publish a payload without going through a connection
    pub fn inject(&self, subject: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.lock()?;
        if !state.online {
            return Err(BlockchainError::Connectivity(
                "memory broker is offline".to_string(),
            ));
        }
        Self::deliver(&mut state, subject, payload);
        Ok(())
    }

    fn deliver(state: &mut BrokerState, subject: &str, payload: &[u8]) {
        if let Some(subscribers) = state.subscribers.get_mut(subject) {
            subscribers.retain(|(_, tx)| tx.send(payload.to_vec()).is_ok());
            debug!("Delivered {} bytes on {subject} to {} subscriber(s)", payload.len(), subscribers.len());
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>> {
        self.state
            .lock()
            .map_err(|_| BlockchainError::Poisoned("memory broker state".to_string()))
    }
}

impl Transport for MemoryBroker {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        let mut state = self.lock()?;
        if !state.online {
            return Err(BlockchainError::Connectivity(
                "memory broker is offline".to_string(),
            ));
        }
        state.next_connection += 1;
        let id = state.next_connection;
        state.open.insert(id);
        Ok(Box::new(MemoryConnection {
            id,
            broker: self.clone(),
        }))
    }
}

struct MemoryConnection {
    id: u64,
    broker: MemoryBroker,
}

impl MemoryConnection {
    fn open_state(&self) -> Result<MutexGuard<'_, BrokerState>> {
        let state = self.broker.lock()?;
        if !state.open.contains(&self.id) {
            return Err(BlockchainError::Connectivity(format!(
                "connection {} is closed",
                self.id
            )));
        }
        Ok(state)
    }
}

impl Connection for MemoryConnection {
    fn subscribe(&self, subject: &str) -> Result<Inbox> {
        let mut state = self.open_state()?;
        let (tx, rx) = mpsc::channel();
        state
            .subscribers
            .entry(subject.to_string())
            .or_default()
            .push((self.id, tx));
        Ok(rx)
    }

    fn unsubscribe(&self, subject: &str) -> Result<()> {
        let mut state = self.broker.lock()?;
        if let Some(subscribers) = state.subscribers.get_mut(subject) {
            subscribers.retain(|(id, _)| *id != self.id);
        }
        Ok(())
    }

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.open_state()?;
        MemoryBroker::deliver(&mut state, subject, payload);
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut state) = self.broker.lock() {
            state.open.remove(&self.id);
            for subscribers in state.subscribers.values_mut() {
                subscribers.retain(|(id, _)| *id != self.id);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.broker
            .lock()
            .map(|s| s.open.contains(&self.id))
            .unwrap_or(false)
    }
}
