// This is the gossip layer. It owns the broker connection, keeps one listener
// thread per topic, and reconnects a bounded number of times when the
// connection drops. Publishing is best effort: no queue, no retry beyond one
// synchronous reconnect.

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::envelope::{GossipMessage, Topic};
use crate::network::transport::{Connection, Inbox, Transport};
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;
pub const DEFAULT_MAX_CONNECTION_ATTEMPTS: u32 = 5;

/// Receives decoded messages from other nodes
pub trait MessageHandler: Send + Sync {
    fn on_chain(&self, sender: &str, chain: Vec<Block>);

    fn on_transaction(&self, sender: &str, transaction: Transaction);

    fn on_status(&self, sender: &str, status: String) {
        info!("Status from {sender}: {status}");
    }

    fn on_test(&self, sender: &str, payload: serde_json::Value) {
        debug!("Test message from {sender}: {payload}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GossipSettings {
    pub reconnect_delay: Duration,
    pub max_connection_attempts: u32,
}

impl Default for GossipSettings {
    fn default() -> Self {
        GossipSettings {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_connection_attempts: DEFAULT_MAX_CONNECTION_ATTEMPTS,
        }
    }
}

struct Session {
    state: ConnectionState,
    // Bumped on every successful connect so stale listeners can tell they are stale
    generation: u64,
    connection: Option<Arc<dyn Connection>>,
    listeners: Vec<JoinHandle<()>>,
    reconnecting: bool,
}

struct GossipInner {
    node_id: String,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn MessageHandler>,
    settings: GossipSettings,
    session: Mutex<Session>,
    attempts: AtomicU32,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

/// Handle to a node's gossip component; clones share one connection
#[derive(Clone)]
pub struct Gossip {
    inner: Arc<GossipInner>,
}

impl Gossip {
    pub fn new(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn MessageHandler>,
        settings: GossipSettings,
    ) -> Gossip {
        Gossip {
            inner: Arc::new(GossipInner {
                node_id: Uuid::new_v4().to_string(),
                transport,
                handler,
                settings,
                session: Mutex::new(Session {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    connection: None,
                    listeners: Vec::new(),
                    reconnecting: false,
                }),
                attempts: AtomicU32::new(0),
                shutdown: Mutex::new(false),
                wake: Condvar::new(),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        self.inner.node_id.as_str()
    }

    /// Connect and subscribe to every topic. On failure the bounded reconnect
    /// loop takes over in the background.
    pub fn initialize(&self) -> bool {
        if GossipInner::establish(&self.inner) {
            return true;
        }
        self.inner.schedule_reconnect();
        false
    }

    /// Reset the attempt counter and connect again; used once the reconnect cap is exhausted
    pub fn reinitialize(&self) -> bool {
        if self.inner.is_shut_down() {
            return false;
        }
        info!("Reinitializing gossip for node {}", self.inner.node_id);
        self.inner.attempts.store(0, Ordering::SeqCst);
        self.initialize()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner
            .lock_session()
            .map(|s| s.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Failed attempts since the last successful connect
    pub fn connection_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Publish on the message's topic. Returns false when the message could
    /// not be handed to the broker.
    pub fn publish(&self, message: &GossipMessage) -> bool {
        let topic = message.topic();
        let payload = match message.encode(&self.inner.node_id) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode {topic} message: {e}");
                return false;
            }
        };

        let connection = match self.inner.live_connection() {
            Some(connection) => connection,
            None => {
                if !self.inner.can_attempt() || !GossipInner::establish(&self.inner) {
                    warn!("Not connected; dropping {topic} message");
                    return false;
                }
                match self.inner.live_connection() {
                    Some(connection) => connection,
                    None => return false,
                }
            }
        };

        match connection.publish(topic.subject(), &payload) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to publish {topic} message: {e}");
                false
            }
        }
    }

    pub fn broadcast_chain(&self, chain: &[Block]) -> bool {
        self.publish(&GossipMessage::Chain(chain.to_vec()))
    }

    pub fn broadcast_transaction(&self, transaction: &Transaction) -> bool {
        self.publish(&GossipMessage::Transaction(transaction.clone()))
    }

    pub fn broadcast_status(&self, status: &str) -> bool {
        self.publish(&GossipMessage::Status(status.to_string()))
    }

    /// Unsubscribe, let listeners drain what they already received, then close
    /// the connection. No handler runs after this returns.
    pub fn close(&self) {
        {
            let mut shutdown = match self.inner.shutdown.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *shutdown = true;
            self.inner.wake.notify_all();
        }

        let (connection, listeners) = match self.inner.lock_session() {
            Ok(mut session) => {
                session.state = ConnectionState::Disconnected;
                (
                    session.connection.take(),
                    std::mem::take(&mut session.listeners),
                )
            }
            Err(e) => {
                error!("Cannot close gossip cleanly: {e}");
                return;
            }
        };

        if let Some(connection) = &connection {
            for topic in Topic::ALL {
                if let Err(e) = connection.unsubscribe(topic.subject()) {
                    warn!("Failed to unsubscribe from {topic}: {e}");
                }
            }
        }

        let current = thread::current().id();
        for listener in listeners {
            if listener.thread().id() != current && listener.join().is_err() {
                error!("Gossip listener panicked during shutdown");
            }
        }

        if let Some(connection) = connection {
            connection.close();
        }
        info!("Gossip closed for node {}", self.inner.node_id);
    }
}

impl GossipInner {
    fn lock_session(&self) -> Result<MutexGuard<'_, Session>> {
        self.session
            .lock()
            .map_err(|_| BlockchainError::Poisoned("gossip session".to_string()))
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.lock().map(|s| *s).unwrap_or(true)
    }

    fn can_attempt(&self) -> bool {
        self.attempts.load(Ordering::SeqCst) < self.settings.max_connection_attempts
    }

    fn live_connection(&self) -> Option<Arc<dyn Connection>> {
        let session = self.lock_session().ok()?;
        match &session.connection {
            Some(connection)
                if session.state == ConnectionState::Connected && connection.is_open() =>
            {
                Some(Arc::clone(connection))
            }
            _ => None,
        }
    }

    /// One connection attempt. The broker handshake runs without the session
    /// lock; the `Connecting` state marks an attempt in flight so concurrent
    /// callers back off instead of queueing behind it.
    fn establish(inner: &Arc<GossipInner>) -> bool {
        let stale = {
            let mut session = match inner.lock_session() {
                Ok(session) => session,
                Err(e) => {
                    error!("{e}");
                    return false;
                }
            };
            if inner.is_shut_down() {
                return false;
            }
            if let Some(connection) = &session.connection {
                if session.state == ConnectionState::Connected && connection.is_open() {
                    return true;
                }
            }
            if session.state == ConnectionState::Connecting {
                debug!("Gossip connection attempt already in flight");
                return false;
            }
            session.state = ConnectionState::Connecting;
            session.connection.take()
        };
        if let Some(stale) = stale {
            stale.close();
        }

        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Connecting to gossip broker (attempt {attempt}/{})",
            inner.settings.max_connection_attempts
        );
        let connected = inner.transport.connect().and_then(|connection| {
            let connection: Arc<dyn Connection> = Arc::from(connection);
            let mut inboxes = Vec::with_capacity(Topic::ALL.len());
            for topic in Topic::ALL {
                match connection.subscribe(topic.subject()) {
                    Ok(inbox) => inboxes.push((topic, inbox)),
                    Err(e) => {
                        connection.close();
                        return Err(e);
                    }
                }
            }
            Ok((connection, inboxes))
        });

        let mut session = match inner.lock_session() {
            Ok(session) => session,
            Err(e) => {
                error!("{e}");
                return false;
            }
        };
        let (connection, inboxes) = match connected {
            Ok(connected) => connected,
            Err(e) => {
                warn!("Gossip connection attempt {attempt} failed: {e}");
                if session.state == ConnectionState::Connecting {
                    session.state = ConnectionState::Disconnected;
                }
                return false;
            }
        };
        // close() may have run while the handshake was in flight
        if inner.is_shut_down() || session.state != ConnectionState::Connecting {
            drop(session);
            connection.close();
            return false;
        }

        session.generation += 1;
        let generation = session.generation;
        session.listeners.retain(|h| !h.is_finished());
        for (topic, inbox) in inboxes {
            let listener = Arc::clone(inner);
            match thread::Builder::new()
                .name(format!("gossip-{}", topic.subject().to_lowercase()))
                .spawn(move || listener.listen(topic, inbox, generation))
            {
                Ok(handle) => session.listeners.push(handle),
                Err(e) => error!("Failed to spawn {topic} listener: {e}"),
            }
        }

        session.connection = Some(connection);
        session.state = ConnectionState::Connected;
        inner.attempts.store(0, Ordering::SeqCst);
        info!(
            "Gossip connected for node {}; subscribed to {} topics",
            inner.node_id,
            Topic::ALL.len()
        );
        true
    }

    fn listen(self: Arc<Self>, topic: Topic, inbox: Inbox, generation: u64) {
        for payload in inbox.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(topic, &payload)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Dropped {topic} message: {e}"),
                Err(_) => error!("Handler panicked while processing {topic} message"),
            }
        }
        debug!("{topic} listener finished");
        self.connection_lost(generation);
    }

    fn dispatch(&self, topic: Topic, payload: &[u8]) -> Result<()> {
        let envelope = GossipMessage::decode(topic, payload)?;
        if envelope.sender == self.node_id {
            debug!("Ignoring own {topic} message");
            return Ok(());
        }

        let sender = envelope.sender.as_str();
        match envelope.data {
            GossipMessage::Chain(chain) => {
                info!("Received chain of {} blocks from {sender}", chain.len());
                self.handler.on_chain(sender, chain);
            }
            GossipMessage::Transaction(transaction) => {
                info!("Received transaction {} from {sender}", transaction.get_id());
                self.handler.on_transaction(sender, transaction);
            }
            GossipMessage::Status(status) => self.handler.on_status(sender, status),
            GossipMessage::Test(value) => self.handler.on_test(sender, value),
        }
        Ok(())
    }

    // Every listener of a dropped connection ends up here; only the first one
    // for the current generation acts on it.
    fn connection_lost(self: &Arc<Self>, generation: u64) {
        if self.is_shut_down() {
            return;
        }
        let mut session = match self.lock_session() {
            Ok(session) => session,
            Err(_) => return,
        };
        if session.generation != generation || session.state != ConnectionState::Connected {
            return;
        }
        warn!("Gossip connection lost for node {}", self.node_id);
        session.state = ConnectionState::Disconnected;
        if let Some(connection) = session.connection.take() {
            connection.close();
        }
        drop(session);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        {
            let mut session = match self.lock_session() {
                Ok(session) => session,
                Err(_) => return,
            };
            if session.reconnecting || self.is_shut_down() {
                return;
            }
            session.reconnecting = true;
        }

        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("gossip-reconnect".to_string())
            .spawn(move || inner.reconnect_loop());
        if let Err(e) = spawned {
            error!("Failed to spawn reconnect worker: {e}");
            if let Ok(mut session) = self.lock_session() {
                session.reconnecting = false;
            }
        }
    }

    fn reconnect_loop(self: Arc<Self>) {
        loop {
            {
                let mut session = match self.lock_session() {
                    Ok(session) => session,
                    Err(_) => return,
                };
                if session.state == ConnectionState::Connected || self.is_shut_down() {
                    session.reconnecting = false;
                    return;
                }
                if !self.can_attempt() {
                    error!(
                        "Gossip gave up after {} attempts; node {} stays offline until reinitialized",
                        self.settings.max_connection_attempts, self.node_id
                    );
                    session.reconnecting = false;
                    return;
                }
            }

            if self.wait_for_shutdown(self.settings.reconnect_delay) {
                if let Ok(mut session) = self.lock_session() {
                    session.reconnecting = false;
                }
                return;
            }
            GossipInner::establish(&self);
        }
    }

    /// Sleep for `delay` unless shutdown is requested first; returns true on shutdown
    fn wait_for_shutdown(&self, delay: Duration) -> bool {
        let guard = match self.shutdown.lock() {
            Ok(guard) => guard,
            Err(_) => return true,
        };
        match self.wake.wait_timeout_while(guard, delay, |shutdown| !*shutdown) {
            Ok((guard, _)) => *guard,
            Err(_) => true,
        }
    }
}
