//! NATS transport
//!
//! Wraps the blocking `nats` client. Its own reconnect logic is switched off:
//! the gossip layer owns reconnects, so a dropped connection here simply ends
//! every inbox. Each subscription is fed into its inbox by a small forwarding
//! thread.

use crate::error::{BlockchainError, Result};
use crate::network::transport::{Connection, Inbox, Transport};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";
const CONNECT_TIMEOUT: u64 = 5000;
// How often a forwarding thread looks at the open flag while idle
const FORWARD_POLL: u64 = 200;

pub struct NatsTransport {
    url: String,
    address: String,
    client_name: String,
    connect_timeout: Duration,
}

impl NatsTransport {
    /// Accepts `nats://host:port` or a bare `host:port`
    pub fn new(url: &str, client_name: &str) -> Result<NatsTransport> {
        let address = url
            .strip_prefix("nats://")
            .unwrap_or(url)
            .trim_end_matches('/');
        if address.is_empty() || !address.contains(':') {
            return Err(BlockchainError::Config(format!(
                "Invalid NATS url {url}: expected nats://host:port"
            )));
        }
        Ok(NatsTransport {
            url: format!("nats://{address}"),
            address: address.to_string(),
            client_name: client_name.to_string(),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT),
        })
    }

    /// Upper bound on the TCP connect plus server handshake
    pub fn with_connect_timeout(mut self, timeout: Duration) -> NatsTransport {
        self.connect_timeout = timeout;
        self
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    fn open_client(&self, open: Arc<AtomicBool>) -> io::Result<nats::Connection> {
        let on_disconnect = Arc::clone(&open);
        let on_close = open;
        let address = self.address.clone();
        nats::Options::new()
            .with_name(&self.client_name)
            .max_reconnects(Some(0usize))
            .disconnect_callback(move || {
                warn!("NATS connection to {address} lost");
                on_disconnect.store(false, Ordering::SeqCst);
            })
            .close_callback(move || on_close.store(false, Ordering::SeqCst))
            .connect(self.url.as_str())
    }
}

impl Transport for NatsTransport {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        let open = Arc::new(AtomicBool::new(true));

        // The handshake runs on a helper thread so a server that accepts TCP
        // but never greets cannot stall the caller past the timeout
        let (sender, receiver) = mpsc::sync_channel(1);
        let transport = NatsTransport {
            url: self.url.clone(),
            address: self.address.clone(),
            client_name: self.client_name.clone(),
            connect_timeout: self.connect_timeout,
        };
        let handshake_open = Arc::clone(&open);
        thread::Builder::new()
            .name(format!("nats-connect-{}", self.address))
            .spawn(move || {
                let client = transport.open_client(handshake_open);
                if let Err(mpsc::TrySendError::Disconnected(Ok(late))) = sender.try_send(client) {
                    debug!("Closing NATS connection that finished after the timeout");
                    late.close();
                }
            })?;

        let client = match receiver.recv_timeout(self.connect_timeout) {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                return Err(BlockchainError::Connectivity(format!("{}: {e}", self.address)))
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(BlockchainError::Connectivity(format!(
                    "{}: no handshake within {}ms",
                    self.address,
                    self.connect_timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(BlockchainError::Connectivity(format!(
                    "{}: connect worker exited",
                    self.address
                )))
            }
        };

        info!("Connected to NATS at {}", self.address);
        Ok(Box::new(NatsConnection {
            client,
            open,
            closed: AtomicBool::new(false),
            subscriptions: Mutex::new(HashMap::new()),
        }))
    }
}

struct NatsConnection {
    client: nats::Connection,
    open: Arc<AtomicBool>,
    closed: AtomicBool,
    subscriptions: Mutex<HashMap<String, Vec<nats::Subscription>>>,
}

impl NatsConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BlockchainError::Connectivity(
                "NATS connection is closed".to_string(),
            ))
        }
    }

    fn subscriptions(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<nats::Subscription>>>> {
        self.subscriptions
            .lock()
            .map_err(|_| BlockchainError::Poisoned("NATS subscriptions".to_string()))
    }
}

fn forward(feed: nats::Subscription, sender: mpsc::Sender<Vec<u8>>, open: Arc<AtomicBool>) {
    let poll = Duration::from_millis(FORWARD_POLL);
    loop {
        match feed.next_timeout(poll) {
            Ok(message) => {
                if sender.send(message.data).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                if !open.load(Ordering::SeqCst) {
                    return;
                }
            }
            // Unsubscribed or the client shut down
            Err(_) => return,
        }
    }
}

impl Connection for NatsConnection {
    fn subscribe(&self, subject: &str) -> Result<Inbox> {
        self.ensure_open()?;
        let subscription = self.client.subscribe(subject).map_err(|e| {
            BlockchainError::Connectivity(format!("NATS subscribe to {subject} failed: {e}"))
        })?;

        let (sender, inbox) = mpsc::channel();
        let feed = subscription.clone();
        let open = Arc::clone(&self.open);
        thread::Builder::new()
            .name(format!("nats-{}", subject.to_lowercase()))
            .spawn(move || forward(feed, sender, open))?;

        self.subscriptions()?
            .entry(subject.to_string())
            .or_default()
            .push(subscription);
        Ok(inbox)
    }

    fn unsubscribe(&self, subject: &str) -> Result<()> {
        let subscriptions = self.subscriptions()?.remove(subject).unwrap_or_default();
        if !self.is_open() {
            return Ok(());
        }
        for subscription in subscriptions {
            subscription.unsubscribe().map_err(|e| {
                BlockchainError::Connectivity(format!("NATS unsubscribe from {subject} failed: {e}"))
            })?;
        }
        Ok(())
    }

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.client
            .publish(subject, payload)
            .map_err(|e| BlockchainError::Connectivity(format!("NATS publish failed: {e}")))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let was_open = self.open.swap(false, Ordering::SeqCst);
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.clear();
        }
        // Drain flushes pending publishes before closing; a dead link only needs closing
        if was_open {
            if let Err(e) = self.client.drain() {
                warn!("NATS drain failed, closing: {e}");
                self.client.clone().close();
            }
        } else {
            self.client.clone().close();
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
