use crate::error::Result;
use std::sync::mpsc::Receiver;

/// Raw payloads delivered for one subscribed subject.
///
/// The stream ends (`recv` fails) once the subject is unsubscribed or the
/// connection is lost, after any already-buffered payloads have been read.
pub type Inbox = Receiver<Vec<u8>>;

/// Something that can open connections to a publish/subscribe broker
pub trait Transport: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>>;
}

pub trait Connection: Send + Sync {
    fn subscribe(&self, subject: &str) -> Result<Inbox>;
    fn unsubscribe(&self, subject: &str) -> Result<()>;
    fn publish(&self, subject: &str, payload: &[u8]) -> Result<()>;
    fn close(&self);
    fn is_open(&self) -> bool;
}
