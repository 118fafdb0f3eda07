//! Wire format for gossip messages
//!
//! Every message is a UTF-8 JSON envelope `{sender, data, timestamp}`. The
//! shape of `data` depends on the topic it travels on, so decoding is keyed by
//! topic rather than by inspecting the payload.

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Test,
    Chain,
    Transaction,
    Status,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Test, Topic::Chain, Topic::Transaction, Topic::Status];

    /// Subject name used on the broker
    pub fn subject(&self) -> &'static str {
        match self {
            Topic::Test => "TEST",
            Topic::Chain => "BLOCKCHAIN",
            Topic::Transaction => "TRANSACTION",
            Topic::Status => "STATUS",
        }
    }

    pub fn from_subject(subject: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.subject() == subject)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subject())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub sender: String,
    pub data: T,
    pub timestamp: u64,
}

/// Payload carried by an envelope, tagged by the topic it was received on
#[derive(Debug, Clone, PartialEq)]
pub enum GossipMessage {
    Chain(Vec<Block>),
    Transaction(Transaction),
    Status(String),
    Test(serde_json::Value),
}

impl GossipMessage {
    pub fn topic(&self) -> Topic {
        match self {
            GossipMessage::Chain(_) => Topic::Chain,
            GossipMessage::Transaction(_) => Topic::Transaction,
            GossipMessage::Status(_) => Topic::Status,
            GossipMessage::Test(_) => Topic::Test,
        }
    }

    pub fn encode(&self, sender: &str) -> Result<Vec<u8>> {
        match self {
            GossipMessage::Chain(chain) => seal(sender, chain),
            GossipMessage::Transaction(tx) => seal(sender, tx),
            GossipMessage::Status(status) => seal(sender, status),
            GossipMessage::Test(value) => seal(sender, value),
        }
    }

    pub fn decode(topic: Topic, payload: &[u8]) -> Result<Envelope<GossipMessage>> {
        let raw: Envelope<serde_json::Value> = deserialize(payload)?;
        let data = match topic {
            Topic::Chain => GossipMessage::Chain(serde_json::from_value(raw.data)?),
            Topic::Transaction => GossipMessage::Transaction(serde_json::from_value(raw.data)?),
            Topic::Status => match raw.data {
                serde_json::Value::String(status) => GossipMessage::Status(status),
                other => {
                    return Err(BlockchainError::Serialization(format!(
                        "STATUS payload must be a string, got {other}"
                    )))
                }
            },
            Topic::Test => GossipMessage::Test(raw.data),
        };
        Ok(Envelope {
            sender: raw.sender,
            data,
            timestamp: raw.timestamp,
        })
    }
}

fn seal<T: Serialize>(sender: &str, data: &T) -> Result<Vec<u8>> {
    let envelope = Envelope {
        sender: sender.to_string(),
        data,
        timestamp: current_timestamp()?,
    };
    serialize(&envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        assert_eq!(Topic::Chain.subject(), "BLOCKCHAIN");
        assert_eq!(Topic::from_subject("TRANSACTION"), Some(Topic::Transaction));
        assert_eq!(Topic::from_subject("nope"), None);
    }

    #[test]
    fn test_chain_envelope_wire_shape() {
        let message = GossipMessage::Chain(vec![Block::genesis()]);
        let bytes = message.encode("node-a").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["sender"], "node-a");
        assert!(json["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(json["data"][0]["lastHash"], "-----");

        let decoded = GossipMessage::decode(Topic::Chain, &bytes).unwrap();
        assert_eq!(decoded.sender, "node-a");
        assert_eq!(decoded.data, message);
    }

    #[test]
    fn test_payload_decoded_per_topic() {
        let bytes = GossipMessage::Status("syncing".to_string())
            .encode("n")
            .unwrap();
        assert!(GossipMessage::decode(Topic::Chain, &bytes).is_err());
        assert!(GossipMessage::decode(Topic::Transaction, &bytes).is_err());
        assert!(matches!(
            GossipMessage::decode(Topic::Status, &bytes).unwrap().data,
            GossipMessage::Status(s) if s == "syncing"
        ));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(
            GossipMessage::decode(Topic::Test, b"{not json"),
            Err(BlockchainError::Serialization(_))
        ));
    }
}
