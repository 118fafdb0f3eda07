// Transactions follow an account-style model: the input records the sender's
// full balance at signing time and the output map splits it between recipients
// and the sender's own change entry.

use crate::core::monetary::{rewards, MINING_REWARD, REWARD_INPUT_ADDRESS};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, ecdsa_p256_sha256_sign_verify, to_json_string};
use crate::wallet::Wallet;
use data_encoding::HEXLOWER;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// The input side of a transaction: who signed it and what balance they held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    amount: u64,
    address: String,
    #[serde(default)]
    signature: String,
}

impl TransactionInput {
    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn get_signature(&self) -> &str {
        self.signature.as_str()
    }
}

// Address -> amount. A BTreeMap keeps the JSON encoding (and so every hash and
// signature over it) independent of insertion order.
pub type OutputMap = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    id: String,
    output_map: OutputMap,
    input: TransactionInput,
}

impl Transaction {
    // When I want to send `amount` from the wallet whose current balance is `balance`
    pub fn new(sender: &Wallet, recipient: &str, amount: u64, balance: u64) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Transaction amount must be positive".to_string(),
            ));
        }
        if amount > balance {
            return Err(BlockchainError::Transaction(
                "Amount exceeds balance".to_string(),
            ));
        }

        let mut output_map = OutputMap::new();
        output_map.insert(recipient.to_string(), amount);
        // Sending to yourself collapses into a single entry holding the full balance
        *output_map.entry(sender.get_address().to_string()).or_insert(0) += balance - amount;

        let input = Self::sign_input(sender, balance, &output_map)?;
        Ok(Transaction {
            id: Uuid::new_v4().to_string(),
            output_map,
            input,
        })
    }

    // When I want to pay another recipient out of a transaction still sitting in the pool
    pub fn update(&mut self, sender: &Wallet, recipient: &str, amount: u64) -> Result<()> {
        let sender_address = sender.get_address();
        if self.input.address != sender_address {
            return Err(BlockchainError::Transaction(
                "Only the original sender can update a transaction".to_string(),
            ));
        }

        let remaining = self.output_map.get(sender_address).copied().unwrap_or(0);
        if amount == 0 || amount > remaining {
            return Err(BlockchainError::Transaction(
                "Amount exceeds balance".to_string(),
            ));
        }

        let credited = self
            .output_map
            .get(recipient)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(|| {
                BlockchainError::Transaction(format!("Output for {recipient} overflows"))
            })?;
        self.output_map.insert(recipient.to_string(), credited);
        if let Some(change) = self.output_map.get_mut(sender_address) {
            *change -= amount;
        }

        self.input = Self::sign_input(sender, self.input.amount, &self.output_map)?;
        Ok(())
    }

    // The reward a miner pays itself in the block it mines
    pub fn reward(miner_address: &str) -> Transaction {
        let mut output_map = OutputMap::new();
        output_map.insert(miner_address.to_string(), MINING_REWARD);
        Transaction {
            id: Uuid::new_v4().to_string(),
            output_map,
            input: TransactionInput {
                timestamp: 0,
                amount: 0,
                address: REWARD_INPUT_ADDRESS.to_string(),
                signature: String::new(),
            },
        }
    }

    // Fixed placeholder entries carried by the genesis block
    pub(crate) fn seed(id: &str, label: &str) -> Transaction {
        let mut output_map = OutputMap::new();
        output_map.insert(label.to_string(), 0);
        Transaction {
            id: id.to_string(),
            output_map,
            input: TransactionInput {
                timestamp: 0,
                amount: 0,
                address: label.to_string(),
                signature: String::new(),
            },
        }
    }

    /// Structural and signature check for a non-reward transaction
    pub fn is_valid(&self) -> bool {
        match self.output_total() {
            Some(total) if total == self.input.amount => {}
            Some(total) => {
                warn!(
                    "Invalid transaction {} from {}: outputs total {} but input is {}",
                    self.id, self.input.address, total, self.input.amount
                );
                return false;
            }
            None => {
                warn!(
                    "Invalid transaction {} from {}: outputs overflow",
                    self.id, self.input.address
                );
                return false;
            }
        }

        if !self.verify_signature() {
            warn!(
                "Invalid signature on transaction {} from {}",
                self.id, self.input.address
            );
            return false;
        }

        true
    }

    pub fn is_reward(&self) -> bool {
        rewards::is_reward_address(&self.input.address)
    }

    pub fn get_id(&self) -> &str {
        self.id.as_str()
    }

    pub fn get_input(&self) -> &TransactionInput {
        &self.input
    }

    pub fn get_output_map(&self) -> &OutputMap {
        &self.output_map
    }

    pub fn output_for(&self, address: &str) -> Option<u64> {
        self.output_map.get(address).copied()
    }

    /// Sum of every output, or `None` if it does not fit in a `u64`
    pub fn output_total(&self) -> Option<u64> {
        self.output_map
            .values()
            .try_fold(0u64, |total, amount| total.checked_add(*amount))
    }

    /// Leaf input for the block's Merkle tree
    pub fn fingerprint(&self) -> Result<String> {
        Ok(format!(
            "{}{}{}",
            self.id,
            to_json_string(&self.output_map)?,
            to_json_string(&self.input)?
        ))
    }

    fn sign_input(sender: &Wallet, amount: u64, output_map: &OutputMap) -> Result<TransactionInput> {
        let message = to_json_string(output_map)?;
        let signature = sender.sign(message.as_bytes())?;
        Ok(TransactionInput {
            timestamp: current_timestamp()?,
            amount,
            address: sender.get_address().to_string(),
            signature: HEXLOWER.encode(&signature),
        })
    }

    fn verify_signature(&self) -> bool {
        let public_key = match HEXLOWER.decode(self.input.address.as_bytes()) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = match HEXLOWER.decode(self.input.signature.as_bytes()) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let message = match to_json_string(&self.output_map) {
            Ok(message) => message,
            Err(_) => return false,
        };
        ecdsa_p256_sha256_sign_verify(&public_key, &signature, message.as_bytes())
    }
}
