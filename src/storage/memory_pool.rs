use crate::core::{Block, Transaction, TransactionValidator};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// ( K -> transaction id, V => Transaction )
///
/// Pending transactions waiting to be mined. Entries are replaced wholesale
/// when a sender updates an existing transaction.
pub struct TransactionPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionPool {
    pub fn new() -> TransactionPool {
        TransactionPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace by id
    pub fn set_transaction(&self, tx: Transaction) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.insert(tx.get_id().to_string(), tx);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on transaction pool");
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.get(id).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on transaction pool");
                None
            }
        }
    }

    /// The pending transaction already signed by `input_address`, if any
    pub fn existing_transaction(&self, input_address: &str) -> Option<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool
                .values()
                .find(|tx| tx.get_input().get_address() == input_address)
                .cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on transaction pool");
                None
            }
        }
    }

    /// Non-reward transactions accepted by `validator`, oldest signature first
    pub fn valid_transactions(&self, validator: &dyn TransactionValidator) -> Vec<Transaction> {
        let mut valid: Vec<Transaction> = match self.inner.read() {
            Ok(pool) => pool
                .values()
                .filter(|tx| !tx.is_reward() && validator.valid_transaction(tx))
                .cloned()
                .collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on transaction pool");
                return Vec::new();
            }
        };
        valid.sort_by(|a, b| {
            a.get_input()
                .get_timestamp()
                .cmp(&b.get_input().get_timestamp())
                .then_with(|| a.get_id().cmp(b.get_id()))
        });
        valid
    }

    /// Drop every pending transaction that `chain` already contains
    pub fn clear_blockchain_transactions(&self, chain: &[Block]) {
        let committed: HashSet<&str> = chain
            .iter()
            .skip(1)
            .flat_map(|block| block.get_data().iter().map(Transaction::get_id))
            .collect();

        match self.inner.write() {
            Ok(mut pool) => {
                let before = pool.len();
                pool.retain(|id, _| !committed.contains(id.as_str()));
                if before != pool.len() {
                    log::info!(
                        "Pruned {} committed transaction(s) from the pool",
                        before - pool.len()
                    );
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on transaction pool");
            }
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.clear();
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on transaction pool");
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on transaction pool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.is_empty(),
            Err(_) => {
                log::error!("Failed to acquire read lock on transaction pool");
                true // Conservative default
            }
        }
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.values().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on transaction pool");
                Vec::new()
            }
        }
    }
}
