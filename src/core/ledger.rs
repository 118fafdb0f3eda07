//! Seams between the chain and the transaction/balance providers
//!
//! The chain only needs two questions answered about transactions: is this one
//! well-formed and signed, and what balance did its sender hold. Both are
//! traits so nodes (and tests) can swap in their own rules.

use crate::core::{Block, Transaction};
use crate::wallet::calculate_balance;

pub trait TransactionValidator: Send + Sync {
    /// Structural + signature check of a non-reward transaction
    fn valid_transaction(&self, transaction: &Transaction) -> bool;
}

pub trait BalanceCalculator: Send + Sync {
    /// Balance of `address` over `chain_prefix`
    fn calculate_balance(&self, chain_prefix: &[Block], address: &str) -> u64;
}

/// Default validator: output totals must match the input and the ECDSA signature must verify
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureValidator;

impl TransactionValidator for SignatureValidator {
    fn valid_transaction(&self, transaction: &Transaction) -> bool {
        transaction.is_valid()
    }
}

/// Default balance calculator backed by the wallet's chain walk
#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerBalance;

impl BalanceCalculator for LedgerBalance {
    fn calculate_balance(&self, chain_prefix: &[Block], address: &str) -> u64 {
        calculate_balance(chain_prefix, address)
    }
}
