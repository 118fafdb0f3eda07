use crate::core::monetary::STARTING_BALANCE;
use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};

/// An ECDSA P-256 key pair whose address is the hex-encoded public key
#[derive(Clone)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
    address: String,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        let address = HEXLOWER.encode(public_key.as_slice());
        Ok(Wallet {
            pkcs8,
            public_key,
            address,
        })
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        crate::utils::ecdsa_p256_sha256_sign_digest(&self.pkcs8, message)
    }

    pub fn balance(&self, chain: &[Block]) -> u64 {
        calculate_balance(chain, &self.address)
    }

    /// Build a signed transaction spending from this wallet's balance on `chain`
    pub fn create_transaction(
        &self,
        recipient: &str,
        amount: u64,
        chain: &[Block],
    ) -> Result<Transaction> {
        let balance = self.balance(chain);
        Transaction::new(self, recipient, amount, balance)
    }
}

/// Balance of `address` as recorded by `chain`.
///
/// Walks blocks newest-first (genesis excluded), summing every output credited
/// to the address. The walk stops after the first block in which the address
/// signed a transaction: that transaction's change output already reflects
/// everything older, so the starting balance is only added when no such block
/// exists.
pub fn calculate_balance(chain: &[Block], address: &str) -> u64 {
    let mut has_conducted_transaction = false;
    let mut outputs_total: u64 = 0;

    for block in chain.iter().skip(1).rev() {
        for transaction in block.get_data() {
            if transaction.get_input().get_address() == address {
                has_conducted_transaction = true;
            }
            if let Some(amount) = transaction.output_for(address) {
                outputs_total = outputs_total.saturating_add(amount);
            }
        }
        if has_conducted_transaction {
            break;
        }
    }

    if has_conducted_transaction {
        outputs_total
    } else {
        STARTING_BALANCE.saturating_add(outputs_total)
    }
}
