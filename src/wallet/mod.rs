//! Wallet functionality
//!
//! Key pair handling, transaction signing and the balance calculator the
//! chain's transaction checks rely on.

pub mod wallet;

pub use wallet::{calculate_balance, Wallet};
