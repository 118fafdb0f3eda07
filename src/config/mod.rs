//! Configuration management
//!
//! Broker address, miner identity, reconnect policy and the mining interval.
//! Consensus constants are compiled in and live next to the code that uses them.

pub mod settings;

pub use settings::Config;
