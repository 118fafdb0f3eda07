//! Utility functions and helpers
//!
//! Hashing, signing, timestamps and the JSON helpers used by the wire codec.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    crypto_hash, current_timestamp, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, sha256_digest, sha256_hex,
};

pub use serialization::{deserialize, serialize, to_json_string};
