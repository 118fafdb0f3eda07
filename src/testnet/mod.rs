//! Test helpers for assembling chains without the cost of real mining
//!
//! Blocks are sealed at fixed, low difficulty so chains of any shape can be
//! built quickly while still passing every validity check.

pub mod test_utils;

pub use test_utils::*;
