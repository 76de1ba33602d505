//! CPU implementations of all backend op traits.

pub mod factory;
pub mod merge_state;
