//! attnmerge: exact recombination of partial attention states
//!
//! This crate provides the core types and traits for merging attention
//! outputs computed over disjoint key/value ranges using their
//! log-sum-exp normalizers. Backend-specific kernels live in separate
//! crates (`attnmerge-cpu`).

pub mod backend;
pub mod config;
pub mod dtype;
pub mod error;
pub mod launch;
pub mod merge;
pub mod tensor;

pub use backend::{Backend, MergeStateOps, TensorFactory};
pub use config::MergeConfig;
pub use dtype::{DType, FloatStorage, TensorDType, TRANSFER_BYTES};
pub use error::{Error, Result};
pub use launch::{LaunchConfig, WorkItem};
pub use merge::{validate_merge, MergeGeometry, MergeOperands};
pub use tensor::{DeviceId, Tensor};
