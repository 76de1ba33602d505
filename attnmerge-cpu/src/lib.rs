//! CPU backend for attnmerge.
//!
//! Runs merge kernels as data-parallel launches on a Rayon-backed
//! `CpuStream`. Storage may be f32, f16 or bf16; all arithmetic is f32.

#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod kernels;
pub mod ops;
pub mod stream;
pub mod tensor;

use attnmerge::backend::Backend;

pub use ops::merge_state::{merge_attention_states, merge_attention_states_many};
pub use stream::CpuStream;
pub use tensor::CpuTensor;

/// Marker type for the CPU backend.
///
/// All op trait impls are on this type. Callers parameterised by
/// `B: Backend` can use `CpuBackend` to run on CPU.
pub struct CpuBackend;

impl Backend for CpuBackend {
    type Tensor = CpuTensor;
    type Stream = CpuStream;
}
