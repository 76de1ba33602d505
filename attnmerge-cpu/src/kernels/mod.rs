//! Data-parallel kernels run on a `CpuStream`.

pub mod merge_state;
