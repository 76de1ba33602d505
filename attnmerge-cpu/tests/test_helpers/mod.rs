//! Shared helpers for merge integration tests.
//!
//! Provides deterministic inputs and an f64 reference for attention over
//! explicit scores, so merged partials can be checked against the joint
//! softmax.

#![allow(dead_code)]

use attnmerge::dtype::{DType, FloatStorage, TensorDType};
use attnmerge::tensor::DeviceId;
use attnmerge::MergeConfig;
use attnmerge_cpu::{CpuStream, CpuTensor};

/// Small stream with several blocks per launch.
pub fn stream(block_size: usize) -> CpuStream {
    CpuStream::new(
        DeviceId(0),
        &MergeConfig {
            block_size,
            num_threads: 4,
        },
    )
    .expect("Failed to create stream")
}

/// Deterministic values in `[-2, 2)` on a 1/64 grid, exact in every
/// supported storage type.
pub fn pattern(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            #[allow(clippy::cast_precision_loss)]
            let bucket = ((state >> 33) % 256) as f32;
            bucket / 64.0 - 2.0
        })
        .collect()
}

/// Build a tensor of storage type `T` from f32 values.
pub fn tensor_of<T: FloatStorage>(shape: &[usize], data: &[f32]) -> CpuTensor {
    let typed: Vec<T> = data.iter().map(|&v| T::from_f32(v)).collect();
    CpuTensor::from_slice(shape, &typed)
}

/// Tensor filled with `value`, used to detect writes.
pub fn filled(shape: &[usize], dtype: DType, value: f32) -> CpuTensor {
    let numel: usize = shape.iter().product();
    let data = vec![value; numel];
    match dtype {
        DType::F32 => tensor_of::<f32>(shape, &data),
        DType::F16 => tensor_of::<half::f16>(shape, &data),
        DType::BF16 => tensor_of::<half::bf16>(shape, &data),
        DType::U32 => CpuTensor::from_slice(shape, &vec![0u32; numel]),
    }
}

/// Machine epsilon of a storage type.
pub fn epsilon(dtype: DType) -> f32 {
    match dtype {
        DType::F32 => f32::EPSILON,
        DType::F16 => half::f16::EPSILON.to_f32(),
        DType::BF16 => half::bf16::EPSILON.to_f32(),
        DType::U32 => panic!("no epsilon for {}", u32::DTYPE),
    }
}

/// Attention of one query over explicit scores, in f64.
///
/// Returns `(output, lse)`; an empty score list gives `lse = -inf`.
pub fn attend(scores: &[f64], values: &[Vec<f64>], head_dim: usize) -> (Vec<f64>, f64) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if scores.is_empty() {
        return (vec![0.0; head_dim], f64::NEG_INFINITY);
    }
    let weights: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = weights.iter().sum();
    let mut out = vec![0.0; head_dim];
    for (w, v) in weights.iter().zip(values) {
        for (o, x) in out.iter_mut().zip(v) {
            *o += w / sum * x;
        }
    }
    (out, sum.ln() + max)
}

/// Assert two f32 slices agree within `tol`.
pub fn assert_close(got: &[f32], expected: &[f32], tol: f32, what: &str) {
    assert_eq!(got.len(), expected.len(), "{what}: length mismatch");
    for (i, (g, e)) in got.iter().zip(expected).enumerate() {
        assert!(
            (g - e).abs() <= tol,
            "{what}: mismatch at {i}: {g} vs {e} (tol {tol})"
        );
    }
}
