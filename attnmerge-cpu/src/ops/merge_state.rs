//! MergeStateOps implementation for CpuBackend.

use attnmerge::backend::MergeStateOps;
use attnmerge::dtype::{DType, FloatStorage};
use attnmerge::merge::{validate_merge, MergeGeometry, MergeOperands};
use attnmerge::tensor::Tensor;
use attnmerge::{Error, Result};
use tracing::debug;

use crate::kernels::merge_state::{merge_attn_states, MergeInputs};
use crate::stream::CpuStream;
use crate::tensor::CpuTensor;
use crate::CpuBackend;

/// Launch the kernel instantiation for storage type `T`.
#[allow(clippy::too_many_arguments)]
fn launch<T: FloatStorage>(
    stream: &CpuStream,
    geom: &MergeGeometry,
    prefix_output: &CpuTensor,
    prefix_lse: &CpuTensor,
    suffix_output: &CpuTensor,
    suffix_lse: &CpuTensor,
    merged_output: &mut CpuTensor,
    merged_lse: Option<&mut CpuTensor>,
) {
    let cfg = geom.launch_config(stream.block_size());
    debug!(
        dtype = %geom.dtype,
        tokens = geom.tokens,
        heads = geom.heads,
        head_dim = geom.head_dim,
        grid = cfg.grid_dim,
        block = cfg.block_dim,
        with_lse = merged_lse.is_some(),
        "launching merge_attn_states"
    );

    let inputs = MergeInputs {
        prefix_output: prefix_output.as_slice::<T>(),
        prefix_lse: prefix_lse.as_f32_slice(),
        suffix_output: suffix_output.as_slice::<T>(),
        suffix_lse: suffix_lse.as_f32_slice(),
    };
    let output = merged_output.as_mut_slice::<T>();
    let output_lse = merged_lse.map(|t| t.as_mut_slice::<f32>());

    stream.launch(|| merge_attn_states(geom, &cfg, &inputs, output, output_lse));
}

impl MergeStateOps for CpuBackend {
    fn merge_attention_states(
        stream: &CpuStream,
        prefix_output: &CpuTensor,
        prefix_lse: &CpuTensor,
        suffix_output: &CpuTensor,
        suffix_lse: &CpuTensor,
        merged_output: &mut CpuTensor,
        merged_lse: Option<&mut CpuTensor>,
    ) -> Result<()> {
        let geom = validate_merge(&MergeOperands {
            prefix_output,
            prefix_lse,
            suffix_output,
            suffix_lse,
            merged_output: &*merged_output,
            merged_lse: merged_lse.as_deref(),
        })?;
        if merged_output.device() != stream.device() {
            return Err(Error::DeviceMismatch(format!(
                "tensors are on {} but the stream is on {}",
                merged_output.device(),
                stream.device()
            )));
        }

        match geom.dtype {
            DType::F32 => launch::<f32>(
                stream,
                &geom,
                prefix_output,
                prefix_lse,
                suffix_output,
                suffix_lse,
                merged_output,
                merged_lse,
            ),
            DType::F16 => launch::<half::f16>(
                stream,
                &geom,
                prefix_output,
                prefix_lse,
                suffix_output,
                suffix_lse,
                merged_output,
                merged_lse,
            ),
            DType::BF16 => launch::<half::bf16>(
                stream,
                &geom,
                prefix_output,
                prefix_lse,
                suffix_output,
                suffix_lse,
                merged_output,
                merged_lse,
            ),
            other => {
                return Err(Error::UnsupportedDtype(format!(
                    "merge_attention_states: unsupported output dtype {other}"
                )))
            }
        }
        Ok(())
    }
}

/// Merge a prefix and suffix attention state on `stream`.
///
/// See [`MergeStateOps::merge_attention_states`].
///
/// # Errors
/// Returns an error if any shape, rank, device, contiguity, dtype or
/// alignment precondition is violated. Nothing is written in that case.
pub fn merge_attention_states(
    stream: &CpuStream,
    prefix_output: &CpuTensor,
    prefix_lse: &CpuTensor,
    suffix_output: &CpuTensor,
    suffix_lse: &CpuTensor,
    merged_output: &mut CpuTensor,
    merged_lse: Option<&mut CpuTensor>,
) -> Result<()> {
    CpuBackend::merge_attention_states(
        stream,
        prefix_output,
        prefix_lse,
        suffix_output,
        suffix_lse,
        merged_output,
        merged_lse,
    )
}

/// Fold `(output, lse)` partials left to right into one state.
///
/// # Errors
/// Returns an error if `partials` is empty or any pairwise merge fails.
pub fn merge_attention_states_many(
    stream: &CpuStream,
    partials: &[(CpuTensor, CpuTensor)],
) -> Result<(CpuTensor, CpuTensor)> {
    CpuBackend::merge_many(stream, partials)
}
