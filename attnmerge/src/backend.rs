//! Backend trait and op trait definitions for hardware-agnostic merging.
//!
//! Callers are generic over `B: Backend` and use op traits like
//! `MergeStateOps` to express their compute requirements. Each backend
//! (CPU today) implements these traits with its own tensor and stream types.
//!
//! # Design notes
//!
//! - **Op traits extend `Backend`** — they use `Self::Tensor` and
//!   `Self::Stream` from the supertrait, avoiding repetition.
//! - **Streams are ordered.** A launch returns once its writes are visible
//!   to later work on the same stream. Ordering across streams is the
//!   caller's problem.
//! - **No allocation inside kernels.** Outputs are caller-allocated; the
//!   allocating helpers below go through `TensorFactory` first.

#![allow(clippy::missing_errors_doc, clippy::doc_markdown)]

use crate::dtype::DType;
use crate::tensor::{DeviceId, Tensor};
use crate::Result;

// ---- Core backend trait ----

/// A compute backend.
pub trait Backend: 'static {
    /// The tensor type for this backend (e.g., `CpuTensor`).
    type Tensor: Tensor + Clone;

    /// Ordered execution queue kernels are launched on.
    type Stream;
}

// ---- Op traits ----

/// Tensor allocation.
pub trait TensorFactory: Backend {
    /// Allocate a zero-filled tensor on `device`.
    fn zeros(device: DeviceId, shape: &[usize], dtype: DType) -> Result<Self::Tensor>;
}

/// Merging of partial attention states via their log-sum-exp.
pub trait MergeStateOps: TensorFactory {
    /// Merge a prefix and a suffix partial attention state into
    /// `merged_output` and, if given, `merged_lse`.
    ///
    /// Outputs are `(tokens, heads, head_dim)` in f32/f16/bf16; LSE tensors
    /// are `(tokens, heads)` f32. Nothing is written if validation fails.
    #[allow(clippy::too_many_arguments)]
    fn merge_attention_states(
        stream: &Self::Stream,
        prefix_output: &Self::Tensor,
        prefix_lse: &Self::Tensor,
        suffix_output: &Self::Tensor,
        suffix_lse: &Self::Tensor,
        merged_output: &mut Self::Tensor,
        merged_lse: Option<&mut Self::Tensor>,
    ) -> Result<()>;

    /// Allocating variant of [`MergeStateOps::merge_attention_states`].
    ///
    /// Returns `(merged_output, merged_lse)` on the device of `out1`.
    fn combine_attention_with_lse(
        stream: &Self::Stream,
        out1: &Self::Tensor,
        lse1: &Self::Tensor,
        out2: &Self::Tensor,
        lse2: &Self::Tensor,
    ) -> Result<(Self::Tensor, Self::Tensor)> {
        let device = out1.device();
        let mut merged_output = Self::zeros(device, out1.shape(), out1.dtype())?;
        let mut merged_lse = Self::zeros(device, lse1.shape(), DType::F32)?;
        Self::merge_attention_states(
            stream,
            out1,
            lse1,
            out2,
            lse2,
            &mut merged_output,
            Some(&mut merged_lse),
        )?;
        Ok((merged_output, merged_lse))
    }

    /// Fold an ordered list of partial states into one, left to right.
    ///
    /// A single partial is returned as-is.
    ///
    /// # Errors
    /// Returns `Error::InvalidShape` when `partials` is empty, or any error
    /// from the pairwise merges.
    fn merge_many(
        stream: &Self::Stream,
        partials: &[(Self::Tensor, Self::Tensor)],
    ) -> Result<(Self::Tensor, Self::Tensor)> {
        let Some((first, rest)) = partials.split_first() else {
            return Err(crate::Error::InvalidShape(
                "merge_many: no partial states given".into(),
            ));
        };
        let mut acc = first.clone();
        for (out, lse) in rest {
            acc = Self::combine_attention_with_lse(stream, &acc.0, &acc.1, out, lse)?;
        }
        Ok(acc)
    }
}
