//! Argument checking and geometry for merging two partial attention states.
//!
//! A partial state is an attention output `(tokens, heads, head_dim)` plus its
//! log-sum-exp `(tokens, heads)`. Backends call [`validate_merge`] before
//! touching any memory; every failure is reported before work is scheduled.

use tracing::warn;

use crate::dtype::DType;
use crate::launch::{LaunchConfig, WorkItem};
use crate::tensor::Tensor;
use crate::{Error, Result};

/// Borrowed operands of one merge call.
pub struct MergeOperands<'a, T: Tensor> {
    pub prefix_output: &'a T,
    pub prefix_lse: &'a T,
    pub suffix_output: &'a T,
    pub suffix_lse: &'a T,
    pub merged_output: &'a T,
    pub merged_lse: Option<&'a T>,
}

impl<T: Tensor> MergeOperands<'_, T> {
    fn outputs(&self) -> [(&'static str, &T); 3] {
        [
            ("prefix_output", self.prefix_output),
            ("suffix_output", self.suffix_output),
            ("merged_output", self.merged_output),
        ]
    }

    fn lses(&self) -> Vec<(&'static str, &T)> {
        let mut lses = vec![("prefix_lse", self.prefix_lse), ("suffix_lse", self.suffix_lse)];
        if let Some(lse) = self.merged_lse {
            lses.push(("merged_lse", lse));
        }
        lses
    }

    fn all(&self) -> Vec<(&'static str, &T)> {
        let mut all = self.outputs().to_vec();
        all.extend(self.lses());
        all
    }
}

/// Validated dimensions of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeGeometry {
    pub tokens: usize,
    pub heads: usize,
    pub head_dim: usize,
    /// Storage dtype of the attention outputs
    pub dtype: DType,
}

impl MergeGeometry {
    /// Elements per 16-byte pack for the storage dtype.
    #[must_use]
    pub const fn pack_width(&self) -> usize {
        self.dtype.pack_width()
    }

    #[must_use]
    pub const fn packs_per_head(&self) -> usize {
        self.head_dim / self.pack_width()
    }

    /// Number of independent workers: one per `(token, head, pack)`.
    #[must_use]
    pub const fn total_work(&self) -> usize {
        self.tokens * self.heads * self.packs_per_head()
    }

    #[must_use]
    pub fn work_item(&self, idx: usize) -> Option<WorkItem> {
        WorkItem::from_linear(idx, self.tokens, self.heads, self.packs_per_head())
    }

    #[must_use]
    pub fn launch_config(&self, block_dim: usize) -> LaunchConfig {
        LaunchConfig::for_work(self.total_work(), block_dim)
    }
}

fn check_shapes_equal(context: &str, expected: &[usize], got: &[usize]) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            context: context.to_string(),
            expected: expected.to_vec(),
            got: got.to_vec(),
        })
    }
}

fn check_operands<T: Tensor>(ops: &MergeOperands<'_, T>) -> Result<MergeGeometry> {
    for (name, t) in ops.all() {
        if !t.is_contiguous() {
            return Err(Error::NotContiguous(format!(
                "{name} with shape {:?} and strides {:?}",
                t.shape(),
                t.strides()
            )));
        }
    }

    for (name, t) in ops.outputs() {
        if t.ndim() != 3 {
            return Err(Error::InvalidShape(format!(
                "{name} must be 3D (tokens, heads, head_dim), got {:?}",
                t.shape()
            )));
        }
    }
    for (name, t) in ops.lses() {
        if t.ndim() != 2 {
            return Err(Error::InvalidShape(format!(
                "{name} must be 2D (tokens, heads), got {:?}",
                t.shape()
            )));
        }
    }

    let device = ops.merged_output.device();
    for (name, t) in ops.all() {
        if t.device() != device {
            return Err(Error::DeviceMismatch(format!(
                "{name} is on {} but merged_output is on {device}",
                t.device()
            )));
        }
    }

    let out_shape = ops.prefix_output.shape();
    check_shapes_equal(
        "prefix_output vs suffix_output",
        out_shape,
        ops.suffix_output.shape(),
    )?;
    check_shapes_equal(
        "prefix_output vs merged_output",
        out_shape,
        ops.merged_output.shape(),
    )?;

    let lse_shape = ops.prefix_lse.shape();
    check_shapes_equal("prefix_lse vs suffix_lse", lse_shape, ops.suffix_lse.shape())?;
    if let Some(merged_lse) = ops.merged_lse {
        check_shapes_equal("prefix_lse vs merged_lse", lse_shape, merged_lse.shape())?;
    }

    if out_shape[0] != lse_shape[0] {
        return Err(Error::InvalidShape(format!(
            "token count mismatch: outputs have {} tokens, lse has {}",
            out_shape[0], lse_shape[0]
        )));
    }
    if out_shape[1] != lse_shape[1] {
        return Err(Error::InvalidShape(format!(
            "head count mismatch: outputs have {} heads, lse has {}",
            out_shape[1], lse_shape[1]
        )));
    }

    let dtype = ops.merged_output.dtype();
    for (name, t) in [
        ("prefix_output", ops.prefix_output),
        ("suffix_output", ops.suffix_output),
    ] {
        if t.dtype() != dtype {
            return Err(Error::DtypeMismatch {
                context: format!("{name} vs merged_output"),
                expected: dtype,
                got: t.dtype(),
            });
        }
    }
    for (name, t) in ops.lses() {
        if t.dtype() != DType::F32 {
            return Err(Error::DtypeMismatch {
                context: name.to_string(),
                expected: DType::F32,
                got: t.dtype(),
            });
        }
    }

    if !dtype.is_float() {
        return Err(Error::UnsupportedDtype(format!(
            "merge_attention_states: unsupported output dtype {dtype}"
        )));
    }

    let head_dim = out_shape[2];
    let pack_width = dtype.pack_width();
    if head_dim % pack_width != 0 {
        return Err(Error::Alignment {
            head_dim,
            pack_width,
            dtype,
        });
    }

    Ok(MergeGeometry {
        tokens: out_shape[0],
        heads: out_shape[1],
        head_dim,
        dtype,
    })
}

/// Check every precondition of a merge and return its geometry.
///
/// # Errors
/// Returns the first violated check: contiguity, rank, device, shape,
/// token/head agreement, dtype, supported precision, then pack alignment.
pub fn validate_merge<T: Tensor>(ops: &MergeOperands<'_, T>) -> Result<MergeGeometry> {
    check_operands(ops).inspect_err(|e| {
        warn!(error = %e, "rejecting merge_attention_states call");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DeviceId;

    struct Meta {
        shape: Vec<usize>,
        dtype: DType,
        device: DeviceId,
        strides: Option<Vec<usize>>,
    }

    impl Meta {
        fn new(shape: &[usize], dtype: DType) -> Self {
            Self {
                shape: shape.to_vec(),
                dtype,
                device: DeviceId(0),
                strides: None,
            }
        }
    }

    impl Tensor for Meta {
        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn dtype(&self) -> DType {
            self.dtype
        }

        fn device(&self) -> DeviceId {
            self.device
        }

        fn strides(&self) -> Vec<usize> {
            self.strides
                .clone()
                .unwrap_or_else(|| crate::tensor::contiguous_strides(&self.shape))
        }
    }

    struct Set {
        po: Meta,
        pl: Meta,
        so: Meta,
        sl: Meta,
        mo: Meta,
        ml: Meta,
    }

    fn set(tokens: usize, heads: usize, head_dim: usize, dtype: DType) -> Set {
        Set {
            po: Meta::new(&[tokens, heads, head_dim], dtype),
            pl: Meta::new(&[tokens, heads], DType::F32),
            so: Meta::new(&[tokens, heads, head_dim], dtype),
            sl: Meta::new(&[tokens, heads], DType::F32),
            mo: Meta::new(&[tokens, heads, head_dim], dtype),
            ml: Meta::new(&[tokens, heads], DType::F32),
        }
    }

    fn validate(s: &Set, with_lse: bool) -> Result<MergeGeometry> {
        validate_merge(&MergeOperands {
            prefix_output: &s.po,
            prefix_lse: &s.pl,
            suffix_output: &s.so,
            suffix_lse: &s.sl,
            merged_output: &s.mo,
            merged_lse: with_lse.then_some(&s.ml),
        })
    }

    #[test]
    fn test_valid_geometry() {
        let g = validate(&set(3, 4, 64, DType::BF16), true).unwrap();
        assert_eq!(g.tokens, 3);
        assert_eq!(g.heads, 4);
        assert_eq!(g.pack_width(), 8);
        assert_eq!(g.packs_per_head(), 8);
        assert_eq!(g.total_work(), 3 * 4 * 8);
        assert_eq!(g.launch_config(128).grid_dim, 1);
    }

    #[test]
    fn test_without_merged_lse() {
        assert!(validate(&set(1, 1, 4, DType::F32), false).is_ok());
    }

    #[test]
    fn test_non_contiguous_rejected() {
        let mut s = set(2, 2, 8, DType::F32);
        s.so.strides = Some(vec![8, 16, 1]);
        assert!(matches!(validate(&s, true), Err(Error::NotContiguous(_))));
    }

    #[test]
    fn test_rank_rejected() {
        let mut s = set(2, 2, 8, DType::F32);
        s.pl = Meta::new(&[2, 2, 1], DType::F32);
        assert!(matches!(validate(&s, true), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn test_device_rejected() {
        let mut s = set(2, 2, 8, DType::F32);
        s.ml.device = DeviceId(1);
        let err = validate(&s, true).unwrap_err();
        assert!(matches!(err, Error::DeviceMismatch(ref m) if m.contains("merged_lse")));
        // Ignored when the merged LSE is absent.
        assert!(validate(&s, false).is_ok());
    }

    #[test]
    fn test_head_mismatch_between_outputs() {
        let mut s = set(2, 2, 8, DType::F32);
        s.so = Meta::new(&[2, 3, 8], DType::F32);
        assert!(matches!(
            validate(&s, true),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_token_mismatch_with_lse() {
        let mut s = set(2, 2, 8, DType::F32);
        s.pl = Meta::new(&[3, 2], DType::F32);
        s.sl = Meta::new(&[3, 2], DType::F32);
        s.ml = Meta::new(&[3, 2], DType::F32);
        let err = validate(&s, true).unwrap_err();
        assert!(matches!(err, Error::InvalidShape(ref m) if m.contains("token")));
    }

    #[test]
    fn test_head_mismatch_with_lse() {
        let mut s = set(2, 2, 8, DType::F32);
        s.pl = Meta::new(&[2, 4], DType::F32);
        s.sl = Meta::new(&[2, 4], DType::F32);
        s.ml = Meta::new(&[2, 4], DType::F32);
        let err = validate(&s, true).unwrap_err();
        assert!(matches!(err, Error::InvalidShape(ref m) if m.contains("head")));
    }

    #[test]
    fn test_lse_must_be_f32() {
        let mut s = set(2, 2, 8, DType::F16);
        s.sl.dtype = DType::F16;
        assert!(matches!(
            validate(&s, true),
            Err(Error::DtypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_dtype() {
        let s = set(2, 2, 8, DType::U32);
        assert!(matches!(
            validate(&s, true),
            Err(Error::UnsupportedDtype(_))
        ));
    }

    #[test]
    fn test_alignment_rejected() {
        let err = validate(&set(2, 1, 3, DType::F32), true).unwrap_err();
        assert!(matches!(
            err,
            Error::Alignment {
                head_dim: 3,
                pack_width: 4,
                ..
            }
        ));
        // 4 is fine for f32 but not for the 8-wide half types
        assert!(validate(&set(2, 1, 4, DType::F32), true).is_ok());
        assert!(validate(&set(2, 1, 4, DType::F16), true).is_err());
    }
}
