//! Tensor trait definition

use std::fmt;

use crate::dtype::DType;

/// Identifier of the compute device a tensor lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// Row-major strides for a dense tensor of the given shape.
#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Core tensor trait that defines the interface for all tensor implementations
///
/// Only the metadata the merge ops validate against lives here; element
/// access is backend-specific.
pub trait Tensor: Sized {
    /// Returns the shape of the tensor as a slice of dimensions
    fn shape(&self) -> &[usize];

    /// Returns the data type of tensor elements
    fn dtype(&self) -> DType;

    /// Returns the device holding the tensor's storage
    fn device(&self) -> DeviceId;

    /// Returns the stride (in elements) for each dimension
    fn strides(&self) -> Vec<usize> {
        contiguous_strides(self.shape())
    }

    /// Returns the total number of elements in the tensor
    fn numel(&self) -> usize {
        self.shape().iter().product()
    }

    /// Returns the number of dimensions (rank) of the tensor
    fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Returns true if the tensor is dense and row-major in memory
    ///
    /// Size-1 dimensions are ignored since their stride is never used.
    fn is_contiguous(&self) -> bool {
        let expected = contiguous_strides(self.shape());
        self.shape()
            .iter()
            .zip(self.strides().iter().zip(expected.iter()))
            .all(|(&dim, (s, e))| dim == 1 || s == e)
    }

    /// Returns the size of the tensor data in bytes
    fn size_in_bytes(&self) -> usize {
        self.numel() * self.dtype().size_in_bytes()
    }
}
