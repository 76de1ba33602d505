//! CPU tensor implementation.

use std::sync::Arc;

use attnmerge::dtype::{DType, TensorDType, TRANSFER_BYTES};
use attnmerge::tensor::{contiguous_strides, DeviceId, Tensor};

/// One 16-byte transfer unit of backing storage.
///
/// Storage is allocated in whole packs so that every pack-aligned element
/// offset is also 16-byte aligned in memory.
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, align(16))]
pub struct Pack128([u8; TRANSFER_BYTES]);

/// A CPU-resident tensor backed by shared, 16-byte aligned storage.
///
/// Uses `Arc<Vec<Pack128>>` so clones and `as_strided` views are cheap
/// (shared backing). Writes go through `Arc::make_mut`, so a tensor never
/// mutates storage another handle can observe.
#[derive(Clone)]
pub struct CpuTensor {
    data: Arc<Vec<Pack128>>,
    len_bytes: usize,
    shape: Vec<usize>,
    strides: Vec<usize>,
    dtype: DType,
    device: DeviceId,
}

impl CpuTensor {
    fn with_bytes(shape: &[usize], dtype: DType, bytes: &[u8]) -> Self {
        let mut packs = vec![Pack128::default(); bytes.len().div_ceil(TRANSFER_BYTES)];
        bytemuck::cast_slice_mut::<Pack128, u8>(&mut packs)[..bytes.len()].copy_from_slice(bytes);
        Self {
            data: Arc::new(packs),
            len_bytes: bytes.len(),
            shape: shape.to_vec(),
            strides: contiguous_strides(shape),
            dtype,
            device: DeviceId::default(),
        }
    }

    /// Create a tensor from a typed slice.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the shape.
    #[must_use]
    pub fn from_slice<T: TensorDType>(shape: &[usize], data: &[T]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "data len {} != shape product {numel}",
            data.len()
        );
        Self::with_bytes(shape, T::DTYPE, bytemuck::cast_slice(data))
    }

    /// Create a tensor from an f32 slice.
    #[must_use]
    pub fn from_f32(shape: &[usize], data: &[f32]) -> Self {
        Self::from_slice(shape, data)
    }

    /// Create a tensor from raw bytes with a given dtype.
    ///
    /// # Panics
    /// Panics if the byte count does not match shape and dtype.
    #[must_use]
    pub fn from_raw(shape: &[usize], dtype: DType, data: &[u8]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(data.len(), numel * dtype.size_in_bytes());
        Self::with_bytes(shape, dtype, data)
    }

    /// Create a zero-filled tensor.
    #[must_use]
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let numel: usize = shape.iter().product();
        let len_bytes = numel * dtype.size_in_bytes();
        Self {
            data: Arc::new(vec![Pack128::default(); len_bytes.div_ceil(TRANSFER_BYTES)]),
            len_bytes,
            shape: shape.to_vec(),
            strides: contiguous_strides(shape),
            dtype,
            device: DeviceId::default(),
        }
    }

    /// Move the tensor to `device` (metadata only on the host).
    #[must_use]
    pub fn on_device(mut self, device: DeviceId) -> Self {
        self.device = device;
        self
    }

    /// Create a view over the same storage with explicit element strides.
    ///
    /// # Panics
    /// Panics if the view reaches past the end of the storage.
    #[must_use]
    pub fn as_strided(&self, shape: &[usize], strides: &[usize]) -> Self {
        assert_eq!(shape.len(), strides.len(), "as_strided: rank mismatch");
        if shape.iter().all(|&d| d > 0) {
            let last: usize = shape.iter().zip(strides).map(|(&d, &s)| (d - 1) * s).sum();
            assert!(
                (last + 1) * self.dtype.size_in_bytes() <= self.len_bytes,
                "as_strided: view out of bounds"
            );
        }
        Self {
            data: Arc::clone(&self.data),
            len_bytes: self.len_bytes,
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            dtype: self.dtype,
            device: self.device,
        }
    }

    /// Get the raw bytes covered by this tensor's elements.
    ///
    /// For a view this is `numel * dtype size` from the start of storage,
    /// not the whole backing buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<Pack128, u8>(&self.data)[..self.size_in_bytes()]
    }

    /// Get the data as a typed slice.
    ///
    /// # Panics
    /// Panics if the dtype does not match `T` or the tensor is a
    /// non-contiguous view.
    #[must_use]
    pub fn as_slice<T: TensorDType>(&self) -> &[T] {
        assert_eq!(self.dtype, T::DTYPE, "expected {} tensor", T::DTYPE);
        assert!(self.is_contiguous(), "as_slice: tensor is not contiguous");
        bytemuck::cast_slice(self.as_bytes())
    }

    /// Get the data as a mutable typed slice.
    ///
    /// Copies the storage first if it is shared with another tensor.
    ///
    /// # Panics
    /// Panics if the dtype does not match `T` or the tensor is a
    /// non-contiguous view.
    pub fn as_mut_slice<T: TensorDType>(&mut self) -> &mut [T] {
        assert_eq!(self.dtype, T::DTYPE, "expected {} tensor", T::DTYPE);
        assert!(self.is_contiguous(), "as_mut_slice: tensor is not contiguous");
        let len = self.size_in_bytes();
        let data = Arc::make_mut(&mut self.data);
        bytemuck::cast_slice_mut(&mut bytemuck::cast_slice_mut::<Pack128, u8>(data)[..len])
    }

    /// Get the data as an f32 slice.
    ///
    /// # Panics
    /// Panics if dtype is not F32.
    #[must_use]
    pub fn as_f32_slice(&self) -> &[f32] {
        self.as_slice()
    }

    /// Convert to an f32 Vec, casting from bf16/f16 if necessary.
    ///
    /// # Panics
    /// Panics on non-float dtypes.
    #[must_use]
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self.dtype {
            DType::F32 => self.as_f32_slice().to_vec(),
            DType::BF16 => self
                .as_slice::<half::bf16>()
                .iter()
                .map(|v| v.to_f32())
                .collect(),
            DType::F16 => self
                .as_slice::<half::f16>()
                .iter()
                .map(|v| v.to_f32())
                .collect(),
            other => panic!("to_f32_vec: unsupported dtype {other}"),
        }
    }

    /// Whether two tensors share backing storage.
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Tensor for CpuTensor {
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
        self.strides.clone()
    }
}
