//! Data types for tensor elements

use std::fmt;

/// Width in bytes of one vectorized load/store.
pub const TRANSFER_BYTES: usize = 16;

/// Supported data types for tensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point
    F32,
    /// 16-bit floating point (IEEE 754)
    F16,
    /// Brain floating point (16-bit)
    BF16,
    /// 32-bit unsigned integer
    U32,
}

impl DType {
    /// Size of the dtype in bytes
    #[must_use]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 | Self::U32 => 4,
            Self::F16 | Self::BF16 => 2,
        }
    }

    /// Number of elements moved by one 16-byte transfer.
    #[must_use]
    pub const fn pack_width(self) -> usize {
        TRANSFER_BYTES / self.size_in_bytes()
    }

    /// Whether values of this dtype can be merged as attention outputs.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16 | Self::BF16)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F16 => write!(f, "f16"),
            Self::BF16 => write!(f, "bf16"),
            Self::U32 => write!(f, "u32"),
        }
    }
}

/// Trait for types that can be used as tensor elements
pub trait TensorDType: Copy + Clone + Default + Send + Sync + bytemuck::Pod + 'static {
    /// The corresponding `DType` enum value
    const DTYPE: DType;
}

/// Floating-point storage formats that round-trip through an f32 accumulator.
///
/// Widening is exact. Narrowing rounds to nearest, ties to even.
pub trait FloatStorage: TensorDType {
    /// Elements per 16-byte pack.
    const PACK_WIDTH: usize = TRANSFER_BYTES / std::mem::size_of::<Self>();

    /// Widen to the f32 working representation.
    fn to_f32(self) -> f32;

    /// Narrow from the f32 working representation.
    fn from_f32(value: f32) -> Self;
}

impl TensorDType for f32 {
    const DTYPE: DType = DType::F32;
}

impl TensorDType for half::f16 {
    const DTYPE: DType = DType::F16;
}

impl TensorDType for half::bf16 {
    const DTYPE: DType = DType::BF16;
}

impl TensorDType for u32 {
    const DTYPE: DType = DType::U32;
}

impl FloatStorage for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }
}

impl FloatStorage for half::f16 {
    #[inline]
    fn to_f32(self) -> f32 {
        half::f16::to_f32(self)
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        half::f16::from_f32(value)
    }
}

impl FloatStorage for half::bf16 {
    #[inline]
    fn to_f32(self) -> f32 {
        half::bf16::to_f32(self)
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        half::bf16::from_f32(value)
    }
}
