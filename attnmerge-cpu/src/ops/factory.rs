//! TensorFactory implementation for CpuBackend.

use attnmerge::backend::TensorFactory;
use attnmerge::dtype::DType;
use attnmerge::tensor::DeviceId;
use attnmerge::Result;

use crate::tensor::CpuTensor;
use crate::CpuBackend;

impl TensorFactory for CpuBackend {
    fn zeros(device: DeviceId, shape: &[usize], dtype: DType) -> Result<CpuTensor> {
        Ok(CpuTensor::zeros(shape, dtype).on_device(device))
    }
}
