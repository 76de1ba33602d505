//! Ordered execution stream backed by a Rayon thread pool.

use std::sync::Arc;

use attnmerge::tensor::DeviceId;
use attnmerge::{Error, MergeConfig, Result};
use tracing::debug;

/// A queue of kernel launches on one device.
///
/// Launches run to completion before `launch` returns, so anything issued
/// afterwards on the same stream sees their writes. Separate streams have
/// separate pools and may run merges over disjoint tensors concurrently.
#[derive(Clone)]
pub struct CpuStream {
    device: DeviceId,
    pool: Arc<rayon::ThreadPool>,
    block_size: usize,
}

impl CpuStream {
    /// Build a stream for `device` from `config`.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the pool cannot be built.
    pub fn new(device: DeviceId, config: &MergeConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(move |i| format!("attnmerge-{}-{i}", device.0))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        debug!(
            %device,
            threads = pool.current_num_threads(),
            block_size = config.block_size,
            "created cpu stream"
        );
        Ok(Self {
            device,
            pool: Arc::new(pool),
            block_size: config.block_size,
        })
    }

    /// Stream on device 0 with the default config.
    ///
    /// # Errors
    /// Returns an error if the thread pool cannot be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(DeviceId::default(), &MergeConfig::default())
    }

    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Workers per block for launches on this stream.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `kernel` on this stream's pool and wait for it.
    pub fn launch<R, F>(&self, kernel: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(kernel)
    }
}
