//! Batch scheduling
//!
//! Samples are cut into contiguous, order-preserving batches. The batch size is a
//! throughput knob chosen per device class; results never depend on it.

use crate::config::Device;
use crate::error::{OrderError, Result};

/// Batch size for the default tier (CPU)
pub const CPU_BATCH_SIZE: usize = 4;
/// Batch size for Apple Silicon
pub const MPS_BATCH_SIZE: usize = 4;
/// Batch size for CUDA devices
pub const CUDA_BATCH_SIZE: usize = 32;

/// Recommended batch size for a device class
///
/// - **CPU**: 4
/// - **MPS**: 4
/// - **CUDA**: 32
#[must_use = "returns the recommended batch size for the device"]
pub const fn default_batch_size(device: Device) -> usize {
    match device {
        Device::Cpu => CPU_BATCH_SIZE,
        Device::Mps => MPS_BATCH_SIZE,
        Device::Cuda(_) => CUDA_BATCH_SIZE,
    }
}

/// A contiguous slice of samples decoded together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'s, T> {
    /// 0-based batch number
    pub index: usize,
    pub samples: &'s [T],
}

impl<T> Batch<'_, T> {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Progress event emitted after each batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub batch_index: usize,
    pub num_batches: usize,
    /// Samples finished so far, including this batch
    pub samples_done: usize,
    pub samples_total: usize,
}

/// Splits samples into fixed-size batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    /// # Errors
    ///
    /// Returns `OrderError::Config` when `batch_size` is 0.
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(OrderError::Config {
                reason: "batch size must be at least 1".to_string(),
            });
        }
        Ok(Self { batch_size })
    }

    #[inline]
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches needed for `num_samples` samples
    #[inline]
    #[must_use]
    pub const fn num_batches(&self, num_samples: usize) -> usize {
        num_samples.div_ceil(self.batch_size)
    }

    /// Lazily yield batches in input order
    pub fn batches<'s, T>(&self, samples: &'s [T]) -> impl Iterator<Item = Batch<'s, T>> + 's {
        samples
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, chunk)| Batch {
                index,
                samples: chunk,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_batch_size_tiers() {
        assert_eq!(default_batch_size(Device::Cpu), 4);
        assert_eq!(default_batch_size(Device::Mps), 4);
        assert_eq!(default_batch_size(Device::Cuda(0)), 32);
        assert_eq!(default_batch_size(Device::Cuda(3)), 32);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(BatchScheduler::new(0).unwrap_err().is_config_error());
    }

    #[rstest]
    #[case(10, 4, &[4, 4, 2])]
    #[case(10, 10, &[10])]
    #[case(3, 32, &[3])]
    #[case(0, 4, &[])]
    fn test_batches_are_contiguous(
        #[case] num_samples: usize,
        #[case] batch_size: usize,
        #[case] expected_sizes: &[usize],
    ) {
        let samples: Vec<usize> = (0..num_samples).collect();
        let scheduler = BatchScheduler::new(batch_size).unwrap();
        let batches: Vec<_> = scheduler.batches(&samples).collect();

        assert_eq!(batches.len(), scheduler.num_batches(num_samples));
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, expected_sizes);

        let flattened: Vec<usize> = batches
            .iter()
            .flat_map(|b| b.samples.iter().copied())
            .collect();
        assert_eq!(flattened, samples);

        for (i, batch) in batches.iter().enumerate() {
            assert_eq!(batch.index, i);
            assert_eq!(batch.samples[0], i * batch_size);
        }
    }
}
