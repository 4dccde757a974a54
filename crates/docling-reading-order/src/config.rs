//! Reading-order configuration
//!
//! [`OrderConfig`] is an explicit value passed to the scheduler, the preprocessor and
//! the decoding loop. The process environment is only consulted by
//! [`OrderConfigBuilder::from_env`].

use crate::batch::default_batch_size;
use crate::error::{OrderError, Result};

/// Maximum number of decoding steps (and therefore boxes per page)
pub const DEFAULT_MAX_BOXES: usize = 256;

/// Number of rank tokens in the model vocabulary
///
/// Fixed by the trained model. The separator and padding ids sit right after this
/// range, so they do not move when the step cap changes.
pub const DEFAULT_RANK_TOKENS: usize = 256;

/// Side length of the square model input image
pub const DEFAULT_IMAGE_SIZE: usize = 1024;

/// Side length of the square grid box coordinates are quantized into
pub const DEFAULT_BOX_SIZE: usize = 1024;

/// ImageNet normalization mean (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet normalization standard deviation (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Environment variable overriding the batch size
pub const ENV_BATCH_SIZE: &str = "ORDER_BATCH_SIZE";
/// Environment variable overriding the decoding step cap
pub const ENV_MAX_BOXES: &str = "ORDER_MAX_BOXES";
/// Environment variable selecting the compute device class
pub const ENV_DEVICE: &str = "ORDER_DEVICE";

/// Device selection for model inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// CPU inference
    #[default]
    Cpu,
    /// CUDA GPU inference (device index)
    Cuda(usize),
    /// Apple Metal Performance Shaders (MPS)
    Mps,
}

impl std::fmt::Display for Device {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{idx}"),
            Self::Mps => write!(f, "mps"),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let parse_index = |prefix: &str, idx_str: &str| {
            idx_str.parse::<usize>().map(Self::Cuda).map_err(|_| {
                format!("Invalid {prefix} device index '{idx_str}'. Expected: {prefix}:N")
            })
        };
        match lower.as_str() {
            "cpu" => Ok(Self::Cpu),
            "mps" | "metal" => Ok(Self::Mps),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            s => {
                if let Some(idx_str) = s.strip_prefix("cuda:") {
                    parse_index("cuda", idx_str)
                } else if let Some(idx_str) = s.strip_prefix("gpu:") {
                    parse_index("gpu", idx_str)
                } else {
                    Err(format!(
                        "Unknown device '{s}'. Expected: cpu, cuda, cuda:N, mps"
                    ))
                }
            }
        }
    }
}

/// Width and height of a square-ish model grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridSize {
    /// Width in cells/pixels
    pub width: usize,
    /// Height in cells/pixels
    pub height: usize,
}

impl GridSize {
    /// Square grid with the given side
    #[inline]
    #[must_use]
    pub const fn square(side: usize) -> Self {
        Self {
            width: side,
            height: side,
        }
    }
}

/// Reading-order configuration
///
/// # Examples
///
/// ```
/// use docling_reading_order::{Device, OrderConfigBuilder};
///
/// # fn main() -> docling_reading_order::Result<()> {
/// let config = OrderConfigBuilder::new()
///     .device(Device::Cuda(0))
///     .max_boxes(128)
///     .build()?;
/// assert_eq!(config.batch_size(), 32);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfig {
    /// Compute device class; selects the default batch size tier
    pub device: Device,
    /// Explicit batch size; `None` uses the device tier
    pub batch_size: Option<usize>,
    /// Hard cap on decoding steps per batch (`ORDER_MAX_BOXES`)
    pub max_boxes: usize,
    /// Rank tokens the model can emit; `max_boxes` may not exceed it
    pub rank_tokens: usize,
    /// Model input image size
    pub image_size: GridSize,
    /// Grid box coordinates are quantized into; its height is also the token id of rank 0
    pub box_size: GridSize,
    /// Token marking the end of the box sequence
    pub token_sep_id: i64,
    /// Padding token, doubling as the decoding terminator
    pub token_pad_id: i64,
    /// Per-channel normalization mean
    pub image_mean: [f32; 3],
    /// Per-channel normalization standard deviation
    pub image_std: [f32; 3],
}

impl Default for OrderConfig {
    #[inline]
    fn default() -> Self {
        OrderConfigBuilder::new()
            .build()
            .expect("Default config should always be valid")
    }
}

impl OrderConfig {
    /// Effective batch size: the explicit override, else the device tier
    #[inline]
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
            .unwrap_or_else(|| default_batch_size(self.device))
    }

    /// Token id that encodes rank 0
    #[inline]
    #[must_use]
    pub const fn rank_token_offset(&self) -> i64 {
        self.box_size.height as i64
    }
}

/// Builder for [`OrderConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfigBuilder {
    device: Device,
    batch_size: Option<usize>,
    max_boxes: usize,
    rank_tokens: usize,
    image_size: GridSize,
    box_size: GridSize,
    token_sep_id: Option<i64>,
    token_pad_id: Option<i64>,
    image_mean: [f32; 3],
    image_std: [f32; 3],
}

impl Default for OrderConfigBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl OrderConfigBuilder {
    /// Create a builder with defaults
    ///
    /// - Device: CPU (default batch tier)
    /// - Max boxes: 256
    /// - Image size: 1024x1024, box grid: 1024x1024
    /// - Rank tokens: 256
    /// - Separator/padding tokens: right after the rank tokens
    /// - Normalization: ImageNet mean/std
    #[inline]
    #[must_use = "returns a new builder with default settings"]
    pub const fn new() -> Self {
        Self {
            device: Device::Cpu,
            batch_size: None,
            max_boxes: DEFAULT_MAX_BOXES,
            rank_tokens: DEFAULT_RANK_TOKENS,
            image_size: GridSize::square(DEFAULT_IMAGE_SIZE),
            box_size: GridSize::square(DEFAULT_BOX_SIZE),
            token_sep_id: None,
            token_pad_id: None,
            image_mean: IMAGENET_MEAN,
            image_std: IMAGENET_STD,
        }
    }

    /// Builder seeded from `ORDER_BATCH_SIZE`, `ORDER_MAX_BOXES` and `ORDER_DEVICE`
    ///
    /// Unparseable numbers are ignored with a warning. An unknown device falls back
    /// to [`Device::Cpu`] and therefore to the default batch size tier.
    #[must_use = "returns a builder seeded from the environment"]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable lookup
    #[must_use = "returns a builder seeded from the lookup"]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::new();

        if let Some(raw) = lookup(ENV_DEVICE) {
            builder.device = raw.parse().unwrap_or_else(|e| {
                log::warn!("{ENV_DEVICE}: {e}; falling back to cpu");
                Device::Cpu
            });
        }

        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(size) => builder.batch_size = Some(size),
                Err(_) => log::warn!("Ignoring {ENV_BATCH_SIZE}={raw:?}: not a number"),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_BOXES) {
            match raw.trim().parse::<usize>() {
                Ok(max) => builder.max_boxes = max,
                Err(_) => log::warn!("Ignoring {ENV_MAX_BOXES}={raw:?}: not a number"),
            }
        }

        builder
    }

    /// Set the compute device class
    #[inline]
    #[must_use]
    pub const fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Override the device-tier batch size
    #[inline]
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Set the decoding step cap
    #[inline]
    #[must_use]
    pub const fn max_boxes(mut self, max_boxes: usize) -> Self {
        self.max_boxes = max_boxes;
        self
    }

    /// Set the size of the model's rank vocabulary
    #[inline]
    #[must_use]
    pub const fn rank_tokens(mut self, rank_tokens: usize) -> Self {
        self.rank_tokens = rank_tokens;
        self
    }

    /// Set the model input image size
    #[inline]
    #[must_use]
    pub const fn image_size(mut self, width: usize, height: usize) -> Self {
        self.image_size = GridSize { width, height };
        self
    }

    /// Set the box quantization grid
    #[inline]
    #[must_use]
    pub const fn box_size(mut self, width: usize, height: usize) -> Self {
        self.box_size = GridSize { width, height };
        self
    }

    /// Override the separator token id
    #[inline]
    #[must_use]
    pub const fn token_sep_id(mut self, id: i64) -> Self {
        self.token_sep_id = Some(id);
        self
    }

    /// Override the padding/terminator token id
    #[inline]
    #[must_use]
    pub const fn token_pad_id(mut self, id: i64) -> Self {
        self.token_pad_id = Some(id);
        self
    }

    /// Set per-channel normalization
    #[inline]
    #[must_use]
    pub const fn normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.image_mean = mean;
        self.image_std = std;
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Config` for zero sizes, a zero batch size, zero standard
    /// deviations, or special tokens that collide with each other or with rank tokens.
    pub fn build(self) -> Result<OrderConfig> {
        let invalid = |reason: String| -> Result<OrderConfig> { Err(OrderError::Config { reason }) };

        if self.batch_size == Some(0) {
            return invalid("batch size must be at least 1".to_string());
        }
        if self.max_boxes == 0 {
            return invalid("max_boxes must be at least 1".to_string());
        }
        if self.image_size.width == 0 || self.image_size.height == 0 {
            return invalid(format!("image size {:?} has a zero side", self.image_size));
        }
        if self.box_size.width < 2 || self.box_size.height < 2 {
            return invalid(format!("box grid {:?} is too small", self.box_size));
        }
        if self.image_std.iter().any(|s| *s == 0.0) {
            return invalid("normalization std must be non-zero".to_string());
        }

        if self.max_boxes > self.rank_tokens {
            return invalid(format!(
                "max_boxes {} exceeds the model's {} rank tokens",
                self.max_boxes, self.rank_tokens
            ));
        }

        let rank_offset = self.box_size.height as i64;
        let rank_end = rank_offset + self.rank_tokens as i64;
        let token_sep_id = self.token_sep_id.unwrap_or(rank_end + 1);
        let token_pad_id = self.token_pad_id.unwrap_or(token_sep_id + 1);

        if token_sep_id == token_pad_id {
            return invalid(format!(
                "separator and padding tokens are both {token_pad_id}"
            ));
        }
        for (name, id) in [("separator", token_sep_id), ("padding", token_pad_id)] {
            if (rank_offset..rank_end).contains(&id) {
                return invalid(format!(
                    "{name} token {id} collides with rank tokens {rank_offset}..{rank_end}"
                ));
            }
        }

        Ok(OrderConfig {
            device: self.device,
            batch_size: self.batch_size,
            max_boxes: self.max_boxes,
            rank_tokens: self.rank_tokens,
            image_size: self.image_size,
            box_size: self.box_size,
            token_sep_id,
            token_pad_id,
            image_mean: self.image_mean,
            image_std: self.image_std,
        })
    }
}
