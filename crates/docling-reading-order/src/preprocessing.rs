// Intentional ML conversions: image dimensions, pixel coordinates, token ids
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

//! Ordering model preprocessing
//!
//! Turns a batch of [`PageSample`]s into the tensors the ordering model consumes.
//!
//! Pipeline per image:
//! 1. Resize to the configured model size (bilinear)
//! 2. Rescale to [0, 1] by dividing by 255
//! 3. Normalize with per-channel mean/std
//! 4. Convert HWC → CHW and stack into `[B, 3, H, W]`
//!
//! Pipeline per box list:
//! 1. Scale pixel coordinates into the box grid, round, clamp to `[0, side - 1]`
//! 2. Append one separator box (`token_sep_id` x4) marking where ranking starts
//! 3. Left-pad with `token_pad_id` boxes to the widest sample of the batch
//!
//! The mask is 0 on padding and 1 elsewhere; counts hold `(pad_len, width)` per sample.

use crate::config::{GridSize, OrderConfig};
use crate::data_structures::{BoundingBox, PageSample};
use crate::error::{OrderError, Result};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{s, Array2, Array3, Array4};

/// Tensors for one batch, as consumed by the inference oracle at step 0
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedBatch {
    /// `[B, 3, H, W]` normalized pixels
    pub pixel_values: Array4<f32>,
    /// `[B, W, 4]` left-padded box tokens
    pub input_boxes: Array3<i64>,
    /// `[B, W]` validity mask
    pub input_boxes_mask: Array2<i64>,
    /// `[B, 2]` rows of `(pad_len, width)`
    pub input_boxes_counts: Array2<i64>,
    /// True number of boxes per sample
    pub box_counts: Vec<usize>,
}

impl PreprocessedBatch {
    /// Number of samples in the batch
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.box_counts.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.box_counts.is_empty()
    }
}

/// Converts samples into model tensors
pub trait Preprocessor {
    /// # Errors
    ///
    /// Returns `OrderError::Preprocessing` when an image or box list cannot be encoded.
    fn preprocess(&self, samples: &[PageSample<'_>]) -> Result<PreprocessedBatch>;
}

/// Default preprocessor for the ordering model
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPreprocessor {
    image_size: GridSize,
    box_size: GridSize,
    token_sep_id: i64,
    token_pad_id: i64,
    image_mean: [f32; 3],
    image_std: [f32; 3],
}

impl OrderPreprocessor {
    #[must_use]
    pub fn from_config(config: &OrderConfig) -> Self {
        Self {
            image_size: config.image_size,
            box_size: config.box_size,
            token_sep_id: config.token_sep_id,
            token_pad_id: config.token_pad_id,
            image_mean: config.image_mean,
            image_std: config.image_std,
        }
    }

    /// Resize and normalize one RGB image into a `[3, H, W]` tensor
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Preprocessing` for non-RGB or empty images.
    pub fn preprocess_image(&self, image: &Array3<u8>) -> Result<Array3<f32>> {
        let (height, width, channels) = image.dim();
        if channels != 3 {
            return Err(OrderError::Preprocessing {
                reason: format!("expected an RGB image with 3 channels, got {channels}"),
            });
        }
        if height == 0 || width == 0 {
            return Err(OrderError::Preprocessing {
                reason: format!("image has zero size ({width}x{height})"),
            });
        }

        // iter() walks logical HWC order, so non-contiguous views are fine
        let raw: Vec<u8> = image.iter().copied().collect();
        let rgb = RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(|| {
            OrderError::Preprocessing {
                reason: format!("could not wrap {width}x{height} image buffer"),
            }
        })?;

        let target = self.image_size;
        let resized = image::imageops::resize(
            &rgb,
            target.width as u32,
            target.height as u32,
            FilterType::Triangle,
        );

        let mut tensor = Array3::<f32>::zeros((3, target.height, target.width));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                tensor[[c, y as usize, x as usize]] =
                    (value - self.image_mean[c]) / self.image_std[c];
            }
        }
        Ok(tensor)
    }

    /// Quantize one pixel-space box into the box grid
    #[must_use]
    pub fn quantize_box(&self, bbox: &BoundingBox, image_width: usize, image_height: usize) -> [i64; 4] {
        let scale_x = self.box_size.width as f32 / image_width.max(1) as f32;
        let scale_y = self.box_size.height as f32 / image_height.max(1) as f32;
        let max_x = (self.box_size.width - 1) as f32;
        let max_y = (self.box_size.height - 1) as f32;

        let quantize = |v: f32, scale: f32, max: f32| (v * scale).round().clamp(0.0, max) as i64;
        [
            quantize(bbox.l, scale_x, max_x),
            quantize(bbox.t, scale_y, max_y),
            quantize(bbox.r, scale_x, max_x),
            quantize(bbox.b, scale_y, max_y),
        ]
    }
}

impl Preprocessor for OrderPreprocessor {
    fn preprocess(&self, samples: &[PageSample<'_>]) -> Result<PreprocessedBatch> {
        if samples.is_empty() {
            return Err(OrderError::Preprocessing {
                reason: "cannot preprocess an empty batch".to_string(),
            });
        }

        let batch = samples.len();
        let target = self.image_size;

        let mut pixel_values = Array4::<f32>::zeros((batch, 3, target.height, target.width));
        for (i, sample) in samples.iter().enumerate() {
            let tensor = self.preprocess_image(sample.image)?;
            pixel_values.slice_mut(s![i, .., .., ..]).assign(&tensor);
        }

        // One extra slot per sample for the separator box
        let box_counts: Vec<usize> = samples.iter().map(PageSample::box_count).collect();
        let width = box_counts.iter().max().copied().unwrap_or(0) + 1;

        let mut input_boxes = Array3::<i64>::from_elem((batch, width, 4), self.token_pad_id);
        let mut input_boxes_mask = Array2::<i64>::zeros((batch, width));
        let mut input_boxes_counts = Array2::<i64>::zeros((batch, 2));

        for (i, sample) in samples.iter().enumerate() {
            let (image_width, image_height) = sample.image_size();
            let pad_len = width - (sample.box_count() + 1);

            for (j, bbox) in sample.bboxes.iter().enumerate() {
                let tokens = self.quantize_box(bbox, image_width, image_height);
                for (k, token) in tokens.into_iter().enumerate() {
                    input_boxes[[i, pad_len + j, k]] = token;
                }
            }
            input_boxes
                .slice_mut(s![i, width - 1, ..])
                .fill(self.token_sep_id);
            input_boxes_mask.slice_mut(s![i, pad_len..]).fill(1);
            input_boxes_counts[[i, 0]] = pad_len as i64;
            input_boxes_counts[[i, 1]] = width as i64;
        }

        log::trace!(
            "Preprocessed batch of {batch}: pixels {:?}, boxes {:?}",
            pixel_values.dim(),
            input_boxes.dim()
        );

        Ok(PreprocessedBatch {
            pixel_values,
            input_boxes,
            input_boxes_mask,
            input_boxes_counts,
            box_counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrderConfigBuilder;

    fn small_preprocessor() -> OrderPreprocessor {
        let config = OrderConfigBuilder::new()
            .image_size(8, 6)
            .box_size(100, 100)
            .max_boxes(16)
            .build()
            .unwrap();
        OrderPreprocessor::from_config(&config)
    }

    #[test]
    fn test_pixel_tensor_shape_and_normalization() {
        let pre = OrderPreprocessor::from_config(
            &OrderConfigBuilder::new()
                .image_size(8, 6)
                .normalization([0.5; 3], [0.5; 3])
                .build()
                .unwrap(),
        );
        let image = Array3::<u8>::from_elem((20, 10, 3), 255);
        let tensor = pre.preprocess_image(&image).unwrap();
        assert_eq!(tensor.dim(), (3, 6, 8));
        assert!(tensor.iter().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_rejects_non_rgb_images() {
        let pre = small_preprocessor();
        let gray = Array3::<u8>::zeros((10, 10, 1));
        assert!(matches!(
            pre.preprocess_image(&gray),
            Err(OrderError::Preprocessing { .. })
        ));
        let empty = Array3::<u8>::zeros((0, 10, 3));
        assert!(pre.preprocess_image(&empty).is_err());
    }

    #[test]
    fn test_quantize_box_scales_and_clamps() {
        let pre = small_preprocessor();
        let tokens = pre.quantize_box(&BoundingBox::new(10.0, 20.0, 50.0, 400.0), 200, 200);
        assert_eq!(tokens, [5, 10, 25, 99]);

        let negative = pre.quantize_box(&BoundingBox::new(-5.0, 0.0, 1.0, 1.0), 200, 200);
        assert_eq!(negative[0], 0);
    }

    #[test]
    fn test_boxes_are_left_padded_with_separator() {
        let pre = small_preprocessor();
        let config = OrderConfigBuilder::new()
            .box_size(100, 100)
            .max_boxes(16)
            .build()
            .unwrap();
        let (sep, pad) = (config.token_sep_id, config.token_pad_id);

        let image = Array3::<u8>::zeros((100, 100, 3));
        let one = [BoundingBox::new(0.0, 0.0, 10.0, 10.0)];
        let three = [
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(10.0, 10.0, 20.0, 20.0),
            BoundingBox::new(20.0, 20.0, 30.0, 30.0),
        ];
        let samples = [PageSample::new(&image, &one), PageSample::new(&image, &three)];

        let batch = pre.preprocess(&samples).unwrap();
        assert_eq!(batch.pixel_values.dim(), (2, 3, 6, 8));
        assert_eq!(batch.input_boxes.dim(), (2, 4, 4));
        assert_eq!(batch.box_counts, vec![1, 3]);

        // Sample 0: two padding slots, one box, separator
        assert!(batch.input_boxes.slice(s![0, 0..2, ..]).iter().all(|&t| t == pad));
        assert_eq!(
            batch.input_boxes.slice(s![0, 2, ..]).to_vec(),
            vec![0, 0, 10, 10]
        );
        assert!(batch.input_boxes.slice(s![0, 3, ..]).iter().all(|&t| t == sep));
        assert_eq!(batch.input_boxes_mask.row(0).to_vec(), vec![0, 0, 1, 1]);
        assert_eq!(batch.input_boxes_counts.row(0).to_vec(), vec![2, 4]);

        // Sample 1: no padding
        assert_eq!(batch.input_boxes_mask.row(1).to_vec(), vec![1, 1, 1, 1]);
        assert_eq!(batch.input_boxes_counts.row(1).to_vec(), vec![0, 4]);
        assert!(batch.input_boxes.slice(s![1, 3, ..]).iter().all(|&t| t == sep));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let pre = small_preprocessor();
        assert!(pre.preprocess(&[]).is_err());
    }
}
