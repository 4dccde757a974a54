//! Request and result types for reading-order inference

use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Label of boxes that are always read first
pub const PAGE_HEADER_LABEL: &str = "Page-header";

/// Label of boxes that are always read last
pub const PAGE_FOOTER_LABEL: &str = "Page-footer";

/// Axis-aligned box in image pixel space (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left
    pub l: f32,
    /// Top
    pub t: f32,
    /// Right
    pub r: f32,
    /// Bottom
    pub b: f32,
}

impl BoundingBox {
    #[inline]
    #[must_use]
    pub const fn new(l: f32, t: f32, r: f32, b: f32) -> Self {
        Self { l, t, r, b }
    }

    #[inline]
    #[must_use]
    pub const fn to_array(self) -> [f32; 4] {
        [self.l, self.t, self.r, self.b]
    }
}

impl From<[f32; 4]> for BoundingBox {
    #[inline]
    fn from([l, t, r, b]: [f32; 4]) -> Self {
        Self { l, t, r, b }
    }
}

/// Structural group a label places a box in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReadingGroup {
    /// `Page-header` boxes
    Header,
    /// Everything that is neither header nor footer
    Body,
    /// `Page-footer` boxes
    Footer,
}

impl ReadingGroup {
    /// Classify a label; matching is exact and case-sensitive
    #[inline]
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            PAGE_HEADER_LABEL => Self::Header,
            PAGE_FOOTER_LABEL => Self::Footer,
            _ => Self::Body,
        }
    }
}

/// One page to order: a borrowed view over the caller's image, boxes and labels
#[derive(Debug, Clone, Copy)]
pub struct PageSample<'a> {
    /// RGB page image, HWC, u8
    pub image: &'a Array3<u8>,
    /// Boxes in the caller's order
    pub bboxes: &'a [BoundingBox],
    /// Optional labels, one per box
    pub labels: Option<&'a [String]>,
}

impl<'a> PageSample<'a> {
    #[inline]
    #[must_use]
    pub const fn new(image: &'a Array3<u8>, bboxes: &'a [BoundingBox]) -> Self {
        Self {
            image,
            bboxes,
            labels: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_labels(mut self, labels: &'a [String]) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Number of boxes to rank
    #[inline]
    #[must_use]
    pub fn box_count(&self) -> usize {
        self.bboxes.len()
    }

    /// Original image size as `(width, height)`
    #[inline]
    #[must_use]
    pub fn image_size(&self) -> (usize, usize) {
        let (height, width, _) = self.image.dim();
        (width, height)
    }
}

/// A box with its final reading position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBox {
    pub bbox: BoundingBox,
    /// 0-based position, unique and dense within its page
    pub position: usize,
}

/// Reading order for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    /// Boxes in the caller's original order, each carrying its position
    pub bboxes: Vec<OrderBox>,
    /// `[0, 0, width, height]` of the original image
    pub image_bbox: [f32; 4],
}

impl OrderResult {
    /// Boxes sorted by reading position
    #[must_use]
    pub fn in_reading_order(&self) -> Vec<OrderBox> {
        let mut ordered = self.bboxes.clone();
        ordered.sort_by_key(|b| b.position);
        ordered
    }

    /// Positions in the caller's box order
    #[must_use]
    pub fn positions(&self) -> Vec<usize> {
        self.bboxes.iter().map(|b| b.position).collect()
    }
}
