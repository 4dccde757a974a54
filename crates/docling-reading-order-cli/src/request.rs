//! Request and response documents of the `docling-order` command.
//!
//! ```json
//! {
//!   "pages": [
//!     {
//!       "image": "page-001.png",
//!       "bboxes": [{"l": 72.0, "t": 40.0, "r": 540.0, "b": 60.0}],
//!       "labels": ["Page-header"]
//!     }
//!   ]
//! }
//! ```
//!
//! Relative image paths resolve against the request file's directory.

use anyhow::{Context, Result};
use docling_reading_order::{BoundingBox, OrderResult};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub pages: Vec<PageRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageRequest {
    pub image: PathBuf,
    #[serde(default)]
    pub bboxes: Vec<BoundingBox>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub pages: Vec<PageResponse>,
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub image: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OrderResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrderRequest {
    /// Read a request and resolve its image paths
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request {}", path.display()))?;
        let mut request: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse request {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for page in &mut request.pages {
            if page.image.is_relative() {
                page.image = base.join(&page.image);
            }
        }
        Ok(request)
    }
}

/// Decode an image file into an `[H, W, 3]` RGB array
pub fn load_image(path: &Path) -> Result<Array3<u8>> {
    let rgb = image::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw())
        .context("Image buffer does not match its dimensions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_load_resolves_relative_images() {
        let dir = tempfile::tempdir().unwrap();
        let request_path = dir.path().join("request.json");
        std::fs::write(
            &request_path,
            r#"{"pages": [
                {"image": "a.png", "bboxes": [{"l": 1, "t": 2, "r": 3, "b": 4}], "labels": ["Text"]},
                {"image": "/abs/b.png"}
            ]}"#,
        )
        .unwrap();

        let request = OrderRequest::load(&request_path).unwrap();
        assert_eq!(request.pages.len(), 2);
        assert_eq!(request.pages[0].image, dir.path().join("a.png"));
        assert_eq!(request.pages[0].bboxes[0], BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(request.pages[0].labels.as_deref(), Some(&["Text".to_string()][..]));
        assert_eq!(request.pages[1].image, PathBuf::from("/abs/b.png"));
        assert!(request.pages[1].bboxes.is_empty());
        assert!(request.pages[1].labels.is_none());
    }

    #[test]
    fn test_load_image_is_hwc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([10, 20, 30]));
        img.save(&path).unwrap();

        let array = load_image(&path).unwrap();
        assert_eq!(array.dim(), (2, 3, 3));
        assert_eq!(array[[1, 2, 0]], 10);
        assert_eq!(array[[1, 2, 2]], 30);
    }

    #[test]
    fn test_missing_request_is_error() {
        assert!(OrderRequest::load(Path::new("/nonexistent/request.json")).is_err());
    }
}
