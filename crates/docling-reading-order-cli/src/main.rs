//! `docling-order`: predict the reading order of layout boxes on page images.
//!
//! ```text
//! docling-order request.json --encoder order_encoder.onnx --decoder order_decoder.onnx -o order.json
//! ```

mod request;

use anyhow::{bail, Context, Result};
use clap::Parser;
use docling_reading_order::models::onnx::OnnxOrderOracle;
use docling_reading_order::{Device, OrderConfigBuilder, PageSample, ReadingOrderPredictor};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array3;
use request::{load_image, OrderRequest, OrderResponse, PageResponse};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "docling-order",
    about = "Predict the reading order of layout boxes on page images",
    long_about = "Predict the reading order of layout boxes on page images.\n\
                  \n\
                  Batch size, box limit and device default to ORDER_BATCH_SIZE,\n\
                  ORDER_MAX_BOXES and ORDER_DEVICE when set.",
    version
)]
struct Args {
    /// Request JSON listing page images, boxes and optional labels
    #[arg(value_name = "REQUEST")]
    request: PathBuf,

    /// Exported encoder graph
    #[arg(long, value_name = "ONNX")]
    encoder: PathBuf,

    /// Exported decoder graph
    #[arg(long, value_name = "ONNX")]
    decoder: PathBuf,

    /// Compute device: cpu, mps, cuda or cuda:N
    #[arg(long)]
    device: Option<Device>,

    /// Pages per batch
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Maximum boxes per page (also the decoding step cap)
    #[arg(long, value_name = "N")]
    max_boxes: Option<usize>,

    /// Output file (stdout when omitted)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Suppress the progress bar and summary
    #[arg(short, long)]
    quiet: bool,
}

fn progress_bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages {msg}")
            .expect("template is compile-time constant")
            .progress_chars("█▓▒░  "),
    );
    pb
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut builder = OrderConfigBuilder::from_env();
    if let Some(device) = args.device {
        builder = builder.device(device);
    }
    if let Some(batch_size) = args.batch_size {
        builder = builder.batch_size(batch_size);
    }
    if let Some(max_boxes) = args.max_boxes {
        builder = builder.max_boxes(max_boxes);
    }
    let config = builder.build()?;

    let request = OrderRequest::load(&args.request)?;
    log::info!(
        "Ordering {} pages on {} (batch size {})",
        request.pages.len(),
        config.device,
        config.batch_size()
    );

    let oracle = OnnxOrderOracle::load(&args.encoder, &args.decoder, config.device)
        .context("Failed to load the reading order model")?;
    let mut predictor = ReadingOrderPredictor::new(oracle, config)?;

    // Pages whose image cannot be read are reported and skipped
    let images: Vec<Result<Array3<u8>>> = request
        .pages
        .iter()
        .map(|page| load_image(&page.image))
        .collect();
    let loaded: Vec<(usize, &Array3<u8>)> = images
        .iter()
        .enumerate()
        .filter_map(|(i, image)| image.as_ref().ok().map(|img| (i, img)))
        .collect();
    let samples: Vec<PageSample<'_>> = loaded
        .iter()
        .map(|&(i, image)| {
            let page = &request.pages[i];
            let sample = PageSample::new(image, &page.bboxes);
            match &page.labels {
                Some(labels) => sample.with_labels(labels),
                None => sample,
            }
        })
        .collect();

    let start = Instant::now();
    let pb = progress_bar(samples.len(), args.quiet);
    let results = predictor.predict_each_with_progress(&samples, |progress| {
        pb.set_position(progress.samples_done as u64);
        pb.set_message(format!(
            "(batch {}/{})",
            progress.batch_index + 1,
            progress.num_batches
        ));
    });
    pb.finish_and_clear();

    let mut pages: Vec<PageResponse> = request
        .pages
        .iter()
        .zip(&images)
        .map(|(page, image)| PageResponse {
            image: page.image.clone(),
            result: None,
            error: image.as_ref().err().map(|e| format!("{e:#}")),
        })
        .collect();
    for (&(i, _), result) in loaded.iter().zip(results) {
        match result {
            Ok(order) => pages[i].result = Some(order),
            Err(e) => pages[i].error = Some(e.to_string()),
        }
    }

    let failed = pages.iter().filter(|p| p.error.is_some()).count();
    let json = serde_json::to_string_pretty(&OrderResponse { pages })?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    if !args.quiet {
        eprintln!(
            "Ordered {} pages in {:.2}s ({failed} failed)",
            images.len(),
            start.elapsed().as_secs_f64()
        );
    }
    if failed > 0 {
        bail!("{failed} of {} pages failed", images.len());
    }
    Ok(())
}
