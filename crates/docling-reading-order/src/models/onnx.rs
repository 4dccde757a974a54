// Intentional ML conversions: ONNX shapes are i64
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

//! ONNX Runtime binding of the ordering model
//!
//! The model is exported as two graphs:
//!
//! | Graph | Inputs | Outputs |
//! |-------|--------|---------|
//! | encoder | `pixel_values [B,3,H,W] f32` | hidden states (first output) |
//! | decoder | `encoder_hidden_states`, `input_boxes [B,S,4] i64`, `input_boxes_mask [B,S] i64`, `input_boxes_counts [B,2] i64` | `logits [B,S,C]` or `[B,C]` |
//!
//! The encoder runs once per batch. The decoder graph has no past-key-value inputs, so
//! the cache keeps the full box history and the decoder is rerun over it on every step;
//! only the last position's logits are returned.
//!
//! Environment:
//! - `ORDER_ONNX_THREADS`: intra-op threads (default: physical cores, clamped to 1..=8)
//! - `ORT_FORCE_CPU`: ignore the requested device and use the CPU provider

use crate::config::Device;
use crate::error::{OrderError, Result};
use crate::models::oracle::{InferenceOracle, OracleInput, OracleOutput};
use ndarray::{concatenate, Array2, Array3, Axis};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;

const ENCODER_NAME: &str = "OrderEncoderOnnx";
const DECODER_NAME: &str = "OrderDecoderOnnx";

/// Environment variable overriding the ONNX intra-op thread count
pub const ENV_ONNX_THREADS: &str = "ORDER_ONNX_THREADS";

/// Decoding state carried between steps of one batch
#[derive(Debug, Clone)]
pub struct OnnxDecodeCache {
    encoder_shape: Vec<usize>,
    encoder_hidden: Vec<f32>,
    boxes: Array3<i64>,
    mask: Array2<i64>,
}

impl OnnxDecodeCache {
    /// Number of box positions seen so far
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.boxes.dim().1
    }
}

/// Encoder/decoder pair running on ONNX Runtime
pub struct OnnxOrderOracle {
    encoder: Session,
    decoder: Session,
    device: Device,
}

impl std::fmt::Debug for OnnxOrderOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxOrderOracle")
            .field("encoder", &"<Session>")
            .field("decoder", &"<Session>")
            .field("device", &self.device)
            .finish()
    }
}

impl OnnxOrderOracle {
    /// Load the exported encoder and decoder graphs
    ///
    /// # Example
    /// ```no_run
    /// use docling_reading_order::models::onnx::OnnxOrderOracle;
    /// use docling_reading_order::Device;
    ///
    /// let oracle = OnnxOrderOracle::load("encoder.onnx", "decoder.onnx", Device::Cpu)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `OrderError::ModelLoad` if a file is missing or cannot be loaded.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        encoder_path: P,
        decoder_path: Q,
        device: Device,
    ) -> Result<Self> {
        let device = if std::env::var("ORT_FORCE_CPU").is_ok() {
            log::debug!("ORT_FORCE_CPU set - forcing CPU execution provider");
            Device::Cpu
        } else {
            device
        };
        let num_threads = onnx_threads();
        log::debug!("Reading order ONNX sessions using {num_threads} threads on {device}");

        let encoder = load_session(ENCODER_NAME, encoder_path.as_ref(), device, num_threads)?;
        let decoder = load_session(DECODER_NAME, decoder_path.as_ref(), device, num_threads)?;

        Ok(Self {
            encoder,
            decoder,
            device,
        })
    }

    /// Device the sessions were created for
    #[inline]
    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }

    fn encode(&mut self, input: &OracleInput<'_>) -> Result<(Vec<usize>, Vec<f32>)> {
        let pixels = input.pixel_values;
        let shape = pixels.shape().to_vec();
        let data = pixels
            .as_slice()
            .map_or_else(|| pixels.iter().copied().collect(), <[f32]>::to_vec);

        let pixel_value = ort::value::Value::from_array((shape.as_slice(), data))
            .map_err(|e| OrderError::inference(ENCODER_NAME, e))?;
        let outputs = self
            .encoder
            .run(ort::inputs!["pixel_values" => pixel_value])
            .map_err(|e| OrderError::inference(ENCODER_NAME, e))?;

        let (hidden_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OrderError::inference(ENCODER_NAME, e))?;
        let hidden_shape: Vec<usize> = hidden_shape.iter().map(|&d| d as usize).collect();
        let hidden = hidden.to_vec();
        drop(outputs);

        log::trace!("Encoded batch: hidden states {hidden_shape:?}");
        Ok((hidden_shape, hidden))
    }

    fn decode(&mut self, cache: &OnnxDecodeCache, counts: &Array2<i64>) -> Result<Array2<f32>> {
        let hidden = ort::value::Value::from_array((
            cache.encoder_shape.as_slice(),
            cache.encoder_hidden.clone(),
        ))
        .map_err(|e| OrderError::inference(DECODER_NAME, e))?;
        let boxes = ort::value::Value::from_array((
            cache.boxes.shape().to_vec().as_slice(),
            cache.boxes.iter().copied().collect::<Vec<i64>>(),
        ))
        .map_err(|e| OrderError::inference(DECODER_NAME, e))?;
        let mask = ort::value::Value::from_array((
            cache.mask.shape().to_vec().as_slice(),
            cache.mask.iter().copied().collect::<Vec<i64>>(),
        ))
        .map_err(|e| OrderError::inference(DECODER_NAME, e))?;
        let counts = ort::value::Value::from_array((
            counts.shape().to_vec().as_slice(),
            counts.iter().copied().collect::<Vec<i64>>(),
        ))
        .map_err(|e| OrderError::inference(DECODER_NAME, e))?;

        let outputs = self
            .decoder
            .run(ort::inputs![
                "encoder_hidden_states" => hidden,
                "input_boxes" => boxes,
                "input_boxes_mask" => mask,
                "input_boxes_counts" => counts
            ])
            .map_err(|e| OrderError::inference(DECODER_NAME, e))?;

        let (shape, data) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| OrderError::inference(DECODER_NAME, e))?;

        // [B, S, C]: keep the last position. [B, C]: already per-sample.
        let logits = match shape.len() {
            3 => {
                let (batch, seq, classes) =
                    (shape[0] as usize, shape[1] as usize, shape[2] as usize);
                let full = ndarray::ArrayView3::from_shape((batch, seq, classes), data)?;
                full.index_axis(Axis(1), seq.saturating_sub(1)).to_owned()
            }
            2 => {
                let (batch, classes) = (shape[0] as usize, shape[1] as usize);
                ndarray::ArrayView2::from_shape((batch, classes), data)?.to_owned()
            }
            _ => {
                return Err(OrderError::inference(
                    DECODER_NAME,
                    format!("unexpected logits shape {:?}", &shape[..]),
                ))
            }
        };
        drop(outputs);

        Ok(logits)
    }
}

impl InferenceOracle for OnnxOrderOracle {
    type Cache = OnnxDecodeCache;

    fn step(
        &mut self,
        input: &OracleInput<'_>,
        cache: Option<OnnxDecodeCache>,
    ) -> Result<OracleOutput<OnnxDecodeCache>> {
        let cache = match cache {
            None => {
                let (encoder_shape, encoder_hidden) = self.encode(input)?;
                OnnxDecodeCache {
                    encoder_shape,
                    encoder_hidden,
                    boxes: input.input_boxes.to_owned(),
                    mask: input.input_boxes_mask.to_owned(),
                }
            }
            Some(prev) => OnnxDecodeCache {
                boxes: concatenate(Axis(1), &[prev.boxes.view(), input.input_boxes.view()])?,
                mask: concatenate(Axis(1), &[prev.mask.view(), input.input_boxes_mask.view()])?,
                encoder_shape: prev.encoder_shape,
                encoder_hidden: prev.encoder_hidden,
            },
        };

        log::trace!("{DECODER_NAME}: decoding over {} box positions", cache.history_len());
        let logits = self.decode(&cache, &input.input_boxes_counts.to_owned())?;
        Ok(OracleOutput { logits, cache })
    }
}

fn onnx_threads() -> usize {
    std::env::var(ENV_ONNX_THREADS)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| num_cpus::get_physical().clamp(1, 8))
}

fn load_session(name: &str, path: &Path, device: Device, num_threads: usize) -> Result<Session> {
    if !path.exists() {
        return Err(OrderError::ModelLoad {
            model_name: name.to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Model file not found: {}", path.display()),
            )),
        });
    }

    let build = || -> ort::Result<Session> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?;
        let builder = match device {
            Device::Cpu => builder,
            Device::Cuda(_) => builder.with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ])?,
            // ONNX Runtime has no MPS provider; CoreML covers Apple Silicon
            Device::Mps => {
                builder.with_execution_providers([CoreMLExecutionProvider::default().build()])?
            }
        };
        builder.commit_from_file(path)
    };

    let session = build().map_err(|e| OrderError::ModelLoad {
        model_name: name.to_string(),
        source: Box::new(e),
    })?;

    log::debug!("Loaded {name} from: {}", path.display());
    log::debug!(
        "  Inputs: {:?}",
        session.inputs.iter().map(|i| &i.name).collect::<Vec<_>>()
    );
    log::debug!(
        "  Outputs: {:?}",
        session.outputs.iter().map(|o| &o.name).collect::<Vec<_>>()
    );
    Ok(session)
}
