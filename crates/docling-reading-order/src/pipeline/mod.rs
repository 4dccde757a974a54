//! # Reading order pipeline
//!
//! | Stage | Module | Input | Output |
//! |-------|--------|-------|--------|
//! | Decoding | [`decoding`] | preprocessed batch + oracle | predicted rank per box |
//! | Reordering | [`reorder`] | raw ranks + labels | final ranks |
//! | Assembly | [`assembly`] | boxes + final ranks | [`OrderResult`](crate::OrderResult) |
//! | Orchestration | [`executor`] | page samples | one result per page |

pub mod assembly;
pub mod decoding;
pub mod executor;
pub mod reorder;

pub use assembly::assemble_result;
pub use decoding::{decode_batch, DecodeOutcome, DecodeParams, DecodeState, DecodeStatus};
pub use executor::{infer_reading_order, ReadingOrderPredictor};
pub use reorder::apply_structural_order;
