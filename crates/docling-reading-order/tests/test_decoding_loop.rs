//! Decoding loop behavior seen through the public predictor API.

mod common;

use common::{blank_image, ranked_boxes, test_config, Script, ScriptedOracle, GRID, MAX_BOXES};
use docling_reading_order::{OrderConfigBuilder, OrderError, PageSample, ReadingOrderPredictor};

#[test]
fn test_masking_prevents_duplicate_ranks() {
    let config = test_config(4);
    let image = blank_image();
    // The model wants rank 0 twice and rank 1 twice
    let boxes = ranked_boxes(&[0, 0, 1, 1]);

    let oracle = ScriptedOracle::new(&config, Script::Follow);
    let mut predictor = ReadingOrderPredictor::new(oracle, config).unwrap();
    let results = predictor.predict(&[PageSample::new(&image, &boxes)]).unwrap();

    // Masked picks fall back to the lowest unused rank
    assert_eq!(results[0].positions(), vec![0, 1, 2, 3]);
}

#[test]
fn test_early_terminator_fails_only_that_call() {
    let config = test_config(2);
    let image = blank_image();
    let boxes = ranked_boxes(&[1, 0, 2]);
    let samples = [
        PageSample::new(&image, &boxes),
        PageSample::new(&image, &boxes),
        PageSample::new(&image, &boxes),
    ];

    let oracle = ScriptedOracle::new(&config, Script::StopAfter(1));
    let mut predictor = ReadingOrderPredictor::new(oracle, config).unwrap();

    match predictor.predict(&samples).unwrap_err() {
        OrderError::OracleContract {
            sample_index,
            reason,
        } => {
            assert_eq!(sample_index, 0);
            assert!(reason.contains("expected 3 ranks, got 1"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }

    let results = predictor.predict_each(&samples);
    for (i, result) in results.iter().enumerate() {
        match result {
            Err(OrderError::OracleContract { sample_index, .. }) => assert_eq!(*sample_index, i),
            other => panic!("sample {i}: unexpected result {other:?}"),
        }
    }
}

#[test]
fn test_out_of_range_rank_is_isolated_to_its_sample() {
    let config = test_config(2);
    let image = blank_image();
    let good = ranked_boxes(&[1, 0]);
    // Rank 5 does not exist on a two-box page
    let bad = ranked_boxes(&[0, 5]);
    let samples = [PageSample::new(&image, &good), PageSample::new(&image, &bad)];

    let oracle = ScriptedOracle::new(&config, Script::Follow);
    let mut predictor = ReadingOrderPredictor::new(oracle, config).unwrap();
    let results = predictor.predict_each(&samples);

    assert_eq!(results[0].as_ref().unwrap().positions(), vec![1, 0]);
    assert!(results[1].as_ref().unwrap_err().is_oracle_contract_error());
}

#[test]
fn test_non_terminating_model_stops_at_step_cap() {
    let config = test_config(1);
    let image = blank_image();
    let ranks: Vec<usize> = (0..MAX_BOXES).rev().collect();
    let boxes = ranked_boxes(&ranks);

    let oracle = ScriptedOracle::new(&config, Script::NeverStop);
    let mut predictor = ReadingOrderPredictor::new(oracle, config).unwrap();
    let results = predictor.predict(&[PageSample::new(&image, &boxes)]).unwrap();

    assert_eq!(predictor.oracle().calls, MAX_BOXES);
    assert_eq!(results[0].positions(), ranks);
}

#[test]
fn test_non_terminating_model_below_cap_is_contract_error() {
    let config = test_config(1);
    let image = blank_image();
    let boxes = ranked_boxes(&[2, 0, 1]);

    let oracle = ScriptedOracle::new(&config, Script::NeverStop);
    let mut predictor = ReadingOrderPredictor::new(oracle, config).unwrap();
    let err = predictor
        .predict(&[PageSample::new(&image, &boxes)])
        .unwrap_err();

    assert!(err.is_oracle_contract_error());
    // Three ranks, then one step whose only choices are invalid
    assert_eq!(predictor.oracle().calls, 4);
}

#[test]
fn test_encoder_state_built_once_per_batch() {
    let config = test_config(3);
    let image = blank_image();
    let boxes = ranked_boxes(&[0, 1]);
    let samples: Vec<_> = (0..7).map(|_| PageSample::new(&image, &boxes)).collect();

    let oracle = ScriptedOracle::new(&config, Script::Follow);
    let mut predictor = ReadingOrderPredictor::new(oracle, config).unwrap();
    let results = predictor.predict(&samples).unwrap();

    assert_eq!(results.len(), 7);
    let oracle = predictor.into_oracle();
    assert_eq!(oracle.batches, 3);
    // Two ranks plus the terminator per batch
    assert_eq!(oracle.calls, 9);
}

#[test]
fn test_lower_box_limit_keeps_model_terminator() {
    // The oracle knows the model's terminator; the caller only lowers the box limit
    let model_config = test_config(1);
    let config = OrderConfigBuilder::new()
        .image_size(8, 8)
        .box_size(GRID, GRID)
        .max_boxes(4)
        .batch_size(1)
        .build()
        .unwrap();
    assert_eq!(config.token_pad_id, model_config.token_pad_id);
    assert_eq!(config.token_sep_id, model_config.token_sep_id);

    let image = blank_image();
    let boxes = ranked_boxes(&[0]);
    let oracle = ScriptedOracle::new(&model_config, Script::Follow);
    let mut predictor = ReadingOrderPredictor::new(oracle, config).unwrap();
    let results = predictor.predict(&[PageSample::new(&image, &boxes)]).unwrap();

    assert_eq!(results[0].positions(), vec![0]);
    assert_eq!(predictor.oracle().calls, 2);
}
