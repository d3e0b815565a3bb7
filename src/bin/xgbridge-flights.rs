//! End-to-end run against the real native engine: train on a small flight
//! delay table, save, reload and predict.
//!
//! Usage: `xgbridge-flights [model path]` (defaults to `model.bin` in the
//! system temp directory).

use std::path::PathBuf;

use xgbridge::config;
use xgbridge::engine::XgboostEngine;
use xgbridge::gateway::Gateway;
use xgbridge::logging;
use xgbridge::validation::{
    FeatureMatrix, ImportanceType, LabelVector, Objective, TrainParams,
};

// distance, departure hour, day of week, carrier delay rate, weather index, load factor
const TRAIN_ROWS: [[f32; 6]; 5] = [
    [1200.0, 8.0, 1.0, 0.12, 0.3, 0.81],
    [800.0, 14.0, 3.0, 0.25, 0.7, 0.92],
    [2400.0, 19.0, 5.0, 0.18, 0.1, 0.77],
    [450.0, 6.0, 2.0, 0.05, 0.0, 0.64],
    [1600.0, 17.0, 7.0, 0.31, 0.9, 0.95],
];
const TRAIN_DELAYS: [f32; 5] = [12.0, 35.0, 20.0, 3.0, 48.0];
const QUERY_ROWS: [[f32; 6]; 3] = [
    [1000.0, 9.0, 2.0, 0.10, 0.2, 0.70],
    [2000.0, 18.0, 6.0, 0.28, 0.8, 0.93],
    [600.0, 7.0, 4.0, 0.07, 0.1, 0.66],
];

fn main() {
    if let Err(err) = logging::init_for("xgbridge-flights") {
        eprintln!("Logging disabled: {err}");
    }
    if let Err(err) = try_main() {
        tracing::error!("Flight demo failed: {err}");
        eprintln!("Flight demo failed: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    let model_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("model.bin"));
    let config = config::load_or_default()?;
    let gateway = Gateway::new(XgboostEngine::discover(&config.engine)?)?;

    let features = FeatureMatrix::from_rows(&TRAIN_ROWS)?;
    let labels = LabelVector::from_slice(&TRAIN_DELAYS)?;
    let params = TrainParams {
        max_depth: Some(3),
        eta: Some(0.1),
        objective: Some(Objective::SquaredError),
        ..TrainParams::default()
    };
    gateway.train(features, labels, params).wait()?;
    println!("Trained; state is {}", gateway.state());

    gateway.save(&model_path).wait()?;
    println!("Saved model to {}", model_path.display());
    gateway.unload();
    println!("Unloaded; state is {}", gateway.state());

    gateway.load(&model_path).wait()?;
    println!("Reloaded; state is {}", gateway.state());

    let predictions = gateway.predict(FeatureMatrix::from_rows(&QUERY_ROWS)?).wait()?;
    for (row, delay) in QUERY_ROWS.iter().zip(&predictions) {
        println!("distance {:>6.0} -> predicted delay {delay:.1} min", row[0]);
    }
    let importance = gateway.feature_importance(ImportanceType::Gain).wait()?;
    println!("Feature importance (gain): {importance:?}");
    Ok(())
}
