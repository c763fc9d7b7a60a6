//! Request flows behind `/train` and `/predict`.

use std::time::Duration;

pub mod predict;
pub mod train;

pub use predict::{PredictError, PredictFlow, PredictResponse};
pub use train::{TrainError, TrainFlow, TrainResponse, Upload};

/// Formats a step duration the way timing breakdowns report it, e.g. `"0.123s"`.
pub fn format_secs(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

/// First `max` characters of `text` for log previews.
pub(crate) fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
