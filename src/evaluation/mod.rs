//! Reference-free evaluation of RAG answers.

pub mod evaluator;
pub mod judge;
pub mod metrics;
pub mod service;
pub mod types;

pub use evaluator::{EvaluationError, RagasEvaluator};
pub use judge::LlmJudge;
pub use service::{EvaluationFlowError, EvaluationResponse, EvaluationService, ExportOutcome};
pub use types::{EvaluationMetrics, EvaluationRecord, EvaluationReport, MetricSummary};
