use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

use super::judge::LlmJudge;
use super::metrics::heuristic_metrics;
use super::types::{
    EvaluationMetrics, EvaluationPeriod, EvaluationRecord, EvaluationReport, EvaluationSummary,
    JudgeMetrics, MetricSummary,
};

pub const SATISFACTORY: &str = "Overall RAG performance appears satisfactory based on current metrics.";

const THRESHOLDS: [(&str, f64, &str); 4] = [
    (
        "faithfulness",
        0.7,
        "Low faithfulness scores indicate the model may be hallucinating. Consider improving context quality or adjusting the model prompt.",
    ),
    (
        "answer_relevancy",
        0.6,
        "Low answer relevancy suggests responses may not address user queries effectively. Review prompt engineering and context retrieval.",
    ),
    (
        "context_relevancy",
        0.5,
        "Low context relevancy indicates poor retrieval performance. Consider improving embedding model or retrieval strategy.",
    ),
    (
        "context_coverage",
        0.3,
        "Low context coverage suggests the model may not be utilizing retrieved information effectively.",
    ),
];

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode evaluation results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One item of a batch: query, answer, context chunks and metadata.
pub type BatchItem = (String, String, Vec<String>, Map<String, Value>);

/// Scores responses and keeps every result for reporting.
pub struct RagasEvaluator {
    judge: Option<LlmJudge>,
    history: RwLock<Vec<EvaluationRecord>>,
}

impl RagasEvaluator {
    /// Without a judge the four judge metrics are always reported as missing.
    pub fn new(judge: Option<LlmJudge>) -> Self {
        Self {
            judge,
            history: RwLock::new(Vec::new()),
        }
    }

    pub async fn evaluate_response(
        &self,
        query: &str,
        answer: &str,
        context_chunks: &[String],
        metadata: Map<String, Value>,
    ) -> EvaluationRecord {
        let started = Instant::now();
        tracing::info!(query = %crate::pipeline::preview(query, 100), "Starting evaluation");

        let judged = match &self.judge {
            Some(judge) => judge.score(query, answer, context_chunks).await,
            None => JudgeMetrics::default(),
        };
        let metrics = EvaluationMetrics::combine(judged, heuristic_metrics(query, answer, context_chunks));

        let record = EvaluationRecord {
            query: query.to_string(),
            answer: answer.to_string(),
            context_chunks: context_chunks.to_vec(),
            metrics,
            metadata,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        self.history.write().await.push(record.clone());
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation completed"
        );
        record
    }

    pub async fn evaluate_batch(&self, items: Vec<BatchItem>) -> Vec<EvaluationRecord> {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        for (i, (query, answer, chunks, metadata)) in items.into_iter().enumerate() {
            results.push(self.evaluate_response(&query, &answer, &chunks, metadata).await);
            tracing::info!("Completed evaluation {}/{}", i + 1, total);
        }
        results
    }

    pub async fn history(&self) -> Vec<EvaluationRecord> {
        self.history.read().await.clone()
    }

    /// Statistics per metric over the non-missing values.
    pub async fn metrics_summary(&self) -> BTreeMap<String, MetricSummary> {
        summarize(&self.history.read().await)
    }

    pub async fn report(&self) -> EvaluationReport {
        let history = self.history.read().await;
        let metrics_summary = summarize(&history);
        let recommendations = recommendations(&metrics_summary);

        EvaluationReport {
            evaluation_summary: EvaluationSummary {
                total_evaluations: history.len(),
                evaluation_period: EvaluationPeriod {
                    start: history.first().map(|r| r.timestamp.clone()),
                    end: history.last().map(|r| r.timestamp.clone()),
                },
            },
            metrics_summary,
            recommendations,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Writes every stored record to `path` as a pretty-printed JSON array.
    pub async fn export(&self, path: &Path) -> Result<usize, EvaluationError> {
        let history = self.history.read().await;
        let body = serde_json::to_string_pretty(&*history)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| EvaluationError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, body)
            .await
            .map_err(|source| EvaluationError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(count = history.len(), path = %path.display(), "Exported evaluation results");
        Ok(history.len())
    }

    pub async fn load_export(path: &Path) -> Result<Vec<EvaluationRecord>, EvaluationError> {
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| EvaluationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn summarize(history: &[EvaluationRecord]) -> BTreeMap<String, MetricSummary> {
    let mut values: BTreeMap<&'static str, Vec<f64>> = BTreeMap::new();
    for record in history {
        for (name, value) in record.metrics.named() {
            if let Some(value) = value {
                values.entry(name).or_default().push(value);
            }
        }
    }

    values
        .into_iter()
        .filter_map(|(name, values)| {
            MetricSummary::from_values(&values).map(|summary| (name.to_string(), summary))
        })
        .collect()
}

pub fn recommendations(summary: &BTreeMap<String, MetricSummary>) -> Vec<String> {
    let mut messages: Vec<String> = THRESHOLDS
        .iter()
        .filter(|(metric, threshold, _)| {
            summary
                .get(*metric)
                .map(|s| s.mean < *threshold)
                .unwrap_or(false)
        })
        .map(|(_, _, message)| message.to_string())
        .collect();

    if messages.is_empty() {
        messages.push(SATISFACTORY.to_string());
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<String> {
        vec![
            "Refunds take five days".to_string(),
            "Shipping is free over fifty dollars".to_string(),
        ]
    }

    #[tokio::test]
    async fn heuristic_only_evaluation_stores_history() {
        let evaluator = RagasEvaluator::new(None);

        let record = evaluator
            .evaluate_response("How long do refunds take?", "Refunds take five days.", &chunks(), Map::new())
            .await;

        assert_eq!(record.metrics.faithfulness, None);
        assert_eq!(record.metrics.answer_completeness, 1.0);
        assert_eq!(evaluator.history().await, vec![record]);
    }

    #[tokio::test]
    async fn summary_statistics_are_ordered() {
        let evaluator = RagasEvaluator::new(None);
        evaluator
            .evaluate_batch(vec![
                ("what is this?".into(), "ok".into(), chunks(), Map::new()),
                ("refunds".into(), "Refunds take five days".into(), chunks(), Map::new()),
                ("shipping cost".into(), "Shipping is free".into(), vec![], Map::new()),
            ])
            .await;

        let summary = evaluator.metrics_summary().await;

        assert!(!summary.contains_key("faithfulness"));
        for stats in summary.values() {
            assert!(stats.min <= stats.mean && stats.mean <= stats.max);
            assert_eq!(stats.count, 3);
        }
    }

    #[tokio::test]
    async fn empty_report_is_satisfactory() {
        let evaluator = RagasEvaluator::new(None);

        let report = evaluator.report().await;

        assert_eq!(report.evaluation_summary.total_evaluations, 0);
        assert_eq!(report.evaluation_summary.evaluation_period.start, None);
        assert!(report.metrics_summary.is_empty());
        assert_eq!(report.recommendations, vec![SATISFACTORY.to_string()]);
    }

    #[test]
    fn low_means_trigger_recommendations() {
        let mut summary = BTreeMap::new();
        let low = |mean: f64| MetricSummary {
            mean,
            std: 0.0,
            min: mean,
            max: mean,
            count: 1,
        };
        summary.insert("faithfulness".to_string(), low(0.5));
        summary.insert("context_coverage".to_string(), low(0.1));
        summary.insert("answer_relevancy".to_string(), low(0.9));

        let messages = recommendations(&summary);

        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("Low faithfulness"));
        assert!(messages[1].starts_with("Low context coverage"));
    }

    #[tokio::test]
    async fn export_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.json");
        let evaluator = RagasEvaluator::new(None);
        let mut metadata = Map::new();
        metadata.insert("session_id".to_string(), Value::from("s1"));
        evaluator
            .evaluate_response("refunds?", "Five days.", &chunks(), metadata)
            .await;

        let count = evaluator.export(&path).await.unwrap();
        let loaded = RagasEvaluator::load_export(&path).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(loaded, evaluator.history().await);
    }
}
