use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lexical metrics computed locally; never missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeuristicMetrics {
    pub answer_length_ratio: f64,
    pub context_coverage: f64,
    pub context_diversity: f64,
    pub query_answer_similarity: f64,
    pub answer_completeness: f64,
}

/// Judge-scored metrics; `None` when the judge call or its parsing failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeMetrics {
    pub faithfulness: Option<f64>,
    pub answer_relevancy: Option<f64>,
    pub context_relevancy: Option<f64>,
    pub context_precision: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub faithfulness: Option<f64>,
    pub answer_relevancy: Option<f64>,
    pub context_relevancy: Option<f64>,
    pub context_precision: Option<f64>,
    pub answer_length_ratio: f64,
    pub context_coverage: f64,
    pub context_diversity: f64,
    pub query_answer_similarity: f64,
    pub answer_completeness: f64,
}

impl EvaluationMetrics {
    pub fn combine(judge: JudgeMetrics, heuristics: HeuristicMetrics) -> Self {
        Self {
            faithfulness: judge.faithfulness,
            answer_relevancy: judge.answer_relevancy,
            context_relevancy: judge.context_relevancy,
            context_precision: judge.context_precision,
            answer_length_ratio: heuristics.answer_length_ratio,
            context_coverage: heuristics.context_coverage,
            context_diversity: heuristics.context_diversity,
            query_answer_similarity: heuristics.query_answer_similarity,
            answer_completeness: heuristics.answer_completeness,
        }
    }

    /// Every metric by name, in reporting order.
    pub fn named(&self) -> [(&'static str, Option<f64>); 9] {
        [
            ("faithfulness", self.faithfulness),
            ("answer_relevancy", self.answer_relevancy),
            ("context_relevancy", self.context_relevancy),
            ("context_precision", self.context_precision),
            ("answer_length_ratio", Some(self.answer_length_ratio)),
            ("context_coverage", Some(self.context_coverage)),
            ("context_diversity", Some(self.context_diversity)),
            ("query_answer_similarity", Some(self.query_answer_similarity)),
            ("answer_completeness", Some(self.answer_completeness)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub query: String,
    pub answer: String,
    pub context_chunks: Vec<String>,
    pub metrics: EvaluationMetrics,
    pub metadata: Map<String, Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl MetricSummary {
    /// Population statistics over the finite values; `None` if there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            // summation error must not push the mean outside [min, max]
            mean: mean.clamp(min, max),
            std: variance.sqrt(),
            min,
            max,
            count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPeriod {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total_evaluations: usize,
    pub evaluation_period: EvaluationPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub evaluation_summary: EvaluationSummary,
    pub metrics_summary: BTreeMap<String, MetricSummary>,
    pub recommendations: Vec<String>,
    pub generated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_uses_population_std() {
        let summary = MetricSummary::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();

        assert_eq!(summary.count, 8);
        assert!((summary.mean - 5.0).abs() < 1e-12);
        assert!((summary.std - 2.0).abs() < 1e-12);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 9.0);
    }

    #[test]
    fn empty_sample_has_no_summary() {
        assert!(MetricSummary::from_values(&[]).is_none());
    }

    #[test]
    fn constant_sample_keeps_mean_within_bounds() {
        let summary = MetricSummary::from_values(&[0.1, 0.1, 0.1]).unwrap();

        assert!(summary.min <= summary.mean && summary.mean <= summary.max);
    }

    #[test]
    fn missing_judge_scores_serialize_as_null() {
        let metrics = EvaluationMetrics::combine(JudgeMetrics::default(), HeuristicMetrics::default());

        let json = serde_json::to_value(metrics).unwrap();

        assert!(json["faithfulness"].is_null());
        assert_eq!(json["answer_completeness"], 0.0);
    }
}
