//! LLM-as-judge scoring for the reference-free RAG metrics.
//!
//! Each metric is an independent prompt whose JSON verdict is turned into a
//! score in [0, 1]. A failing metric is logged and reported as missing; it
//! never fails the evaluation as a whole.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::types::JudgeMetrics;
use crate::llm::{ChatProvider, ChatRequest, EmbeddingProvider, LlmError};
use crate::rag::vector;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to parse judge response: {0}")]
    Parse(String),
    #[error("judge returned no {0}")]
    Empty(&'static str),
}

pub struct LlmJudge {
    chat: Arc<dyn ChatProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    relevancy_questions: usize,
}

impl LlmJudge {
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        relevancy_questions: usize,
    ) -> Self {
        Self {
            chat,
            embedder,
            relevancy_questions: relevancy_questions.max(1),
        }
    }

    pub async fn score(&self, query: &str, answer: &str, chunks: &[String]) -> JudgeMetrics {
        JudgeMetrics {
            faithfulness: settle("faithfulness", self.faithfulness(answer, chunks).await),
            answer_relevancy: settle("answer_relevancy", self.answer_relevancy(query, answer).await),
            context_relevancy: settle("context_relevancy", self.context_relevancy(query, chunks).await),
            context_precision: settle("context_precision", self.context_precision(query, chunks).await),
        }
    }

    async fn ask(&self, prompt: String) -> Result<String, JudgeError> {
        let request = ChatRequest::from_prompt(prompt).with_temperature(0.0);
        Ok(self.chat.chat(request).await?.content)
    }

    /// Fraction of answer statements supported by the context.
    pub async fn faithfulness(&self, answer: &str, chunks: &[String]) -> Result<f64, JudgeError> {
        let prompt = format!(
            r#"You are verifying whether an answer is grounded in its context.

Context:
{}

Answer:
{}

Break the answer into short standalone factual statements. For each statement,
decide whether it can be directly inferred from the context.

Respond in JSON format:
{{
    "statements": [
        {{"statement": "<statement>", "supported": <true/false>}}
    ]
}}

Respond with only the JSON, no other text."#,
            numbered(chunks),
            answer
        );

        let response = self.ask(prompt).await?;
        parse_faithfulness(&response)
    }

    /// Mean cosine similarity between the query and questions generated from the answer.
    pub async fn answer_relevancy(&self, query: &str, answer: &str) -> Result<f64, JudgeError> {
        let prompt = format!(
            r#"Generate {} questions that the following answer would directly respond to.
Also decide whether the answer is noncommittal (evasive, vague or a refusal).

Answer:
{}

Respond in JSON format:
{{
    "questions": ["<question>"],
    "noncommittal": <true/false>
}}

Respond with only the JSON, no other text."#,
            self.relevancy_questions, answer
        );

        let response = self.ask(prompt).await?;
        let generated = parse_generated_questions(&response)?;
        if generated.noncommittal {
            return Ok(0.0);
        }

        let mut inputs = Vec::with_capacity(generated.questions.len() + 1);
        inputs.push(query.to_string());
        inputs.extend(generated.questions);
        let vectors = self.embedder.embed(&inputs).await?;
        let (query_vector, question_vectors) = vectors
            .split_first()
            .ok_or(JudgeError::Empty("embeddings"))?;
        if question_vectors.is_empty() {
            return Err(JudgeError::Empty("question embeddings"));
        }

        let mean = question_vectors
            .iter()
            .map(|vector| vector::cosine(query_vector, vector))
            .sum::<f64>()
            / question_vectors.len() as f64;
        Ok(mean.clamp(0.0, 1.0))
    }

    /// Fraction of context sentences relevant to the query.
    pub async fn context_relevancy(&self, query: &str, chunks: &[String]) -> Result<f64, JudgeError> {
        let total = chunks.iter().map(|chunk| split_sentences(chunk).len()).sum::<usize>();
        if total == 0 {
            return Ok(0.0);
        }

        let prompt = format!(
            r#"Extract the sentences from the context that are needed to answer the question.
Copy them exactly. Do not change or add any sentence.

Question: {}

Context:
{}

Respond in JSON format:
{{
    "relevant_sentences": ["<sentence>"]
}}

Respond with only the JSON, no other text."#,
            query,
            numbered(chunks)
        );

        let response = self.ask(prompt).await?;
        let relevant = parse_relevant_sentences(&response)?;
        Ok(relevant.min(total) as f64 / total as f64)
    }

    /// Average precision of the retrieved chunks, in retrieval order.
    pub async fn context_precision(&self, query: &str, chunks: &[String]) -> Result<f64, JudgeError> {
        if chunks.is_empty() {
            return Ok(0.0);
        }

        let prompt = format!(
            r#"For each numbered context passage, decide whether it is useful for answering the question.

Question: {}

Context passages:
{}

Respond in JSON format with one verdict per passage, in order:
{{
    "verdicts": [<true/false>]
}}

Respond with only the JSON, no other text."#,
            query,
            numbered(chunks)
        );

        let response = self.ask(prompt).await?;
        let verdicts = parse_verdicts(&response, chunks.len())?;
        Ok(average_precision(&verdicts))
    }
}

fn settle(metric: &str, result: Result<f64, JudgeError>) -> Option<f64> {
    match result {
        Ok(score) if score.is_finite() => Some(score.clamp(0.0, 1.0)),
        Ok(score) => {
            tracing::warn!(metric, score, "Judge produced a non-finite score");
            None
        }
        Err(err) => {
            tracing::warn!(metric, error = %err, "Failed to calculate metric");
            None
        }
    }
}

fn numbered(chunks: &[String]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] {}", i + 1, chunk))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sentence_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[^.!?\n]+[.!?]*").ok())
        .as_ref()
}

pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let Some(pattern) = sentence_pattern() else {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    };
    pattern
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

/// Mean of precision@k over the positions holding useful chunks.
pub(crate) fn average_precision(verdicts: &[bool]) -> f64 {
    let useful = verdicts.iter().filter(|v| **v).count();
    if useful == 0 {
        return 0.0;
    }
    let mut hits = 0usize;
    let mut sum = 0.0;
    for (k, verdict) in verdicts.iter().enumerate() {
        if *verdict {
            hits += 1;
            sum += hits as f64 / (k + 1) as f64;
        }
    }
    sum / useful as f64
}

fn extract_json(response: &str) -> String {
    let response = response.trim();

    if response.starts_with("```") {
        if let Some(end) = response.rfind("```") {
            let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }

    response.to_string()
}

fn parse_json<T: for<'de> Deserialize<'de>>(response: &str) -> Result<T, JudgeError> {
    let json_str = extract_json(response);
    serde_json::from_str(&json_str)
        .map_err(|e| JudgeError::Parse(format!("{}. Response: {}", e, response)))
}

fn parse_faithfulness(response: &str) -> Result<f64, JudgeError> {
    #[derive(Deserialize)]
    struct Statement {
        supported: bool,
    }

    #[derive(Deserialize)]
    struct Raw {
        statements: Vec<Statement>,
    }

    let raw: Raw = parse_json(response)?;
    if raw.statements.is_empty() {
        return Err(JudgeError::Empty("statements"));
    }
    let supported = raw.statements.iter().filter(|s| s.supported).count();
    Ok(supported as f64 / raw.statements.len() as f64)
}

struct GeneratedQuestions {
    questions: Vec<String>,
    noncommittal: bool,
}

fn parse_generated_questions(response: &str) -> Result<GeneratedQuestions, JudgeError> {
    #[derive(Deserialize)]
    struct Raw {
        questions: Vec<String>,
        #[serde(default)]
        noncommittal: bool,
    }

    let raw: Raw = parse_json(response)?;
    let questions: Vec<String> = raw
        .questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if questions.is_empty() && !raw.noncommittal {
        return Err(JudgeError::Empty("questions"));
    }
    Ok(GeneratedQuestions {
        questions,
        noncommittal: raw.noncommittal,
    })
}

fn parse_relevant_sentences(response: &str) -> Result<usize, JudgeError> {
    #[derive(Deserialize)]
    struct Raw {
        relevant_sentences: Vec<String>,
    }

    let raw: Raw = parse_json(response)?;
    Ok(raw
        .relevant_sentences
        .iter()
        .filter(|s| !s.trim().is_empty())
        .count())
}

fn parse_verdicts(response: &str, expected: usize) -> Result<Vec<bool>, JudgeError> {
    #[derive(Deserialize)]
    struct Raw {
        verdicts: Vec<bool>,
    }

    let raw: Raw = parse_json(response)?;
    if raw.verdicts.len() != expected {
        return Err(JudgeError::Parse(format!(
            "expected {} verdicts, got {}",
            expected,
            raw.verdicts.len()
        )));
    }
    Ok(raw.verdicts)
}
