use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde_json::json;
use tracing::info;

use crate::ai::{round2, round3};
use crate::error::Result;
use crate::types::{text_field, Record, RecordSet, Transformer};

static POSITIVE_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "excellent", "great", "good", "happy", "satisfied", "love", "amazing",
        "fantastic", "wonderful", "perfect", "excited", "interested", "ready",
        "yes", "absolutely", "definitely", "agreed", "approve", "success",
    ])
});

static NEGATIVE_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "bad", "poor", "terrible", "hate", "angry", "frustrated", "disappointed",
        "unhappy", "problem", "issue", "concern", "worried", "cancel", "no",
        "reject", "decline", "denied", "failed", "loss", "lost",
    ])
});

/// Keyword hits at which confidence saturates to 1.0.
const CONFIDENCE_NORMALIZER: f64 = 10.0;

/// Tag records with keyword-based sentiment over their free-text fields.
///
/// This is a curated-keyword heuristic, not a trained classifier: the score
/// is (positive − negative) / max(1, positive + negative) over keyword hits,
/// classified at ±0.1. Missing or empty text yields neutral sentiment with
/// zero confidence.
pub struct SentimentAnalysisTransformer {
    text_fields: Vec<String>,
    output_field: String,
    positive_keywords: HashSet<String>,
    negative_keywords: HashSet<String>,
    name: String,
}

impl SentimentAnalysisTransformer {
    pub fn new(text_fields: Vec<String>) -> Self {
        Self {
            text_fields,
            output_field: "ai_sentiment".to_string(),
            positive_keywords: POSITIVE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            negative_keywords: NEGATIVE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            name: "SentimentAnalysisTransformer".to_string(),
        }
    }

    pub fn with_output_field(mut self, output_field: impl Into<String>) -> Self {
        self.output_field = output_field.into();
        self
    }

    /// Replace the curated keyword sets entirely.
    pub fn with_keywords(
        mut self,
        positive: HashSet<String>,
        negative: HashSet<String>,
    ) -> Self {
        self.positive_keywords = positive;
        self.negative_keywords = negative;
        self
    }

    fn analyze_text(&self, text: &str) -> serde_json::Value {
        let mut positive = 0usize;
        let mut negative = 0usize;
        for word in text.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            if self.positive_keywords.contains(word) {
                positive += 1;
            } else if self.negative_keywords.contains(word) {
                negative += 1;
            }
        }

        let hits = positive + negative;
        let score = (positive as f64 - negative as f64) / (hits.max(1) as f64);
        let sentiment = if score > 0.1 {
            "positive"
        } else if score < -0.1 {
            "negative"
        } else {
            "neutral"
        };
        let confidence = (hits as f64 / CONFIDENCE_NORMALIZER).min(1.0);

        json!({
            "sentiment": sentiment,
            "score": round3(score),
            "confidence": round2(confidence),
        })
    }
}

impl Transformer for SentimentAnalysisTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, data: &[Record]) -> Result<RecordSet> {
        info!("Analyzing sentiment for {} records", data.len());

        Ok(data
            .iter()
            .map(|record| {
                let combined = self
                    .text_fields
                    .iter()
                    .filter_map(|field| text_field(record, field))
                    .collect::<Vec<_>>()
                    .join(" ");

                let mut tagged = record.clone();
                tagged.insert(self.output_field.clone(), self.analyze_text(&combined));
                tagged
            })
            .collect())
    }
}
