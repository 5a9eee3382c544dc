//! Post-processing of free-form analysis text

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// "NN% probability", then "assessment: NN%"
static PROBABILITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)(\d{1,3})%\s*probability", r"(?i)assessment[:\s]*(\d{1,3})%"]
        .into_iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

/// Analysis returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub analysis: String,
    /// Model's own probability estimate, in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<u32>,
    pub sentiment: Sentiment,
}

impl MarketAnalysis {
    pub fn from_text(text: impl Into<String>) -> Self {
        let analysis = text.into();
        let probability = extract_probability(&analysis);
        let sentiment = classify_sentiment(&analysis);
        Self {
            analysis,
            probability,
            sentiment,
        }
    }
}

/// Pull a percentage out of "NN% probability" or "assessment: NN%".
///
/// The first pattern wins when both appear. A value above 100 is skipped and
/// the next pattern is tried.
pub fn extract_probability(text: &str) -> Option<u32> {
    PROBABILITY_PATTERNS.iter().find_map(|re| {
        let value: u32 = re.captures(text)?.get(1)?.as_str().parse().ok()?;
        (value <= 100).then_some(value)
    })
}

pub fn classify_sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    if lower.contains("undervalued") || lower.contains("bullish") {
        Sentiment::Bullish
    } else if lower.contains("overvalued") || lower.contains("bearish") {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    }
}
