use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use polyperps_core::PerpsError;
use tracing::{debug, instrument};

use crate::analysis::MarketAnalysis;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = r#"You are a prediction market analyst. You will receive a market question and its current YES price.

Give a short analysis (under 200 words) covering:
1. The key factors that decide the outcome
2. Recent developments that matter
3. Whether the current price looks undervalued, overvalued or fairly priced

End with one line in this exact form:
Probability Assessment: NN%

Be direct. Do not hedge every sentence."#;

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIClient {
    /// Client for the given key. `base_url` points at any OpenAI-compatible
    /// endpoint; `None` keeps the async-openai default.
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }

        Self {
            client: Client::with_config(config),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Analyze a market at its current YES price (0-1)
    #[instrument(skip(self))]
    pub async fn analyze(
        &self,
        question: &str,
        current_price: f64,
    ) -> Result<MarketAnalysis, PerpsError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()
                    .map_err(|e| PerpsError::internal(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_prompt(question, current_price))
                    .build()
                    .map_err(|e| PerpsError::internal(e.to_string()))?
                    .into(),
            ])
            .temperature(0.4)
            .max_tokens(600u32)
            .build()
            .map_err(|e| PerpsError::internal(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PerpsError::api(format!("OpenAI API error: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PerpsError::parse("No response from OpenAI"))?;

        let analysis = MarketAnalysis::from_text(content.trim());
        debug!(
            "Analysis ready: probability={:?} sentiment={:?}",
            analysis.probability, analysis.sentiment
        );
        Ok(analysis)
    }
}

fn format_price(price: f64) -> String {
    if price.is_finite() && (0.0..=1.0).contains(&price) {
        format!("{:.1}%", price * 100.0)
    } else {
        "Unknown".to_string()
    }
}

fn user_prompt(question: &str, current_price: f64) -> String {
    format!(
        "Market: {}\nCurrent YES price: {} implied probability\n\nAnalyze this market.",
        question.trim(),
        format_price(current_price)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0.73), "73.0%");
        assert_eq!(format_price(0.0), "0.0%");
        assert_eq!(format_price(1.5), "Unknown");
        assert_eq!(format_price(f64::NAN), "Unknown");
    }

    #[test]
    fn test_user_prompt() {
        let prompt = user_prompt("  Will it rain?  ", 0.42);
        assert!(prompt.starts_with("Market: Will it rain?\n"));
        assert!(prompt.contains("42.0% implied probability"));
    }

    #[test]
    fn test_client_model() {
        let client = OpenAIClient::new("sk-test", Some("http://localhost:9/v1"));
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.with_model("gpt-4o").model(), "gpt-4o");
    }
}
