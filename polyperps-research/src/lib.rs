//! AI market analysis for the PolyPerps terminal
//!
//! Sends a market question and its current price to an OpenAI-compatible chat
//! API and extracts a probability estimate and a sentiment from the reply.

pub mod analysis;
pub mod openai;

pub use analysis::{classify_sentiment, extract_probability, MarketAnalysis, Sentiment};
pub use openai::{OpenAIClient, DEFAULT_MODEL};
