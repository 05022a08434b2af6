//! API Module
//!
//! Provider-specific request shaping. Each adapter performs exactly one call
//! with the key it is given; rotation happens in the pool.

pub mod gemini;
pub mod groq;
pub mod rapidapi;

pub use gemini::GenerateContentRequest;
pub use groq::{ChatCompletionRequest, ChatMessage};
