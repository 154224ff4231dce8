//! Streaming completion backend implementations for turnwise.
//!
//! Currently one implementation: the OpenAI-compatible chat completions
//! endpoint with structured output, which covers OpenAI, OpenRouter,
//! Ollama, vLLM, and most hosted inference services.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatBackend;
