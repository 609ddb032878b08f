//! LLM backends.

pub mod openai;

pub use openai::OpenAiClient;
