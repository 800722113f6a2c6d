pub mod gemini;

pub use gemini::{GeminiClient, GenerationError, TextGenerator, DEFAULT_MODEL};
