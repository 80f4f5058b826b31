pub mod gemini;
pub mod provider;
pub mod types;

pub use gemini::GeminiGenerator;
pub use provider::{GenerationParams, Generator};
