// Data models module (for API types)

pub mod anthropic;
pub mod gemini;
pub mod mapping;
pub mod streaming;

pub use anthropic::*;
pub use gemini::*;
pub use mapping::{classify, Disposition};
