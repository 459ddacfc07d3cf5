pub mod chat;
pub mod metrics;
pub mod providers;
pub mod summarizer;

pub use summarizer::SummarizeError;
