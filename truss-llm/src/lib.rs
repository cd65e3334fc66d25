//! ABOUTME: LLM streaming provider trait, OpenAI-compatible implementation,
//! ABOUTME: and the publish/accumulate activity driving both together

mod accumulator;
mod activity;
mod provider;

pub use accumulator::ChunkAccumulator;
pub use activity::stream_and_accumulate;
pub use provider::{LlmProvider, OpenAiCompatibleProvider, ProviderChunk};
