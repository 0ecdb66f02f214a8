pub mod types;
pub mod chat;

pub use types::{Message, Role};
pub use chat::{ChatChunk, ChatOptions, ChatRequest, FinishReason};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
