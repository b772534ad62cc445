pub mod openai;

pub use openai::{LlmClient, LlmError, strip_markdown_fence};
