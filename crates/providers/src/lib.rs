pub mod openai_compat;
pub mod traits;
pub mod util;

pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
