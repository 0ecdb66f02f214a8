pub mod openai;
pub mod mock;

pub use openai::OpenAiProvider;
pub use mock::MockProvider;
