pub mod model;
pub mod prompt;
pub mod resolver;
pub mod response;

pub use model::{ClaudeCli, HttpModel, Invocation, LanguageModel, ModelError};
pub use resolver::{AiResolver, ResolverConfig};
