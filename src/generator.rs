use crate::error::Result;

/// A generative language model: one prompt in, one text out.
///
/// Implementations make a single remote call per prompt. Retry or timeout
/// policies belong in a wrapper implementing this same trait.
#[allow(async_fn_in_trait)]
pub trait Generator {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
