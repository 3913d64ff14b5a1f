//! Language model traits

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::Result;

/// Stream of reply text deltas, in generation order
pub type TextDeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Text completion engine
///
/// Implementations:
/// - `OpenAIBackend` - OpenAI-compatible chat completions with SSE streaming
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn ReplyGenerator> = Arc::new(OpenAIBackend::new(config)?);
/// let mut deltas = llm.generate_reply("hello").await?;
/// while let Some(delta) = deltas.next().await {
///     print!("{}", delta?);
/// }
/// ```
#[async_trait]
pub trait ReplyGenerator: Send + Sync + 'static {
    /// Start generating a reply for the user's utterance
    ///
    /// Returns once the request is accepted; the reply arrives as a stream
    /// of text deltas. Callers needing the full reply concatenate them.
    async fn generate_reply(&self, prompt: &str) -> Result<TextDeltaStream>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
