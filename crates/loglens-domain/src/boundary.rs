//! Boundary traits to external collaborators (spec §6.5, §6.6).
//!
//! Neither trait has a transport implementation in this workspace; the
//! core only consumes them. Grounded in `CIRunner`'s
//! `#[async_trait] trait` shape from the teacher, generalized to the two
//! seams this spec names.

use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum ProviderError {
    Auth,
    RateLimit { retry_after_secs: u64 },
    TokenLimit { used: u32, limit: u32 },
    Network,
    Other(String),
}

/// Boundary to an external LLM transport (spec §6.5). Transport
/// lifetime is scoped to the call: implementations must not keep a
/// handle alive past the request, and must release it on every exit
/// path including cancellation (spec §9 redesign flag).
#[async_trait]
pub trait Provider: Send + Sync {
    async fn analyze(
        &self,
        prompt: &str,
        context: &str,
    ) -> Result<AnalysisResult, ProviderError>;

    /// Streaming variant. Returns a bounded channel receiver rather than
    /// a generator (spec §9 redesign flag): the producer task owns the
    /// transport handle and closes the channel on completion,
    /// cancellation, or error.
    async fn stream_analyze(
        &self,
        prompt: &str,
        context: &str,
    ) -> Result<mpsc::Receiver<String>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub step_boundaries: Vec<(String, usize, usize)>,
}

/// Boundary to the external workflow runner (spec §6.6).
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        workflow_selector: &str,
    ) -> std::io::Result<(i32, Vec<u8>, RunMetadata)>;
}
