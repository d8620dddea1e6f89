use async_trait::async_trait;

use crate::errors::OracleError;
use crate::llm::types::{Decision, OracleContext};
use crate::perception::types::Frame;

/// A service that looks at the current frame and proposes the next action.
/// New backends implement this trait and register in config.toml.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Identifier, matching the config.toml key.
    fn name(&self) -> &str;

    /// Propose at most one action for `task` given the current frame.
    async fn decide(
        &self,
        task: &str,
        frame: &Frame,
        ctx: &OracleContext<'_>,
    ) -> Result<Decision, OracleError>;
}
