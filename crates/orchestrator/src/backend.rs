//! The seam between the controller and whatever actually performs the work.

use async_trait::async_trait;
use opwatch_core::OperationParams;

use crate::error::CommandError;

/// Runs backend commands by name.
///
/// An implementation reports per-step progress on the operation's event
/// channel while `execute` is pending. The returned future resolves once the
/// command has settled, and its result says only whether the command as a
/// whole succeeded.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &str,
        params: OperationParams,
    ) -> std::result::Result<(), CommandError>;
}
