use crate::cli::actions::{authenticate, server, Action};
use anyhow::Result;

/// Dispatch the action to its handler.
///
/// # Errors
/// Returns an error if the handler fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Authenticate(args) => authenticate::execute(args).await,
        Action::Serve(args) => server::execute(args).await,
    }
}
