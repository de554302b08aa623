pub mod authenticate;
pub mod server;

mod run;

use crate::{
    cli::commands::host,
    notify::{HostNotifier, LogNotifier, WebhookNotifier},
};
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug)]
pub enum Action {
    Authenticate(authenticate::Args),
    Serve(server::Args),
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Deliver outcome messages to the configured webhook, or only log them.
fn host_notifier(options: &host::Options) -> Result<Option<Arc<dyn HostNotifier>>> {
    options
        .webhook_url
        .as_deref()
        .map(|url| {
            WebhookNotifier::new(url, options.webhook_timeout)
                .map(|notifier| Arc::new(notifier) as Arc<dyn HostNotifier>)
        })
        .transpose()
}

fn host_notifier_or_log(options: &host::Options) -> Result<Arc<dyn HostNotifier>> {
    Ok(host_notifier(options)?.unwrap_or_else(|| Arc::new(LogNotifier)))
}
