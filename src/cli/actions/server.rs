use crate::{
    api::{self, FlowRegistry, ProviderFactory},
    cli::{actions::host_notifier_or_log, commands::host},
    device::UserAgentClassifier,
    flow::FlowSettings,
    membership::{MembershipBridge, MembershipClient, MembershipConfig},
    provider::{IdProvider, ProviderClient, ProviderConfig},
};
use anyhow::Result;
use std::{net::IpAddr, sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub retention: Duration,
    pub provider: ProviderConfig,
    pub membership: MembershipConfig,
    pub host: host::Options,
    pub settings: FlowSettings,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let provider = ProviderClient::new(args.provider)?;
    let provider_for: ProviderFactory = Arc::new(move |end_user_ip: IpAddr| {
        Arc::new(provider.with_end_user_ip(end_user_ip)) as Arc<dyn IdProvider>
    });
    let membership = MembershipBridge::new(Arc::new(MembershipClient::new(args.membership)?));
    let notifier = host_notifier_or_log(&args.host)?;

    let registry = FlowRegistry::new(
        provider_for,
        membership,
        notifier,
        Arc::new(UserAgentClassifier),
        args.settings,
    )
    .with_retention(args.retention);

    api::new(args.port, Arc::new(registry), args.host.host_url.as_deref()).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("provider_sign_url", args.provider.sign_url.to_string()),
        ("provider_status_url", args.provider.status_url.to_string()),
        ("provider_api_user", args.provider.api_user.clone()),
        ("membership_url", args.membership.base_url.to_string()),
        (
            "host_url",
            args.host
                .host_url
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
        (
            "host_webhook_url",
            args.host
                .webhook_url
                .clone()
                .unwrap_or_else(|| "none (log only)".to_string()),
        ),
        ("login_redirect_url", args.host.login_redirect.to_string()),
        (
            "poll_interval",
            format!("{}ms", args.settings.poll_interval.as_millis()),
        ),
        ("retention", format!("{}s", args.retention.as_secs())),
    ];
    info!("{}", startup_message(&entries));
}

fn startup_message(entries: &[(&str, String)]) -> String {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\nStartup configuration:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    message
}

fn banner() -> String {
    BANNER.replace(
        "{VERSION}",
        &format!(
            " - {} - {}",
            env!("CARGO_PKG_VERSION"),
            short_commit(crate::GIT_COMMIT_HASH)
        ),
    )
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

const BANNER: &str = r"
   _     _ _          _     _
  (_) __| | |__  _ __(_) __| | __ _  ___
  | |/ _` | '_ \| '__| |/ _` |/ _` |/ _ \
  | | (_| | |_) | |  | | (_| | (_| |  __/
  |_|\__,_|_.__/|_|  |_|\__,_|\__, |\___|
                              |___/ {VERSION}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_commit_truncates_long_hashes() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit(" abc "), "abc");
        assert_eq!(short_commit("unknown"), "unknown");
    }

    #[test]
    fn startup_message_aligns_keys() {
        let message = startup_message(&[
            ("listen", "tcp:8080".to_string()),
            ("retention", "600s".to_string()),
        ]);
        assert!(message.contains(env!("CARGO_PKG_VERSION")));
        assert!(message.contains("\n  listen:    tcp:8080"));
        assert!(message.contains("\n  retention: 600s"));
    }
}
