use crate::{
    cli::{actions::host_notifier, commands::host},
    device::UserAgentClassifier,
    flow::{ClientContext, Flow, FlowServices, FlowSettings, FlowSnapshot},
    membership::{MembershipBridge, MembershipClient, MembershipConfig},
    notify::{ChannelNotifier, HostMessage, HostNotifier},
    provider::{ProviderClient, ProviderConfig},
};
use anyhow::{anyhow, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug)]
pub struct Args {
    pub provider: ProviderConfig,
    pub membership: MembershipConfig,
    pub host: host::Options,
    pub settings: FlowSettings,
    pub client: ClientContext,
}

/// Run one attempt in the terminal, printing progress and the outcome message.
///
/// # Errors
/// Returns an error if a client cannot be built or the attempt does not end signed in.
pub async fn execute(args: Args) -> Result<()> {
    info!(
        end_user_ip = %args.provider.end_user_ip,
        membership = %args.membership.base_url,
        "starting terminal attempt"
    );

    let webhook = host_notifier(&args.host)?;
    let (channel, mut messages) = ChannelNotifier::channel();

    let services = FlowServices {
        provider: Arc::new(ProviderClient::new(args.provider)?),
        membership: MembershipBridge::new(Arc::new(MembershipClient::new(args.membership)?)),
        notifier: Arc::new(channel),
        classifier: Arc::new(UserAgentClassifier),
    };
    let flow = Flow::new(services, args.settings, args.client);
    let mut snapshots = flow.subscribe();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut run = tokio::spawn(flow.run(cancel));
    let mut last_line = String::new();
    let mut watching = true;

    let last = loop {
        tokio::select! {
            changed = snapshots.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let line = progress_line(&snapshots.borrow_and_update());
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
            Some(message) = messages.recv() => deliver(&message, webhook.as_deref()).await,
            finished = &mut run => break finished?,
        }
    };

    while let Ok(message) = messages.try_recv() {
        deliver(&message, webhook.as_deref()).await;
    }

    for entry in &last.log {
        debug!("{entry}");
    }

    outcome(&last)
}

async fn deliver(message: &HostMessage, webhook: Option<&dyn HostNotifier>) {
    match serde_json::to_string_pretty(message) {
        Ok(payload) => println!("{payload}"),
        Err(err) => error!("failed to encode host message: {err}"),
    }

    if let Some(webhook) = webhook {
        if let Err(err) = webhook.notify(message).await {
            error!(kind = message.kind(), "failed to deliver host message: {err:#}");
        }
    }
}

/// One line describing what the user should do next.
fn progress_line(snapshot: &FlowSnapshot) -> String {
    let mut line = format!("[{}] {}", snapshot.state, snapshot.message);
    if let Some(redirect) = &snapshot.redirect {
        line.push_str(&format!("\n  open on this device: {redirect}"));
    } else if let Some(challenge) = &snapshot.challenge {
        line.push_str(&format!("\n  scan: {}", challenge.url));
    }
    line
}

/// `Set-Cookie` lines for the membership session, empty unless signed in.
fn session_lines(snapshot: &FlowSnapshot) -> Vec<String> {
    if !snapshot.login_complete {
        return Vec::new();
    }
    snapshot.session.as_ref().map_or_else(Vec::new, |session| {
        session
            .cookies()
            .iter()
            .map(|cookie| format!("Set-Cookie: {}", cookie.expose_secret()))
            .collect()
    })
}

fn outcome(snapshot: &FlowSnapshot) -> Result<()> {
    if snapshot.login_complete {
        println!("{}", snapshot.message);
        for line in session_lines(snapshot) {
            println!("{line}");
        }
        return Ok(());
    }
    if snapshot.cancelled {
        return Err(anyhow!("attempt cancelled"));
    }

    let detail = snapshot
        .error
        .as_ref()
        .map_or_else(
            || snapshot.message.clone(),
            |error| format!("{}: {}", error.code, error.message),
        );
    Err(anyhow!("authentication did not complete ({}): {detail}", snapshot.state))
}
