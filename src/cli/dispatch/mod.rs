use crate::{
    cli::{
        actions::{authenticate, server, Action},
        commands::{
            flow, host, membership, provider, ARG_END_USER_IP, ARG_PORT, ARG_RETENTION_SECONDS,
            ARG_RETURN_URL, ARG_USER_AGENT, CMD_AUTHENTICATE, CMD_SERVE,
        },
    },
    flow::ClientContext,
    APP_USER_AGENT,
};
use anyhow::{anyhow, Result};
use clap::ArgMatches;
use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_AUTHENTICATE, sub)) => authenticate(sub),
        Some((CMD_SERVE, sub)) => serve(sub),
        _ => Err(anyhow!(
            "missing subcommand: {CMD_AUTHENTICATE} or {CMD_SERVE}"
        )),
    }
}

fn authenticate(matches: &ArgMatches) -> Result<Action> {
    let mut provider = provider::parse(matches)?;
    provider.end_user_ip = matches
        .get_one::<IpAddr>(ARG_END_USER_IP)
        .copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let host = host::parse(matches)?;
    let settings = flow::parse(matches, host.login_redirect.clone());

    let client = ClientContext {
        user_agent: matches
            .get_one::<String>(ARG_USER_AGENT)
            .cloned()
            .unwrap_or_else(|| APP_USER_AGENT.to_string()),
        return_url: matches
            .get_one::<String>(ARG_RETURN_URL)
            .filter(|url| !url.trim().is_empty())
            .cloned(),
    };

    Ok(Action::Authenticate(authenticate::Args {
        provider,
        membership: membership::parse(matches)?,
        host,
        settings,
        client,
    }))
}

fn serve(matches: &ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let retention = matches
        .get_one::<u64>(ARG_RETENTION_SECONDS)
        .map_or(crate::api::registry::DEFAULT_RETENTION, |secs| {
            Duration::from_secs(*secs)
        });

    let host = host::parse(matches)?;
    let settings = flow::parse(matches, host.login_redirect.clone());

    Ok(Action::Serve(server::Args {
        port,
        retention,
        provider: provider::parse(matches)?,
        membership: membership::parse(matches)?,
        host,
        settings,
    }))
}
