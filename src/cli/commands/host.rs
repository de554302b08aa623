use crate::{api::host_origin, cli::commands::provider::required_url, notify::DEFAULT_TIMEOUT};
use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;
use url::Url;

pub const ARG_HOST_URL: &str = "host-url";
pub const ARG_WEBHOOK_URL: &str = "host-webhook-url";
pub const ARG_WEBHOOK_TIMEOUT_MS: &str = "host-webhook-timeout-ms";
pub const ARG_LOGIN_REDIRECT_URL: &str = "login-redirect-url";

/// Where outcome messages go and where the browser finishes the login.
#[derive(Debug, Clone)]
pub struct Options {
    /// Page embedding the login widget; its origin is the only CORS origin allowed.
    pub host_url: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub login_redirect: Url,
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HOST_URL)
                .long(ARG_HOST_URL)
                .help("URL of the page embedding the login widget")
                .env("IDBRIDGE_HOST_URL"),
        )
        .arg(
            Arg::new(ARG_WEBHOOK_URL)
                .long(ARG_WEBHOOK_URL)
                .help("Trusted host endpoint receiving outcome messages as JSON")
                .long_help(
                    "Trusted host endpoint receiving outcome messages as JSON. Must be an explicit http(s) URL, '*' is rejected. Messages are only logged when unset.",
                )
                .env("IDBRIDGE_HOST_WEBHOOK_URL"),
        )
        .arg(
            Arg::new(ARG_WEBHOOK_TIMEOUT_MS)
                .long(ARG_WEBHOOK_TIMEOUT_MS)
                .help("Deadline for delivering an outcome message in milliseconds")
                .env("IDBRIDGE_HOST_WEBHOOK_TIMEOUT_MS")
                .default_value("10000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOGIN_REDIRECT_URL)
                .long(ARG_LOGIN_REDIRECT_URL)
                .help("Host page finishing the login, receives ?personal_number=")
                .env("IDBRIDGE_LOGIN_REDIRECT_URL")
                .required(true),
        )
}

/// # Errors
/// Returns an error if the redirect URL is missing or a URL is malformed.
pub fn parse(matches: &ArgMatches) -> Result<Options> {
    let login_redirect = required_url(matches, ARG_LOGIN_REDIRECT_URL)?;

    let host_url = matches.get_one::<String>(ARG_HOST_URL).cloned();
    if let Some(url) = &host_url {
        host_origin(url)?;
    }

    let webhook_timeout = matches
        .get_one::<u64>(ARG_WEBHOOK_TIMEOUT_MS)
        .map_or(DEFAULT_TIMEOUT, |ms| Duration::from_millis(*ms));

    Ok(Options {
        host_url,
        webhook_url: matches.get_one::<String>(ARG_WEBHOOK_URL).cloned(),
        webhook_timeout,
        login_redirect,
    })
}
