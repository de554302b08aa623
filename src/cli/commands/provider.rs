use crate::provider::{ProviderConfig, DEFAULT_USER_VISIBLE_DATA};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const ARG_SIGN_URL: &str = "provider-sign-url";
pub const ARG_STATUS_URL: &str = "provider-status-url";
pub const ARG_API_USER: &str = "provider-api-user";
pub const ARG_PASSWORD: &str = "provider-password";
pub const ARG_COMPANY_GUID: &str = "provider-company-guid";
pub const ARG_USER_VISIBLE_DATA: &str = "provider-user-visible-data";
pub const ARG_TIMEOUT_MS: &str = "provider-timeout-ms";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGN_URL)
                .long(ARG_SIGN_URL)
                .help("Broker endpoint that initiates a signed authentication")
                .env("IDBRIDGE_PROVIDER_SIGN_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_STATUS_URL)
                .long(ARG_STATUS_URL)
                .help("Broker endpoint that collects the status of a transaction")
                .env("IDBRIDGE_PROVIDER_STATUS_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_API_USER)
                .long(ARG_API_USER)
                .help("Broker API user")
                .env("IDBRIDGE_PROVIDER_API_USER")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Broker API password")
                .env("IDBRIDGE_PROVIDER_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_COMPANY_GUID)
                .long(ARG_COMPANY_GUID)
                .help("Company API GUID issued by the broker")
                .env("IDBRIDGE_PROVIDER_COMPANY_GUID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_USER_VISIBLE_DATA)
                .long(ARG_USER_VISIBLE_DATA)
                .help("Text shown to the user in the ID app")
                .env("IDBRIDGE_PROVIDER_USER_VISIBLE_DATA")
                .default_value(DEFAULT_USER_VISIBLE_DATA),
        )
        .arg(
            Arg::new(ARG_TIMEOUT_MS)
                .long(ARG_TIMEOUT_MS)
                .help("Deadline for each broker request in milliseconds")
                .env("IDBRIDGE_PROVIDER_TIMEOUT_MS")
                .default_value("30000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

/// Build the broker configuration from the parsed arguments.
///
/// # Errors
/// Returns an error if a required argument is missing or an endpoint is not a URL.
pub fn parse(matches: &ArgMatches) -> Result<ProviderConfig> {
    let sign_url = required_url(matches, ARG_SIGN_URL)?;
    let status_url = required_url(matches, ARG_STATUS_URL)?;
    let api_user = matches
        .get_one::<String>(ARG_API_USER)
        .cloned()
        .context("missing required argument: --provider-api-user")?;
    let password = matches
        .get_one::<String>(ARG_PASSWORD)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --provider-password")?;
    let company_api_guid = matches
        .get_one::<String>(ARG_COMPANY_GUID)
        .cloned()
        .context("missing required argument: --provider-company-guid")?;

    let mut config = ProviderConfig::new(sign_url, status_url, api_user, password, company_api_guid);

    if let Some(text) = matches.get_one::<String>(ARG_USER_VISIBLE_DATA) {
        config.user_visible_data.clone_from(text);
    }
    if let Some(timeout) = matches.get_one::<u64>(ARG_TIMEOUT_MS) {
        config.timeout = Duration::from_millis(*timeout);
    }

    Ok(config)
}

pub(crate) fn required_url(matches: &ArgMatches, name: &str) -> Result<Url> {
    let value = matches
        .get_one::<String>(name)
        .with_context(|| format!("missing required argument: --{name}"))?;
    Url::parse(value).with_context(|| format!("invalid --{name}: {value}"))
}
