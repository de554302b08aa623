use crate::{
    cli::commands::provider::required_url,
    membership::{
        client::{DEFAULT_CHECK_PATH, DEFAULT_LOGIN_PATH},
        MembershipConfig,
    },
};
use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_URL: &str = "membership-url";
pub const ARG_CHECK_PATH: &str = "membership-check-path";
pub const ARG_LOGIN_PATH: &str = "membership-login-path";
pub const ARG_TIMEOUT_MS: &str = "membership-timeout-ms";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_URL)
                .long(ARG_URL)
                .help("Base URL of the membership site (WordPress)")
                .env("IDBRIDGE_MEMBERSHIP_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CHECK_PATH)
                .long(ARG_CHECK_PATH)
                .help("Path of the check-user endpoint")
                .env("IDBRIDGE_MEMBERSHIP_CHECK_PATH")
                .default_value(DEFAULT_CHECK_PATH),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Path of the login-user endpoint")
                .env("IDBRIDGE_MEMBERSHIP_LOGIN_PATH")
                .default_value(DEFAULT_LOGIN_PATH),
        )
        .arg(
            Arg::new(ARG_TIMEOUT_MS)
                .long(ARG_TIMEOUT_MS)
                .help("Deadline for each membership request in milliseconds")
                .env("IDBRIDGE_MEMBERSHIP_TIMEOUT_MS")
                .default_value("30000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

/// # Errors
/// Returns an error if the membership URL is missing or invalid.
pub fn parse(matches: &ArgMatches) -> Result<MembershipConfig> {
    let mut config = MembershipConfig::new(required_url(matches, ARG_URL)?);

    if let Some(path) = matches.get_one::<String>(ARG_CHECK_PATH) {
        config.check_path.clone_from(path);
    }
    if let Some(path) = matches.get_one::<String>(ARG_LOGIN_PATH) {
        config.login_path.clone_from(path);
    }
    if let Some(timeout) = matches.get_one::<u64>(ARG_TIMEOUT_MS) {
        config.timeout = Duration::from_millis(*timeout);
    }

    Ok(config)
}
