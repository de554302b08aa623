use crate::{
    device::{APP_SCHEME, UNIVERSAL_LINK},
    flow::FlowSettings,
};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;
use url::Url;

pub const ARG_POLL_INTERVAL_MS: &str = "poll-interval-ms";
pub const ARG_CHALLENGE_INTERVAL_MS: &str = "challenge-interval-ms";
pub const ARG_REDIRECT_DELAY_MS: &str = "redirect-delay-ms";
pub const ARG_UNIVERSAL_LINK: &str = "universal-link";
pub const ARG_APP_SCHEME: &str = "app-scheme";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_POLL_INTERVAL_MS)
                .long(ARG_POLL_INTERVAL_MS)
                .help("Status poll interval in milliseconds")
                .env("IDBRIDGE_POLL_INTERVAL_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CHALLENGE_INTERVAL_MS)
                .long(ARG_CHALLENGE_INTERVAL_MS)
                .help("QR challenge refresh interval in milliseconds")
                .env("IDBRIDGE_CHALLENGE_INTERVAL_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REDIRECT_DELAY_MS)
                .long(ARG_REDIRECT_DELAY_MS)
                .help("Delay before following the app link on mobile, in milliseconds")
                .env("IDBRIDGE_REDIRECT_DELAY_MS")
                .default_value("100")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_UNIVERSAL_LINK)
                .long(ARG_UNIVERSAL_LINK)
                .help("App link used on modern mobile platforms")
                .env("IDBRIDGE_UNIVERSAL_LINK")
                .default_value(UNIVERSAL_LINK),
        )
        .arg(
            Arg::new(ARG_APP_SCHEME)
                .long(ARG_APP_SCHEME)
                .help("Custom-scheme app link used on older mobile platforms")
                .env("IDBRIDGE_APP_SCHEME")
                .default_value(APP_SCHEME),
        )
}

#[must_use]
pub fn parse(matches: &ArgMatches, login_redirect: Url) -> FlowSettings {
    let mut settings = FlowSettings::new(login_redirect);
    let millis = |name: &str| matches.get_one::<u64>(name).map(|ms| Duration::from_millis(*ms));

    if let Some(interval) = millis(ARG_POLL_INTERVAL_MS) {
        settings.poll_interval = interval;
    }
    if let Some(interval) = millis(ARG_CHALLENGE_INTERVAL_MS) {
        settings.challenge_interval = interval;
    }
    if let Some(delay) = millis(ARG_REDIRECT_DELAY_MS) {
        settings.redirect_delay = delay;
    }
    if let Some(link) = matches.get_one::<String>(ARG_UNIVERSAL_LINK) {
        settings.deep_link.universal_link.clone_from(link);
    }
    if let Some(scheme) = matches.get_one::<String>(ARG_APP_SCHEME) {
        settings.deep_link.app_scheme.clone_from(scheme);
    }

    settings
}
