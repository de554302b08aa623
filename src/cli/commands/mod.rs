pub mod flow;
pub mod host;
pub mod logging;
pub mod membership;
pub mod provider;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};
use std::net::IpAddr;

pub const CMD_AUTHENTICATE: &str = "authenticate";
pub const CMD_SERVE: &str = "serve";

pub const ARG_USER_AGENT: &str = "user-agent";
pub const ARG_RETURN_URL: &str = "return-url";
pub const ARG_END_USER_IP: &str = "end-user-ip";
pub const ARG_PORT: &str = "port";
pub const ARG_RETENTION_SECONDS: &str = "retention-seconds";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("idbridge")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(authenticate())
        .subcommand(serve());

    logging::with_args(command)
}

fn with_backend_args(command: Command) -> Command {
    let command = provider::with_args(command);
    let command = membership::with_args(command);
    let command = host::with_args(command);
    flow::with_args(command)
}

fn authenticate() -> Command {
    let command = Command::new(CMD_AUTHENTICATE)
        .about("Run one authentication attempt from the terminal")
        .arg(
            Arg::new(ARG_USER_AGENT)
                .long(ARG_USER_AGENT)
                .help("User agent of the device running the attempt")
                .default_value(crate::APP_USER_AGENT),
        )
        .arg(
            Arg::new(ARG_RETURN_URL)
                .long(ARG_RETURN_URL)
                .help("Page the ID app returns to after signing on a mobile device"),
        )
        .arg(
            Arg::new(ARG_END_USER_IP)
                .long(ARG_END_USER_IP)
                .help("End-user address reported to the ID provider")
                .default_value("127.0.0.1")
                .value_parser(clap::value_parser!(IpAddr)),
        );

    with_backend_args(command)
}

fn serve() -> Command {
    let command = Command::new(CMD_SERVE)
        .about("Host authentication attempts for browsers over HTTP")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("IDBRIDGE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_RETENTION_SECONDS)
                .long(ARG_RETENTION_SECONDS)
                .help("How long finished attempts stay queryable, in seconds")
                .default_value("600")
                .env("IDBRIDGE_RETENTION_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        );

    with_backend_args(command)
}
