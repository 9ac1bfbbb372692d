use crate::config::DEFAULT_CONFIG_PATH;
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

#[derive(Debug)]
pub struct CliArgs {
    pub config: PathBuf,
    pub port: Option<u16>,
}

impl From<ArgMatches> for CliArgs {
    fn from(matches: ArgMatches) -> Self {
        CliArgs {
            config: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            port: matches.get_one::<u16>("port").copied(),
        }
    }
}

fn command() -> Command {
    Command::new("compose-control")
        .version(env!("CARGO_PKG_VERSION"))
        .about("operate a docker compose project over http, with per service permissions")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path of the TOML configuration file")
                .value_name("PATH")
                .default_value(DEFAULT_CONFIG_PATH)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Listen port, overrides the configured one")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16)),
        )
}

pub fn configure_cli() -> CliArgs {
    command().get_matches().into()
}
