use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about = "Dynamic DNS update client - one-shot or as an interface watching daemon",
    long_about = None,
    disable_help_flag = true
)]
pub struct Args {
    /// String to send as your IP address
    #[arg(short = 'a', long)]
    pub address: Option<String>,

    /// File to cache the last update time and address in
    #[arg(short = 'b', long = "cache-file")]
    pub cache_file: Option<PathBuf>,

    /// Configuration file, one option per line
    #[arg(short = 'c', long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Run as a daemon, periodically updating if necessary
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Command to run after a successful update ({ip} is replaced by the address)
    #[arg(short = 'e', long)]
    pub execute: Option<String>,

    /// When running as a daemon, stay in the foreground
    #[arg(short = 'f', long)]
    pub foreground: bool,

    /// Write the daemon's process id to this file
    #[arg(short = 'F', long = "pid-file")]
    pub pid_file: Option<PathBuf>,

    /// Request path to send to the server instead of the service default
    #[arg(short = 'g', long = "request-uri")]
    pub request_uri: Option<String>,

    /// Hostname to update
    #[arg(short = 'h', long)]
    pub host: Option<String>,

    /// Network interface whose address is published (daemon default: eth0)
    #[arg(short = 'i', long)]
    pub interface: Option<String>,

    /// Title to use for a cloaked url
    #[arg(short = 'L', long = "cloak-title")]
    pub cloak_title: Option<String>,

    /// Mail exchange to set for the host
    #[arg(short = 'm', long)]
    pub mx: Option<String>,

    /// Force an update after this long even if the address is unchanged (e.g. 30s, 5m, 24d)
    #[arg(short = 'M', long = "max-interval", value_parser = parse_seconds)]
    pub max_interval: Option<u64>,

    /// Ask the service to mark the host offline
    #[arg(short = 'o', long)]
    pub offline: bool,

    /// How long to wait before retrying after the address could not be determined
    #[arg(short = 'p', long = "resolv-period", value_parser = parse_seconds)]
    pub resolv_period: Option<u64>,

    /// How often the daemon checks the address (default: 600s)
    #[arg(short = 'P', long, value_parser = parse_seconds)]
    pub period: Option<u64>,

    /// Quiet mode - only report errors
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Number of update attempts (default: 1)
    #[arg(short = 'r', long = "retrys")]
    pub retries: Option<u32>,

    /// Server to connect to, as host or host:port
    #[arg(short = 's', long)]
    pub server: Option<String>,

    /// Dynamic DNS service to use (see --list-services)
    #[arg(short = 'S', long = "service-type")]
    pub service_type: Option<String>,

    /// Network timeout (default: 10s)
    #[arg(short = 't', long, value_parser = parse_seconds)]
    pub timeout: Option<u64>,

    /// Number sent as the connection type
    #[arg(short = 'T', long = "connection-type")]
    pub connection_type: Option<u32>,

    /// Url to redirect the host to
    #[arg(short = 'U', long)]
    pub url: Option<String>,

    /// User and password as user[:password]; missing parts are prompted for
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Give the host a wildcard alias
    #[arg(short = 'w', long)]
    pub wildcard: bool,

    /// Discover the public address through a web check-ip service
    #[arg(long)]
    pub web: bool,

    /// Check-ip service to use with --web
    #[arg(long = "web-url")]
    pub web_url: Option<String>,

    /// Debug output
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Verbose output
    #[arg(long)]
    pub verbose: bool,

    /// List the supported services and exit
    #[arg(long = "list-services")]
    pub list_services: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl Args {
    pub fn new() -> Self {
        Self::parse()
    }
}

fn parse_seconds(value: &str) -> Result<u64, String> {
    crate::config::parse_interval(value).map_err(|e| e.to_string())
}
