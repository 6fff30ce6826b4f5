/// Configuration loading.
///
/// Settings come from an optional configuration file and the command line,
/// with the command line taking precedence. The file has one option per
/// line, either `name=value` or a bare `name` for flags:
///
/// ```text
/// # ipupdate.conf
/// service-type=dyndns
/// user=bob:secret
/// host=bob.example.com
/// interface=ppp0
/// max-interval=24d
/// daemon
/// ```
///
/// Option names are looked up in a static table of setters, so the file
/// accepts exactly the long names of the command line options.
use crate::validate::ValidationError;
use std::error::Error;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVICE: &str = "ezip";
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Fully merged configuration. Built once at startup (and again on reload)
/// and only read after that.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub service_type: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub address: Option<Ipv4Addr>,
    pub interface: Option<String>,
    pub web: bool,
    pub web_url: Option<String>,
    pub wildcard: bool,
    pub mx: Option<String>,
    pub url: Option<String>,
    pub cloak_title: Option<String>,
    pub connection_type: Option<u32>,
    pub offline: bool,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub request: Option<String>,
    pub cache_file: Option<PathBuf>,
    pub execute: Option<String>,
    pub pid_file: Option<PathBuf>,
    pub daemon: bool,
    pub foreground: bool,
    /// Seconds between checks in daemon mode.
    pub period: u64,
    /// Seconds to wait after the address could not be determined.
    pub resolv_period: u64,
    /// Seconds after which an unchanged address is republished anyway.
    pub max_interval: Option<u64>,
    pub retries: u32,
    /// Network timeout in seconds.
    pub timeout: u64,
    pub quiet: bool,
    pub debug: bool,
    /// Where this configuration was read from, for reloading.
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_type: DEFAULT_SERVICE.to_string(),
            user: None,
            password: None,
            host: None,
            address: None,
            interface: None,
            web: false,
            web_url: None,
            wildcard: false,
            mx: None,
            url: None,
            cloak_title: None,
            connection_type: None,
            offline: false,
            server: None,
            port: None,
            request: None,
            cache_file: None,
            execute: None,
            pid_file: None,
            daemon: false,
            foreground: false,
            period: 600,
            resolv_period: 30,
            max_interval: None,
            retries: 1,
            timeout: 10,
            quiet: false,
            debug: false,
            config_file: None,
        }
    }
}

type Setter = fn(&mut Config, Option<&str>) -> Result<(), String>;

/// Option name to setter. Names use dashes; underscores in a file are
/// accepted and normalised.
static OPTIONS: &[(&str, Setter)] = &[
    ("address", |c, v| {
        c.address = Some(parse_address(required(v)?)?);
        Ok(())
    }),
    ("cache-file", |c, v| {
        c.cache_file = Some(PathBuf::from(required(v)?));
        Ok(())
    }),
    ("cloak-title", |c, v| {
        c.cloak_title = Some(required(v)?.to_string());
        Ok(())
    }),
    ("connection-type", |c, v| {
        c.connection_type = Some(parse_number(required(v)?)?);
        Ok(())
    }),
    ("daemon", |c, v| {
        c.daemon = flag(v)?;
        Ok(())
    }),
    ("debug", |c, v| {
        c.debug = flag(v)?;
        Ok(())
    }),
    ("execute", |c, v| {
        c.execute = Some(required(v)?.to_string());
        Ok(())
    }),
    ("foreground", |c, v| {
        c.foreground = flag(v)?;
        Ok(())
    }),
    ("host", |c, v| {
        c.host = Some(required(v)?.to_string());
        Ok(())
    }),
    ("interface", |c, v| {
        c.interface = Some(required(v)?.to_string());
        Ok(())
    }),
    ("max-interval", |c, v| {
        c.max_interval = Some(parse_seconds(required(v)?)?);
        Ok(())
    }),
    ("mx", |c, v| {
        c.mx = Some(required(v)?.to_string());
        Ok(())
    }),
    ("offline", |c, v| {
        c.offline = flag(v)?;
        Ok(())
    }),
    ("period", |c, v| {
        c.period = parse_seconds(required(v)?)?;
        Ok(())
    }),
    ("pid-file", |c, v| {
        c.pid_file = Some(PathBuf::from(required(v)?));
        Ok(())
    }),
    ("quiet", |c, v| {
        c.quiet = flag(v)?;
        Ok(())
    }),
    ("request-uri", |c, v| {
        c.request = Some(required(v)?.to_string());
        Ok(())
    }),
    ("resolv-period", |c, v| {
        c.resolv_period = parse_seconds(required(v)?)?;
        Ok(())
    }),
    ("retrys", |c, v| {
        c.retries = parse_number(required(v)?)?;
        Ok(())
    }),
    ("server", |c, v| c.set_server(required(v)?)),
    ("service-type", |c, v| {
        c.service_type = required(v)?.to_ascii_lowercase();
        Ok(())
    }),
    ("timeout", |c, v| {
        c.timeout = parse_seconds(required(v)?)?;
        Ok(())
    }),
    ("url", |c, v| {
        c.url = Some(required(v)?.to_string());
        Ok(())
    }),
    ("user", |c, v| {
        c.set_user(required(v)?);
        Ok(())
    }),
    ("web", |c, v| {
        c.web = flag(v)?;
        Ok(())
    }),
    ("web-url", |c, v| {
        c.web_url = Some(required(v)?.to_string());
        Ok(())
    }),
    ("wildcard", |c, v| {
        c.wildcard = flag(v)?;
        Ok(())
    }),
];

impl Config {
    /// Load a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn Error>> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("unable to read config file {}: {}", path.display(), e))?;
        let mut config = Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))?;
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration file text. Errors carry the offending line number.
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut config = Config::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, value) = match line.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim())),
                None => (line, None),
            };
            let name = name.replace('_', "-");

            let setter = OPTIONS
                .iter()
                .find(|(option, _)| *option == name)
                .map(|(_, setter)| setter)
                .ok_or_else(|| format!("line {}: unknown option '{}'", index + 1, name))?;

            setter(&mut config, value).map_err(|e| format!("line {}: {}: {}", index + 1, name, e))?;
        }

        Ok(config)
    }

    /// Combine an optional file-derived Config with CLI arguments, using CLI
    /// values when provided. Flags can only be switched on from the command
    /// line.
    pub fn merge(file_config: Option<Self>, args: &crate::args::Args) -> Result<Self, Box<dyn Error>> {
        let mut config = file_config.unwrap_or_default();

        if let Some(service) = &args.service_type {
            config.service_type = service.to_ascii_lowercase();
        }
        if let Some(user) = &args.user {
            config.set_user(user);
        }
        if let Some(server) = &args.server {
            config.set_server(server)?;
        }
        if let Some(address) = &args.address {
            config.address = Some(parse_address(address)?);
        }

        config.host = args.host.clone().or(config.host);
        config.interface = args.interface.clone().or(config.interface);
        config.web_url = args.web_url.clone().or(config.web_url);
        config.mx = args.mx.clone().or(config.mx);
        config.url = args.url.clone().or(config.url);
        config.cloak_title = args.cloak_title.clone().or(config.cloak_title);
        config.connection_type = args.connection_type.or(config.connection_type);
        config.request = args.request_uri.clone().or(config.request);
        config.cache_file = args.cache_file.clone().or(config.cache_file);
        config.execute = args.execute.clone().or(config.execute);
        config.pid_file = args.pid_file.clone().or(config.pid_file);
        config.max_interval = args.max_interval.or(config.max_interval);
        config.period = args.period.unwrap_or(config.period);
        config.resolv_period = args.resolv_period.unwrap_or(config.resolv_period);
        config.retries = args.retries.unwrap_or(config.retries);
        config.timeout = args.timeout.unwrap_or(config.timeout);

        config.daemon |= args.daemon;
        config.foreground |= args.foreground;
        config.wildcard |= args.wildcard;
        config.offline |= args.offline;
        config.web |= args.web || args.web_url.is_some();
        config.quiet |= args.quiet;
        config.debug |= args.debug;

        // the daemon has to watch something
        if config.daemon && config.address.is_none() && config.interface.is_none() && !config.web {
            config.interface = Some(DEFAULT_INTERFACE.to_string());
        }

        Ok(config)
    }

    /// Load the configuration file (explicit, or the default location if it
    /// exists) and merge it with the command line.
    pub fn load(args: &crate::args::Args) -> Result<Self, Box<dyn Error>> {
        let config_file = match &args.config_file {
            Some(path) => Some(path.clone()),
            None => default_config_path().filter(|path| path.exists()),
        };

        let file_config = match &config_file {
            Some(path) => {
                log::debug!("reading configuration from {}", path.display());
                Some(Self::from_file(path)?)
            }
            None => None,
        };

        let config = Self::merge(file_config, args)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that can never work.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |field: &'static str, reason: &str| ValidationError::InvalidValue {
            field,
            reason: reason.to_string(),
        };

        if self.timeout == 0 {
            return Err(invalid("timeout", "must be at least one second"));
        }
        if self.period == 0 {
            return Err(invalid("period", "must be at least one second"));
        }
        if self.resolv_period == 0 {
            return Err(invalid("resolv-period", "must be at least one second"));
        }
        if self.retries == 0 {
            return Err(invalid("retrys", "must be at least 1"));
        }
        if self.cache_file.is_some() && !self.has_address_source() {
            return Err(invalid(
                "cache-file",
                "needs an address, interface or web check-ip source to compare against",
            ));
        }
        Ok(())
    }

    /// Whether the address to publish is known locally (as opposed to left
    /// for the server to work out from the connection).
    pub fn has_address_source(&self) -> bool {
        self.address.is_some() || self.interface.is_some() || self.web
    }

    /// `user[:password]`; the password part is optional.
    fn set_user(&mut self, value: &str) {
        match value.split_once(':') {
            Some((user, password)) => {
                self.user = Some(user.to_string());
                if !password.is_empty() {
                    self.password = Some(password.to_string());
                }
            }
            None => self.user = Some(value.to_string()),
        }
    }

    /// `server[:port]`.
    fn set_server(&mut self, value: &str) -> Result<(), String> {
        match value.rsplit_once(':') {
            Some((server, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port '{}' in server '{}'", port, value))?;
                self.server = Some(server.to_string());
                self.port = Some(port);
            }
            None => self.server = Some(value.to_string()),
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ipupdate").join("ipupdate.conf"))
}

fn required(value: Option<&str>) -> Result<&str, String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err("a value is required".to_string()),
    }
}

/// Bare flag means on; `flag=no` style values are honoured too.
fn flag(value: Option<&str>) -> Result<bool, String> {
    match value.map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("yes") | Some("true") | Some("on") | Some("1") => Ok(true),
        Some("no") | Some("false") | Some("off") | Some("0") => Ok(false),
        Some(other) => Err(format!("'{}' is not a yes/no value", other)),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value.parse().map_err(|_| format!("'{}' is not a valid number", value))
}

fn parse_seconds(value: &str) -> Result<u64, String> {
    parse_interval(value).map_err(|e| e.to_string())
}

fn parse_address(value: &str) -> Result<Ipv4Addr, String> {
    value
        .parse()
        .map_err(|_| format!("'{}' is not a valid IPv4 address", value))
}

/// Convert a duration string into seconds. Accepts plain seconds or a number
/// followed by one of `s`, `m`, `h`, `d`.
pub fn parse_interval(interval: &str) -> Result<u64, Box<dyn Error>> {
    let interval = interval.trim();
    if interval.is_empty() {
        return Err("Interval cannot be empty".into());
    }

    if let Ok(seconds) = interval.parse::<u64>() {
        return Ok(seconds);
    }

    let unit_len = interval.chars().last().map_or(0, char::len_utf8);
    let (num_str, unit) = interval.split_at(interval.len() - unit_len);
    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in interval: '{}'", interval))?;

    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(format!("Invalid interval unit '{}'. Use s, m, h, or d", unit).into()),
    };

    num.checked_mul(scale)
        .ok_or_else(|| format!("Interval too large: '{}'", interval).into())
}
