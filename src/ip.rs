use crate::config::Config;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::process::Command;
use thiserror::Error;

/// Where the address to publish comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSource {
    /// Given on the command line or in the config file.
    Explicit(Ipv4Addr),
    /// Primary IPv4 address of a local interface.
    Interface(String),
    /// A check-ip web service; `None` tries the built in list.
    Web(Option<String>),
    /// Nothing known locally; the service uses the connection's address.
    Provider,
}

impl AddressSource {
    pub fn from_config(config: &Config) -> Self {
        if let Some(address) = config.address {
            Self::Explicit(address)
        } else if let Some(interface) = &config.interface {
            Self::Interface(interface.clone())
        } else if config.web {
            Self::Web(config.web_url.clone())
        } else {
            Self::Provider
        }
    }
}

impl std::fmt::Display for AddressSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(ip) => write!(f, "address {}", ip),
            Self::Interface(name) => write!(f, "interface {}", name),
            Self::Web(Some(url)) => write!(f, "check-ip service {}", url),
            Self::Web(None) => f.write_str("check-ip services"),
            Self::Provider => f.write_str("server side detection"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("could not determine the address of interface {0}")]
    Interface(String),

    #[error("check-ip request to {url} failed: {reason}")]
    Web { url: String, reason: String },

    #[error("no check-ip service returned an IPv4 address")]
    NoWebAddress,
}

/// Address discovery, behind a trait so the daemon can be tested without
/// real interfaces.
pub trait AddressLookup {
    fn interface_address(&self, interface: &str) -> Result<Ipv4Addr, LookupError>;

    fn web_address(&self, url: Option<&str>, timeout: u64) -> Result<Ipv4Addr, LookupError>;
}

/// Check-ip services tried in order when no url is configured. All of them
/// answer over IPv4 only or return JSON with an `ip` field.
const WEB_SERVICES: &[&str] = &[
    "https://api.ipify.org?format=json",
    "http://checkip.amazonaws.com",
    "https://ipv4.icanhazip.com",
    "https://ipv4.nsupdate.info/myip",
    "http://ifconfig.me/ip",
];

pub struct SystemLookup;

impl AddressLookup for SystemLookup {
    fn interface_address(&self, interface: &str) -> Result<Ipv4Addr, LookupError> {
        // `ip` on modern Linux, `ifconfig` everywhere else
        let attempts: [(&str, Vec<&str>); 2] = [
            ("ip", vec!["-o", "-4", "addr", "show", "dev", interface]),
            ("ifconfig", vec![interface]),
        ];

        for (program, args) in &attempts {
            match Command::new(program).args(args).output() {
                Ok(output) if output.status.success() => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    if let Some(ip) = extract_ipv4(&stdout) {
                        log::debug!("{}: {} (via {})", interface, ip, program);
                        return Ok(ip);
                    }
                }
                Ok(output) => log::debug!("{} {} exited with {}", program, interface, output.status),
                Err(e) => log::debug!("unable to run {}: {}", program, e),
            }
        }

        Err(LookupError::Interface(interface.to_string()))
    }

    fn web_address(&self, url: Option<&str>, timeout: u64) -> Result<Ipv4Addr, LookupError> {
        if let Some(url) = url {
            return try_service(url, timeout);
        }

        for service in WEB_SERVICES {
            match try_service(service, timeout) {
                Ok(ip) => return Ok(ip),
                Err(e) => log::debug!("{}", e),
            }
        }
        Err(LookupError::NoWebAddress)
    }
}

#[derive(Deserialize)]
struct WebReply {
    ip: String,
}

fn try_service(url: &str, timeout: u64) -> Result<Ipv4Addr, LookupError> {
    let fail = |reason: String| LookupError::Web {
        url: url.to_string(),
        reason,
    };

    let response = minreq::get(url)
        .with_header("User-Agent", crate::user_agent())
        .with_timeout(timeout)
        .send()
        .map_err(|e| fail(e.to_string()))?;

    if response.status_code != 200 {
        return Err(fail(format!("HTTP {}", response.status_code)));
    }

    let body = response.as_str().map_err(|e| fail(e.to_string()))?;
    parse_web_body(body).ok_or_else(|| fail(format!("no IPv4 address in reply '{}'", body.trim())))
}

/// Either `{"ip": "..."}` or the bare address.
fn parse_web_body(body: &str) -> Option<Ipv4Addr> {
    let body = body.trim();
    if body.starts_with('{') {
        let reply: WebReply = serde_json::from_str(body).ok()?;
        return reply.ip.trim().parse().ok();
    }
    body.split_whitespace().next()?.parse().ok()
}

/// First non-loopback IPv4 address in `ip`/`ifconfig` output.
fn extract_ipv4(output: &str) -> Option<Ipv4Addr> {
    for line in output.lines() {
        let Some(pos) = line.find("inet ") else {
            continue;
        };
        for word in line[pos..].split_whitespace().skip(1) {
            // `addr:1.2.3.4` on old net-tools, `1.2.3.4/24` on iproute2
            let word = word.strip_prefix("addr:").unwrap_or(word);
            let candidate = word.split('/').next().unwrap_or(word);
            if let Ok(ip) = candidate.parse::<Ipv4Addr>() {
                if !ip.is_loopback() {
                    return Some(ip);
                }
                break;
            }
        }
    }
    None
}

/// Work out the address to publish. `Ok(None)` means leave it to the
/// server.
pub fn resolve_address(
    source: &AddressSource,
    lookup: &dyn AddressLookup,
    timeout: u64,
) -> Result<Option<Ipv4Addr>, LookupError> {
    match source {
        AddressSource::Explicit(ip) => Ok(Some(*ip)),
        AddressSource::Interface(name) => lookup.interface_address(name).map(Some),
        AddressSource::Web(url) => lookup.web_address(url.as_deref(), timeout).map(Some),
        AddressSource::Provider => Ok(None),
    }
}
