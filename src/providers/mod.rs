use crate::clock::Clock;
use crate::config::Config;
use crate::transport::{Transport, TransportError};
use crate::validate::{self, Field, Prompt, ValidationError};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

pub mod dhs;
pub mod dyndns;
pub mod dyns;
pub mod easydns;
pub mod ezip;
pub mod gnudip;
pub mod http;
pub mod null;
pub mod pgpow;
pub mod tzo;
pub mod zoneedit;

/// Static description of a service: where it lives and what it understands.
#[derive(Debug)]
pub struct ProviderDescriptor {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    pub name: &'static str,
    pub server: &'static str,
    pub port: u16,
    pub request: &'static str,
    /// Fields the service makes use of.
    pub supported: &'static [Field],
    /// Fields that must be known before the first attempt.
    pub required: &'static [Field],
    /// Services that expire idle hosts want a periodic refresh.
    pub default_max_interval: Option<u64>,
}

impl ProviderDescriptor {
    pub fn supports(&self, field: Field) -> bool {
        self.supported.contains(&field)
    }

    fn matches(&self, name: &str) -> bool {
        self.id.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// Result of one update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Success,
    /// The server already had this address.
    NoChangeNeeded,
    AuthFailure,
    ProtocolError(String),
    TransportError(TransportError),
}

impl UpdateOutcome {
    /// Both outcomes mean the server now holds the address.
    pub fn is_success(&self) -> bool {
        matches!(self, UpdateOutcome::Success | UpdateOutcome::NoChangeNeeded)
    }

    /// Bad credentials stay bad; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpdateOutcome::ProtocolError(_) | UpdateOutcome::TransportError(_))
    }
}

impl From<TransportError> for UpdateOutcome {
    fn from(e: TransportError) -> Self {
        UpdateOutcome::TransportError(e)
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::Success => f.write_str("request successful"),
            UpdateOutcome::NoChangeNeeded => f.write_str("address already current, no change needed"),
            UpdateOutcome::AuthFailure => f.write_str("authentication failure"),
            UpdateOutcome::ProtocolError(msg) => write!(f, "server error: {}", msg),
            UpdateOutcome::TransportError(e) => write!(f, "{}", e),
        }
    }
}

/// Everything a service needs for one attempt. Built fresh from the current
/// configuration before every attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub hostname: String,
    /// `None` leaves it to the server to use the connection's source address.
    pub ip_address: Option<Ipv4Addr>,
    pub wildcard: bool,
    pub mail_exchange: Option<String>,
    pub redirect_url: Option<String>,
    pub cloak_title: Option<String>,
    pub connection_type: Option<u32>,
    pub offline: bool,
    pub username: String,
    pub password: String,
}

impl UpdateRequest {
    pub fn from_config(config: &Config, address: Option<Ipv4Addr>) -> Self {
        Self {
            hostname: config.host.clone().unwrap_or_default(),
            ip_address: address,
            wildcard: config.wildcard,
            mail_exchange: config.mx.clone(),
            redirect_url: config.url.clone(),
            cloak_title: config.cloak_title.clone(),
            connection_type: config.connection_type,
            offline: config.offline,
            username: config.user.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
        }
    }

    /// Address as sent on the wire; empty when the server should decide.
    pub fn address_string(&self) -> String {
        self.ip_address.map(|ip| ip.to_string()).unwrap_or_default()
    }
}

/// Where to send the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub server: String,
    pub port: u16,
    pub request: String,
}

impl Endpoint {
    /// Service defaults, overridden by whatever the configuration says.
    pub fn for_service(descriptor: &ProviderDescriptor, config: &Config) -> Self {
        Self {
            server: config.server.clone().unwrap_or_else(|| descriptor.server.to_string()),
            port: config.port.unwrap_or(descriptor.port),
            request: config.request.clone().unwrap_or_else(|| descriptor.request.to_string()),
        }
    }
}

pub struct UpdateContext<'a> {
    pub transport: &'a dyn Transport,
    pub clock: &'a dyn Clock,
    pub endpoint: Endpoint,
    pub timeout: Duration,
}

/// One dynamic DNS service.
pub trait Provider {
    fn descriptor(&self) -> &'static ProviderDescriptor;

    /// Make sure the mandatory fields are known before the first attempt,
    /// prompting where possible.
    fn check_info(&self, config: &mut Config, prompt: &dyn Prompt) -> Result<(), ValidationError> {
        validate::require_fields(self.descriptor(), config, prompt)
    }

    /// Send one update and classify the server's answer. Never panics or
    /// errors out; every failure is an `UpdateOutcome`.
    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome;
}

/// Every supported service, for lookup and `--list-services`.
pub static SERVICES: &[&ProviderDescriptor] = &[
    &null::DESCRIPTOR,
    &ezip::DESCRIPTOR,
    &pgpow::DESCRIPTOR,
    &dhs::DESCRIPTOR,
    &dyndns::DYNAMIC,
    &dyndns::STATIC,
    &dyndns::CUSTOM,
    &easydns::DESCRIPTOR,
    &gnudip::DESCRIPTOR,
    &dyns::DESCRIPTOR,
    &zoneedit::DESCRIPTOR,
    &tzo::DESCRIPTOR,
];

pub fn lookup(name: &str) -> Option<&'static ProviderDescriptor> {
    SERVICES.iter().copied().find(|d| d.matches(name))
}

/// Select the service implementation by name. Happens once per process.
pub fn create_provider(name: &str) -> Result<Box<dyn Provider>, ValidationError> {
    let descriptor = lookup(name).ok_or_else(|| ValidationError::UnknownService(name.to_string()))?;
    let provider: Box<dyn Provider> = match descriptor.id {
        "null" => Box::new(null::Null),
        "ezip" => Box::new(ezip::EzIp),
        "pgpow" => Box::new(pgpow::PgPow),
        "dhs" => Box::new(dhs::Dhs),
        "dyndns" => Box::new(dyndns::DynDns::new(&dyndns::DYNAMIC)),
        "dyndns-static" => Box::new(dyndns::DynDns::new(&dyndns::STATIC)),
        "dyndns-custom" => Box::new(dyndns::DynDns::new(&dyndns::CUSTOM)),
        "easydns" => Box::new(easydns::EasyDns),
        "gnudip" => Box::new(gnudip::GnuDip),
        "dyns" => Box::new(dyns::Dyns),
        "zoneedit" => Box::new(zoneedit::ZoneEdit),
        "tzo" => Box::new(tzo::Tzo),
        other => return Err(ValidationError::UnknownService(other.to_string())),
    };
    Ok(provider)
}

/// Human readable service table.
pub fn describe_services() -> String {
    let mut out = String::new();
    for d in SERVICES {
        let fields: Vec<&str> = d
            .supported
            .iter()
            .filter(|f| !matches!(f, Field::Host | Field::Address))
            .map(|f| f.name())
            .collect();
        let endpoint = if d.server.is_empty() {
            "-".to_string()
        } else {
            format!("{}:{}", d.server, d.port)
        };
        out.push_str(&format!(
            "  {:<14} {:<30} {:<32} {}\n",
            d.id,
            d.name,
            endpoint,
            if fields.is_empty() { "-".to_string() } else { fields.join(",") }
        ));
    }
    out
}
