/// Field checks done once at startup.
///
/// Unsupported optional fields only produce warnings: services ignore what
/// they don't understand, so the update goes ahead regardless. Missing
/// mandatory fields are prompted for on the terminal in one-shot mode and
/// are fatal when running unattended.
use crate::config::Config;
use crate::providers::{ProviderDescriptor, UpdateRequest};
use std::fmt;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    User,
    Password,
    Host,
    Address,
    Wildcard,
    MailExchange,
    Url,
    CloakTitle,
    ConnectionType,
    Offline,
}

impl Field {
    /// Option name as used on the command line and in config files.
    pub fn name(&self) -> &'static str {
        match self {
            Field::User => "user",
            Field::Password => "password",
            Field::Host => "host",
            Field::Address => "address",
            Field::Wildcard => "wildcard",
            Field::MailExchange => "mx",
            Field::Url => "url",
            Field::CloakTitle => "cloak-title",
            Field::ConnectionType => "connection-type",
            Field::Offline => "offline",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the {service} service needs a {field} and none was given")]
    MissingField { field: Field, service: &'static str },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("unknown service type '{0}' (try --list-services)")]
    UnknownService(String),
}

/// A field was set that the selected service will ignore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub field: Field,
    pub service: &'static str,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the {} service does not support the {} option, ignoring it", self.service, self.field)
    }
}

/// Warn about every optional field present in `request` that `descriptor`
/// does not declare support for.
pub fn validate(descriptor: &ProviderDescriptor, request: &UpdateRequest) -> Vec<Warning> {
    let present = [
        (Field::Host, !request.hostname.is_empty()),
        (Field::Address, request.ip_address.is_some()),
        (Field::Wildcard, request.wildcard),
        (Field::MailExchange, is_set(&request.mail_exchange)),
        (Field::Url, is_set(&request.redirect_url)),
        (Field::CloakTitle, is_set(&request.cloak_title)),
        (Field::ConnectionType, request.connection_type.is_some()),
        (Field::Offline, request.offline),
    ];

    present
        .into_iter()
        .filter(|(field, set)| *set && !descriptor.supports(*field))
        .map(|(field, _)| Warning {
            field,
            service: descriptor.id,
        })
        .collect()
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Source for values the user forgot to configure.
pub trait Prompt {
    /// Ask for `field`. `None` means no answer can be had.
    fn ask(&self, field: Field) -> Option<String>;
}

/// Interactive prompting on the controlling terminal.
pub struct Terminal;

impl Prompt for Terminal {
    fn ask(&self, field: Field) -> Option<String> {
        let answer = match field {
            Field::Password => rpassword::prompt_password("password: ").ok()?,
            _ => {
                print!("{}: ", field);
                io::stdout().flush().ok()?;
                let mut line = String::new();
                io::stdin().lock().read_line(&mut line).ok()?;
                line
            }
        };
        let answer = answer.trim().to_string();
        (!answer.is_empty()).then_some(answer)
    }
}

/// Daemon mode: nobody is there to answer.
pub struct Unattended;

impl Prompt for Unattended {
    fn ask(&self, _field: Field) -> Option<String> {
        None
    }
}

/// Make sure every field in `descriptor.required` is set in `config`,
/// prompting for the ones that aren't.
pub fn require_fields(descriptor: &ProviderDescriptor, config: &mut Config, prompt: &dyn Prompt) -> Result<(), ValidationError> {
    for field in descriptor.required {
        let slot = match field {
            Field::User => &mut config.user,
            Field::Password => &mut config.password,
            Field::Host => &mut config.host,
            _ => continue,
        };

        if slot.as_deref().is_some_and(|v| !v.is_empty()) {
            continue;
        }

        match prompt.ask(*field) {
            Some(value) => *slot = Some(value),
            None => {
                return Err(ValidationError::MissingField {
                    field: *field,
                    service: descriptor.id,
                })
            }
        }
    }
    Ok(())
}
