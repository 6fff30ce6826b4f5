use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::config::Config;
use crate::transport::{Connection, TransportError};
use crate::validate::{self, Field, Prompt, ValidationError};

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "gnudip",
    aliases: &[],
    name: "GnuDIP (self hosted)",
    server: "",
    port: 3495,
    request: "",
    supported: &[Field::Host, Field::Address, Field::Offline],
    required: &[Field::User, Field::Password, Field::Host],
    default_max_interval: None,
};

/// Request codes.
const SET_ADDRESS: char = '0';
const GO_OFFLINE: char = '1';
const SERVER_DETECTS: char = '2';

/// GnuDIP: the server sends a salt, the client answers with one
/// colon-delimited line carrying a salted double MD5 of the password, and
/// the server replies with a single digit.
pub struct GnuDip;

impl GnuDip {
    fn login_line(request: &UpdateRequest, salt: &str) -> String {
        let domain = request
            .hostname
            .split_once('.')
            .map_or(request.hostname.as_str(), |(_, domain)| domain);

        let (code, address) = if request.offline {
            (GO_OFFLINE, String::new())
        } else {
            match request.ip_address {
                Some(ip) => (SET_ADDRESS, ip.to_string()),
                None => (SERVER_DETECTS, String::new()),
            }
        };

        let mut line = format!("{}:{}:{}:{}", request.username, digest(&request.password, salt), domain, code);
        if code == SET_ADDRESS {
            line.push(':');
            line.push_str(&address);
        }
        line.push('\n');
        line
    }

    fn session(conn: &mut dyn Connection, request: &UpdateRequest) -> Result<UpdateOutcome, TransportError> {
        let salt = conn.receive_line()?;
        let salt = salt.trim();
        if salt.is_empty() {
            return Ok(UpdateOutcome::ProtocolError("server sent no salt".to_string()));
        }

        conn.send(Self::login_line(request, salt).as_bytes())?;

        let reply = conn.receive_line()?;
        let outcome = match reply.trim().split(':').next().unwrap_or("") {
            "0" => UpdateOutcome::Success,
            "1" => UpdateOutcome::AuthFailure,
            "2" => {
                log::info!("host is now marked offline");
                UpdateOutcome::Success
            }
            other => UpdateOutcome::ProtocolError(format!("unknown reply code '{}'", other)),
        };
        Ok(outcome)
    }
}

/// `md5hex(md5hex(password) "." salt)`
fn digest(password: &str, salt: &str) -> String {
    let inner = hex::encode(md5::compute(password.as_bytes()).0);
    hex::encode(md5::compute(format!("{}.{}", inner, salt).as_bytes()).0)
}

impl Provider for GnuDip {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    /// There is no public GnuDIP server, so one has to be named.
    fn check_info(&self, config: &mut Config, prompt: &dyn Prompt) -> Result<(), ValidationError> {
        if !config.server.as_deref().is_some_and(|s| !s.is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "server",
                reason: "the gnudip service needs the server given with --server".to_string(),
            });
        }
        validate::require_fields(&DESCRIPTOR, config, prompt)
    }

    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        let endpoint = &ctx.endpoint;
        let mut conn = match ctx.transport.connect(&endpoint.server, endpoint.port, ctx.timeout) {
            Ok(conn) => conn,
            Err(e) => return e.into(),
        };

        Self::session(conn.as_mut(), request).unwrap_or_else(UpdateOutcome::from)
    }
}
