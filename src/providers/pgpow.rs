use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::transport::{Connection, TransportError};
use crate::validate::Field;

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "pgpow",
    aliases: &["penguinpowered"],
    name: "penguinpowered.com",
    server: "www.penguinpowered.com",
    port: 2345,
    request: "",
    supported: &[Field::Host, Field::Address],
    required: &[Field::User, Field::Password, Field::Host],
    default_max_interval: None,
};

const PROTOCOL_VERSION: &str = "1.0";

/// How one command's reply is read.
enum Reply {
    Ok,
    Err(String),
}

/// penguinpowered line protocol: one command per line, each answered by a
/// line starting with `OK` or `ERR`.
pub struct PgPow;

impl PgPow {
    fn exchange(conn: &mut dyn Connection, command: &str) -> Result<Reply, TransportError> {
        log::debug!("pgpow: sending {}", command.split(' ').next().unwrap_or(command));
        conn.send(format!("{}\r\n", command).as_bytes())?;
        let line = conn.receive_line()?;
        let line = line.trim();
        if line.starts_with("OK") {
            Ok(Reply::Ok)
        } else {
            Ok(Reply::Err(line.to_string()))
        }
    }

    fn session(conn: &mut dyn Connection, request: &UpdateRequest) -> Result<UpdateOutcome, TransportError> {
        let mut commands = vec![
            ("VER", PROTOCOL_VERSION.to_string()),
            ("USER", request.username.clone()),
            ("PASS", request.password.clone()),
            ("HOST", request.hostname.clone()),
            ("OPER", if request.offline { "1" } else { "0" }.to_string()),
        ];
        if let Some(ip) = request.ip_address {
            commands.push(("IP", ip.to_string()));
        }

        for (verb, arg) in &commands {
            match Self::exchange(conn, &format!("{} {}", verb, arg))? {
                Reply::Ok => {}
                Reply::Err(_) if matches!(*verb, "USER" | "PASS") => return Ok(UpdateOutcome::AuthFailure),
                Reply::Err(line) => {
                    return Ok(UpdateOutcome::ProtocolError(format!("server refused {}: {}", verb, line)))
                }
            }
        }

        match Self::exchange(conn, "DONE")? {
            Reply::Ok => Ok(UpdateOutcome::Success),
            Reply::Err(line) => Ok(UpdateOutcome::ProtocolError(format!("server refused DONE: {}", line))),
        }
    }
}

impl Provider for PgPow {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
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
