use super::http::{self, HttpRequest};
use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::validate::Field;

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "tzo",
    aliases: &[],
    name: "TZO",
    server: "cgi.tzo.com",
    port: 80,
    request: "/webclient/signedon.html",
    supported: &[Field::Host, Field::Address, Field::ConnectionType],
    required: &[Field::User, Field::Password, Field::Host],
    default_max_interval: None,
};

/// TZO identifies the account by e-mail address (the user) and key (the
/// password), both passed in the query.
pub struct Tzo;

impl Provider for Tzo {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        let mut req = HttpRequest::get(&ctx.endpoint.request)
            .param("TZOName", &request.hostname)
            .param("Email", &request.username)
            .param("TZOKey", &request.password);
        if let Some(ip) = request.ip_address {
            req = req.param("IPAddress", ip.to_string());
        }
        if let Some(kind) = request.connection_type {
            req = req.param("ConnectionType", kind.to_string());
        }

        http::perform(ctx, &req, &http::STATUS_ONLY)
    }
}
