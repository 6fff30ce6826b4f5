use super::http::{self, HttpRequest};
use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::validate::Field;

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "ezip",
    aliases: &["ez-ip"],
    name: "EZ-IP.Net",
    server: "www.EZ-IP.Net",
    port: 80,
    request: "/members/update/",
    supported: &[Field::Host, Field::Address, Field::Wildcard, Field::MailExchange, Field::Url],
    required: &[Field::User, Field::Password, Field::Host],
    default_max_interval: None,
};

/// EZ-IP.Net: every field is always sent, empty when unset, and the status
/// code is the whole answer.
pub struct EzIp;

impl EzIp {
    fn build(&self, request_uri: &str, request: &UpdateRequest) -> HttpRequest {
        HttpRequest::get(request_uri)
            .param("mode", "update")
            .param("ipaddress", request.address_string())
            .param("wildcard", if request.wildcard { "yes" } else { "no" })
            .param("mx", request.mail_exchange.as_deref().unwrap_or(""))
            .param("url", request.redirect_url.as_deref().unwrap_or(""))
            .param("host", &request.hostname)
            .basic_auth(&request.username, &request.password)
    }
}

impl Provider for EzIp {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        let req = self.build(&ctx.endpoint.request, request);
        http::perform(ctx, &req, &http::STATUS_ONLY)
    }
}
