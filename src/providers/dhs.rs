use super::http::{self, HttpRequest};
use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::validate::Field;
use std::time::Duration;

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "dhs",
    aliases: &[],
    name: "DHS International",
    server: "members.dhs.org",
    port: 80,
    request: "/nic/hosts",
    supported: &[Field::Host, Field::Address, Field::MailExchange, Field::Url, Field::CloakTitle],
    required: &[Field::User, Field::Password, Field::Host],
    default_max_interval: None,
};

/// Longest the server needs to settle before it accepts the second form.
const SETTLE: Duration = Duration::from_secs(5);

/// DHS takes a POSTed form. The redirect url and cloak settings are only
/// honoured in a second submission, which must not follow the first too
/// quickly.
pub struct Dhs;

impl Dhs {
    fn form(&self, request_uri: &str, request: &UpdateRequest) -> HttpRequest {
        let (host, domain) = split_host(&request.hostname);
        HttpRequest::post(request_uri)
            .field("hostscmd", "edit")
            .field("hostscmdstage", "2")
            .field("type", "4")
            .field("updatetype", "Online")
            .field("domain", domain)
            .field("hostname", host)
            .field("ip", request.address_string())
            .field("mx", request.mail_exchange.as_deref().unwrap_or(""))
            .field("submit", "Update")
            .basic_auth(&request.username, &request.password)
    }

    fn redirect_form(&self, request_uri: &str, request: &UpdateRequest) -> HttpRequest {
        let (host, domain) = split_host(&request.hostname);
        let cloak = request.cloak_title.as_deref().unwrap_or("");
        HttpRequest::post(request_uri)
            .field("hostscmd", "edit")
            .field("hostscmdstage", "2")
            .field("type", "5")
            .field("domain", domain)
            .field("hostname", host)
            .field("url", request.redirect_url.as_deref().unwrap_or(""))
            .field("cloak", if cloak.is_empty() { "N" } else { "Y" })
            .field("cloak_title", cloak)
            .field("submit", "Update")
            .basic_auth(&request.username, &request.password)
    }
}

impl Provider for Dhs {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        let outcome = http::perform(ctx, &self.form(&ctx.endpoint.request, request), &http::STATUS_ONLY);

        let wants_redirect = [&request.redirect_url, &request.cloak_title]
            .iter()
            .any(|v| v.as_deref().is_some_and(|s| !s.is_empty()));
        if !outcome.is_success() || !wants_redirect {
            return outcome;
        }

        ctx.clock.sleep(ctx.timeout.min(SETTLE));
        http::perform(ctx, &self.redirect_form(&ctx.endpoint.request, request), &http::STATUS_ONLY)
    }
}

/// `foo.example.com` becomes (`foo`, `example.com`).
fn split_host(hostname: &str) -> (&str, &str) {
    hostname.split_once('.').unwrap_or((hostname, ""))
}
