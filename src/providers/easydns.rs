use super::http::{self, Anchor, HttpRequest, Marker, MarkerTable, Verdict};
use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::validate::Field;

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "easydns",
    aliases: &[],
    name: "easyDNS",
    server: "members.easydns.com",
    port: 80,
    request: "/dyn/ez-ipupdate.php",
    supported: &[Field::Host, Field::Address, Field::Wildcard, Field::MailExchange],
    required: &[Field::User, Field::Password, Field::Host],
    default_max_interval: None,
};

const fn anywhere(text: &'static str, verdict: Verdict) -> Marker {
    Marker {
        text,
        anchor: Anchor::Anywhere,
        verdict,
    }
}

static MARKERS: MarkerTable = MarkerTable {
    markers: &[
        anywhere("NOERROR", Verdict::Success),
        anywhere("NOACCESS", Verdict::AuthFailure),
        anywhere("NOSERVICE", Verdict::Error("dynamic DNS is not enabled for this domain")),
        anywhere("ILLEGAL INPUT", Verdict::Error("server rejected the request as illegal input")),
        anywhere("TOOSOON", Verdict::Error("update too soon after the previous one")),
    ],
    otherwise: Verdict::Unrecognized,
};

pub struct EasyDns;

impl Provider for EasyDns {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        let mut req = HttpRequest::get(&ctx.endpoint.request)
            .param("action", "edit")
            .param("host_id", &request.hostname);
        if let Some(ip) = request.ip_address {
            req = req.param("myip", ip.to_string());
        }
        req = req
            .param("wildcard", if request.wildcard { "ON" } else { "OFF" })
            .param_opt("mx", request.mail_exchange.as_deref());
        if request.mail_exchange.is_some() {
            req = req.param("backmx", "NO");
        }
        let req = req.basic_auth(&request.username, &request.password);

        http::perform(ctx, &req, &MARKERS)
    }
}
