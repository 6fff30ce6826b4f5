use super::http::{self, Anchor, HttpRequest, Marker, MarkerTable, Verdict};
use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::validate::Field;

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "dyns",
    aliases: &[],
    name: "dyns.cx",
    server: "www.dyns.cx",
    port: 80,
    request: "/postscript011.php",
    supported: &[Field::Host, Field::Address],
    required: &[Field::User, Field::Password, Field::Host],
    default_max_interval: None,
};

const fn code(text: &'static str, verdict: Verdict) -> Marker {
    Marker {
        text,
        anchor: Anchor::LineStart,
        verdict,
    }
}

static MARKERS: MarkerTable = MarkerTable {
    markers: &[
        code("200", Verdict::Success),
        code("400", Verdict::Error("bad request")),
        code("401", Verdict::AuthFailure),
        code("402", Verdict::Error("update too frequent")),
        code("403", Verdict::Error("account blocked")),
        code("404", Verdict::Error("no such host")),
        code("405", Verdict::Error("host does not belong to this account")),
    ],
    otherwise: Verdict::Unrecognized,
};

/// dyns.cx wants the credentials in the query string.
pub struct Dyns;

impl Provider for Dyns {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        let mut req = HttpRequest::get(&ctx.endpoint.request)
            .param("username", &request.username)
            .param("password", &request.password)
            .param("host", &request.hostname);
        if let Some(ip) = request.ip_address {
            req = req.param("ip", ip.to_string());
        }

        http::perform(ctx, &req, &MARKERS)
    }
}
