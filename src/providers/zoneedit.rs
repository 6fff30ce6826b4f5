use super::http::{self, Anchor, HttpRequest, Marker, MarkerTable, Verdict};
use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::validate::Field;

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "zoneedit",
    aliases: &[],
    name: "ZoneEdit",
    server: "dynamic.zoneedit.com",
    port: 80,
    request: "/auth/dynamic.html",
    supported: &[Field::Host, Field::Address, Field::MailExchange],
    required: &[Field::User, Field::Password, Field::Host],
    default_max_interval: None,
};

// Replies look like `<SUCCESS CODE="200" TEXT="..." ZONE="...">`.
static MARKERS: MarkerTable = MarkerTable {
    markers: &[
        Marker {
            text: "CODE=\"200\"",
            anchor: Anchor::Anywhere,
            verdict: Verdict::Success,
        },
        Marker {
            text: "CODE=\"201\"",
            anchor: Anchor::Anywhere,
            verdict: Verdict::NoChange,
        },
        Marker {
            text: "CODE=\"707\"",
            anchor: Anchor::Anywhere,
            verdict: Verdict::Error("update too frequent, try again later"),
        },
        Marker {
            text: "CODE=\"701\"",
            anchor: Anchor::Anywhere,
            verdict: Verdict::Error("zone is not set up in this account"),
        },
        Marker {
            text: "<ERROR",
            anchor: Anchor::Anywhere,
            verdict: Verdict::Unrecognized,
        },
    ],
    otherwise: Verdict::Unrecognized,
};

pub struct ZoneEdit;

impl Provider for ZoneEdit {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        let mut req = HttpRequest::get(&ctx.endpoint.request).param("host", &request.hostname);
        if let Some(ip) = request.ip_address {
            req = req.param("dnsto", ip.to_string());
        }
        let req = req
            .param_opt("mx", request.mail_exchange.as_deref())
            .basic_auth(&request.username, &request.password);

        http::perform(ctx, &req, &MARKERS)
    }
}
