use super::http::{self, Anchor, HttpRequest, Marker, MarkerTable, Verdict};
use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::validate::Field;

/// Hosts that go this long without an update are expired by the service.
const MAX_INTERVAL: u64 = 24 * 24 * 3600;

const SUPPORTED: &[Field] = &[
    Field::Host,
    Field::Address,
    Field::Wildcard,
    Field::MailExchange,
    Field::Offline,
];
const REQUIRED: &[Field] = &[Field::User, Field::Password, Field::Host];

pub static DYNAMIC: ProviderDescriptor = ProviderDescriptor {
    id: "dyndns",
    aliases: &[],
    name: "dyndns.org dynamic DNS",
    server: "members.dyndns.org",
    port: 80,
    request: "/nic/update",
    supported: SUPPORTED,
    required: REQUIRED,
    default_max_interval: Some(MAX_INTERVAL),
};

pub static STATIC: ProviderDescriptor = ProviderDescriptor {
    id: "dyndns-static",
    aliases: &["statdns"],
    name: "dyndns.org static DNS",
    server: "members.dyndns.org",
    port: 80,
    request: "/nic/update",
    supported: SUPPORTED,
    required: REQUIRED,
    default_max_interval: Some(MAX_INTERVAL),
};

pub static CUSTOM: ProviderDescriptor = ProviderDescriptor {
    id: "dyndns-custom",
    aliases: &[],
    name: "dyndns.org custom DNS",
    server: "members.dyndns.org",
    port: 80,
    request: "/nic/update",
    supported: SUPPORTED,
    required: REQUIRED,
    default_max_interval: Some(MAX_INTERVAL),
};

const fn line(text: &'static str, verdict: Verdict) -> Marker {
    Marker {
        text,
        anchor: Anchor::LineStart,
        verdict,
    }
}

static MARKERS: MarkerTable = MarkerTable {
    markers: &[
        line("good", Verdict::Success),
        line("nochg", Verdict::NoChange),
        line("badauth", Verdict::AuthFailure),
        line("badsys", Verdict::Error("bad system parameter")),
        line("badagent", Verdict::Error("this client has been blocked by the server")),
        line("notfqdn", Verdict::Error("hostname is not a fully qualified domain name")),
        line("nohost", Verdict::Error("no such host in this account")),
        line("!yours", Verdict::Error("host exists but not under this account")),
        line("!donator", Verdict::Error("feature requires a donator account")),
        line("abuse", Verdict::Error("host blocked for update abuse")),
        line("numhost", Verdict::Error("too many or too few hosts found")),
        line("dnserr", Verdict::Error("DNS error on the server")),
        line("911", Verdict::Error("server is down for maintenance, try later")),
    ],
    otherwise: Verdict::Unrecognized,
};

/// dyndns.org and its static and custom variants, which differ only in the
/// `system` parameter.
pub struct DynDns {
    descriptor: &'static ProviderDescriptor,
}

impl DynDns {
    pub fn new(descriptor: &'static ProviderDescriptor) -> Self {
        Self { descriptor }
    }

    fn system(&self) -> &'static str {
        match self.descriptor.id {
            "dyndns-static" => "statdns",
            "dyndns-custom" => "custom",
            _ => "dyndns",
        }
    }

    fn build(&self, request_uri: &str, request: &UpdateRequest) -> HttpRequest {
        let mut req = HttpRequest::get(request_uri)
            .param("system", self.system())
            .param("hostname", &request.hostname);

        if let Some(ip) = request.ip_address {
            req = req.param("myip", ip.to_string());
        }

        req = req
            .param("wildcard", if request.wildcard { "ON" } else { "OFF" })
            .param_opt("mx", request.mail_exchange.as_deref());

        if request.mail_exchange.as_deref().is_some_and(|mx| !mx.is_empty()) {
            req = req.param("backmx", "NO");
        }
        if request.offline {
            req = req.param("offline", "YES");
        }

        req.basic_auth(&request.username, &request.password)
    }
}

impl Provider for DynDns {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        self.descriptor
    }

    fn update_entry(&self, ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        let req = self.build(&ctx.endpoint.request, request);
        http::perform(ctx, &req, &MARKERS)
    }
}
