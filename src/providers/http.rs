/// HTTP/1.0 over the raw transport, shared by the web based services.
///
/// Requests are built by hand rather than through an HTTP client so that the
/// same `Transport` (and the same mock in tests) serves every service.
/// Responses are classified from the status line first; a 200 is then read
/// against the service's marker table.
use super::{UpdateContext, UpdateOutcome};
use base64::{engine::general_purpose, Engine as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    authorization: Option<String>,
}

impl HttpRequest {
    pub fn get(path: &str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::Post, path)
    }

    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            form: Vec::new(),
            authorization: None,
        }
    }

    /// Add a query string parameter. Values are percent-encoded.
    pub fn param(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.query.push((key.to_string(), value.as_ref().to_string()));
        self
    }

    /// Add a parameter only when there is a value to send.
    pub fn param_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.param(key, v),
            _ => self,
        }
    }

    /// Add an `application/x-www-form-urlencoded` body field.
    pub fn field(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.form.push((key.to_string(), value.as_ref().to_string()));
        self
    }

    pub fn basic_auth(mut self, user: &str, password: &str) -> Self {
        let token = general_purpose::STANDARD.encode(format!("{}:{}", user, password));
        self.authorization = Some(format!("Basic {}", token));
        self
    }

    /// Request target including the encoded query string.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let separator = if self.path.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.path, separator, encode_pairs(&self.query))
    }

    /// Serialise to wire format.
    pub fn to_bytes(&self, host: &str, user_agent: &str) -> Vec<u8> {
        let method = match self.method {
            Method::Get => "GET",
            Method::Post => "POST",
        };

        let mut out = format!("{} {} HTTP/1.0\r\n", method, self.target());
        if let Some(auth) = &self.authorization {
            out.push_str(&format!("Authorization: {}\r\n", auth));
        }
        out.push_str(&format!("User-Agent: {}\r\n", user_agent));
        out.push_str(&format!("Host: {}\r\n", host));

        if self.method == Method::Post {
            let body = encode_pairs(&self.form);
            out.push_str("Content-Type: application/x-www-form-urlencoded\r\n");
            out.push_str(&format!("Content-Length: {}\r\n", body.len()));
            out.push_str("\r\n");
            out.push_str(&body);
        } else {
            out.push_str("\r\n");
        }

        out.into_bytes()
    }
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

/// Parse `HTTP/1.x NNN reason` plus whatever follows the header block.
/// `None` when the reply is not HTTP at all.
pub fn parse_response(raw: &[u8]) -> Option<HttpResponse> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_start();

    let status_line = text.lines().next()?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next()?;
    if !version.starts_with("HTTP/1.") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    let status = code.parse::<u16>().ok()?;
    let reason = parts.next().unwrap_or("").trim().to_string();

    let body = match text.find("\r\n\r\n") {
        Some(i) => &text[i + 4..],
        None => match text.find("\n\n") {
            Some(i) => &text[i + 2..],
            None => "",
        },
    };

    Some(HttpResponse {
        status,
        reason,
        body: body.to_string(),
    })
}

/// Where in the body a marker has to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Anywhere,
    /// At the start of some line, after leading whitespace.
    LineStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    NoChange,
    AuthFailure,
    Error(&'static str),
    /// Nothing recognisable; reported with the first body line.
    Unrecognized,
}

#[derive(Debug)]
pub struct Marker {
    pub text: &'static str,
    pub anchor: Anchor,
    pub verdict: Verdict,
}

/// How a service reports its result inside a 200 response. Markers are
/// tried in order; the first hit wins.
#[derive(Debug)]
pub struct MarkerTable {
    pub markers: &'static [Marker],
    pub otherwise: Verdict,
}

impl MarkerTable {
    fn verdict(&self, body: &str) -> Verdict {
        self.markers
            .iter()
            .find(|m| match m.anchor {
                Anchor::Anywhere => body.contains(m.text),
                Anchor::LineStart => body.lines().any(|line| line.trim_start().starts_with(m.text)),
            })
            .map_or(self.otherwise, |m| m.verdict)
    }
}

/// Services whose answer is carried by the status code alone.
pub static STATUS_ONLY: MarkerTable = MarkerTable {
    markers: &[],
    otherwise: Verdict::Success,
};

pub fn classify(raw: &[u8], table: &MarkerTable) -> UpdateOutcome {
    let response = match parse_response(raw) {
        Some(response) => response,
        None => {
            let text = String::from_utf8_lossy(raw);
            let first = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
            return UpdateOutcome::ProtocolError(format!(
                "strange server response, are you connecting to the right server? ({})",
                first
            ));
        }
    };

    match response.status {
        200 => match table.verdict(&response.body) {
            Verdict::Success => UpdateOutcome::Success,
            Verdict::NoChange => UpdateOutcome::NoChangeNeeded,
            Verdict::AuthFailure => UpdateOutcome::AuthFailure,
            Verdict::Error(msg) => UpdateOutcome::ProtocolError(msg.to_string()),
            Verdict::Unrecognized => {
                let first = response.body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
                UpdateOutcome::ProtocolError(format!("unexpected server response: {}", first))
            }
        },
        401 => UpdateOutcome::AuthFailure,
        code => UpdateOutcome::ProtocolError(format!("unknown return code: {} {}", code, response.reason)),
    }
}

/// One request/response exchange on a fresh connection.
pub fn perform(ctx: &UpdateContext, request: &HttpRequest, table: &MarkerTable) -> UpdateOutcome {
    let endpoint = &ctx.endpoint;
    let mut conn = match ctx.transport.connect(&endpoint.server, endpoint.port, ctx.timeout) {
        Ok(conn) => conn,
        Err(e) => return e.into(),
    };

    let bytes = request.to_bytes(&endpoint.server, &crate::user_agent());
    if let Err(e) = conn.send(&bytes) {
        return e.into();
    }

    let raw = match conn.receive_all() {
        Ok(raw) => raw,
        Err(e) => return e.into(),
    };
    log::debug!("server output: {}", String::from_utf8_lossy(&raw));

    classify(&raw, table)
}
