//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The client
//! builds `HttpRequest` values and interprets `HttpResponse` values without
//! touching the network; a `Transport` implementation performs the actual
//! round-trip. Keeping the two apart lets every route and every response
//! mapping be tested with literal values.
//!
//! Response bodies are raw bytes because downloads return binary payloads;
//! text endpoints decode them explicitly.

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A single file carried in a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// Raw JSON text, passed through unmodified.
    Json(String),
    Multipart(FilePart),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

/// An HTTP request described as plain data.
///
/// Built by `ReportingClient::build_*` methods. `url` is absolute: the
/// client's base address joined with the endpoint path and query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Reason phrase reported for the status, when one is known.
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn reason_phrase(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }

    /// Full human-readable dump of the response: status line, headers and
    /// body text. Carried by errors for non-success statuses.
    pub fn describe(&self) -> String {
        let mut out = format!("StatusCode: {}, ReasonPhrase: '{}'", self.status, self.reason_phrase());
        if !self.headers.is_empty() {
            let headers = self
                .headers
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(", Headers: {{ {headers} }}"));
        }
        if !self.body.is_empty() {
            out.push_str(&format!(", Content: {}", String::from_utf8_lossy(&self.body)));
        }
        out
    }
}
