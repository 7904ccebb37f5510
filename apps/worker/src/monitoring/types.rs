use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// Up/down status of a monitored endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Up,
    /// Every check starts out `down` until the worker has observed it
    #[default]
    Down,
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckState::Up => write!(f, "up"),
            CheckState::Down => write!(f, "down"),
        }
    }
}

/// Scheme used to reach the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request method a probe is sent with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A validated check, as stored under the `checks` collection.
///
/// Field names on disk are shared with the CRUD layer, hence the renames.
/// Keys the worker does not know about are carried in `extra` so that
/// writing the check back never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDescriptor {
    pub id: String,

    /// Subscriber that owns the check and receives its alerts
    #[serde(rename = "userPhone")]
    pub owner_id: String,

    pub protocol: Protocol,

    /// Host, path and query without the scheme
    pub url: String,

    pub method: HttpMethod,

    pub success_codes: Vec<u16>,

    pub timeout_seconds: u64,

    pub state: CheckState,

    /// Epoch milliseconds of the last execution, `None` if never checked
    #[serde(rename = "lastChecked", default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CheckDescriptor {
    /// Full URL the probe is sent to
    pub fn target_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}://{}", self.protocol, self.url))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Why a probe failed to produce a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeErrorKind {
    Transport,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub detail: String,
}

/// Terminal result of one probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub response_code: Option<u16>,
    pub error: Option<ProbeError>,
}

impl ProbeOutcome {
    pub fn response(status_code: u16) -> Self {
        Self { response_code: Some(status_code), error: None }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            response_code: None,
            error: Some(ProbeError { kind: ProbeErrorKind::Transport, detail: detail.into() }),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            response_code: None,
            error: Some(ProbeError {
                kind: ProbeErrorKind::Timeout,
                detail: format!("no response within {}s", after.as_secs()),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_kind(&self) -> Option<ProbeErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// One line of a check's append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Check as it was before this execution
    pub check: CheckDescriptor,
    pub outcome: ProbeOutcome,
    pub state: CheckState,
    pub alert: bool,
    /// Epoch milliseconds
    pub time: i64,
}
