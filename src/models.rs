//! Core data model: what to probe, what "healthy" means, and how the
//! outcome is classified for a monitoring supervisor.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// URL scheme of the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Scheme as it appears in a URL.
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Authentication attached to the outgoing request.
///
/// A proper sum type: credentials exist exactly when a scheme that needs
/// them is selected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Auth {
    /// No authentication.
    #[default]
    None,
    /// HTTP basic auth, applied per-request.
    Basic {
        /// Username.
        user: String,
        /// Password.
        password: String,
    },
    /// NTLM auth, negotiated by the transport wrapper.
    Ntlm {
        /// Username, optionally `DOMAIN\user`.
        user: String,
        /// Password.
        password: String,
    },
}

/// Credential-less authentication scheme, as reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// No challenge, or an unrecognized one.
    None,
    /// Server offered `Basic`.
    Basic,
    /// Server offered `Negotiate` or `NTLM`.
    Ntlm,
}

impl AuthScheme {
    /// Combines a detected scheme with credentials parsed by the CLI layer.
    ///
    /// A scheme that requires credentials degrades to [`Auth::None`] when none
    /// were supplied; the caller is expected to log that condition.
    pub fn with_credentials(self, credentials: Option<(String, String)>) -> Auth {
        match (self, credentials) {
            (AuthScheme::Basic, Some((user, password))) => Auth::Basic { user, password },
            (AuthScheme::Ntlm, Some((user, password))) => Auth::Ntlm { user, password },
            _ => Auth::None,
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthScheme::None => "none",
            AuthScheme::Basic => "basic auth",
            AuthScheme::Ntlm => "NTLM auth",
        };
        write!(f, "{label}")
    }
}

/// Client certificate identity presented during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCert {
    /// PEM file holding the certificate.
    pub cert_file: PathBuf,
    /// PEM file holding the matching private key.
    pub key_file: PathBuf,
}

/// How long the probe may take before the outcome degrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingPolicy {
    /// Single hard timeout; exceeding it is CRITICAL.
    Flat(Duration),
    /// Layered policy: a completed response slower than `warning` is WARNING,
    /// the transport aborts at `critical`.
    Interval {
        /// Elapsed-time bound checked after a successful response.
        warning: Duration,
        /// Hard transport deadline.
        critical: Duration,
    },
}

impl TimingPolicy {
    /// The hard transport deadline: the most lenient configured bound.
    pub fn deadline(&self) -> Duration {
        match self {
            TimingPolicy::Flat(timeout) => *timeout,
            TimingPolicy::Interval { critical, .. } => *critical,
        }
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        TimingPolicy::Flat(Duration::from_secs(30))
    }
}

/// Immutable description of one probe target.
#[derive(Debug, Clone)]
pub struct Target {
    /// URL scheme.
    pub scheme: Scheme,
    /// Host name; takes precedence over `ip_address` in the URL when both
    /// are given (the IP then only pins the connect address).
    pub host: String,
    /// Literal address to connect to.
    pub ip_address: Option<IpAddr>,
    /// TCP port.
    pub port: u16,
    /// Request path (and query).
    pub uri: String,
    /// Timeout configuration.
    pub timing: TimingPolicy,
    /// Disable certificate chain and hostname verification entirely.
    pub skip_verify: bool,
    /// Do not announce the host name via SNI.
    pub disable_sni: bool,
    /// Accept one legacy TLS renegotiation (compatibility flag).
    pub allow_renegotiation: bool,
    /// Optional TLS client identity.
    pub client_cert: Option<ClientCert>,
    /// Follow redirects instead of evaluating the first response as-is.
    pub follow_redirects: bool,
    /// Authentication for the outgoing request.
    pub auth: Auth,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            scheme: Scheme::Http,
            host: String::new(),
            ip_address: None,
            port: 80,
            uri: "/".to_string(),
            timing: TimingPolicy::default(),
            skip_verify: false,
            disable_sni: false,
            allow_renegotiation: false,
            client_cert: None,
            follow_redirects: false,
            auth: Auth::None,
        }
    }
}

impl Target {
    /// Name the URL (and thus SNI and the `Host` header) is built from:
    /// the host when present, otherwise the IP address.
    pub fn effective_host(&self) -> Option<String> {
        if !self.host.is_empty() {
            Some(self.host.clone())
        } else {
            self.ip_address.map(|ip| ip.to_string())
        }
    }

    /// Full request URL.
    pub fn url(&self) -> String {
        let host = self.effective_host().unwrap_or_default();
        format!("{}://{}:{}{}", self.scheme.as_str(), host, self.port, self.uri)
    }
}

/// Certificate-expiry policy. A zero threshold disables that severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SslCheck {
    /// Whether the expiry check runs at all.
    pub run: bool,
    /// WARNING when a certificate expires within this many days.
    pub days_warning: i64,
    /// CRITICAL when a certificate expires within this many days.
    pub days_critical: i64,
}

/// What a healthy response looks like.
#[derive(Debug, Clone, Default)]
pub struct Expected {
    /// Acceptable HTTP status codes; non-empty for a well-formed check.
    pub status_codes: Vec<u16>,
    /// Substring the body must contain, byte-exact.
    pub body_text: Option<String>,
    /// Certificate-expiry policy.
    pub ssl_check: SslCheck,
}

/// Monitoring severity, ordered by escalation urgency.
///
/// The numeric exit-code contract (0/1/2/3) is fixed for compatibility with
/// Nagios-style supervisors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Everything passed.
    Ok,
    /// Degraded but functional (slow response, certificate nearing expiry).
    Warning,
    /// The target failed the policy or was unreachable.
    Critical,
    /// The probe itself could not be carried out meaningfully.
    Unknown,
}

impl Severity {
    /// Process exit code consumed by the monitoring supervisor.
    pub fn exit_code(self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
            Severity::Unknown => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        };
        write!(f, "{label}")
    }
}

/// Terminal result of one evaluation. Created once, handed to the caller,
/// never mutated.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// Human-readable result line; network-phase outcomes carry a
    /// `|time=<seconds>s` performance suffix.
    pub message: String,
    /// Classified severity.
    pub severity: Severity,
}

impl CheckOutcome {
    /// Builds an outcome.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        CheckOutcome {
            message: message.into(),
            severity,
        }
    }
}
