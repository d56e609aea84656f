//! Command-line options and flag parsing.
//!
//! The core evaluator consumes fully-typed [`Target`] / [`Expected`] values;
//! everything string-shaped (comma-joined status lists, `user:password`
//! pairs, `warn,crit` day thresholds) is parsed here, in the collaborator
//! layer, and rejected with an UNKNOWN exit before any request is made.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error_handling::ParseError;
use crate::models::{Auth, ClientCert, Expected, Scheme, SslCheck, Target, TimingPolicy};

/// User-Agent sent with every request, probe and detector alike.
pub const DEFAULT_USER_AGENT: &str = concat!("http_check/", env!("CARGO_PKG_VERSION"));

/// Maximum redirect hops when `--follow-redirects` is enabled.
///
/// Prevents infinite redirect loops and excessive request chains.
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to
/// most verbose (Trace). Used with the `--log-level` CLI option; `-v`
/// overrides it to Debug.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages and above.
    Info,
    /// Diagnostic trace lines (`>> ...`) and above.
    Debug,
    /// Everything.
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Command-line options.
///
/// This struct is generated by `clap` from the field attributes. The short
/// flags follow the classic `check_http` plugin conventions so existing
/// monitoring configurations keep working.
#[derive(Debug, Parser)]
#[command(
    name = "http_check",
    about = "Single-probe HTTP(S) health check with Nagios-compatible exit codes."
)]
pub struct Opt {
    /// Host name, e.g. google.com
    #[arg(short = 'H', long, default_value = "")]
    pub host: String,

    /// IP address to connect to, e.g. 8.8.4.4
    #[arg(short = 'I', long = "ip")]
    pub ip_address: Option<IpAddr>,

    /// URI to check
    #[arg(short = 'u', long, default_value = "/")]
    pub uri: String,

    /// Port, e.g. 80 for HTTP, 443 for HTTPS
    #[arg(short = 'p', long, default_value_t = 80)]
    pub port: u16,

    /// Use HTTPS
    #[arg(short = 'S', long = "tls")]
    pub tls: bool,

    /// Flat timeout in seconds
    #[arg(short = 't', long, default_value_t = 30)]
    pub timeout: u64,

    /// Use basic auth
    #[arg(long)]
    pub auth_basic: bool,

    /// Use NTLM auth
    #[arg(long)]
    pub auth_ntlm: bool,

    /// Credentials as user:password
    #[arg(short = 'a', long, default_value = "")]
    pub auth: String,

    /// Expected HTTP status code(s), comma-separated
    #[arg(short = 'e', long = "expect", default_value = "200")]
    pub expected_codes: String,

    /// Require the given string in the response body
    #[arg(short = 's', long = "string", default_value = "")]
    pub body_text: String,

    /// Check SSL certificate expiration, days as warn or warn,crit
    #[arg(short = 'C', long = "ssl-expiration", default_value = "")]
    pub ssl_expiration: String,

    /// Skip verification of the server certificate chain and host name
    #[arg(short = 'k', long = "insecure")]
    pub insecure: bool,

    /// Verbose mode (diagnostic trace lines on stderr)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Probe the server's auth scheme before the check
    #[arg(long)]
    pub guess_auth: bool,

    /// Follow redirects instead of evaluating the first response
    #[arg(long)]
    pub follow_redirects: bool,

    /// Warning response-time threshold in seconds (0 disables)
    #[arg(short = 'w', long, default_value_t = 0)]
    pub warning_timeout: u64,

    /// Critical response-time threshold in seconds (0 disables)
    #[arg(short = 'c', long, default_value_t = 0)]
    pub critical_timeout: u64,

    /// Do not send the host name via SNI
    #[arg(long)]
    pub no_sni: bool,

    /// Permit one legacy TLS renegotiation during the handshake
    #[arg(long)]
    pub allow_renegotiation: bool,

    /// Client certificate file (PEM) for the TLS session
    #[arg(short = 'J', long = "client-cert")]
    pub client_cert: Option<PathBuf>,

    /// Private key file (PEM) matching the client certificate
    #[arg(short = 'K', long = "private-key")]
    pub private_key: Option<PathBuf>,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
}

/// Parses a comma-separated status code list, e.g. `200` or `200,302`.
pub fn parse_status_codes(raw: &str) -> Result<Vec<u16>, ParseError> {
    let codes: Vec<u16> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u16>())
        .collect::<Result<_, _>>()
        .map_err(|_| ParseError::StatusCodes(raw.to_string()))?;
    if codes.is_empty() {
        return Err(ParseError::StatusCodes(raw.to_string()));
    }
    Ok(codes)
}

/// Parses the `-C` value into `(days_warning, days_critical)`.
///
/// A bare number configures only the warning threshold; `warn,crit`
/// configures both. Empty input means the check is not requested.
pub fn parse_ssl_expiration(raw: &str) -> Result<(i64, i64), ParseError> {
    if raw.is_empty() {
        return Ok((0, 0));
    }
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let parse = |s: &str| {
        s.parse::<i64>()
            .ok()
            .filter(|d| *d >= 0)
            .ok_or_else(|| ParseError::SslExpiration(raw.to_string()))
    };
    match parts.as_slice() {
        [warning] => Ok((parse(warning)?, 0)),
        [warning, critical] => Ok((parse(warning)?, parse(critical)?)),
        _ => Err(ParseError::SslExpiration(raw.to_string())),
    }
}

impl Opt {
    /// Splits `-a user:password` into a credential pair.
    ///
    /// Empty input yields `None`; anything else must contain a non-empty
    /// user and password around the first `:`.
    pub fn credentials(&self) -> Result<Option<(String, String)>, ParseError> {
        if self.auth.is_empty() {
            return Ok(None);
        }
        match self.auth.split_once(':') {
            Some((user, password)) if !user.is_empty() && !password.is_empty() => {
                Ok(Some((user.to_string(), password.to_string())))
            }
            _ => Err(ParseError::Credentials),
        }
    }

    fn scheme(&self) -> Scheme {
        if self.tls || self.port == 443 {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }

    fn effective_port(&self, scheme: Scheme) -> u16 {
        // Bare -S keeps the convenience of the default port promoting to 443
        if scheme == Scheme::Https && self.port == 80 {
            443
        } else {
            self.port
        }
    }

    fn timing(&self) -> Result<TimingPolicy, ParseError> {
        if self.warning_timeout > 0 && self.critical_timeout > 0 {
            if self.warning_timeout >= self.critical_timeout {
                return Err(ParseError::TimeoutInterval {
                    warning: self.warning_timeout,
                    critical: self.critical_timeout,
                });
            }
            Ok(TimingPolicy::Interval {
                warning: Duration::from_secs(self.warning_timeout),
                critical: Duration::from_secs(self.critical_timeout),
            })
        } else {
            Ok(TimingPolicy::Flat(Duration::from_secs(self.timeout)))
        }
    }

    fn auth(&self) -> Result<Auth, ParseError> {
        let credentials = self.credentials()?;
        if self.auth_ntlm {
            let (user, password) = credentials.ok_or(ParseError::Credentials)?;
            return Ok(Auth::Ntlm { user, password });
        }
        if self.auth_basic {
            let (user, password) = credentials.ok_or(ParseError::Credentials)?;
            return Ok(Auth::Basic { user, password });
        }
        // Bare credentials imply basic auth
        Ok(match credentials {
            Some((user, password)) => Auth::Basic { user, password },
            None => Auth::None,
        })
    }

    /// Builds the typed probe target from the raw flags.
    pub fn build_target(&self) -> Result<Target, ParseError> {
        let scheme = self.scheme();
        let client_cert = match (&self.client_cert, &self.private_key) {
            (Some(cert_file), Some(key_file)) => Some(ClientCert {
                cert_file: cert_file.clone(),
                key_file: key_file.clone(),
            }),
            _ => None,
        };
        Ok(Target {
            scheme,
            host: self.host.clone(),
            ip_address: self.ip_address,
            port: self.effective_port(scheme),
            uri: self.uri.clone(),
            timing: self.timing()?,
            skip_verify: self.insecure,
            disable_sni: self.no_sni,
            allow_renegotiation: self.allow_renegotiation,
            client_cert,
            follow_redirects: self.follow_redirects,
            auth: self.auth()?,
        })
    }

    /// Builds the typed expectation set from the raw flags.
    pub fn build_expected(&self) -> Result<Expected, ParseError> {
        let (days_warning, days_critical) = parse_ssl_expiration(&self.ssl_expiration)?;
        Ok(Expected {
            status_codes: parse_status_codes(&self.expected_codes)?,
            body_text: if self.body_text.is_empty() {
                None
            } else {
                Some(self.body_text.clone())
            },
            ssl_check: SslCheck {
                // Expiry thresholds only make sense over TLS
                run: self.tls && !self.ssl_expiration.is_empty(),
                days_warning,
                days_critical,
            },
        })
    }
}
