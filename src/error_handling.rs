//! Typed errors for the probe pipeline.
//!
//! Every error here is eventually folded into a monitoring severity by the
//! evaluator; nothing in normal operation escapes as a crash. The enums keep
//! the taxonomy explicit: configuration faults on our side map to UNKNOWN,
//! faults in the target's presented material map to CRITICAL.

use std::path::PathBuf;

use log::SetLoggerError;
use thiserror::Error;

/// Errors raised while turning raw CLI flag strings into typed values.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The `-e/--expect` list did not parse into status codes.
    #[error("Invalid status code list '{0}': provide e.g. -e 200,302")]
    StatusCodes(String),

    /// The `-a/--auth` value was not a `user:password` pair.
    #[error("Username and password not given: provide -a|--auth username:password")]
    Credentials,

    /// The `-C/--ssl-expiration` value was not `warn` or `warn,crit`.
    #[error("SSL check has invalid parameters '{0}': provide e.g. -C 14,7")]
    SslExpiration(String),

    /// `-w`/`-c` did not form a valid interval (warning must be below critical).
    #[error("Invalid timeout interval: warning ({warning}s) must be below critical ({critical}s)")]
    TimeoutInterval {
        /// Configured warning bound in seconds.
        warning: u64,
        /// Configured critical bound in seconds.
        critical: u64,
    },
}

/// Errors during process startup.
#[derive(Error, Debug)]
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),
}

/// Errors building the per-check HTTP transport.
///
/// Classified CRITICAL by the evaluator: the need to present a client
/// certificate is a property of the target's TLS requirements.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A client certificate or private key file could not be read.
    #[error("Cannot read client certificate material {path}: {source}")]
    ClientCertRead {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The PEM material did not form a usable TLS identity.
    #[error("Invalid client certificate or private key: {0}")]
    ClientCertParse(#[source] reqwest::Error),

    /// The HTTP client itself failed to build.
    #[error("Cannot build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Errors from the dedicated certificate-inspection handshake.
#[derive(Error, Debug)]
pub enum TlsProbeError {
    /// The host is not a valid TLS server name.
    #[error("Invalid TLS server name '{0}'")]
    InvalidServerName(String),

    /// Client identity material could not be loaded or was rejected.
    #[error("Cannot use client certificate material {path}: {reason}")]
    ClientIdentity {
        /// File the identity came from.
        path: PathBuf,
        /// Loader or TLS-layer rejection detail.
        reason: String,
    },

    /// TCP connect failed.
    #[error("TCP connect to {addr} failed: {source}")]
    Connect {
        /// Address the probe attempted.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// TCP connect exceeded the probe deadline.
    #[error("TCP connect to {0} timed out")]
    ConnectTimeout(String),

    /// The TLS handshake failed (untrusted chain, protocol error, reset).
    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake {
        /// Address the probe attempted.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TLS handshake exceeded the probe deadline.
    #[error("TLS handshake with {0} timed out")]
    HandshakeTimeout(String),

    /// Handshake completed but the server presented no certificates.
    #[error("Server presented no certificate chain")]
    NoPeerCertificates,

    /// A presented certificate could not be parsed.
    #[error("Cannot parse server certificate: {0}")]
    CertParse(String),
}

/// Errors during the NTLM challenge/response exchange.
#[derive(Error, Debug)]
pub enum NtlmError {
    /// A request in the exchange failed at the transport level.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The server never issued an NTLM type-2 challenge.
    #[error("Server sent no NTLM challenge")]
    MissingChallenge,

    /// The type-2 challenge was present but malformed.
    #[error("Malformed NTLM challenge: {0}")]
    BadChallenge(String),
}

/// Error dispatching the probe request, unified over plain and NTLM sends.
#[derive(Error, Debug)]
pub enum SendError {
    /// Plain request failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// NTLM negotiation failure.
    #[error("NTLM negotiation failed: {0}")]
    Ntlm(#[from] NtlmError),
}

impl SendError {
    /// Whether the failure was specifically the transport deadline expiring.
    pub fn is_timeout(&self) -> bool {
        match self {
            SendError::Http(e) => e.is_timeout(),
            SendError::Ntlm(NtlmError::Http(e)) => e.is_timeout(),
            SendError::Ntlm(_) => false,
        }
    }
}

/// Flattens an error and its source chain into a single result line.
///
/// Monitoring output is one line per check, so the chain is joined with
/// `: ` instead of the multi-line `anyhow`-style report.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        let rendered = source.to_string();
        // reqwest repeats the source text in its own Display output
        if !message.contains(&rendered) {
            message.push_str(": ");
            message.push_str(&rendered);
        }
        current = source.source();
    }
    message
}
