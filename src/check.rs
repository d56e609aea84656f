//! The evaluator: one request, one classified outcome.
//!
//! A strict sequence of states, each a potential terminal exit: validate
//! the target, build the transport, build the request, dispatch, then the
//! ordered validation chain (timing interval, status code, body text,
//! certificate expiry). Every predictable failure maps to one of the four
//! severities; nothing is retried and nothing panics.

use std::time::{Duration, Instant};

use log::debug;
use reqwest::{Client, Response, Url};

use crate::error_handling::{error_chain, SendError};
use crate::models::{Auth, AuthScheme, CheckOutcome, Expected, Scheme, Severity, Target, TimingPolicy};
use crate::ntlm;
use crate::tls;
use crate::transport::build_client;

/// Runs the health check described by `target` against `expected`.
///
/// Always returns a classified outcome; the message carries a
/// `|time=<seconds>s` suffix for every state reached after the request was
/// dispatched.
pub async fn check(target: &Target, expected: &Expected) -> CheckOutcome {
    // Malformed target: nothing to probe
    if target.host.is_empty() && target.ip_address.is_none() {
        return CheckOutcome::new(Severity::Unknown, "UNKNOWN - No host or IP address given");
    }

    // Transport construction; a bad client certificate is a property of
    // the target's TLS requirements, hence CRITICAL rather than UNKNOWN
    let client = match build_client(target) {
        Ok(client) => client,
        Err(e) => {
            return CheckOutcome::new(Severity::Critical, format!("CRITICAL - {}", error_chain(&e)))
        }
    };

    let raw_url = target.url();
    debug!(">> URL: {raw_url}");
    let url = match Url::parse(&raw_url) {
        Ok(url) => url,
        Err(e) => {
            debug!(">> URL parse error: {e}");
            return CheckOutcome::new(
                Severity::Unknown,
                format!("UNKNOWN - Invalid request URL '{raw_url}': {e}"),
            );
        }
    };

    let start = Instant::now();
    let response = match dispatch(&client, url, &target.auth).await {
        Ok(response) => response,
        Err(e) => {
            let elapsed = start.elapsed();
            debug!(">> Request error: {e}");
            if e.is_timeout() {
                return CheckOutcome::new(
                    Severity::Critical,
                    format!(
                        "CRITICAL - Timeout - No response received in {} seconds|{}",
                        fmt_secs(target.timing.deadline()),
                        perf(elapsed)
                    ),
                );
            }
            return CheckOutcome::new(
                Severity::Critical,
                format!("CRITICAL - {}|{}", error_chain(&e), perf(elapsed)),
            );
        }
    };

    debug!(">> Response status: {}", response.status());

    // A slow-but-successful response is its own failure mode, reported
    // before any content validation
    if let TimingPolicy::Interval { warning, .. } = target.timing {
        let elapsed = start.elapsed();
        if elapsed >= warning {
            return CheckOutcome::new(
                Severity::Warning,
                format!(
                    "WARNING - Response received after warning threshold of {} seconds|{}",
                    fmt_secs(warning),
                    perf(elapsed)
                ),
            );
        }
    }

    let status = response.status().as_u16();
    if !expected.status_codes.contains(&status) {
        let expected_list = expected
            .status_codes
            .iter()
            .map(|code| code.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return CheckOutcome::new(
            Severity::Critical,
            format!(
                "CRITICAL - Got response HTTP/1.1 {status}, expected {expected_list}|{}",
                perf(start.elapsed())
            ),
        );
    }

    if let Some(body_text) = expected.body_text.as_deref().filter(|s| !s.is_empty()) {
        // Reading the body consumes the response; the connection is
        // released when the bytes (or the error) are dropped
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                return CheckOutcome::new(
                    Severity::Unknown,
                    format!(
                        "UNKNOWN - Failed to read response body: {}|{}",
                        error_chain(&e),
                        perf(start.elapsed())
                    ),
                );
            }
        };
        if !contains_bytes(&body, body_text.as_bytes()) {
            return CheckOutcome::new(
                Severity::Critical,
                format!(
                    "CRITICAL - String '{body_text}' not found in body|{}",
                    perf(start.elapsed())
                ),
            );
        }
    }

    if expected.ssl_check.run && target.scheme == Scheme::Https {
        match tls::collect_chain_expiry(target).await {
            Ok(chain) => {
                let (message, severity) = tls::evaluate_expiry(&[chain], &expected.ssl_check);
                if severity != Severity::Ok {
                    return CheckOutcome::new(
                        severity,
                        format!("{message}|{}", perf(start.elapsed())),
                    );
                }
            }
            Err(e) => {
                return CheckOutcome::new(
                    Severity::Critical,
                    format!("CRITICAL - {}|{}", error_chain(&e), perf(start.elapsed())),
                );
            }
        }
    }

    CheckOutcome::new(
        Severity::Ok,
        format!(
            "OK - Got response HTTP/1.1 {status}|{}",
            perf(start.elapsed())
        ),
    )
}

/// Detects the authentication scheme the target demands.
///
/// One unauthenticated GET with the same transport rules as the check;
/// every error degrades to [`AuthScheme::None`] so the caller can always
/// proceed to the real check, which will report the failure properly.
pub async fn detect_auth_type(target: &Target) -> AuthScheme {
    let Ok(client) = build_client(target) else {
        return AuthScheme::None;
    };
    let Ok(url) = Url::parse(&target.url()) else {
        return AuthScheme::None;
    };
    let Ok(response) = client.get(url).send().await else {
        return AuthScheme::None;
    };

    let challenge = response
        .headers()
        .get(reqwest::header::WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok());
    classify_challenge(challenge)
}

/// Classifies a `WWW-Authenticate` challenge value.
///
/// Ordered first-match prefix checks; servers offering several schemes in
/// one value resolve to the first match.
pub(crate) fn classify_challenge(challenge: Option<&str>) -> AuthScheme {
    let Some(challenge) = challenge else {
        return AuthScheme::None;
    };
    let challenge = challenge.trim().to_ascii_lowercase();
    if challenge.starts_with("negotiate") || challenge.starts_with("ntlm") {
        AuthScheme::Ntlm
    } else if challenge.starts_with("basic") {
        AuthScheme::Basic
    } else {
        AuthScheme::None
    }
}

/// Dispatches the probe request with the configured authentication.
async fn dispatch(client: &Client, url: Url, auth: &Auth) -> Result<Response, SendError> {
    match auth {
        Auth::None => Ok(client.get(url).send().await?),
        Auth::Basic { user, password } => Ok(client
            .get(url)
            .basic_auth(user, Some(password))
            .send()
            .await?),
        Auth::Ntlm { user, password } => {
            Ok(ntlm::send_negotiated(client, url, user, password).await?)
        }
    }
}

/// Byte-exact containment, case-sensitive by construction.
fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

/// Performance-data suffix for the monitoring supervisor.
fn perf(elapsed: Duration) -> String {
    format!("time={:.6}s", elapsed.as_secs_f64())
}

/// Seconds for human-readable thresholds: integral values print bare.
fn fmt_secs(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs:.3}")
    }
}
