//! Per-check HTTP transport construction.
//!
//! Every invocation gets its own `reqwest::Client` scoped to one target;
//! nothing here touches process-wide defaults, so TLS settings from one
//! check can never leak into another.

use std::fs;
use std::net::SocketAddr;

use log::{debug, warn};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Identity};

use crate::config::{DEFAULT_USER_AGENT, MAX_REDIRECT_HOPS};
use crate::error_handling::TransportError;
use crate::models::{ClientCert, Target};

/// Builds the HTTP client for one probe.
///
/// Configuration rules:
/// - the hard timeout is the most lenient configured bound
///   ([`TimingPolicy::deadline`](crate::models::TimingPolicy::deadline)), so an
///   interval warning can fire before the transport aborts;
/// - redirects are not followed unless the target opts in: the first
///   response is what gets evaluated;
/// - when both a host name and an IP address are given, the connection is
///   pinned to the IP while SNI and the `Host` header keep the host name;
/// - `skip_verify` disables certificate validation entirely, an explicit
///   opt-out for self-signed or broken chains.
pub fn build_client(target: &Target) -> Result<Client, TransportError> {
    let mut builder = ClientBuilder::new()
        .use_rustls_tls()
        .timeout(target.timing.deadline())
        .user_agent(DEFAULT_USER_AGENT)
        .redirect(if target.follow_redirects {
            Policy::limited(MAX_REDIRECT_HOPS)
        } else {
            Policy::none()
        });

    if target.skip_verify {
        debug!(">> Certificate verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    if target.disable_sni {
        builder = builder.tls_sni(false);
    }

    if let (false, Some(ip)) = (target.host.is_empty(), target.ip_address) {
        // Probe a specific address while validating for the domain name
        let addr = SocketAddr::new(ip, target.port);
        debug!(">> Pinning {} to {}", target.host, addr);
        builder = builder.resolve(&target.host, addr);
    }

    if target.allow_renegotiation {
        // rustls has no legacy renegotiation; the flag is accepted for
        // compatibility with existing monitoring configurations.
        warn!("--allow-renegotiation is not supported by the rustls backend and has no effect");
    }

    if let Some(client_cert) = &target.client_cert {
        builder = builder.identity(load_identity(client_cert)?);
    }

    builder.build().map_err(TransportError::Build)
}

/// Loads a certificate/key PEM pair as a TLS client identity.
fn load_identity(client_cert: &ClientCert) -> Result<Identity, TransportError> {
    let mut pem = fs::read(&client_cert.cert_file).map_err(|source| {
        TransportError::ClientCertRead {
            path: client_cert.cert_file.clone(),
            source,
        }
    })?;
    let key = fs::read(&client_cert.key_file).map_err(|source| TransportError::ClientCertRead {
        path: client_cert.key_file.clone(),
        source,
    })?;
    pem.extend_from_slice(&key);
    Identity::from_pem(&pem).map_err(TransportError::ClientCertParse)
}
