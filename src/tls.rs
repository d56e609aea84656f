//! Certificate-chain inspection for the expiry check.
//!
//! The HTTP client does not expose the chain it verified, so the expiry
//! check performs one dedicated TLS handshake against the target, parses
//! every presented certificate, and evaluates the expiry thresholds over
//! the deduplicated set.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use log::debug;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use crate::error_handling::TlsProbeError;
use crate::models::{ClientCert, Severity, SslCheck, Target};

/// One certificate out of a presented chain, reduced to what the expiry
/// check needs.
#[derive(Debug, Clone)]
pub struct ChainCert {
    /// Certificate subject, for log output.
    pub subject: String,
    /// Identity of the certificate (raw DER); used to evaluate a
    /// certificate appearing in several chains only once.
    pub fingerprint: Vec<u8>,
    /// Hours until `notAfter`, negative once expired.
    pub hours_remaining: i64,
}

/// Certificate verifier that accepts any chain.
///
/// Only installed when the target explicitly opted out of verification;
/// the expiry of a self-signed certificate is still worth reporting.
#[derive(Debug)]
struct AcceptAnyCert(CryptoProvider);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// TLS configuration for the probe, mirroring the main transport: same
/// verification mode, same client identity, same SNI behavior. A server
/// that requires client authentication or serves per-SNI certificates must
/// see the probe exactly as it saw the evaluated request.
fn client_config(target: &Target) -> Result<ClientConfig, TlsProbeError> {
    let builder = if target.skip_verify {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(
                rustls::crypto::ring::default_provider(),
            )))
    } else {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        ClientConfig::builder().with_root_certificates(root_store)
    };

    let mut config = match &target.client_cert {
        Some(client_cert) => {
            let (certs, key) = load_client_identity(client_cert)?;
            builder.with_client_auth_cert(certs, key).map_err(|e| {
                TlsProbeError::ClientIdentity {
                    path: client_cert.cert_file.clone(),
                    reason: e.to_string(),
                }
            })?
        }
        None => builder.with_no_client_auth(),
    };
    if target.disable_sni {
        config.enable_sni = false;
    }
    Ok(config)
}

/// Loads the PEM certificate chain and private key for client auth.
fn load_client_identity(
    client_cert: &ClientCert,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsProbeError> {
    let certs = CertificateDer::pem_file_iter(&client_cert.cert_file)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| TlsProbeError::ClientIdentity {
            path: client_cert.cert_file.clone(),
            reason: e.to_string(),
        })?;
    let key =
        PrivateKeyDer::from_pem_file(&client_cert.key_file).map_err(|e| {
            TlsProbeError::ClientIdentity {
                path: client_cert.key_file.clone(),
                reason: e.to_string(),
            }
        })?;
    Ok((certs, key))
}

/// Connects to the target, completes a TLS handshake, and returns the
/// presented certificate chain with hours-to-expiry per certificate.
///
/// Both the TCP connect and the handshake are bounded by the target's
/// transport deadline.
pub async fn collect_chain_expiry(target: &Target) -> Result<Vec<ChainCert>, TlsProbeError> {
    let host = target.effective_host().unwrap_or_default();
    let deadline = target.timing.deadline();

    let server_name = ServerName::try_from(host.clone())
        .map_err(|_| TlsProbeError::InvalidServerName(host.clone()))?;

    let addr_label;
    let sock = match target.ip_address {
        Some(ip) => {
            let addr = SocketAddr::new(ip, target.port);
            addr_label = addr.to_string();
            timeout(deadline, TcpStream::connect(addr)).await
        }
        None => {
            addr_label = format!("{}:{}", host, target.port);
            timeout(deadline, TcpStream::connect((host.clone(), target.port))).await
        }
    };
    let sock = match sock {
        Ok(Ok(sock)) => sock,
        Ok(Err(source)) => {
            return Err(TlsProbeError::Connect {
                addr: addr_label,
                source,
            })
        }
        Err(_) => return Err(TlsProbeError::ConnectTimeout(addr_label)),
    };

    let connector = TlsConnector::from(Arc::new(client_config(target)?));
    let stream = match timeout(deadline, connector.connect(server_name, sock)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(TlsProbeError::Handshake {
                addr: addr_label,
                source,
            })
        }
        Err(_) => return Err(TlsProbeError::HandshakeTimeout(addr_label)),
    };

    let now = chrono::Utc::now().timestamp();
    let certs = stream
        .get_ref()
        .1
        .peer_certificates()
        .ok_or(TlsProbeError::NoPeerCertificates)?;
    if certs.is_empty() {
        return Err(TlsProbeError::NoPeerCertificates);
    }

    let mut chain = Vec::with_capacity(certs.len());
    for der in certs {
        let (_, cert) = parse_x509_certificate(der.as_ref())
            .map_err(|e| TlsProbeError::CertParse(e.to_string()))?;
        let hours_remaining = (cert.validity().not_after.timestamp() - now) / 3600;
        debug!(
            ">> Certificate {} expires in {} hours",
            cert.subject(),
            hours_remaining
        );
        chain.push(ChainCert {
            subject: cert.subject().to_string(),
            fingerprint: der.as_ref().to_vec(),
            hours_remaining,
        });
    }
    Ok(chain)
}

/// Evaluates expiry thresholds over the verified chains.
///
/// Chains are flattened in order and deduplicated; every certificate is
/// checked against the critical threshold before any is checked against
/// the warning threshold, so a nearly-expired certificate is never masked
/// as a mere warning by an earlier one. Zero thresholds suppress their
/// severity. Returns an empty message and `Severity::Ok` when the policy
/// passes.
pub fn evaluate_expiry(chains: &[Vec<ChainCert>], policy: &SslCheck) -> (String, Severity) {
    let mut seen: HashSet<&[u8]> = HashSet::new();
    let mut unique: Vec<&ChainCert> = Vec::new();
    for chain in chains {
        for cert in chain {
            if seen.insert(cert.fingerprint.as_slice()) {
                unique.push(cert);
            }
        }
    }

    if policy.days_critical > 0 {
        for cert in &unique {
            if cert.hours_remaining <= policy.days_critical * 24 {
                return (
                    format!(
                        "CRITICAL - SSL cert expires in {:.1} days",
                        cert.hours_remaining as f64 / 24.0
                    ),
                    Severity::Critical,
                );
            }
        }
    }

    if policy.days_warning > 0 {
        for cert in &unique {
            if cert.hours_remaining <= policy.days_warning * 24 {
                return (
                    format!(
                        "WARNING - SSL cert expires in {:.1} days",
                        cert.hours_remaining as f64 / 24.0
                    ),
                    Severity::Warning,
                );
            }
        }
    }

    (String::new(), Severity::Ok)
}
