//! Integration tests for the certificate probe against local TLS servers:
//! chain collection, client-identity presentation under mutual TLS, and
//! SNI behavior.

use std::sync::Arc;

use rcgen::{CertificateParams, DnType, KeyPair, PKCS_ECDSA_P256_SHA256};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, SignatureScheme};
use tokio::net::TcpListener;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::{LazyConfigAcceptor, TlsAcceptor};

use http_check::error_handling::TlsProbeError;
use http_check::{collect_chain_expiry, ClientCert, Target};

/// Generates a self-signed certificate and key, both PEM-encoded.
fn self_signed_identity(common_name: &str, san: &str) -> (String, String) {
    let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).expect("generate key");
    let mut params = CertificateParams::new(vec![san.to_string()]).expect("cert params");
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    let cert = params.self_signed(&key).expect("self-sign certificate");
    (cert.pem(), key.serialize_pem())
}

fn parse_identity(
    cert_pem: &str,
    key_pem: &str,
) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    let cert = CertificateDer::from_pem_slice(cert_pem.as_bytes()).expect("parse cert pem");
    let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes()).expect("parse key pem");
    (vec![cert], key)
}

/// Target pointing at a local listener, with verification disabled because
/// the server identity is self-signed.
fn probe_target(port: u16) -> Target {
    Target {
        host: "localhost".to_string(),
        ip_address: Some("127.0.0.1".parse().expect("loopback")),
        port,
        skip_verify: true,
        ..Target::default()
    }
}

#[tokio::test]
async fn collects_presented_chain_from_local_tls_server() {
    let (cert_pem, key_pem) = self_signed_identity("tls-probe-server", "localhost");
    let (chain, key) = parse_identity(&cert_pem, &key_pem);
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .expect("server config");
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        if let Ok((tcp, _)) = listener.accept().await {
            let _ = acceptor.accept(tcp).await;
        }
    });

    let chain = collect_chain_expiry(&probe_target(port))
        .await
        .expect("collect chain");

    assert_eq!(chain.len(), 1);
    assert!(
        chain[0].subject.contains("tls-probe-server"),
        "subject: {}",
        chain[0].subject
    );
    // rcgen's default validity lies years in the future
    assert!(chain[0].hours_remaining > 24 * 365);
}

/// Server-side verifier that demands a client certificate but accepts any.
#[derive(Debug)]
struct RequireAnyClientCert(CryptoProvider);

impl ClientCertVerifier for RequireAnyClientCert {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
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
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
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

#[tokio::test]
async fn probe_presents_the_client_identity_under_mutual_tls() {
    let (server_cert_pem, server_key_pem) = self_signed_identity("mtls-server", "localhost");
    let (chain, key) = parse_identity(&server_cert_pem, &server_key_pem);
    // TLS 1.2 so a rejected client is refused during the handshake itself
    let config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
        .with_client_cert_verifier(Arc::new(RequireAnyClientCert(
            rustls::crypto::ring::default_provider(),
        )))
        .with_single_cert(chain, key)
        .expect("server config");
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        loop {
            let Ok((tcp, _)) = listener.accept().await else { break };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let _ = acceptor.accept(tcp).await;
            });
        }
    });

    // Without an identity the server refuses the handshake
    let rejected = collect_chain_expiry(&probe_target(port)).await;
    assert!(
        matches!(rejected, Err(TlsProbeError::Handshake { .. })),
        "expected handshake rejection, got {rejected:?}"
    );

    // With the identity configured, the probe authenticates and collects
    let (client_cert_pem, client_key_pem) = self_signed_identity("mtls-client", "client");
    let dir = tempfile::tempdir().expect("temp dir");
    let cert_path = dir.path().join("client.pem");
    let key_path = dir.path().join("client-key.pem");
    std::fs::write(&cert_path, client_cert_pem).expect("write client cert");
    std::fs::write(&key_path, client_key_pem).expect("write client key");

    let target = Target {
        client_cert: Some(ClientCert {
            cert_file: cert_path,
            key_file: key_path,
        }),
        ..probe_target(port)
    };
    let chain = collect_chain_expiry(&target).await.expect("mutual TLS chain");
    assert_eq!(chain.len(), 1);
    assert!(chain[0].subject.contains("mtls-server"));
}

/// Accepts one connection and reports the SNI value from its ClientHello.
async fn capture_sni(listener: TcpListener, config: Arc<ServerConfig>) -> Option<String> {
    let (tcp, _) = listener.accept().await.expect("accept");
    let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), tcp)
        .await
        .expect("client hello");
    let sni = start.client_hello().server_name().map(str::to_string);
    let _ = start.into_stream(config).await;
    sni
}

#[tokio::test]
async fn sni_is_withheld_when_disabled() {
    let (cert_pem, key_pem) = self_signed_identity("sni-server", "localhost");
    let (chain, key) = parse_identity(&cert_pem, &key_pem);
    let config = Arc::new(
        ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .expect("server config"),
    );

    // Default: the host name is announced
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = tokio::spawn(capture_sni(listener, config.clone()));
    collect_chain_expiry(&probe_target(port))
        .await
        .expect("collect chain");
    assert_eq!(
        server.await.expect("server task"),
        Some("localhost".to_string())
    );

    // Disabled: nothing announced even though the host is a DNS name
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = tokio::spawn(capture_sni(listener, config));
    let target = Target {
        disable_sni: true,
        ..probe_target(port)
    };
    collect_chain_expiry(&target).await.expect("collect chain");
    assert_eq!(server.await.expect("server task"), None);
}
