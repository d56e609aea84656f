//! http_check library: single-probe HTTP(S) health checking
//!
//! This library performs one HTTP request against a described target and
//! classifies the outcome into one of four monitoring severities (OK,
//! WARNING, CRITICAL, UNKNOWN) with the Nagios/Icinga exit-code contract.
//! The validation chain covers response timing, status code, body content,
//! and TLS certificate expiry; the authentication scheme a server demands
//! can be auto-detected beforehand.
//!
//! # Example
//!
//! ```no_run
//! use http_check::{check, Expected, Scheme, Target};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let target = Target {
//!     scheme: Scheme::Https,
//!     host: "example.com".to_string(),
//!     port: 443,
//!     ..Target::default()
//! };
//! let expected = Expected {
//!     status_codes: vec![200],
//!     ..Expected::default()
//! };
//!
//! let outcome = check(&target, &expected).await;
//! println!("{}", outcome.message);
//! std::process::exit(outcome.severity.exit_code());
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime, and
//! [`initialization::init_crypto_provider`] must run before the first TLS
//! connection.

#![warn(missing_docs)]

mod check;
pub mod config;
pub mod error_handling;
pub mod initialization;
mod models;
mod ntlm;
mod tls;
mod transport;

// Re-export public API
pub use check::{check, detect_auth_type};
pub use config::{LogLevel, Opt, DEFAULT_USER_AGENT};
pub use models::{
    Auth, AuthScheme, CheckOutcome, ClientCert, Expected, Scheme, Severity, SslCheck, Target,
    TimingPolicy,
};
pub use tls::{collect_chain_expiry, evaluate_expiry, ChainCert};
