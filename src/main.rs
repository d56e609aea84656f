//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `http_check` library that handles:
//! - Command-line argument parsing
//! - Logger and crypto-provider initialization
//! - Optional authentication auto-detection
//! - Printing the result line and exiting with the severity code
//!
//! All check logic is implemented in the library crate. The process exit
//! code is the monitoring contract: 0 OK, 1 WARNING, 2 CRITICAL,
//! 3 UNKNOWN.

use std::process;

use clap::Parser;
use log::{debug, warn};

use http_check::initialization::{init_crypto_provider, init_logger_with};
use http_check::{check, detect_auth_type, Auth, Opt, Severity};

#[tokio::main]
async fn main() {
    let opt = Opt::parse();

    let level = if opt.verbose {
        log::LevelFilter::Debug
    } else {
        opt.log_level.clone().into()
    };
    if let Err(e) = init_logger_with(level) {
        eprintln!("http_check: {e}");
    }

    init_crypto_provider();

    // Raw flag validation happens here; the core only sees typed values
    let (mut target, expected) = match opt.build_target().and_then(|t| {
        let e = opt.build_expected()?;
        Ok((t, e))
    }) {
        Ok(pair) => pair,
        Err(e) => {
            println!("UNKNOWN - {e}");
            process::exit(Severity::Unknown.exit_code());
        }
    };

    if opt.guess_auth {
        let scheme = detect_auth_type(&target).await;
        debug!(">> Detected auth: {scheme}");
        let credentials = match &target.auth {
            Auth::Basic { user, password } | Auth::Ntlm { user, password } => {
                Some((user.clone(), password.clone()))
            }
            Auth::None => match opt.credentials() {
                Ok(credentials) => credentials,
                Err(e) => {
                    println!("UNKNOWN - {e}");
                    process::exit(Severity::Unknown.exit_code());
                }
            },
        };
        let had_credentials = credentials.is_some();
        target.auth = scheme.with_credentials(credentials);
        if target.auth == Auth::None && !had_credentials && scheme != http_check::AuthScheme::None
        {
            warn!("Detected {scheme} but no credentials were supplied; proceeding unauthenticated");
        }
    }

    let outcome = check(&target, &expected).await;

    println!("{}", outcome.message);
    process::exit(outcome.severity.exit_code());
}
