//! NTLM authentication wrapper.
//!
//! Drives the three-message NTLM exchange over the already-configured
//! client: an unauthenticated request first, then a type-1 negotiate
//! message against the 401 challenge, then a type-3 authenticate message
//! computed from the server's type-2 challenge (NTLMv2 responses).
//! Servers that answer the initial request without demanding NTLM are
//! passed through untouched.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use log::debug;
use md4::{Digest, Md4};
use reqwest::header::{HeaderMap, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode, Url};

use crate::error_handling::NtlmError;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SECURITY: u32 = 0x0008_0000;

/// Offset between the Unix epoch and the Windows FILETIME epoch, seconds.
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

/// Parsed server type-2 challenge.
#[derive(Debug)]
struct Challenge {
    server_challenge: [u8; 8],
    target_info: Vec<u8>,
}

/// Sends a GET through the NTLM handshake.
///
/// The client carries the full transport configuration of the check, so
/// the negotiation inherits its TLS settings, timeout, and redirect
/// policy. Each message exchange is a separate request; the overall hard
/// timeout still applies per request.
pub async fn send_negotiated(
    client: &Client,
    url: Url,
    user: &str,
    password: &str,
) -> Result<Response, NtlmError> {
    let initial = client.get(url.clone()).send().await?;
    if initial.status() != StatusCode::UNAUTHORIZED || !offers_ntlm(initial.headers()) {
        // Server does not demand NTLM for this resource
        return Ok(initial);
    }
    drop(initial);

    debug!(">> NTLM: sending negotiate message");
    let negotiate = format!("NTLM {}", BASE64.encode(negotiate_message()));
    let challenged = client
        .get(url.clone())
        .header(AUTHORIZATION, negotiate)
        .send()
        .await?;
    let challenge = extract_challenge(challenged.headers())?;
    drop(challenged);

    debug!(">> NTLM: answering challenge");
    let authenticate = format!(
        "NTLM {}",
        BASE64.encode(authenticate_message(&challenge, user, password))
    );
    Ok(client
        .get(url)
        .header(AUTHORIZATION, authenticate)
        .send()
        .await?)
}

/// Whether any `WWW-Authenticate` value offers NTLM or Negotiate.
fn offers_ntlm(headers: &HeaderMap) -> bool {
    headers.get_all(WWW_AUTHENTICATE).iter().any(|value| {
        value
            .to_str()
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                v.starts_with("ntlm") || v.starts_with("negotiate")
            })
            .unwrap_or(false)
    })
}

/// Pulls the base64 type-2 payload out of the challenge response headers.
fn extract_challenge(headers: &HeaderMap) -> Result<Challenge, NtlmError> {
    for value in headers.get_all(WWW_AUTHENTICATE).iter() {
        let Ok(value) = value.to_str() else { continue };
        let value = value.trim();
        let lower = value.to_ascii_lowercase();
        let payload = if lower.starts_with("ntlm ") {
            &value[5..]
        } else if lower.starts_with("negotiate ") {
            &value[10..]
        } else {
            continue;
        };
        let raw = BASE64
            .decode(payload.trim())
            .map_err(|e| NtlmError::BadChallenge(e.to_string()))?;
        return parse_challenge(&raw);
    }
    Err(NtlmError::MissingChallenge)
}

/// Builds the type-1 negotiate message (no domain or workstation fields).
fn negotiate_message() -> Vec<u8> {
    let flags = NEGOTIATE_UNICODE
        | REQUEST_TARGET
        | NEGOTIATE_NTLM
        | NEGOTIATE_ALWAYS_SIGN
        | NEGOTIATE_EXTENDED_SECURITY;

    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&1u32.to_le_bytes());
    msg.extend_from_slice(&flags.to_le_bytes());
    // Empty domain and workstation fields, offsets past the fixed header
    for _ in 0..2 {
        msg.extend_from_slice(&0u16.to_le_bytes());
        msg.extend_from_slice(&0u16.to_le_bytes());
        msg.extend_from_slice(&32u32.to_le_bytes());
    }
    msg
}

/// Parses the server's type-2 challenge message.
fn parse_challenge(raw: &[u8]) -> Result<Challenge, NtlmError> {
    if raw.len() < 48 {
        return Err(NtlmError::BadChallenge("message too short".to_string()));
    }
    if &raw[0..8] != SIGNATURE {
        return Err(NtlmError::BadChallenge("bad signature".to_string()));
    }
    let msg_type = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
    if msg_type != 2 {
        return Err(NtlmError::BadChallenge(format!(
            "expected type 2 message, got type {msg_type}"
        )));
    }

    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(&raw[24..32]);

    let info_len = u16::from_le_bytes([raw[40], raw[41]]) as usize;
    let info_offset = u32::from_le_bytes([raw[44], raw[45], raw[46], raw[47]]) as usize;
    let target_info = if info_len == 0 {
        Vec::new()
    } else {
        raw.get(info_offset..info_offset + info_len)
            .ok_or_else(|| NtlmError::BadChallenge("target info out of bounds".to_string()))?
            .to_vec()
    };

    Ok(Challenge {
        server_challenge,
        target_info,
    })
}

/// Builds the type-3 authenticate message with NTLMv2 responses.
fn authenticate_message(challenge: &Challenge, user: &str, password: &str) -> Vec<u8> {
    // DOMAIN\user form carries the domain in the username
    let (domain, user) = match user.split_once('\\') {
        Some((domain, user)) => (domain, user),
        None => ("", user),
    };

    let v2_hash = ntlmv2_hash(user, domain, password);
    let client_challenge: [u8; 8] = rand::random();
    let timestamp = filetime_now();

    // NTLMv2 blob: version, timestamp, client nonce, server's target info
    let mut blob = Vec::with_capacity(28 + challenge.target_info.len() + 4);
    blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(&client_challenge);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&challenge.target_info);
    blob.extend_from_slice(&[0u8; 4]);

    let mut proof_input = Vec::with_capacity(8 + blob.len());
    proof_input.extend_from_slice(&challenge.server_challenge);
    proof_input.extend_from_slice(&blob);
    let nt_proof = hmac_md5(&v2_hash, &proof_input);

    let mut nt_response = Vec::with_capacity(16 + blob.len());
    nt_response.extend_from_slice(&nt_proof);
    nt_response.extend_from_slice(&blob);

    let mut lm_input = Vec::with_capacity(16);
    lm_input.extend_from_slice(&challenge.server_challenge);
    lm_input.extend_from_slice(&client_challenge);
    let mut lm_response = Vec::with_capacity(24);
    lm_response.extend_from_slice(&hmac_md5(&v2_hash, &lm_input));
    lm_response.extend_from_slice(&client_challenge);

    let domain_bytes = utf16le(domain);
    let user_bytes = utf16le(user);
    let workstation_bytes: Vec<u8> = Vec::new();
    let session_key: Vec<u8> = Vec::new();

    let flags = NEGOTIATE_UNICODE
        | REQUEST_TARGET
        | NEGOTIATE_NTLM
        | NEGOTIATE_ALWAYS_SIGN
        | NEGOTIATE_EXTENDED_SECURITY;

    // Fixed part: signature, type, six field descriptors, flags
    const HEADER_LEN: usize = 8 + 4 + 6 * 8 + 4;
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(SIGNATURE);
    header.extend_from_slice(&3u32.to_le_bytes());

    let mut payload: Vec<u8> = Vec::new();
    let mut push_field = |header: &mut Vec<u8>, data: &[u8]| {
        let offset = (HEADER_LEN + payload.len()) as u32;
        header.extend_from_slice(&(data.len() as u16).to_le_bytes());
        header.extend_from_slice(&(data.len() as u16).to_le_bytes());
        header.extend_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(data);
    };

    push_field(&mut header, &lm_response);
    push_field(&mut header, &nt_response);
    push_field(&mut header, &domain_bytes);
    push_field(&mut header, &user_bytes);
    push_field(&mut header, &workstation_bytes);
    push_field(&mut header, &session_key);
    header.extend_from_slice(&flags.to_le_bytes());

    header.extend_from_slice(&payload);
    header
}

/// NTLMv2 hash: HMAC-MD5 of the NT hash, keyed over UPPER(user) + domain.
fn ntlmv2_hash(user: &str, domain: &str, password: &str) -> [u8; 16] {
    let mut md4 = Md4::new();
    md4.update(utf16le(password));
    let nt_hash = md4.finalize();

    let mut identity = user.to_uppercase();
    identity.push_str(domain);
    hmac_md5(&nt_hash, &utf16le(&identity))
}

fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac =
        <Hmac<md5::Md5> as Mac>::new_from_slice(key).expect("HMAC-MD5 key length is unrestricted");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Current time as a Windows FILETIME (100 ns ticks since 1601).
fn filetime_now() -> u64 {
    let unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    (unix + FILETIME_EPOCH_OFFSET) * 10_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal, well-formed type-2 challenge message.
    fn synthetic_challenge(server_challenge: [u8; 8], target_info: &[u8]) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&2u32.to_le_bytes());
        // Target name fields (empty)
        msg.extend_from_slice(&0u16.to_le_bytes());
        msg.extend_from_slice(&0u16.to_le_bytes());
        msg.extend_from_slice(&48u32.to_le_bytes());
        // Flags
        msg.extend_from_slice(&(NEGOTIATE_UNICODE | NEGOTIATE_NTLM).to_le_bytes());
        msg.extend_from_slice(&server_challenge);
        // Reserved
        msg.extend_from_slice(&[0u8; 8]);
        // Target info fields
        msg.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
        msg.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
        msg.extend_from_slice(&48u32.to_le_bytes());
        msg.extend_from_slice(target_info);
        msg
    }

    #[test]
    fn negotiate_message_layout() {
        let msg = negotiate_message();
        assert_eq!(msg.len(), 32);
        assert_eq!(&msg[0..8], SIGNATURE);
        assert_eq!(u32::from_le_bytes([msg[8], msg[9], msg[10], msg[11]]), 1);
    }

    #[test]
    fn parses_synthetic_challenge() {
        let info = [0x02, 0x00, 0x04, 0x00, b'd', 0, b'c', 0];
        let raw = synthetic_challenge(*b"\x01\x23\x45\x67\x89\xab\xcd\xef", &info);
        let challenge = parse_challenge(&raw).unwrap();
        assert_eq!(&challenge.server_challenge, b"\x01\x23\x45\x67\x89\xab\xcd\xef");
        assert_eq!(challenge.target_info, info);
    }

    #[test]
    fn rejects_malformed_challenges() {
        assert!(parse_challenge(b"short").is_err());

        let mut wrong_sig = synthetic_challenge([0u8; 8], &[]);
        wrong_sig[0] = b'X';
        assert!(parse_challenge(&wrong_sig).is_err());

        let mut wrong_type = synthetic_challenge([0u8; 8], &[]);
        wrong_type[8] = 3;
        assert!(parse_challenge(&wrong_type).is_err());
    }

    #[test]
    fn challenge_with_out_of_bounds_target_info_is_rejected() {
        let mut raw = synthetic_challenge([0u8; 8], &[1, 2, 3, 4]);
        raw.truncate(50);
        assert!(parse_challenge(&raw).is_err());
    }

    #[test]
    fn authenticate_message_carries_a_valid_ntlmv2_proof() {
        let server_challenge = *b"\x11\x22\x33\x44\x55\x66\x77\x88";
        let challenge = Challenge {
            server_challenge,
            target_info: vec![0x02, 0x00, 0x02, 0x00, b'x', 0],
        };
        let msg = authenticate_message(&challenge, "CONTOSO\\user", "password");

        assert_eq!(&msg[0..8], SIGNATURE);
        assert_eq!(u32::from_le_bytes([msg[8], msg[9], msg[10], msg[11]]), 3);

        // NT response descriptor sits at offset 20
        let nt_len = u16::from_le_bytes([msg[20], msg[21]]) as usize;
        let nt_offset = u32::from_le_bytes([msg[24], msg[25], msg[26], msg[27]]) as usize;
        let nt_response = &msg[nt_offset..nt_offset + nt_len];

        // Recompute the proof over the embedded blob
        let v2_hash = ntlmv2_hash("user", "CONTOSO", "password");
        let mut proof_input = Vec::new();
        proof_input.extend_from_slice(&server_challenge);
        proof_input.extend_from_slice(&nt_response[16..]);
        assert_eq!(hmac_md5(&v2_hash, &proof_input), nt_response[..16]);

        // Username is embedded as UTF-16LE
        let user_len = u16::from_le_bytes([msg[36], msg[37]]) as usize;
        let user_offset = u32::from_le_bytes([msg[40], msg[41], msg[42], msg[43]]) as usize;
        assert_eq!(&msg[user_offset..user_offset + user_len], utf16le("user"));
    }

    #[test]
    fn offers_ntlm_matches_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, "ntlm".parse().unwrap());
        assert!(offers_ntlm(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, "Negotiate".parse().unwrap());
        assert!(offers_ntlm(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, "Basic realm=\"x\"".parse().unwrap());
        assert!(!offers_ntlm(&headers));
    }

    #[test]
    fn missing_challenge_payload_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, "NTLM".parse().unwrap());
        assert!(matches!(
            extract_challenge(&headers),
            Err(NtlmError::MissingChallenge)
        ));
    }
}
