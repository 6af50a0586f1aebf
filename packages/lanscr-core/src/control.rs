//! One-shot control requests against a running server.

use reqwest::header::AUTHORIZATION;

use crate::auth::AuthConfig;
use crate::error::{Error, Result};

/// Resolves an `audio-mute` target into the control URL. An all-digit target
/// is a local port; anything else is treated as a server base URL.
pub fn control_url(target: &str, mute: bool) -> Result<String> {
    let mute = mute as u8;
    if !target.is_empty() && target.bytes().all(|b| b.is_ascii_digit()) {
        let port: u16 = target
            .parse()
            .map_err(|_| Error::Config(format!("Invalid port: {target}")))?;
        return Ok(format!("http://127.0.0.1:{port}/control?mute={mute}"));
    }
    let base = target.trim_end_matches('/');
    if base.is_empty() {
        return Err(Error::Config("Empty control target".into()));
    }
    Ok(format!("{base}/control?mute={mute}"))
}

/// Sends `GET /control?mute=N` to a server, optionally with Basic Auth.
pub async fn send_mute(target: &str, mute: bool, auth: Option<&AuthConfig>) -> Result<()> {
    let url = control_url(target, mute)?;
    let client = reqwest::Client::new();
    let mut request = client.get(&url);
    if let Some(auth) = auth {
        request = request.header(AUTHORIZATION, auth.header_value());
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::RemoteRefused(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        return Err(Error::RemoteRefused(format!("HTTP {status}")));
    }
    Ok(())
}
