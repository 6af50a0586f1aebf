//! HTTP Basic Auth configuration.
//!
//! Credentials are fixed at server start. The expected `Authorization` token
//! is precomputed once so the per-request check is a single string compare.
//! Plaintext Basic Auth is an explicit LAN-only trust decision; there is no
//! transport encryption underneath it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::Rng;

use crate::error::{Error, Result};

/// Username used for generated private-mode credentials.
pub const PRIVATE_MODE_USER: &str = "lanscr";

/// Generated password length for private mode.
pub const PRIVATE_PASSWORD_LEN: usize = 12;

/// Password alphabet for private mode: A-Z a-z 2-9 minus the visually
/// ambiguous glyphs I, O, l, 0, 1.
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

/// Basic-Auth credentials plus the precomputed expected token.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub user: String,
    pub pass: String,
    token: String,
}

impl AuthConfig {
    /// Builds credentials, precomputing the Base64 token of `user:pass`.
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Result<Self> {
        let user = user.into();
        let pass = pass.into();
        if user.is_empty() || pass.is_empty() {
            return Err(Error::Config(
                "Bad --auth value. Expected user:pass".into(),
            ));
        }
        let token = BASE64.encode(format!("{user}:{pass}"));
        Ok(Self { user, pass, token })
    }

    /// Parses a `user:pass` argument (split at the first colon, both parts
    /// required).
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((user, pass)) => Self::new(user, pass),
            None => Err(Error::Config(
                "Bad --auth value. Expected user:pass".into(),
            )),
        }
    }

    /// Generates private-mode credentials with a random password.
    pub fn private() -> Self {
        Self::new(PRIVATE_MODE_USER, generate_password(PRIVATE_PASSWORD_LEN))
            .expect("generated credentials are non-empty")
    }

    /// Checks an `Authorization` header value: scheme must be `Basic`
    /// (case-insensitive) and the token must match exactly.
    pub fn verify(&self, header: &str) -> bool {
        let header = header.trim();
        let mut parts = header.splitn(2, ' ');
        let scheme = parts.next().unwrap_or("");
        if !scheme.eq_ignore_ascii_case("basic") {
            return false;
        }
        let token = parts.next().unwrap_or("").trim();
        !self.token.is_empty() && token == self.token
    }

    /// The value to send in an outgoing `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("Basic {}", self.token)
    }
}

/// Generates a random password from the ambiguity-free alphabet using the
/// OS entropy source.
pub fn generate_password(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}
