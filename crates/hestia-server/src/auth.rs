//! HTTP Basic and Bearer authentication.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use hestia_core::TokenRejection;

/// Verified Basic credentials are remembered this long, keyed by their
/// base64 blob, so repeated requests skip the decode-and-compare.
const BASIC_HISTORY_WINDOW: Duration = Duration::from_secs(10 * 60);

/// HTTP Basic credential verification with a success cache.
pub struct BasicAuth {
    credentials: Vec<String>,
    history: DashMap<String, (String, Instant)>,
}

impl BasicAuth {
    /// Creates a verifier over `user:password` lines.
    #[must_use]
    pub fn new(credentials: Vec<String>) -> Self {
        Self {
            credentials,
            history: DashMap::new(),
        }
    }

    /// Verifies one `Authorization: Basic` blob. Returns the user name on
    /// success.
    #[must_use]
    pub fn verify(&self, blob: &str) -> Option<String> {
        if let Some(entry) = self.history.get(blob) {
            let (username, seen_at) = entry.value();
            if seen_at.elapsed() < BASIC_HISTORY_WINDOW {
                return Some(username.clone());
            }
        }
        self.history
            .retain(|_, (_, seen_at)| seen_at.elapsed() < BASIC_HISTORY_WINDOW);

        let decoded = BASE64.decode(blob.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        if !self.credentials.iter().any(|line| line == &decoded) {
            return None;
        }
        let username = decoded
            .split_once(':')
            .map(|(user, _)| user.to_string())
            .unwrap_or_default();
        self.history
            .insert(blob.to_string(), (username.clone(), Instant::now()));
        Some(username)
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("users", &self.credentials.len())
            .field("cached", &self.history.len())
            .finish()
    }
}

/// Decodes and verifies a presented token: returns the decoded token text
/// and whether its signature checked out.
pub type DecodeTokenFn = dyn Fn(&str) -> Option<(String, bool)> + Send + Sync;

/// Extracts the expiration (epoch seconds) from a decoded token.
pub type TokenExpirationFn = dyn Fn(&str) -> Option<u64> + Send + Sync;

/// Decides whether a decoded token may access a resource URL.
pub type ScopeCheckFn = dyn Fn(&str, &str) -> bool + Send + Sync;

/// Bearer-token verification built from caller-supplied callbacks.
///
/// Verified tokens are cached until their expiration so the decode and
/// signature check run once per token.
pub struct BearerAuth {
    realm: String,
    decode: Box<DecodeTokenFn>,
    expiration: Box<TokenExpirationFn>,
    scope_check: Option<Box<ScopeCheckFn>>,
    cache: DashMap<String, (String, u64)>,
}

impl BearerAuth {
    /// Creates a verifier from the decode and expiration callbacks.
    pub fn new(
        realm: impl Into<String>,
        decode: impl Fn(&str) -> Option<(String, bool)> + Send + Sync + 'static,
        expiration: impl Fn(&str) -> Option<u64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            realm: realm.into(),
            decode: Box::new(decode),
            expiration: Box::new(expiration),
            scope_check: None,
            cache: DashMap::new(),
        }
    }

    /// Adds a per-resource scope check.
    #[must_use]
    pub fn with_scope_check(
        mut self,
        check: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.scope_check = Some(Box::new(check));
        self
    }

    /// The configured realm.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Verifies one `Authorization: Bearer` blob against a resource URL.
    ///
    /// # Errors
    ///
    /// Returns the stage at which verification failed.
    pub fn verify(&self, blob: &str, resource_url: &str) -> Result<String, TokenRejection> {
        let now = epoch_now();

        let cached = self.cache.get(blob).and_then(|entry| {
            let (decoded, expires_at) = entry.value();
            (*expires_at > now).then(|| decoded.clone())
        });

        let decoded = match cached {
            Some(decoded) => decoded,
            None => {
                self.cache.remove(blob);
                let (decoded, signature_ok) =
                    (self.decode)(blob).ok_or(TokenRejection::BadSignature)?;
                if !signature_ok {
                    return Err(TokenRejection::BadSignature);
                }
                let expires_at =
                    (self.expiration)(&decoded).ok_or(TokenRejection::MissingExpiration)?;
                if expires_at <= now {
                    return Err(TokenRejection::Expired);
                }
                self.cache
                    .insert(blob.to_string(), (decoded.clone(), expires_at));
                decoded
            }
        };

        if let Some(check) = &self.scope_check {
            if !check(&decoded, resource_url) {
                return Err(TokenRejection::InsufficientScope);
            }
        }
        Ok(decoded)
    }

    /// Builds the `WWW-Authenticate` challenge value, with structured
    /// error fields when a token was presented and rejected.
    #[must_use]
    pub fn challenge(&self, rejection: Option<TokenRejection>) -> String {
        match rejection {
            None => format!("Bearer realm=\"{}\"", self.realm),
            Some(rejection) => format!(
                "Bearer realm=\"{}\", error=\"{}\", error_description=\"{}\"",
                self.realm,
                rejection.error_code(),
                rejection.description()
            ),
        }
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("realm", &self.realm)
            .field("scoped", &self.scope_check.is_some())
            .field("cached", &self.cache.len())
            .finish()
    }
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
