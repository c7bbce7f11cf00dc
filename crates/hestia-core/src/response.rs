use std::time::SystemTime;

/// One `Set-Cookie` entry.
///
/// # Example
///
/// ```
/// use hestia_core::ResponseCookie;
///
/// let cookie = ResponseCookie::new("theme", "dark")
///     .path("/")
///     .max_age(3600)
///     .http_only();
/// assert_eq!(cookie.name(), "theme");
/// ```
#[derive(Debug, Clone)]
pub struct ResponseCookie {
    name: String,
    value: String,
    max_age: Option<u64>,
    expires: Option<SystemTime>,
    domain: Option<String>,
    path: Option<String>,
    secure: bool,
    http_only: bool,
}

impl ResponseCookie {
    /// Creates a cookie with just a name and value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            expires: None,
            domain: None,
            path: None,
            secure: false,
            http_only: false,
        }
    }

    /// Sets `Max-Age` in seconds.
    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Sets an absolute `Expires` deadline.
    #[must_use]
    pub fn expires(mut self, at: SystemTime) -> Self {
        self.expires = Some(at);
        self
    }

    /// Restricts the cookie to a domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Restricts the cookie to a path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Marks the cookie `Secure`.
    #[must_use]
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Marks the cookie `HttpOnly`.
    #[must_use]
    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// The cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cookie value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// `Max-Age` in seconds, if set.
    #[must_use]
    pub fn max_age_secs(&self) -> Option<u64> {
        self.max_age
    }

    /// Absolute expiry, if set.
    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires
    }

    /// Domain restriction, if set.
    #[must_use]
    pub fn domain_value(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Path restriction, if set.
    #[must_use]
    pub fn path_value(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Whether the cookie is `Secure`.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Whether the cookie is `HttpOnly`.
    #[must_use]
    pub fn is_http_only(&self) -> bool {
        self.http_only
    }
}

/// Cross-origin response policy.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    enabled: bool,
    credentials: bool,
    domain: String,
}

impl CorsPolicy {
    /// Allows cross-origin access from `domain` (use `*` for any origin).
    #[must_use]
    pub fn allow(domain: impl Into<String>, credentials: bool) -> Self {
        Self {
            enabled: true,
            credentials,
            domain: domain.into(),
        }
    }

    /// Whether CORS headers are emitted at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `Access-Control-Allow-Credentials` is emitted.
    #[must_use]
    pub fn allows_credentials(&self) -> bool {
        self.credentials
    }

    /// The allowed origin.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

/// A response under construction.
///
/// Repositories and dynamic pages populate one of these; the response
/// writer serialises it. A response with no content and no explicit status
/// goes out as `204 No Content`; content without an explicit status goes
/// out as `200 OK`.
#[derive(Debug, Default)]
pub struct HttpResponse {
    content: Vec<u8>,
    mime: String,
    status: Option<u16>,
    reason: Option<String>,
    cookies: Vec<ResponseCookie>,
    forward_to: Option<String>,
    cors: CorsPolicy,
    extra_headers: Vec<String>,
    zipped: bool,
}

impl HttpResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the body with raw bytes.
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = content.into();
    }

    /// Replaces the body with a copy of a string.
    pub fn set_content_from_string(&mut self, content: &str) {
        self.content = content.as_bytes().to_vec();
    }

    /// Clears the body and forces `204 No Content`.
    pub fn set_no_content(&mut self) {
        self.content.clear();
        self.status = Some(204);
    }

    /// The current body bytes.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Takes the body out of the response.
    pub fn take_content(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.content)
    }

    /// Body length in bytes.
    #[must_use]
    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    /// Sets the body MIME type (default `text/html`).
    pub fn set_content_type(&mut self, mime: impl Into<String>) {
        self.mime = mime.into();
    }

    /// The body MIME type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        if self.mime.is_empty() {
            "text/html"
        } else {
            &self.mime
        }
    }

    /// Overrides the status code.
    pub fn set_status(&mut self, code: u16) {
        self.status = Some(code);
    }

    /// Overrides the status code and its reason phrase.
    pub fn set_status_with_reason(&mut self, code: u16, reason: impl Into<String>) {
        self.status = Some(code);
        self.reason = Some(reason.into());
    }

    /// The effective status code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.status {
            Some(code) => code,
            None if self.content.is_empty() => 204,
            None => 200,
        }
    }

    /// The explicit reason phrase, if one was set.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Asks the dispatcher to re-resolve the request internally at a new
    /// URL instead of sending this response.
    pub fn forward(&mut self, url: impl Into<String>) {
        self.forward_to = Some(url.into());
    }

    /// The pending internal-forward target, if any.
    #[must_use]
    pub fn forward_to(&self) -> Option<&str> {
        self.forward_to.as_deref()
    }

    /// Clears and returns the pending forward target.
    pub fn take_forward(&mut self) -> Option<String> {
        self.forward_to.take()
    }

    /// Appends a `Set-Cookie` entry.
    pub fn add_cookie(&mut self, cookie: ResponseCookie) {
        self.cookies.push(cookie);
    }

    /// All pending cookies.
    #[must_use]
    pub fn cookies(&self) -> &[ResponseCookie] {
        &self.cookies
    }

    /// Attaches the session cookie for `session_id`.
    pub fn add_session_cookie(&mut self, session_id: &str, max_age_secs: u64) {
        self.add_cookie(
            ResponseCookie::new(crate::SESSION_COOKIE_NAME, session_id)
                .max_age(max_age_secs)
                .http_only(),
        );
    }

    /// Enables CORS headers on this response.
    pub fn set_cors(&mut self, cors: CorsPolicy) {
        self.cors = cors;
    }

    /// The CORS policy.
    #[must_use]
    pub fn cors(&self) -> &CorsPolicy {
        &self.cors
    }

    /// Appends a free-form header line (without trailing CRLF).
    pub fn add_header(&mut self, line: impl Into<String>) {
        self.extra_headers.push(line.into());
    }

    /// Caller-supplied extra header lines.
    #[must_use]
    pub fn extra_headers(&self) -> &[String] {
        &self.extra_headers
    }

    /// Marks the body as already gzip-compressed.
    pub fn set_zipped(&mut self, zipped: bool) {
        self.zipped = zipped;
    }

    /// Whether the body bytes are already gzip-compressed.
    #[must_use]
    pub fn is_zipped(&self) -> bool {
        self.zipped
    }
}
