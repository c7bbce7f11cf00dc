use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use hestia_multipart::Parser as MultipartParser;
use hestia_session::{SessionStore, SessionValue};

use crate::method::Method;

/// One parsed HTTP request, exclusively owned by the worker serving it.
///
/// The request carries the decoded URL and parameter map, cookies, any
/// unrecognised headers, the raw payload for non-form bodies, and a handle
/// to the server's session store so content providers can read and write
/// per-session state.
///
/// On a websocket upgrade the request moves into the websocket client and
/// stays alive for the duration of the connection.
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    url: String,
    params: HashMap<String, String>,
    cookies: HashMap<String, String>,
    extra_headers: HashMap<String, String>,
    content_type: String,
    payload: Bytes,
    multipart: Option<MultipartParser>,
    session_id: String,
    origin: String,
    username: String,
    peer: IpAddr,
    sessions: Arc<SessionStore>,
}

impl HttpRequest {
    /// Creates an empty request for a connection from `peer`.
    #[must_use]
    pub fn new(peer: IpAddr, sessions: Arc<SessionStore>) -> Self {
        Self {
            method: Method::Unknown,
            url: String::new(),
            params: HashMap::new(),
            cookies: HashMap::new(),
            extra_headers: HashMap::new(),
            content_type: String::new(),
            payload: Bytes::new(),
            multipart: None,
            session_id: String::new(),
            origin: String::new(),
            username: String::new(),
            peer,
            sessions,
        }
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Sets the request method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// The percent-decoded URL path, leading slashes stripped.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Replaces the URL path (used on internal forwards).
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// Looks up a query or form parameter.
    ///
    /// A parameter repeated on the wire keeps its latest value under the
    /// plain name; the full `|`-joined history is available under
    /// `name[]`.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The complete parameter map.
    #[must_use]
    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Mutable access for the parser.
    pub fn parameters_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.params
    }

    /// Looks up a request cookie.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// The complete cookie map.
    #[must_use]
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Mutable access for the parser.
    pub fn cookies_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.cookies
    }

    /// Looks up a header that the engine did not consume itself. Names are
    /// stored as received (trimmed); lookup is case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Mutable access for the parser.
    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.extra_headers
    }

    /// The request `Content-Type`, or an empty string.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Sets the request `Content-Type`.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    /// The raw body for non-form requests.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Stores the raw body.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// The multipart parser, when the body was `multipart/form-data`.
    #[must_use]
    pub fn multipart(&self) -> Option<&MultipartParser> {
        self.multipart.as_ref()
    }

    /// Mutable access to the multipart parser.
    pub fn multipart_mut(&mut self) -> Option<&mut MultipartParser> {
        self.multipart.as_mut()
    }

    /// Installs the multipart parser.
    pub fn set_multipart(&mut self, parser: MultipartParser) {
        self.multipart = Some(parser);
    }

    /// The `Origin` header, or an empty string.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Sets the `Origin` header.
    pub fn set_origin(&mut self, origin: impl Into<String>) {
        self.origin = origin.into();
    }

    /// The authenticated user name, or an empty string.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Records the authenticated user name.
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    /// The peer address of the underlying connection.
    #[must_use]
    pub fn peer(&self) -> IpAddr {
        self.peer
    }

    /// The session identifier, or an empty string when the request carries
    /// no live session.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Adopts a session identifier already validated against the store.
    pub fn set_session_id(&mut self, id: impl Into<String>) {
        self.session_id = id.into();
    }

    /// The server's session store.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Returns the live session id, creating a session first if the
    /// request does not have one.
    pub fn get_or_create_session(&mut self) -> &str {
        if self.session_id.is_empty() || !self.sessions.touch_if_exists(&self.session_id) {
            self.session_id = self.sessions.create();
        }
        &self.session_id
    }

    /// Fetches a session attribute. Returns `None` without a live session.
    #[must_use]
    pub fn session_attribute(&self, name: &str) -> Option<SessionValue> {
        if self.session_id.is_empty() {
            return None;
        }
        self.sessions.attribute(&self.session_id, name)
    }

    /// Fetches and downcasts a typed session attribute.
    #[must_use]
    pub fn session_object<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.session_attribute(name)?.downcast::<T>()
    }

    /// Stores a session attribute. Returns `false` without a live session.
    pub fn set_session_attribute(&self, name: &str, value: SessionValue) -> bool {
        if self.session_id.is_empty() {
            return false;
        }
        self.sessions.set_attribute(&self.session_id, name, value)
    }

    /// Removes the request's session entirely.
    pub fn remove_session(&mut self) {
        if !self.session_id.is_empty() {
            self.sessions.remove(&self.session_id);
            self.session_id.clear();
        }
    }
}
