//! Content providers.
//!
//! A [`Repository`] either serves a request or declines it; registered
//! repositories are polled in order and the first to serve wins. Buffers
//! handed out through a response are returned to their repository through
//! [`Repository::free_file`] once the bytes are on the wire, so providers
//! remain authoritative over their own storage.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// A registered content provider.
pub trait Repository: Send + Sync {
    /// Attempts to serve `request`. Returns `true` when the response was
    /// populated (or a forward was requested), `false` to let the next
    /// repository try.
    fn get_file(&self, request: &mut HttpRequest, response: &mut HttpResponse) -> bool;

    /// Releases a buffer previously handed out by this repository. Called
    /// exactly once per served request, after the bytes were written.
    fn free_file(&self, content: Vec<u8>) {
        drop(content);
    }
}

/// A handler producing one dynamic page.
///
/// Implemented automatically for closures:
///
/// ```
/// use hestia_core::{DynamicPage, HttpRequest, HttpResponse};
///
/// let page = |_req: &mut HttpRequest, resp: &mut HttpResponse| {
///     resp.set_content_from_string("hi");
///     true
/// };
/// let _boxed: Box<dyn DynamicPage> = Box::new(page);
/// ```
pub trait DynamicPage: Send + Sync {
    /// Produces the page. Returning `false` declines the request.
    fn get_page(&self, request: &mut HttpRequest, response: &mut HttpResponse) -> bool;
}

impl<F> DynamicPage for F
where
    F: Fn(&mut HttpRequest, &mut HttpResponse) -> bool + Send + Sync,
{
    fn get_page(&self, request: &mut HttpRequest, response: &mut HttpResponse) -> bool {
        self(request, response)
    }
}

/// A repository of dynamic pages keyed by alias-relative URL.
///
/// Successful responses from a dynamic page carry the `SID` session cookie
/// whenever the request holds a live session; static repositories
/// deliberately do not set it.
#[derive(Default)]
pub struct DynamicRepository {
    pages: Mutex<HashMap<String, Arc<dyn DynamicPage>>>,
}

impl DynamicRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a page under a URL. Leading slashes are stripped so
    /// `"/app/page"` and `"app/page"` are the same key.
    pub fn add_page(&self, url: &str, page: impl DynamicPage + 'static) {
        self.pages
            .lock()
            .insert(url.trim_start_matches('/').to_string(), Arc::new(page));
    }

    /// Removes a registered page.
    pub fn remove_page(&self, url: &str) {
        self.pages.lock().remove(url.trim_start_matches('/'));
    }
}

impl Repository for DynamicRepository {
    fn get_file(&self, request: &mut HttpRequest, response: &mut HttpResponse) -> bool {
        let page = {
            let pages = self.pages.lock();
            pages.get(request.url().trim_start_matches('/')).cloned()
        };
        let Some(page) = page else {
            return false;
        };
        let served = page.get_page(request, response);
        if served && !request.session_id().is_empty() {
            response.add_session_cookie(
                request.session_id(),
                request.sessions().lifetime().as_secs(),
            );
        }
        served
    }
}

struct StoredFile {
    content: Vec<u8>,
    zipped: bool,
}

/// An in-memory repository of fixed content.
///
/// The embeddable counterpart of serving from disk: the application
/// registers byte buffers (optionally pre-gzipped) under URLs at startup.
#[derive(Default)]
pub struct MemoryRepository {
    files: Mutex<HashMap<String, StoredFile>>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers plain content under a URL.
    pub fn add_file(&self, url: &str, content: impl Into<Vec<u8>>) {
        self.files.lock().insert(
            url.trim_start_matches('/').to_string(),
            StoredFile {
                content: content.into(),
                zipped: false,
            },
        );
    }

    /// Registers content that is already gzip-compressed. Clients that do
    /// not accept gzip receive it transparently decompressed.
    pub fn add_zipped_file(&self, url: &str, gzipped: impl Into<Vec<u8>>) {
        self.files.lock().insert(
            url.trim_start_matches('/').to_string(),
            StoredFile {
                content: gzipped.into(),
                zipped: true,
            },
        );
    }
}

impl Repository for MemoryRepository {
    fn get_file(&self, request: &mut HttpRequest, response: &mut HttpResponse) -> bool {
        let files = self.files.lock();
        match files.get(request.url().trim_start_matches('/')) {
            Some(file) => {
                response.set_content(file.content.clone());
                response.set_zipped(file.zipped);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_session::SessionStore;
    use std::net::{IpAddr, Ipv4Addr};

    fn request_for(url: &str) -> HttpRequest {
        let mut req = HttpRequest::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            Arc::new(SessionStore::new()),
        );
        req.set_url(url);
        req
    }

    #[test]
    fn test_dynamic_repository_serves_registered_page() {
        let repo = DynamicRepository::new();
        repo.add_page("/app/echo", |_: &mut HttpRequest, resp: &mut HttpResponse| {
            resp.set_content_from_string("pong");
            true
        });

        let mut req = request_for("app/echo");
        let mut resp = HttpResponse::new();
        assert!(repo.get_file(&mut req, &mut resp));
        assert_eq!(resp.content(), b"pong");

        let mut other = request_for("app/other");
        assert!(!repo.get_file(&mut other, &mut HttpResponse::new()));
    }

    #[test]
    fn test_dynamic_repository_sets_session_cookie() {
        let repo = DynamicRepository::new();
        repo.add_page("s", |req: &mut HttpRequest, resp: &mut HttpResponse| {
            req.get_or_create_session();
            resp.set_content_from_string("ok");
            true
        });

        let mut req = request_for("s");
        let mut resp = HttpResponse::new();
        assert!(repo.get_file(&mut req, &mut resp));
        assert_eq!(resp.cookies().len(), 1);
        assert_eq!(resp.cookies()[0].name(), "SID");
    }

    #[test]
    fn test_memory_repository_serves_bytes() {
        let repo = MemoryRepository::new();
        repo.add_file("/index.html", b"hello".to_vec());

        let mut req = request_for("index.html");
        let mut resp = HttpResponse::new();
        assert!(repo.get_file(&mut req, &mut resp));
        assert_eq!(resp.content(), b"hello");
        assert!(!resp.is_zipped());
    }

    #[test]
    fn test_memory_repository_zipped_flag() {
        let repo = MemoryRepository::new();
        repo.add_zipped_file("a.txt", vec![0x1f, 0x8b, 0x08]);

        let mut req = request_for("a.txt");
        let mut resp = HttpResponse::new();
        assert!(repo.get_file(&mut req, &mut resp));
        assert!(resp.is_zipped());
    }
}
