//! Repository dispatch.

use std::sync::Arc;

use hestia_core::{mime_for_url, HttpRequest, HttpResponse, Repository};

/// Internal forwards deeper than this answer `508 Loop Detected`.
pub const MAX_FORWARDS: usize = 8;

/// How a dispatch run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A repository served the request; the index identifies it so its
    /// `free_file` hook can be paired with the sent buffer.
    Served {
        /// Index of the serving repository in the registered order.
        repository: usize,
    },
    /// No repository claimed the request.
    NotFound,
    /// Internal forwards exceeded [`MAX_FORWARDS`].
    LoopDetected,
}

/// Walks the registered repositories in order until one serves the
/// request.
///
/// A repository that returns `true` after calling
/// [`HttpResponse::forward`] restarts the walk from the beginning at the
/// new URL, with the rest of the request preserved; the response MIME is
/// re-derived from the new URL.
pub fn dispatch(
    repositories: &[Arc<dyn Repository>],
    request: &mut HttpRequest,
    response: &mut HttpResponse,
) -> DispatchOutcome {
    let mut forwards = 0;
    'restart: loop {
        for (index, repository) in repositories.iter().enumerate() {
            if !repository.get_file(request, response) {
                continue;
            }
            match response.take_forward() {
                Some(target) => {
                    forwards += 1;
                    if forwards > MAX_FORWARDS {
                        tracing::warn!(url = request.url(), "forward loop detected");
                        return DispatchOutcome::LoopDetected;
                    }
                    let target = target.trim_start_matches('/').to_string();
                    tracing::debug!(from = request.url(), to = %target, "internal forward");
                    response.set_content_type(mime_for_url(&target));
                    request.set_url(target);
                    continue 'restart;
                }
                None => return DispatchOutcome::Served { repository: index },
            }
        }
        return DispatchOutcome::NotFound;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_core::{DynamicRepository, MemoryRepository};
    use hestia_session::SessionStore;
    use std::net::{IpAddr, Ipv4Addr};

    fn request_for(url: &str) -> HttpRequest {
        let mut request = HttpRequest::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            Arc::new(SessionStore::new()),
        );
        request.set_url(url);
        request
    }

    #[test]
    fn test_first_serving_repository_wins() {
        let first = Arc::new(MemoryRepository::new());
        first.add_file("a.txt", b"from-first".to_vec());
        let second = Arc::new(MemoryRepository::new());
        second.add_file("a.txt", b"from-second".to_vec());
        let repositories: Vec<Arc<dyn Repository>> = vec![first, second];

        let mut request = request_for("a.txt");
        let mut response = HttpResponse::new();
        let outcome = dispatch(&repositories, &mut request, &mut response);
        assert_eq!(outcome, DispatchOutcome::Served { repository: 0 });
        assert_eq!(response.content(), b"from-first");
    }

    #[test]
    fn test_unserved_request_is_not_found() {
        let repositories: Vec<Arc<dyn Repository>> =
            vec![Arc::new(MemoryRepository::new())];
        let mut request = request_for("missing.html");
        let outcome = dispatch(&repositories, &mut request, &mut HttpResponse::new());
        assert_eq!(outcome, DispatchOutcome::NotFound);
    }

    #[test]
    fn test_forward_restarts_dispatch() {
        let pages = Arc::new(DynamicRepository::new());
        pages.add_page("old", |_req: &mut HttpRequest, resp: &mut HttpResponse| {
            resp.forward("/new.txt");
            true
        });
        let files = Arc::new(MemoryRepository::new());
        files.add_file("new.txt", b"moved here".to_vec());
        let repositories: Vec<Arc<dyn Repository>> = vec![pages, files];

        let mut request = request_for("old");
        let mut response = HttpResponse::new();
        let outcome = dispatch(&repositories, &mut request, &mut response);
        assert_eq!(outcome, DispatchOutcome::Served { repository: 1 });
        assert_eq!(request.url(), "new.txt");
        assert_eq!(response.content(), b"moved here");
        assert_eq!(response.content_type(), "text/plain");
    }

    #[test]
    fn test_forward_loop_is_bounded() {
        let pages = Arc::new(DynamicRepository::new());
        pages.add_page("a", |_req: &mut HttpRequest, resp: &mut HttpResponse| {
            resp.forward("b");
            true
        });
        pages.add_page("b", |_req: &mut HttpRequest, resp: &mut HttpResponse| {
            resp.forward("a");
            true
        });
        let repositories: Vec<Arc<dyn Repository>> = vec![pages];

        let mut request = request_for("a");
        let outcome = dispatch(&repositories, &mut request, &mut HttpResponse::new());
        assert_eq!(outcome, DispatchOutcome::LoopDetected);
    }
}
