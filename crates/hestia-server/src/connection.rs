//! The per-connection keep-alive worker.
//!
//! One worker drives one accepted connection: it reads the header block
//! line by line, assembles the request, checks credentials, reads the
//! body (raw, urlencoded or streamed into the multipart parser), then
//! either hands the connection to the websocket subsystem or walks the
//! repositories and writes the response. The loop continues while
//! keep-alive is permitted, capped at [`KEEPALIVE_MAX_REQUESTS`] requests
//! per connection.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use hestia_core::{
    mime_for_url, CorsPolicy, HestiaError, HttpRequest, HttpResponse, Method,
    SESSION_COOKIE_NAME,
};
use hestia_http::compress;
use hestia_http::cookie::parse_cookies;
use hestia_http::parser::{normalize_url, parse_request_line, split_header_line, value_has_token};
use hestia_http::urlencoded::parse_params;
use hestia_http::writer::{error_page, serialize_head, ResponseHead};
use hestia_multipart::Parser as MultipartParser;
use hestia_ws::Endpoint;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::dispatcher::{dispatch, DispatchOutcome};
use crate::server::ServerShared;
use crate::stream::ClientStream;

/// A keep-alive connection serves at most this many requests.
const KEEPALIVE_MAX_REQUESTS: u32 = 25;

/// Hard cap on one header line.
const MAX_HEADER_LINE: usize = 32 * 1024;

/// Request bodies stream into the multipart parser in chunks of this
/// size.
const BODY_CHUNK: usize = 32 * 1024;

/// What to do with the connection after one request.
enum Flow {
    KeepAlive,
    Close,
    Upgrade {
        endpoint: Arc<Endpoint>,
        request: HttpRequest,
        client_key: String,
        compressed: bool,
    },
}

/// A failed request, with the status to report (when one can still be
/// reported) and an optional `WWW-Authenticate` challenge.
#[derive(Debug)]
struct Failure {
    status: Option<u16>,
    challenge: Option<String>,
    error: HestiaError,
}

impl From<HestiaError> for Failure {
    fn from(error: HestiaError) -> Self {
        Self {
            status: error.status_code().map(|status| status.as_u16()),
            challenge: None,
            error,
        }
    }
}

/// Parsed header-block state, before the request object exists.
#[derive(Default)]
struct HeadState {
    keep_alive: bool,
    content_length: Option<usize>,
    content_type: String,
    urlencoded_form: bool,
    multipart_form: bool,
    client_gzip: bool,
    upgrade_requested: bool,
    ws_key: String,
    ws_deflate: bool,
    origin: String,
    cookies: HashMap<String, String>,
    extra: HashMap<String, String>,
    authorization: Option<String>,
}

/// Drives one accepted connection to completion.
///
/// Either this worker fully consumes and closes the connection, or
/// exactly one websocket task pair takes ownership of it.
pub(crate) async fn serve_connection(
    shared: Arc<ServerShared>,
    stream: ClientStream,
    peer: IpAddr,
) {
    // Mutual TLS: a verified peer whose DN is not on the allow-list gets
    // a 403 and nothing else.
    if let Some(client_auth) = shared
        .config
        .tls()
        .and_then(|tls| tls.client_auth.as_ref())
    {
        let peer_certs = stream.peer_certificates();
        match crate::tls::allowed_peer_dn(peer_certs.as_deref(), &client_auth.allowed_dns) {
            Some(dn) => tracing::debug!(peer = %peer, dn = %dn, "mutual tls peer accepted"),
            None => {
                let mut stream = stream;
                write_error_response(&mut stream, &shared, 403, None).await;
                return;
            }
        }
    }

    let mut reader = BufReader::new(stream);
    let mut served: u32 = 0;
    loop {
        match serve_one(&shared, &mut reader, peer, &mut served).await {
            Ok(Flow::KeepAlive) => continue,
            Ok(Flow::Close) => break,
            Ok(Flow::Upgrade {
                endpoint,
                request,
                client_key,
                compressed,
            }) => {
                let head = hestia_ws::upgrade_response_head(&client_key, compressed);
                if write_with_timeout(
                    &mut reader,
                    head.as_bytes(),
                    shared.config.socket_timeout(),
                )
                .await
                .is_err()
                {
                    break;
                }
                tracing::debug!(peer = %peer, endpoint = endpoint.path(), "websocket upgrade");
                hestia_ws::attach_client(
                    &endpoint,
                    request,
                    reader,
                    compressed,
                    shared.ws_config.clone(),
                );
                // Ownership of the connection now belongs to the
                // websocket task pair.
                return;
            }
            Err(failure) => {
                match failure.status {
                    Some(status) => {
                        tracing::debug!(peer = %peer, status, "request failed: {}", failure.error);
                        write_error_response(
                            reader.get_mut(),
                            &shared,
                            status,
                            failure.challenge.as_deref(),
                        )
                        .await;
                    }
                    None => {
                        tracing::debug!(peer = %peer, "connection dropped: {}", failure.error);
                    }
                }
                break;
            }
        }
    }
}

async fn serve_one(
    shared: &Arc<ServerShared>,
    reader: &mut BufReader<ClientStream>,
    peer: IpAddr,
    served: &mut u32,
) -> Result<Flow, Failure> {
    let timeout = shared.config.socket_timeout();

    let line = match read_line(reader, timeout).await {
        Ok(Some(line)) => line,
        // EOF, idle timeout or a broken socket between requests close
        // the connection silently.
        Ok(None) => return Ok(Flow::Close),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
            return Err(HestiaError::Parse("header line exceeds 32 KiB".to_string()).into());
        }
        Err(_) => return Ok(Flow::Close),
    };
    if line.is_empty() {
        return Ok(Flow::Close);
    }

    let request_line = parse_request_line(&line).map_err(Failure::from)?;
    let mut head = HeadState {
        keep_alive: request_line.keep_alive_default,
        ..HeadState::default()
    };

    loop {
        let header_line = match read_line(reader, timeout).await {
            Ok(Some(header_line)) => header_line,
            Ok(None) => {
                return Err(HestiaError::Parse("connection closed inside headers".to_string())
                    .into());
            }
            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                return Err(
                    HestiaError::Parse("header line exceeds 32 KiB".to_string()).into(),
                );
            }
            Err(err) => return Err(HestiaError::Io(err).into()),
        };
        if header_line.is_empty() {
            break;
        }
        let Some((name, value)) = split_header_line(&header_line) else {
            return Err(HestiaError::Parse(format!("bad header line: {header_line:?}")).into());
        };
        apply_header(&mut head, name, value)?;
    }

    if request_line.method == Method::Unknown {
        return Err(HestiaError::UnsupportedMethod(request_line.method_token).into());
    }

    *served += 1;
    if head.keep_alive && *served >= KEEPALIVE_MAX_REQUESTS {
        head.keep_alive = false;
    }

    let url = normalize_url(&request_line.path);
    let mut request = HttpRequest::new(peer, Arc::clone(&shared.sessions));
    request.set_method(request_line.method);
    request.set_url(url.clone());
    request.set_content_type(head.content_type.clone());
    request.set_origin(std::mem::take(&mut head.origin));
    if let Some(query) = &request_line.query {
        parse_params(query, request.parameters_mut());
    }
    *request.cookies_mut() = std::mem::take(&mut head.cookies);
    *request.headers_mut() = std::mem::take(&mut head.extra);

    if let Some(sid) = request.cookie(SESSION_COOKIE_NAME) {
        if shared.sessions.touch_if_exists(sid) {
            let sid = sid.to_string();
            request.set_session_id(sid);
        }
    }

    authorize(shared, head.authorization.as_deref(), &url, &mut request)?;

    if let Some(length) = head.content_length.filter(|length| *length > 0) {
        if head.multipart_form {
            let mut parser =
                MultipartParser::new(&head.content_type, shared.config.multipart_temp_dir())
                    .map_err(HestiaError::from)
                    .map_err(Failure::from)?;
            parser.set_max_collected_bytes(shared.config.multipart_max_collected());

            let mut remaining = length;
            let mut chunk = vec![0u8; BODY_CHUNK.min(length)];
            while remaining > 0 {
                let take = remaining.min(chunk.len());
                read_exact_with_timeout(reader, &mut chunk[..take], timeout)
                    .await
                    .map_err(|err| Failure::from(HestiaError::Io(err)))?;
                parser
                    .accept_data(&chunk[..take])
                    .map_err(HestiaError::from)
                    .map_err(Failure::from)?;
                remaining -= take;
            }
            request.set_multipart(parser);
        } else {
            let mut body = vec![0u8; length];
            read_exact_with_timeout(reader, &mut body, timeout)
                .await
                .map_err(|err| Failure::from(HestiaError::Io(err)))?;
            if head.urlencoded_form {
                let body_text = String::from_utf8_lossy(&body);
                parse_params(&body_text, request.parameters_mut());
            } else {
                request.set_payload(body);
            }
        }
    }

    if head.upgrade_requested {
        let Some(endpoint) = shared.endpoints.get(&url) else {
            return Err(HestiaError::NotFound.into());
        };
        if head.ws_key.is_empty() {
            return Err(
                HestiaError::Parse("websocket upgrade without Sec-WebSocket-Key".to_string())
                    .into(),
            );
        }
        if !endpoint.handler().on_opening(&request) {
            return Err(Failure {
                status: Some(403),
                challenge: None,
                error: HestiaError::Internal("websocket upgrade rejected by endpoint".to_string()),
            });
        }
        let compressed = head.ws_deflate && endpoint.compression_enabled();
        return Ok(Flow::Upgrade {
            endpoint: Arc::clone(endpoint),
            request,
            client_key: head.ws_key,
            compressed,
        });
    }

    let mut response = HttpResponse::new();
    response.set_content_type(mime_for_url(&url));

    let repository = match dispatch(&shared.repositories, &mut request, &mut response) {
        DispatchOutcome::Served { repository } => repository,
        DispatchOutcome::NotFound => return Err(HestiaError::NotFound.into()),
        DispatchOutcome::LoopDetected => {
            return Err(Failure {
                status: Some(508),
                challenge: None,
                error: HestiaError::Internal(format!("forward loop at {}", request.url())),
            });
        }
    };

    let status = response.status_code();
    let content = response.take_content();
    let (wire, gzip_encoded) = compress::negotiate(
        content,
        response.is_zipped(),
        head.client_gzip,
        response.content_type(),
    )
    .map_err(Failure::from)?;

    let head_bytes = serialize_head(&ResponseHead {
        status,
        reason: response.reason(),
        server_name: shared.config.server_name(),
        keep_alive: head.keep_alive,
        content_length: if status == 204 { 0 } else { wire.len() },
        content_type: response.content_type(),
        gzip_encoded,
        cookies: response.cookies(),
        cors: response.cors(),
        extra_headers: response.extra_headers(),
        auth_challenge: None,
    });
    write_with_timeout(reader, head_bytes.as_bytes(), timeout)
        .await
        .map_err(|err| Failure::from(HestiaError::Io(err)))?;
    if status != 204 && !wire.is_empty() {
        write_with_timeout(reader, &wire, timeout)
            .await
            .map_err(|err| Failure::from(HestiaError::Io(err)))?;
    }
    shared.repositories[repository].free_file(wire);

    tracing::debug!(
        peer = %peer,
        method = %request.method(),
        url = request.url(),
        status,
        "request served"
    );

    Ok(if head.keep_alive {
        Flow::KeepAlive
    } else {
        Flow::Close
    })
}

fn apply_header(head: &mut HeadState, name: &str, value: &str) -> Result<(), Failure> {
    match name.to_ascii_lowercase().as_str() {
        "authorization" => head.authorization = Some(value.to_string()),
        "connection" => {
            if value_has_token(value, "upgrade") {
                head.upgrade_requested = true;
            }
            if value_has_token(value, "close") {
                head.keep_alive = false;
            }
            if value_has_token(value, "keep-alive") {
                head.keep_alive = true;
            }
        }
        "accept-encoding" => {
            if value.to_ascii_lowercase().contains("gzip") {
                head.client_gzip = true;
            }
        }
        "content-type" => {
            head.content_type = value.to_string();
            let lowered = value.to_ascii_lowercase();
            if lowered.starts_with("application/x-www-form-urlencoded") {
                head.urlencoded_form = true;
            }
            if lowered.starts_with("multipart/form-data") {
                head.multipart_form = true;
            }
        }
        "content-length" => {
            let length = value.parse().map_err(|_| {
                Failure::from(HestiaError::Parse(format!("bad Content-Length: {value:?}")))
            })?;
            head.content_length = Some(length);
        }
        "cookie" => parse_cookies(value, &mut head.cookies),
        "origin" => head.origin = value.to_string(),
        "sec-websocket-key" => head.ws_key = value.to_string(),
        "sec-websocket-extensions" => {
            if value.to_ascii_lowercase().contains("permessage-deflate") {
                head.ws_deflate = true;
            }
        }
        "sec-websocket-version" => {}
        _ => {
            head.extra
                .insert(name.to_string(), value.trim_end().to_string());
        }
    }
    Ok(())
}

fn authorize(
    shared: &ServerShared,
    authorization: Option<&str>,
    url: &str,
    request: &mut HttpRequest,
) -> Result<(), Failure> {
    if let Some(bearer) = &shared.bearer_auth {
        let token = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim);
        match token {
            None => {
                return Err(Failure {
                    status: Some(401),
                    challenge: Some(bearer.challenge(None)),
                    error: HestiaError::AuthRequired,
                });
            }
            Some(token) => {
                if let Err(rejection) = bearer.verify(token, url) {
                    return Err(Failure {
                        status: Some(401),
                        challenge: Some(bearer.challenge(Some(rejection))),
                        error: HestiaError::AuthTokenInvalid { reason: rejection },
                    });
                }
            }
        }
    }

    if let Some(basic) = &shared.basic_auth {
        let username = authorization
            .and_then(|value| value.strip_prefix("Basic "))
            .and_then(|blob| basic.verify(blob.trim()));
        match username {
            Some(username) => request.set_username(username),
            None => return Err(HestiaError::AuthRequired.into()),
        }
    }
    Ok(())
}

/// Writes a server-generated error response with `Connection: close`.
async fn write_error_response<W>(
    writer: &mut W,
    shared: &ServerShared,
    status: u16,
    challenge: Option<&str>,
) where
    W: AsyncWrite + Unpin,
{
    let body = error_page(status);
    let cors = CorsPolicy::default();
    let head = serialize_head(&ResponseHead {
        status,
        reason: None,
        server_name: shared.config.server_name(),
        keep_alive: false,
        content_length: body.len(),
        content_type: "text/html",
        gzip_encoded: false,
        cookies: &[],
        cors: &cors,
        extra_headers: &[],
        auth_challenge: challenge,
    });
    let timeout = shared.config.socket_timeout();
    if write_with_timeout(writer, head.as_bytes(), timeout).await.is_ok() {
        let _ = write_with_timeout(writer, body.as_bytes(), timeout).await;
    }
}

/// Reads one CRLF-terminated line, capped at [`MAX_HEADER_LINE`].
///
/// Returns `Ok(None)` on EOF before any byte of the line. A line longer
/// than the cap fails with `ErrorKind::InvalidData`.
async fn read_line<R>(reader: &mut R, timeout: Duration) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line: Vec<u8> = Vec::new();
    loop {
        let available = tokio::time::timeout(timeout, reader.fill_buf())
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "socket read timed out")
            })??;
        if available.is_empty() {
            if line.is_empty() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed inside a header line",
            ));
        }
        match available.iter().position(|&byte| byte == b'\n') {
            Some(position) => {
                line.extend_from_slice(&available[..position]);
                reader.consume(position + 1);
                break;
            }
            None => {
                line.extend_from_slice(available);
                let taken = available.len();
                reader.consume(taken);
            }
        }
        if line.len() > MAX_HEADER_LINE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "header line too long",
            ));
        }
    }
    if line.len() > MAX_HEADER_LINE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "header line too long",
        ));
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

async fn read_exact_with_timeout<R>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Duration,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, reader.read_exact(buf))
        .await
        .map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, "socket read timed out")
        })??;
    Ok(())
}

async fn write_with_timeout<W>(
    writer: &mut W,
    data: &[u8],
    timeout: Duration,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, async {
        writer.write_all(data).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "socket write timed out"))?
}
