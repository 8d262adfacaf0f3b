//! Per-connection request loop
//!
//! Reads requests off one client connection, drives the module pipeline for
//! each and writes the responses back, reusing the connection while
//! keep-alive holds.

use super::error_page;
use super::keep_alive::KeepAlive;
use super::shutdown::{self, FatalError};
use crate::config::ServerContext;
use crate::context::{RequestContext, ServerVar};
use crate::http::body::{self, BodyKind};
use crate::http::parser::{self, ParseError};
use crate::http::{Request, Response, ResponseState};
use crate::logger::{self, AccessLogEntry};
use crate::module::{ModuleError, ModuleHook};
use crate::transport::{Connection, TransportError};
use futures_util::FutureExt;
use hyper::header::{
    HeaderName, HeaderValue, ACCEPT, ACCEPT_CHARSET, ACCEPT_ENCODING, ACCEPT_LANGUAGE,
    CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, FORWARDED, HOST, REFERER,
    TRANSFER_ENCODING, USER_AGENT,
};
use hyper::StatusCode;
use std::borrow::Cow;
use std::panic::AssertUnwindSafe;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

const KEEP_ALIVE: &str = "keep-alive";

/// Everything that can end a request cycle early
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ParseError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error("Response state is not dispatched")]
    NotDispatched,
}

impl HandlerError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Transport(_) | Self::NotDispatched => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Protocol(err) => err.status(),
            Self::Module(err) => err.status,
        }
    }
}

/// State of one request/response cycle
struct Cycle {
    request: Request,
    response: Response,
    started: Instant,
    keep_alive: bool,
    /// Body announced but not read off the stream
    body_pending: bool,
}

impl Cycle {
    fn new(default_headers: &[(String, String)]) -> Self {
        Self {
            request: Request::default(),
            response: Response::with_default_headers(default_headers),
            started: Instant::now(),
            keep_alive: false,
            body_pending: false,
        }
    }
}

/// Serves the requests of one client connection
pub struct ConnectionHandler {
    server: ServerContext,
    /// Fatal path already taken for this handler
    shutdown_done: bool,
}

impl ConnectionHandler {
    pub const fn new(server: ServerContext) -> Self {
        Self {
            server,
            shutdown_done: false,
        }
    }

    /// Run the request loop until the peer leaves, keep-alive ends or a fatal
    /// error occurs. The connection is closed on return.
    pub async fn handle<S>(&mut self, connection: &mut Connection<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let config = &self.server.config;
        let mut context = RequestContext::new(self.server.server_vars(connection.local_addr()));
        context.set_server_var(ServerVar::RemoteAddr, connection.address().to_string());
        context.set_server_var(ServerVar::RemotePort, connection.port().to_string());

        let mut keep_alive = KeepAlive::new(
            config.performance.keep_alive_max,
            config.keep_alive_timeout(),
        );
        let mut reused = false;

        loop {
            let mut cycle = Cycle::new(self.server.default_headers());
            context.set_server_var(ServerVar::RequestTime, unix_time());

            let outcome = AssertUnwindSafe(self.run_cycle(
                connection,
                &mut context,
                &mut cycle,
                &mut keep_alive,
                reused,
            ))
            .catch_unwind()
            .await;

            match outcome {
                Ok(true) => {
                    context.init_vars();
                    reused = true;
                }
                Ok(false) => break,
                Err(payload) => {
                    let fatal = FatalError::from_panic(payload.as_ref());
                    self.shutdown(connection, &mut context, &mut cycle, &fatal).await;
                    return;
                }
            }
        }
        connection.close().await;
    }

    /// One request cycle; `true` when the connection stays open for another
    async fn run_cycle<S>(
        &self,
        connection: &mut Connection<S>,
        context: &mut RequestContext,
        cycle: &mut Cycle,
        keep_alive: &mut KeepAlive,
        reused: bool,
    ) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self.process_request(connection, context, cycle, keep_alive, reused).await {
            Ok(()) => {}
            Err(HandlerError::Transport(err)) => {
                logger::log_debug(&format!(
                    "[Connection] {} closed: {err}",
                    connection.peer_addr()
                ));
                return false;
            }
            Err(err) => self.render_error(&err, context, cycle).await,
        }

        cycle.response.prepare_headers();

        if let Err(err) = self
            .server
            .pipeline
            .process(
                ModuleHook::ResponsePost,
                &mut cycle.request,
                &mut cycle.response,
                context,
            )
            .await
        {
            logger::log_warning(&format!(
                "{} failed: {err}",
                ModuleHook::ResponsePost.as_str()
            ));
        }

        if let Err(err) = send_response(connection, &cycle.request, &cycle.response).await {
            logger::log_debug(&format!(
                "[Connection] {} write failed: {err}",
                connection.peer_addr()
            ));
            return false;
        }

        self.log_access(connection, cycle);
        cycle.keep_alive
    }

    async fn process_request<S>(
        &self,
        connection: &mut Connection<S>,
        context: &mut RequestContext,
        cycle: &mut Cycle,
        keep_alive: &mut KeepAlive,
        reused: bool,
    ) -> Result<(), HandlerError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let config = &self.server.config;
        let read_timeout = config.read_timeout();
        let max_line = config.http.max_line_length;

        // Idle time between requests is bounded by the keep-alive timeout
        let first_timeout = if reused {
            config.keep_alive_timeout()
        } else {
            read_timeout
        };
        let mut line = connection.read_line(Some(max_line), first_timeout).await?;
        if parser::is_blank_line(&line) {
            line = connection.read_line(Some(max_line), read_timeout).await?;
        }
        cycle.request = parser::parse_start_line(&line, max_line)?;

        let raw_headers = read_header_block(connection, config.http.max_header_size, read_timeout).await?;
        parser::parse_headers(&raw_headers, &mut cycle.request)?;

        if let Some(value) =
            keep_alive.negotiate(cycle.request.header(CONNECTION).as_deref(), cycle.started.elapsed())
        {
            cycle.keep_alive = true;
            cycle
                .response
                .insert_header(CONNECTION, HeaderValue::from_static(KEEP_ALIVE));
            if let Ok(value) = HeaderValue::from_str(&value) {
                cycle
                    .response
                    .insert_header(HeaderName::from_static(KEEP_ALIVE), value);
            }
        }

        self.read_body(connection, cycle).await?;
        init_server_vars(&cycle.request, context);

        let pipeline = &self.server.pipeline;
        for hook in [ModuleHook::RequestPre, ModuleHook::RequestPost] {
            pipeline
                .process(hook, &mut cycle.request, &mut cycle.response, context)
                .await?;
        }
        if !cycle.response.is_dispatched() {
            return Err(HandlerError::NotDispatched);
        }
        pipeline
            .process(
                ModuleHook::ResponsePre,
                &mut cycle.request,
                &mut cycle.response,
                context,
            )
            .await?;
        Ok(())
    }

    /// Read `Content-Length` bytes and attach query and body parameters
    async fn read_body<S>(
        &self,
        connection: &mut Connection<S>,
        cycle: &mut Cycle,
    ) -> Result<(), HandlerError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request = &mut cycle.request;
        let query = body::parse_query(request.query_string().as_bytes());
        request.add_params(query);

        if request.has_header(TRANSFER_ENCODING) {
            cycle.body_pending = true;
            return Err(ParseError::UnsupportedTransferEncoding.into());
        }

        let Some(raw_length) = request.header(CONTENT_LENGTH).map(Cow::into_owned) else {
            return Ok(());
        };
        cycle.body_pending = true;
        let length: u64 = raw_length
            .trim()
            .parse()
            .map_err(|_| ParseError::BadContentLength(raw_length.clone()))?;
        let max = self.server.config.http.max_body_size;
        if length > max {
            return Err(ParseError::BodyTooLarge { size: length, max }.into());
        }
        if length == 0 {
            cycle.body_pending = false;
            return Ok(());
        }
        let length = usize::try_from(length).map_err(|_| ParseError::BodyTooLarge { size: length, max })?;

        let data = connection
            .read_exact(length, self.server.config.read_timeout())
            .await?;
        cycle.body_pending = false;

        match BodyKind::from_content_type(request.header(CONTENT_TYPE).as_deref()) {
            BodyKind::UrlEncoded => request.add_params(body::parse_query(&data)),
            BodyKind::Multipart { boundary } => {
                let parts = body::parse_multipart(&data, &boundary);
                request.add_params(body::multipart_params(&parts));
                request.add_parts(parts);
            }
            BodyKind::Opaque => {}
        }
        request.set_body(data);
        Ok(())
    }

    /// Turn a cycle failure into an error response
    async fn render_error(&self, err: &HandlerError, context: &RequestContext, cycle: &mut Cycle) {
        let status = err.status();
        if status.is_server_error() {
            logger::log_error(&format!(
                "{} {} -> {}: {err}",
                cycle.request.method(),
                cycle.request.uri(),
                status.as_u16()
            ));
        } else {
            logger::log_debug(&format!(
                "{} {} -> {}: {err}",
                cycle.request.method(),
                cycle.request.uri(),
                status.as_u16()
            ));
        }

        let response = &mut cycle.response;
        response.set_status(status);
        response.set_state(ResponseState::Dispatched);
        error_page::render(response, &err.to_string(), context).await;

        // Stream position is unknown once a body was left unread
        if cycle.body_pending {
            cycle.keep_alive = false;
            response.insert_header(CONNECTION, HeaderValue::from_static("close"));
            response.remove_header(KEEP_ALIVE);
        }
    }

    fn log_access<S>(&self, connection: &Connection<S>, cycle: &Cycle)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let Some(access_log) = &self.server.access_logger else {
            return;
        };
        let request = &cycle.request;
        let response = &cycle.response;

        let mut entry = AccessLogEntry::new(
            connection.address().to_string(),
            request.method().as_str(),
            request.uri(),
        );
        entry.version = request.version().to_string();
        entry.status = response.status().as_u16();
        entry.content_length = response.header(CONTENT_LENGTH).map(str::to_string);
        entry.referer = request.header(REFERER).map(Cow::into_owned);
        entry.user_agent = request.header(USER_AGENT).map(Cow::into_owned);
        entry.request_time_us = u64::try_from(cycle.started.elapsed().as_micros()).unwrap_or(u64::MAX);

        access_log.info(&entry.format(&self.server.config.logging.access_log_format));
    }

    /// Fatal path: give the handling module a chance to answer, else send a
    /// 500 with the captured error. Runs at most once per handler.
    async fn shutdown<S>(
        &mut self,
        connection: &mut Connection<S>,
        context: &mut RequestContext,
        cycle: &mut Cycle,
        fatal: &FatalError,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if self.shutdown_done {
            return;
        }
        self.shutdown_done = true;
        logger::log_error(&format!(
            "{} {} from {}: {fatal}",
            cycle.request.method(),
            cycle.request.uri(),
            connection.peer_addr()
        ));

        if !connection.is_closed() {
            let module = context
                .server_var(ServerVar::ServerHandler)
                .and_then(|name| self.server.pipeline.get(name));
            if let Some(module) = module {
                let result = AssertUnwindSafe(module.process(
                    &mut cycle.request,
                    &mut cycle.response,
                    context,
                    ModuleHook::Shutdown,
                ))
                .catch_unwind()
                .await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => logger::log_warning(&format!(
                        "{} hook of '{}' failed: {err}",
                        ModuleHook::Shutdown.as_str(),
                        module.name()
                    )),
                    Err(_) => logger::log_error(&format!(
                        "{} hook of '{}' panicked",
                        ModuleHook::Shutdown.as_str(),
                        module.name()
                    )),
                }
            }

            let response = &mut cycle.response;
            if !response.is_dispatched() {
                response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                shutdown::apply_anti_cache_headers(response);
                error_page::render(response, &fatal.message, context).await;
                if let Some(flushed) = &self.server.flushed_headers {
                    shutdown::apply_flushed_headers(response, &flushed.flushed_headers());
                }
            }
            // The connection is not reused after a fatal error
            response.insert_header(CONNECTION, HeaderValue::from_static("close"));
            response.remove_header(KEEP_ALIVE);
            response.prepare_headers();

            if let Err(err) = send_response(connection, &cycle.request, response).await {
                logger::log_debug(&format!("Failed to send fatal error response: {err}"));
            }
            connection.close().await;
        }

        if let Some(worker) = &self.server.worker {
            worker.shutdown();
        }
    }
}

/// Read header lines up to the blank line; the block may not exceed `max_size`
async fn read_header_block<S>(
    connection: &mut Connection<S>,
    max_size: usize,
    timeout: std::time::Duration,
) -> Result<Vec<u8>, HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut raw = Vec::new();
    loop {
        let remaining = max_size.saturating_sub(raw.len());
        if remaining == 0 {
            return Err(ParseError::HeadersTooLarge(max_size).into());
        }
        let line = connection.read_line(Some(remaining), timeout).await?;
        if !line.ends_with(b"\n") {
            return Err(ParseError::HeadersTooLarge(max_size).into());
        }
        if parser::is_blank_line(&line) {
            return Ok(raw);
        }
        raw.extend_from_slice(&line);
    }
}

/// Status line, header block, then the body unless the request or status
/// forbids one
async fn send_response<S>(
    connection: &mut Connection<S>,
    request: &Request,
    response: &Response,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut head = response.status_line();
    head.push_str(&response.header_string());
    connection.write(head.as_bytes()).await?;
    if !request.is_head() && response.allows_body() {
        connection.copy_stream(response.body()).await?;
    }
    connection.flush().await
}

/// Request-derived server vars, set before the request phases run
fn init_server_vars(request: &Request, context: &mut RequestContext) {
    context.set_server_var(ServerVar::ServerProtocol, "HTTP/1.1");
    context.set_server_var_opt(ServerVar::ServerName, request.header(HOST).as_deref().map(server_name));
    context.set_server_var(ServerVar::RequestMethod, request.method().as_str());
    context.set_server_var(ServerVar::QueryString, request.query_string());
    context.set_server_var(ServerVar::RequestUri, request.uri());
    context.set_server_var(ServerVar::XRequestUri, request.uri());

    let http_vars = [
        (ServerVar::HttpUserAgent, USER_AGENT),
        (ServerVar::HttpReferer, REFERER),
        (ServerVar::HttpHost, HOST),
        (ServerVar::HttpXRequestedWith, HeaderName::from_static("x-requested-with")),
        (ServerVar::HttpAccept, ACCEPT),
        (ServerVar::HttpAcceptCharset, ACCEPT_CHARSET),
        (ServerVar::HttpAcceptEncoding, ACCEPT_ENCODING),
        (ServerVar::HttpAcceptLanguage, ACCEPT_LANGUAGE),
        (ServerVar::HttpConnection, CONNECTION),
        (ServerVar::HttpForwarded, FORWARDED),
        (ServerVar::HttpProxyConnection, HeaderName::from_static("proxy-connection")),
    ];
    for (var, name) in &http_vars {
        context.set_server_var_opt(*var, request.header_joined(name, ", "));
    }
    context.set_server_var_opt(ServerVar::HttpCookie, request.header_joined(&COOKIE, "; "));
}

/// Host header without port and trailing dots
fn server_name(host: &str) -> String {
    let host = host.trim();
    let name = if host.starts_with('[') {
        host.find(']').map_or(host, |end| &host[..=end])
    } else {
        host.rsplit_once(':').map_or(host, |(name, _)| name)
    };
    name.trim_end_matches('.').to_string()
}

fn unix_time() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;

    #[test]
    fn test_server_name() {
        assert_eq!(server_name("example.com"), "example.com");
        assert_eq!(server_name("example.com.:8080"), "example.com");
        assert_eq!(server_name("[::1]:8080"), "[::1]");
        assert_eq!(server_name("localhost"), "localhost");
    }

    #[test]
    fn test_init_server_vars() {
        let mut request = Request::new(Method::GET, "/a.php?x=1", "HTTP/1.0");
        let headers = request.headers_mut();
        headers.append(HOST, HeaderValue::from_static("site.test:8080"));
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("b=2"));
        headers.append(USER_AGENT, HeaderValue::from_static("curl/8"));

        let mut context = RequestContext::default();
        init_server_vars(&request, &mut context);

        assert_eq!(context.server_var(ServerVar::ServerProtocol), Some("HTTP/1.1"));
        assert_eq!(context.server_var(ServerVar::ServerName), Some("site.test"));
        assert_eq!(context.server_var(ServerVar::RequestMethod), Some("GET"));
        assert_eq!(context.server_var(ServerVar::QueryString), Some("x=1"));
        assert_eq!(context.server_var(ServerVar::RequestUri), Some("/a.php?x=1"));
        assert_eq!(context.server_var(ServerVar::XRequestUri), Some("/a.php?x=1"));
        assert_eq!(context.server_var(ServerVar::HttpCookie), Some("a=1; b=2"));
        assert_eq!(context.server_var(ServerVar::HttpUserAgent), Some("curl/8"));
        assert_eq!(context.server_var(ServerVar::HttpHost), Some("site.test:8080"));
        assert!(!context.has_server_var(ServerVar::HttpReferer));
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            HandlerError::NotDispatched.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HandlerError::from(ParseError::HeadersTooLarge(10)).status(),
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
        );
        assert_eq!(
            HandlerError::from(ModuleError::not_found("x")).status(),
            StatusCode::NOT_FOUND
        );
    }
}
