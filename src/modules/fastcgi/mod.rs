//! FastCGI gateway module
//!
//! Proxies requests whose `SERVER_HANDLER` is `fastcgi` to an external
//! responder and translates its CGI output back into the HTTP response.

pub mod client;
pub mod environment;
mod error;
pub mod record;
pub mod response;

pub use client::{FastCgiClient, FastCgiConnection, FastCgiRequest, FastCgiResponse};
pub use environment::FastCgiEnvironment;
pub use error::GatewayError;
pub use response::{FieldValue, GatewayRawResponse};

use crate::config::Config;
use crate::context::{ModuleValue, ModuleVar, RequestContext, ServerVar};
use crate::http::{Request, Response, ResponseState};
use crate::logger;
use crate::module::{Module, ModuleError, ModuleHook};
use async_trait::async_trait;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use std::time::Duration;

pub const MODULE_NAME: &str = "fastcgi";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9010;

const X_POWERED_BY: &str = "x-powered-by";
const POWERED_BY: &str = "FastCgiModule";

/// Server vars passed through unconditionally, empty when unset
const PASS_THROUGH: &[ServerVar] = &[
    ServerVar::RequestMethod,
    ServerVar::ScriptFilename,
    ServerVar::QueryString,
    ServerVar::ScriptName,
    ServerVar::RequestUri,
    ServerVar::DocumentRoot,
    ServerVar::ServerProtocol,
    ServerVar::Https,
    ServerVar::ServerSoftware,
    ServerVar::RemoteAddr,
    ServerVar::RemotePort,
    ServerVar::ServerAddr,
    ServerVar::ServerPort,
    ServerVar::ServerName,
];

/// Server vars passed through only when set
const PASS_IF_SET: &[ServerVar] = &[
    ServerVar::RedirectStatus,
    ServerVar::RedirectUrl,
    ServerVar::RedirectUri,
    ServerVar::PathInfo,
];

#[derive(Debug, Clone)]
pub struct FastCgiModule {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Default for FastCgiModule {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(30),
        }
    }
}

impl FastCgiModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client for this request: configured backend unless the resolved file
    /// handler overrides host or port
    fn client(&self, context: &RequestContext) -> FastCgiClient {
        let mut host = self.host.clone();
        let mut port = self.port;

        if let Some(ModuleValue::FileHandler(vars)) =
            context.module_var(ModuleVar::VolatileFileHandlerVariables)
        {
            if let Some(h) = &vars.host {
                host.clone_from(h);
            }
            if let Some(p) = vars.port {
                port = p;
            }
        }
        FastCgiClient::new(host, port).with_timeout(self.timeout)
    }
}

/// Build the PARAMS environment for a request
pub fn prepare_environment(request: &Request, context: &RequestContext) -> FastCgiEnvironment {
    let mut env = FastCgiEnvironment::new();
    env.insert("GATEWAY_INTERFACE", "FastCGI/1.0");

    for var in PASS_THROUGH {
        env.insert(var.as_str(), context.server_var(*var).unwrap_or_default());
    }
    for var in PASS_IF_SET {
        if let Some(value) = context.server_var(*var) {
            env.insert(var.as_str(), value);
        }
    }

    if let Some(value) = request.header_joined(&CONTENT_TYPE, ", ") {
        env.insert("CONTENT_TYPE", value);
    }
    if let Some(value) = request.header(CONTENT_LENGTH) {
        env.insert("CONTENT_LENGTH", value);
    }

    for name in request.headers().keys() {
        if let Some(value) = request.header_joined(name, ", ") {
            let key = format!("HTTP_{}", name.as_str().to_ascii_uppercase().replace('-', "_"));
            env.insert(key, value);
        }
    }

    for (name, value) in context.env_vars() {
        env.insert(name.as_str(), value.as_str());
    }
    env
}

#[async_trait]
impl Module for FastCgiModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn init(&mut self, config: &Config) -> Result<(), ModuleError> {
        self.host.clone_from(&config.gateway.host);
        self.port = config.gateway.port;
        self.timeout = config.gateway_timeout();
        Ok(())
    }

    async fn process(
        &self,
        request: &mut Request,
        response: &mut Response,
        context: &mut RequestContext,
        hook: ModuleHook,
    ) -> Result<(), ModuleError> {
        if hook != ModuleHook::RequestPost
            || context.server_var(ServerVar::ServerHandler) != Some(MODULE_NAME)
        {
            return Ok(());
        }

        if !context.has_server_var(ServerVar::ScriptFilename) {
            return Err(ModuleError::not_found(format!(
                "No script resolved for {}",
                request.path()
            )));
        }

        let client = self.client(context);
        let env = prepare_environment(request, context);
        logger::log_debug(&format!(
            "[FastCGI] {} {} -> {}:{} ({} params)",
            request.method(),
            request.uri(),
            client.host(),
            client.port(),
            env.len()
        ));

        let output = client.execute(env, request.body().clone()).await?;
        if !output.errors.is_empty() {
            logger::log_warning(&format!(
                "[FastCGI] {}: {}",
                context.server_var(ServerVar::ScriptFilename).unwrap_or_default(),
                String::from_utf8_lossy(&output.errors).trim()
            ));
        }

        let raw = GatewayRawResponse::parse(&output.content)?;
        raw.apply_to(response)?;
        response.insert_header(
            HeaderName::from_static(X_POWERED_BY),
            HeaderValue::from_static(POWERED_BY),
        );
        response.set_state(ResponseState::Dispatched);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FileHandlerVariables;
    use hyper::header::{COOKIE, USER_AGENT};
    use hyper::{Method, StatusCode};
    use std::collections::HashMap;

    fn context() -> RequestContext {
        let mut defaults = HashMap::new();
        defaults.insert(ServerVar::ServerSoftware, "test/1.0".to_string());
        let mut ctx = RequestContext::new(defaults);
        ctx.set_server_var(ServerVar::ServerHandler, MODULE_NAME);
        ctx
    }

    #[test]
    fn test_environment() {
        let mut request = Request::new(Method::POST, "/index.php?a=1", "HTTP/1.1");
        let headers = request.headers_mut();
        headers.append(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.append(CONTENT_LENGTH, HeaderValue::from_static("3"));
        headers.append(USER_AGENT, HeaderValue::from_static("curl"));
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("b=2"));
        headers.append(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("10.0.0.9"),
        );

        let mut ctx = context();
        ctx.set_server_var(ServerVar::ScriptFilename, "/var/www/index.php");
        ctx.set_server_var(ServerVar::PathInfo, "/extra");
        ctx.set_env_var("APP_ENV", "dev");
        ctx.set_env_var("SERVER_SOFTWARE", "override/2.0");

        let env = prepare_environment(&request, &ctx);
        assert_eq!(env.get("GATEWAY_INTERFACE"), Some("FastCGI/1.0"));
        assert_eq!(env.get("SCRIPT_FILENAME"), Some("/var/www/index.php"));
        assert_eq!(env.get("PATH_INFO"), Some("/extra"));
        assert_eq!(env.get("REMOTE_ADDR"), Some(""));
        assert!(!env.contains("REDIRECT_STATUS"));
        assert_eq!(env.get("CONTENT_TYPE"), Some("text/plain"));
        assert_eq!(env.get("CONTENT_LENGTH"), Some("3"));
        assert_eq!(env.get("HTTP_USER_AGENT"), Some("curl"));
        assert_eq!(env.get("HTTP_COOKIE"), Some("a=1, b=2"));
        assert_eq!(env.get("HTTP_X_FORWARDED_FOR"), Some("10.0.0.9"));
        assert_eq!(env.get("APP_ENV"), Some("dev"));
        assert_eq!(env.get("SERVER_SOFTWARE"), Some("override/2.0"));
    }

    #[test]
    fn test_environment_keeps_non_ascii_headers() {
        let mut request = Request::new(Method::POST, "/upload.php", "HTTP/1.1");
        let headers = request.headers_mut();
        headers.append(
            HeaderName::from_static("x-filename"),
            HeaderValue::from_bytes("résumé.pdf".as_bytes()).unwrap(),
        );
        headers.append(COOKIE, HeaderValue::from_bytes("name=Zoë".as_bytes()).unwrap());

        let env = prepare_environment(&request, &context());
        assert_eq!(env.get("HTTP_X_FILENAME"), Some("résumé.pdf"));
        assert_eq!(env.get("HTTP_COOKIE"), Some("name=Zoë"));
    }

    #[test]
    fn test_handler_override() {
        let module = FastCgiModule::new();
        let mut ctx = context();
        assert_eq!(module.client(&ctx).port(), DEFAULT_PORT);

        ctx.set_module_var(
            ModuleVar::VolatileFileHandlerVariables,
            ModuleValue::FileHandler(FileHandlerVariables {
                host: Some("10.1.1.1".to_string()),
                port: Some(9999),
            }),
        );
        let client = module.client(&ctx);
        assert_eq!(client.host(), "10.1.1.1");
        assert_eq!(client.port(), 9999);
    }

    #[tokio::test]
    async fn test_missing_script_is_404() {
        let module = FastCgiModule::new();
        let mut request = Request::default();
        let mut response = Response::default();
        let mut ctx = context();

        let err = module
            .process(&mut request, &mut response, &mut ctx, ModuleHook::RequestPost)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(!response.is_dispatched());
    }

    #[tokio::test]
    async fn test_ignores_other_handlers_and_hooks() {
        let module = FastCgiModule::new();
        let mut request = Request::default();
        let mut response = Response::default();
        let mut ctx = context();

        module
            .process(&mut request, &mut response, &mut ctx, ModuleHook::RequestPre)
            .await
            .unwrap();

        ctx.set_server_var(ServerVar::ServerHandler, "static");
        module
            .process(&mut request, &mut response, &mut ctx, ModuleHook::RequestPost)
            .await
            .unwrap();
        assert!(!response.is_dispatched());
    }
}
