//! Static file serving module
//!
//! Serves the file resolved into `SCRIPT_FILENAME` when `SERVER_HANDLER` is
//! `static`.

use crate::context::{RequestContext, ServerVar};
use crate::http::{mime, Request, Response, ResponseState};
use crate::logger;
use crate::module::{Module, ModuleError, ModuleHook};
use async_trait::async_trait;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, StatusCode};
use std::path::Path;
use tokio::fs;

pub const MODULE_NAME: &str = "static";

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFileModule;

impl StaticFileModule {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Module for StaticFileModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn dependencies(&self) -> &[&'static str] {
        &["core"]
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

        if request.method() != Method::GET && request.method() != Method::HEAD {
            response.insert_header(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return Err(ModuleError::new(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method {} is not allowed for {}", request.method(), request.path()),
            ));
        }

        let Some(filename) = context.server_var(ServerVar::ScriptFilename) else {
            return Err(ModuleError::not_found(format!(
                "The requested URL {} was not found on this server",
                request.path()
            )));
        };
        let path = Path::new(filename);

        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModuleError::not_found(format!(
                    "The requested URL {} was not found on this server",
                    request.path()
                )));
            }
            Err(e) => {
                logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
                return Err(ModuleError::new(
                    StatusCode::FORBIDDEN,
                    format!("Access to {} is forbidden", request.path()),
                ));
            }
        };

        response.set_status(StatusCode::OK);
        response.insert_header(
            CONTENT_TYPE,
            HeaderValue::from_static(mime::content_type_for(path)),
        );
        response.append_body(&content);
        response.set_state(ResponseState::Dispatched);
        Ok(())
    }
}
