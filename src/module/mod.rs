//! Module contract
//!
//! Every processing module (core resolution, static files, the FastCGI gateway)
//! implements [`Module`] and is driven by the connection handler through the
//! [`ModulePipeline`] at fixed phases of a request cycle.

mod pipeline;

pub use pipeline::{ModulePipeline, PipelineError};

use crate::config::Config;
use crate::context::RequestContext;
use crate::http::{Request, Response};
use async_trait::async_trait;
use hyper::StatusCode;
use thiserror::Error;

/// Phases at which modules are invoked, in cycle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleHook {
    RequestPre,
    RequestPost,
    ResponsePre,
    ResponsePost,
    /// Only reachable from the fatal path
    Shutdown,
}

impl ModuleHook {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestPre => "REQUEST_PRE",
            Self::RequestPost => "REQUEST_POST",
            Self::ResponsePre => "RESPONSE_PRE",
            Self::ResponsePost => "RESPONSE_POST",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

/// Failure raised by a module, rendered to the client with `status`
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ModuleError {
    pub status: StatusCode,
    pub message: String,
}

impl ModuleError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// A processing module.
///
/// `process` takes `&self`: instances are shared by every connection task, so
/// per-call working state belongs in locals or in the [`RequestContext`].
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique module name, matched against `SERVER_HANDLER`
    fn name(&self) -> &str;

    /// Names of modules this one expects to run before it. Advisory only.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// Read configuration. Called once when the pipeline is built.
    fn init(&mut self, _config: &Config) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Final setup after every module was initialized
    fn prepare(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Run the module for one phase; modules ignore phases they do not handle
    async fn process(
        &self,
        request: &mut Request,
        response: &mut Response,
        context: &mut RequestContext,
        hook: ModuleHook,
    ) -> Result<(), ModuleError>;
}
