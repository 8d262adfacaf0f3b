// Server context module
// Immutable state shared by every connection task

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::types::Config;
use crate::connection::{FlushedHeaders, Worker};
use crate::context::ServerVar;
use crate::logger::{AccessLogger, WriterAccessLog};
use crate::module::{ModulePipeline, PipelineError};
use crate::modules;

/// Everything a connection handler needs besides its stream
#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<Config>,
    pub pipeline: ModulePipeline,
    pub access_logger: Option<Arc<dyn AccessLogger>>,
    pub worker: Option<Arc<dyn Worker>>,
    pub flushed_headers: Option<Arc<dyn FlushedHeaders>>,
    default_headers: Vec<(String, String)>,
}

impl ServerContext {
    /// Wrap an already built pipeline. The access log goes to the global
    /// writer when `logging.access_log` is on.
    pub fn new(config: Config, pipeline: ModulePipeline) -> Self {
        let access_logger: Option<Arc<dyn AccessLogger>> = if config.logging.access_log {
            Some(Arc::new(WriterAccessLog))
        } else {
            None
        };
        Self {
            default_headers: config.default_headers(),
            config: Arc::new(config),
            pipeline,
            access_logger,
            worker: None,
            flushed_headers: None,
        }
    }

    /// Build the pipeline named by `modules.order`
    pub fn from_config(config: Config) -> Result<Self, PipelineError> {
        let modules = modules::build(&config.modules.order)?;
        let pipeline = ModulePipeline::new(modules, &config)?;
        Ok(Self::new(config, pipeline))
    }

    #[must_use]
    pub fn with_access_logger(mut self, logger: Option<Arc<dyn AccessLogger>>) -> Self {
        self.access_logger = logger;
        self
    }

    #[must_use]
    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = Some(worker);
        self
    }

    #[must_use]
    pub fn with_flushed_headers(mut self, headers: Arc<dyn FlushedHeaders>) -> Self {
        self.flushed_headers = Some(headers);
        self
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    /// Server-level values every request starts from. Address and port come
    /// from the accepting socket when known.
    pub fn server_vars(&self, local_addr: Option<SocketAddr>) -> HashMap<ServerVar, String> {
        let server = &self.config.server;
        let mut vars = HashMap::new();

        vars.insert(ServerVar::ServerSoftware, server.software.clone());
        vars.insert(
            ServerVar::ServerAddr,
            local_addr.map_or_else(|| server.host.clone(), |a| a.ip().to_string()),
        );
        vars.insert(
            ServerVar::ServerPort,
            local_addr.map_or(server.port, |a| a.port()).to_string(),
        );
        vars.insert(ServerVar::DocumentRoot, server.document_root.clone());
        vars.insert(ServerVar::ServerSignature, server.signature.clone());
        vars.insert(ServerVar::ServerAdmin, server.admin.clone());
        vars.insert(ServerVar::Https, "off".to_string());
        if let Some(template) = &server.errors_page_template {
            vars.insert(ServerVar::ServerErrorsPageTemplatePath, template.clone());
        }
        vars
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("pipeline", &self.pipeline)
            .field("access_log", &self.access_logger.is_some())
            .field("worker", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}
