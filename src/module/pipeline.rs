use super::{Module, ModuleError, ModuleHook};
use crate::config::Config;
use crate::context::RequestContext;
use crate::http::{Request, Response};
use crate::logger;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown module '{0}'")]
    UnknownModule(String),
    #[error("module '{0}' is registered twice")]
    DuplicateModule(String),
    #[error("module '{name}' failed to initialize: {source}")]
    Init {
        name: String,
        #[source]
        source: ModuleError,
    },
}

/// Ordered, immutable set of modules shared by all connections
#[derive(Clone, Default)]
pub struct ModulePipeline {
    modules: Vec<Arc<dyn Module>>,
}

impl ModulePipeline {
    /// Initialize and prepare every module in the given order
    pub fn new(mut modules: Vec<Box<dyn Module>>, config: &Config) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for module in &modules {
            if !seen.insert(module.name().to_string()) {
                return Err(PipelineError::DuplicateModule(module.name().to_string()));
            }
        }

        for module in &mut modules {
            module.init(config).map_err(|source| PipelineError::Init {
                name: module.name().to_string(),
                source,
            })?;
        }
        for module in &mut modules {
            module.prepare().map_err(|source| PipelineError::Init {
                name: module.name().to_string(),
                source,
            })?;
        }

        for module in &modules {
            for dep in module.dependencies() {
                if !seen.contains(*dep) {
                    logger::log_warning(&format!(
                        "Module '{}' expects '{dep}' which is not loaded",
                        module.name()
                    ));
                }
            }
        }

        Ok(Self {
            modules: modules.into_iter().map(Arc::from).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.iter().find(|m| m.name() == name).cloned()
    }

    /// Run one phase across the pipeline.
    ///
    /// In `RequestPost` the walk stops as soon as the response is dispatched;
    /// every other phase visits all modules. The first error aborts the phase.
    pub async fn process(
        &self,
        hook: ModuleHook,
        request: &mut Request,
        response: &mut Response,
        context: &mut RequestContext,
    ) -> Result<(), ModuleError> {
        for module in &self.modules {
            if hook == ModuleHook::RequestPost && response.is_dispatched() {
                break;
            }
            module.process(request, response, context, hook).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModulePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModulePipeline")
            .field("modules", &self.names())
            .finish()
    }
}
