//! Built-in processing modules

pub mod core;
pub mod fastcgi;
pub mod static_file;

use crate::module::{Module, PipelineError};

/// Instantiate modules by name, in the given order
pub fn build(order: &[String]) -> Result<Vec<Box<dyn Module>>, PipelineError> {
    order
        .iter()
        .map(|name| -> Result<Box<dyn Module>, PipelineError> {
            match name.as_str() {
                self::core::MODULE_NAME => Ok(Box::new(self::core::CoreModule::new())),
                fastcgi::MODULE_NAME => Ok(Box::new(fastcgi::FastCgiModule::new())),
                static_file::MODULE_NAME => Ok(Box::new(static_file::StaticFileModule::new())),
                other => Err(PipelineError::UnknownModule(other.to_string())),
            }
        })
        .collect()
}
