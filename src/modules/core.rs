//! Core handler resolution
//!
//! Maps the request path onto a file under the document root and picks the
//! module that will serve it. Never dispatches.

use crate::config::{Config, FileHandlerConfig};
use crate::context::{FileHandlerVariables, ModuleValue, ModuleVar, RequestContext, ServerVar};
use crate::http::{Request, Response};
use crate::module::{Module, ModuleError, ModuleHook};
use async_trait::async_trait;
use hyper::StatusCode;
use std::path::{Component, Path, PathBuf};
use url::Url;

pub const MODULE_NAME: &str = "core";
pub const DEFAULT_HANDLER: &str = "static";

/// Result of mapping a request path under a root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Existing file on disk
    pub script_filename: PathBuf,
    /// URL path of the file, e.g. `/blog/index.php`
    pub script_name: String,
    /// Trailing path after the script, e.g. `/2024/post`
    pub path_info: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CoreModule {
    document_root: String,
    index_files: Vec<String>,
    handlers: Vec<FileHandlerConfig>,
}

impl CoreModule {
    pub fn new() -> Self {
        Self::default()
    }

    fn handler_for(&self, path: &Path) -> Option<&FileHandlerConfig> {
        let ext = path.extension()?.to_str()?;
        self.handlers.iter().find(|h| {
            h.extension
                .trim_start_matches('.')
                .eq_ignore_ascii_case(ext)
        })
    }
}

/// Decoded, dot-normalized segments of a URL path
fn path_segments(path: &str) -> Option<Vec<String>> {
    let base = Url::parse("file:///").ok()?;
    let file = base.join(path).ok()?.to_file_path().ok()?;
    Some(
        file.components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect(),
    )
}

fn url_path(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

/// Find the file a request path refers to.
///
/// Tries the full path, then index files for directories, then the longest
/// existing file prefix with the remainder as `PATH_INFO`. Files that resolve
/// outside `root` (e.g. through symlinks) are refused.
pub async fn resolve(
    root: &Path,
    request_path: &str,
    index_files: &[String],
) -> Result<Option<Resolved>, ModuleError> {
    let Some(segments) = path_segments(request_path) else {
        return Ok(None);
    };

    let full = root.join(segments.iter().collect::<PathBuf>());
    let mut found = None;

    if is_file(&full).await {
        found = Some((full, url_path(&segments), None));
    } else if is_dir(&full).await {
        for index in index_files {
            let candidate = full.join(index);
            if is_file(&candidate).await {
                let mut name = segments.clone();
                name.push(index.clone());
                found = Some((candidate, url_path(&name), None));
                break;
            }
        }
    } else {
        for split in (1..segments.len()).rev() {
            let candidate = root.join(segments[..split].iter().collect::<PathBuf>());
            if is_file(&candidate).await {
                found = Some((
                    candidate,
                    url_path(&segments[..split]),
                    Some(url_path(&segments[split..])),
                ));
                break;
            }
        }
    }

    let Some((script_filename, script_name, path_info)) = found else {
        return Ok(None);
    };

    let outside = match (
        tokio::fs::canonicalize(root).await,
        tokio::fs::canonicalize(&script_filename).await,
    ) {
        (Ok(root), Ok(file)) => !file.starts_with(root),
        _ => true,
    };
    if outside {
        return Err(ModuleError::new(
            StatusCode::FORBIDDEN,
            format!("Access to {request_path} is forbidden"),
        ));
    }

    Ok(Some(Resolved {
        script_filename,
        script_name,
        path_info,
    }))
}

#[async_trait]
impl Module for CoreModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn init(&mut self, config: &Config) -> Result<(), ModuleError> {
        self.document_root.clone_from(&config.server.document_root);
        self.index_files.clone_from(&config.server.index_files);
        self.handlers.clone_from(&config.handlers);
        Ok(())
    }

    async fn process(
        &self,
        request: &mut Request,
        _response: &mut Response,
        context: &mut RequestContext,
        hook: ModuleHook,
    ) -> Result<(), ModuleError> {
        if hook != ModuleHook::RequestPost {
            return Ok(());
        }

        let root = PathBuf::from(
            context
                .server_var(ServerVar::DocumentRoot)
                .unwrap_or(self.document_root.as_str()),
        );
        let resolved = resolve(&root, request.path(), &self.index_files).await?;

        let handler_path = match &resolved {
            Some(resolved) => {
                context.set_server_var(
                    ServerVar::ScriptFilename,
                    resolved.script_filename.to_string_lossy(),
                );
                context.set_server_var(ServerVar::ScriptName, resolved.script_name.as_str());
                context.set_server_var_opt(ServerVar::PathInfo, resolved.path_info.clone());
                resolved.script_filename.clone()
            }
            None => PathBuf::from(request.path()),
        };

        if !context.has_server_var(ServerVar::ServerHandler) {
            match self.handler_for(&handler_path) {
                Some(handler) => {
                    context.set_server_var(ServerVar::ServerHandler, handler.name.as_str());
                    if handler.host.is_some() || handler.port.is_some() {
                        context.set_module_var(
                            ModuleVar::VolatileFileHandlerVariables,
                            ModuleValue::FileHandler(FileHandlerVariables {
                                host: handler.host.clone(),
                                port: handler.port,
                            }),
                        );
                    }
                }
                None => context.set_server_var(ServerVar::ServerHandler, DEFAULT_HANDLER),
            }
        }
        Ok(())
    }
}
