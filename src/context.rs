//! Request context
//!
//! Mutable state shared by the connection handler and the modules for one
//! connection: server variables, environment variables and module variables.
//! Server variables use a closed key set ([`ServerVar`]); environment variables
//! stay an open map since their names come from configuration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

macro_rules! server_vars {
    ($($variant:ident => $name:literal,)+) => {
        /// Server variable names
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ServerVar {
            $($variant,)+
        }

        impl ServerVar {
            /// All known variables
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// CGI-style name, e.g. `SCRIPT_FILENAME`
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

server_vars! {
    ServerHandler => "SERVER_HANDLER",
    ServerSoftware => "SERVER_SOFTWARE",
    ServerAddr => "SERVER_ADDR",
    ServerPort => "SERVER_PORT",
    ServerName => "SERVER_NAME",
    ServerAdmin => "SERVER_ADMIN",
    ServerSignature => "SERVER_SIGNATURE",
    ServerProtocol => "SERVER_PROTOCOL",
    ServerErrorsPageTemplatePath => "SERVER_ERRORS_PAGE_TEMPLATE_PATH",
    DocumentRoot => "DOCUMENT_ROOT",
    Https => "HTTPS",
    RemoteAddr => "REMOTE_ADDR",
    RemotePort => "REMOTE_PORT",
    RequestTime => "REQUEST_TIME",
    RequestMethod => "REQUEST_METHOD",
    RequestUri => "REQUEST_URI",
    XRequestUri => "X_REQUEST_URI",
    QueryString => "QUERY_STRING",
    ScriptFilename => "SCRIPT_FILENAME",
    ScriptName => "SCRIPT_NAME",
    PathInfo => "PATH_INFO",
    RedirectStatus => "REDIRECT_STATUS",
    RedirectUrl => "REDIRECT_URL",
    RedirectUri => "REDIRECT_URI",
    HttpUserAgent => "HTTP_USER_AGENT",
    HttpReferer => "HTTP_REFERER",
    HttpCookie => "HTTP_COOKIE",
    HttpHost => "HTTP_HOST",
    HttpXRequestedWith => "HTTP_X_REQUESTED_WITH",
    HttpAccept => "HTTP_ACCEPT",
    HttpAcceptCharset => "HTTP_ACCEPT_CHARSET",
    HttpAcceptEncoding => "HTTP_ACCEPT_ENCODING",
    HttpAcceptLanguage => "HTTP_ACCEPT_LANGUAGE",
    HttpConnection => "HTTP_CONNECTION",
    HttpForwarded => "HTTP_FORWARDED",
    HttpProxyConnection => "HTTP_PROXY_CONNECTION",
}

impl ServerVar {
    /// Variables that survive `init_vars` because they describe the
    /// connection rather than the request
    pub const fn is_connection_scoped(self) -> bool {
        matches!(self, Self::RemoteAddr | Self::RemotePort)
    }
}

impl fmt::Display for ServerVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Module variable names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleVar {
    /// Per-request settings of the file handler chosen for this request
    VolatileFileHandlerVariables,
}

/// Backend overrides a handler resolution can hand to the gateway module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHandlerVariables {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Module variable values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleValue {
    FileHandler(FileHandlerVariables),
}

/// Shared mutable state for one connection and its request cycles
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    defaults: HashMap<ServerVar, String>,
    server_vars: HashMap<ServerVar, String>,
    env_vars: BTreeMap<String, String>,
    module_vars: HashMap<ModuleVar, ModuleValue>,
}

impl RequestContext {
    /// Create a context whose request-scoped server vars reset to `defaults`
    pub fn new(defaults: HashMap<ServerVar, String>) -> Self {
        Self {
            server_vars: defaults.clone(),
            defaults,
            env_vars: BTreeMap::new(),
            module_vars: HashMap::new(),
        }
    }

    pub fn server_var(&self, var: ServerVar) -> Option<&str> {
        self.server_vars.get(&var).map(String::as_str)
    }

    pub fn has_server_var(&self, var: ServerVar) -> bool {
        self.server_vars.contains_key(&var)
    }

    pub fn set_server_var(&mut self, var: ServerVar, value: impl Into<String>) {
        self.server_vars.insert(var, value.into());
    }

    /// Set the var when a value is present, otherwise leave it unset
    pub fn set_server_var_opt(&mut self, var: ServerVar, value: Option<impl Into<String>>) {
        match value {
            Some(value) => self.set_server_var(var, value),
            None => {
                self.server_vars.remove(&var);
            }
        }
    }

    pub fn unset_server_var(&mut self, var: ServerVar) {
        self.server_vars.remove(&var);
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env_vars.get(name).map(String::as_str)
    }

    pub fn set_env_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.env_vars.insert(name.into(), value.into());
    }

    pub const fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    pub fn module_var(&self, var: ModuleVar) -> Option<&ModuleValue> {
        self.module_vars.get(&var)
    }

    pub fn has_module_var(&self, var: ModuleVar) -> bool {
        self.module_vars.contains_key(&var)
    }

    pub fn set_module_var(&mut self, var: ModuleVar, value: ModuleValue) {
        self.module_vars.insert(var, value);
    }

    /// Reset request-scoped state after a request cycle.
    ///
    /// Server vars return to the server defaults, connection-scoped vars are
    /// kept, environment and module vars are cleared.
    pub fn init_vars(&mut self) {
        let kept: Vec<(ServerVar, String)> = self
            .server_vars
            .iter()
            .filter(|(var, _)| var.is_connection_scoped())
            .map(|(var, value)| (*var, value.clone()))
            .collect();

        self.server_vars.clone_from(&self.defaults);
        self.server_vars.extend(kept);
        self.env_vars.clear();
        self.module_vars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RequestContext {
        let mut defaults = HashMap::new();
        defaults.insert(ServerVar::ServerSoftware, "test/1.0".to_string());
        defaults.insert(ServerVar::DocumentRoot, "/var/www".to_string());
        RequestContext::new(defaults)
    }

    #[test]
    fn test_defaults_visible() {
        let ctx = context();
        assert_eq!(ctx.server_var(ServerVar::ServerSoftware), Some("test/1.0"));
        assert!(!ctx.has_server_var(ServerVar::ScriptFilename));
    }

    #[test]
    fn test_init_vars_keeps_connection_scope() {
        let mut ctx = context();
        ctx.set_server_var(ServerVar::RemoteAddr, "10.0.0.1");
        ctx.set_server_var(ServerVar::RemotePort, "4242");
        ctx.set_server_var(ServerVar::ScriptFilename, "/var/www/index.php");
        ctx.set_server_var(ServerVar::DocumentRoot, "/srv/other");
        ctx.set_env_var("APP_ENV", "dev");
        ctx.set_module_var(
            ModuleVar::VolatileFileHandlerVariables,
            ModuleValue::FileHandler(FileHandlerVariables::default()),
        );

        ctx.init_vars();

        assert_eq!(ctx.server_var(ServerVar::RemoteAddr), Some("10.0.0.1"));
        assert_eq!(ctx.server_var(ServerVar::RemotePort), Some("4242"));
        assert_eq!(ctx.server_var(ServerVar::ScriptFilename), None);
        assert_eq!(ctx.server_var(ServerVar::DocumentRoot), Some("/var/www"));
        assert!(ctx.env_vars().is_empty());
        assert!(!ctx.has_module_var(ModuleVar::VolatileFileHandlerVariables));
    }

    #[test]
    fn test_set_server_var_opt() {
        let mut ctx = context();
        ctx.set_server_var_opt(ServerVar::HttpReferer, Some("http://a/"));
        assert_eq!(ctx.server_var(ServerVar::HttpReferer), Some("http://a/"));
        ctx.set_server_var_opt(ServerVar::HttpReferer, None::<String>);
        assert!(!ctx.has_server_var(ServerVar::HttpReferer));
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<&str> = ServerVar::ALL.iter().map(|v| v.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ServerVar::ALL.len());
        assert_eq!(ServerVar::ScriptFilename.to_string(), "SCRIPT_FILENAME");
    }
}
