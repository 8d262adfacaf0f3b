//! MIME type detection module
//!
//! Maps file extensions to the `Content-Type` served by the static file module.

use std::path::Path;

/// Content type for a file, by extension (case-insensitive)
///
/// # Examples
/// ```
/// use rust_gateway_server::http::mime::content_type_for;
/// use std::path::Path;
/// assert_eq!(content_type_for(Path::new("www/INDEX.HTML")), "text/html; charset=utf-8");
/// assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
/// ```
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("txt" | "md" | "log") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        Some("xml") => "application/xml",
        Some("js" | "mjs") => "application/javascript",
        Some("json" | "map") => "application/json",
        Some("wasm") => "application/wasm",

        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",

        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz" | "gzip") => "application/gzip",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_types() {
        assert_eq!(content_type_for(Path::new("a/b.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("style.CSS")), "text/css; charset=utf-8");
        assert_eq!(content_type_for(Path::new("app.js")), "application/javascript");
        assert_eq!(content_type_for(Path::new("logo.png")), "image/png");
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(content_type_for(Path::new("x.xyz")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("Makefile")), "application/octet-stream");
    }
}
