//! Error page rendering
//!
//! Uses the template at `SERVER_ERRORS_PAGE_TEMPLATE_PATH` when it can be read,
//! otherwise a plain-text page.

use crate::context::{RequestContext, ServerVar};
use crate::http::Response;
use hyper::header::{HeaderValue, CONTENT_TYPE};

/// Replace the response body with an error page for its current status
pub async fn render(response: &mut Response, message: &str, context: &RequestContext) {
    let code = response.status().as_u16().to_string();
    let reason = response.reason_phrase().to_string();
    let signature = context.server_var(ServerVar::ServerSignature).unwrap_or_default();

    let template = match context.server_var(ServerVar::ServerErrorsPageTemplatePath) {
        Some(path) => tokio::fs::read_to_string(path).await.ok(),
        None => None,
    };

    let (body, content_type) = match template {
        Some(template) => (
            template
                .replace("{{status_code}}", &code)
                .replace("{{reason}}", &escape_html(&reason))
                .replace("{{message}}", &escape_html(message))
                .replace("{{signature}}", signature),
            "text/html; charset=utf-8",
        ),
        None => (
            format!("{code} {reason}\n\n{message}\n\n{}", strip_tags(signature)),
            "text/plain; charset=utf-8",
        ),
    };

    response.clear_body();
    response.append_body(body.as_bytes());
    response.insert_header(CONTENT_TYPE, HeaderValue::from_static(content_type));
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
