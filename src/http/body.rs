//! Request body parameter parsing
//!
//! `application/x-www-form-urlencoded` bodies go through the query-string
//! parser, `multipart/form-data` bodies through the multipart parser.
//! Any other content type is left untouched.

use super::request::FormPart;
use bytes::Bytes;

/// How a body with the given `Content-Type` should be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    UrlEncoded,
    Multipart { boundary: String },
    Opaque,
}

impl BodyKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Opaque;
        };
        let mut parts = content_type.split(';').map(str::trim);
        let mime = parts.next().unwrap_or_default().to_ascii_lowercase();

        match mime.as_str() {
            "application/x-www-form-urlencoded" => Self::UrlEncoded,
            "multipart/form-data" => parts
                .filter_map(|p| p.split_once('='))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
                .map(|(_, v)| v.trim().trim_matches('"').to_string())
                .filter(|b| !b.is_empty())
                .map_or(Self::Opaque, |boundary| Self::Multipart { boundary }),
            _ => Self::Opaque,
        }
    }
}

/// Parse `a=1&b=two+words` into decoded pairs
pub fn parse_query(input: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Split a `multipart/form-data` body into its parts.
///
/// Malformed parts are skipped; parsing stops at the closing delimiter.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Vec<FormPart> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();

    let Some(mut rest) = find(body, delimiter).map(|pos| &body[pos + delimiter.len()..]) else {
        return parts;
    };

    loop {
        if rest.starts_with(b"--") {
            break;
        }
        let Some(next) = find(rest, delimiter) else {
            break;
        };
        let segment = &rest[..next];
        rest = &rest[next + delimiter.len()..];

        let segment = segment.strip_prefix(b"\r\n").unwrap_or(segment);
        let segment = segment.strip_suffix(b"\r\n").unwrap_or(segment);
        if let Some(part) = parse_part(segment) {
            parts.push(part);
        }
    }
    parts
}

fn parse_part(segment: &[u8]) -> Option<FormPart> {
    let split = find(segment, b"\r\n\r\n")?;
    let head = std::str::from_utf8(&segment[..split]).ok()?;
    let data = Bytes::copy_from_slice(&segment[split + 4..]);

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in head.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("content-disposition") {
            for attr in value.split(';').map(str::trim) {
                if let Some((k, v)) = attr.split_once('=') {
                    let v = v.trim().trim_matches('"').to_string();
                    match k.trim() {
                        "name" => name = Some(v),
                        "filename" => filename = Some(v),
                        _ => {}
                    }
                }
            }
        } else if key.trim().eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    Some(FormPart {
        name: name?,
        filename,
        content_type,
        data,
    })
}

/// Text fields of a multipart body as parameters
pub fn multipart_params(parts: &[FormPart]) -> Vec<(String, String)> {
    parts
        .iter()
        .filter(|p| p.filename.is_none())
        .map(|p| (p.name.clone(), String::from_utf8_lossy(&p.data).into_owned()))
        .collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_kind() {
        assert_eq!(
            BodyKind::from_content_type(Some("application/x-www-form-urlencoded; charset=UTF-8")),
            BodyKind::UrlEncoded
        );
        assert_eq!(
            BodyKind::from_content_type(Some("multipart/form-data; boundary=\"xyz\"")),
            BodyKind::Multipart {
                boundary: "xyz".to_string()
            }
        );
        assert_eq!(
            BodyKind::from_content_type(Some("multipart/form-data")),
            BodyKind::Opaque
        );
        assert_eq!(BodyKind::from_content_type(Some("application/json")), BodyKind::Opaque);
        assert_eq!(BodyKind::from_content_type(None), BodyKind::Opaque);
    }

    #[test]
    fn test_parse_query() {
        let params = parse_query(b"name=Jane+Doe&lang=rust%21&flag");
        assert_eq!(
            params,
            vec![
                ("name".to_string(), "Jane Doe".to_string()),
                ("lang".to_string(), "rust!".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_parse_multipart() {
        let body = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
hello\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
file body\r\n\
--XyZ--\r\n";

        let parts = parse_multipart(body, "XyZ");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "title");
        assert_eq!(&parts[0].data[..], b"hello");
        assert_eq!(parts[1].filename.as_deref(), Some("a.txt"));
        assert_eq!(parts[1].content_type.as_deref(), Some("text/plain"));
        assert_eq!(&parts[1].data[..], b"file body");

        let params = multipart_params(&parts);
        assert_eq!(params, vec![("title".to_string(), "hello".to_string())]);
    }

    #[test]
    fn test_multipart_without_delimiter() {
        assert!(parse_multipart(b"garbage", "XyZ").is_empty());
    }
}
