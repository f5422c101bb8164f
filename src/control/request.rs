//! Request-head parsing for the control listener.
//!
//! Only the request line matters here; headers are read past and ignored.

/// Upper bound on the request head.
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
}

impl RequestHead {
    /// First value of query parameter `name`, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("request line is not valid UTF-8")]
    Encoding,
    #[error("malformed request line")]
    RequestLine,
    #[error("unsupported protocol version")]
    Version,
}

/// Byte offset just past the blank line ending the head, if present.
pub fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse the request line from a complete head.
pub fn parse_request_head(head: &[u8]) -> Result<RequestHead, ParseError> {
    let line_end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(head.len());
    let line = std::str::from_utf8(&head[..line_end]).map_err(|_| ParseError::Encoding)?;

    let mut parts = line.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) if !m.is_empty() && t.starts_with('/') => (m, t, v),
        _ => return Err(ParseError::RequestLine),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(ParseError::Version);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };

    Ok(RequestHead {
        method: method.to_string(),
        path: path.to_string(),
        query,
    })
}

/// Boolean spellings accepted for `do`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// `do` parameter as a bool; absent or unrecognized means `false`.
pub fn reset_requested(head: &RequestHead) -> bool {
    head.query_param("do")
        .and_then(|value| parse_flag(&value))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_and_query() {
        let head = parse_request_head(b"GET /reset?do=true&x=1 HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/reset");
        assert_eq!(head.query_param("do").as_deref(), Some("true"));
        assert_eq!(head.query_param("missing"), None);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_request_head(b"hello\r\n\r\n"), Err(ParseError::RequestLine));
        assert_eq!(
            parse_request_head(b"GET /reset SPDY/3\r\n\r\n"),
            Err(ParseError::Version)
        );
        assert_eq!(
            parse_request_head(b"GET reset HTTP/1.1\r\n\r\n"),
            Err(ParseError::RequestLine)
        );
    }

    #[test]
    fn flag_spellings() {
        for yes in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_flag(yes), Some(true), "{yes}");
        }
        for no in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_flag(no), Some(false), "{no}");
        }
        assert_eq!(parse_flag("yes"), None);
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn unrecognized_flag_means_no_reset() {
        let head = parse_request_head(b"GET /reset?do=please HTTP/1.1\r\n\r\n").unwrap();
        assert!(!reset_requested(&head));

        let head = parse_request_head(b"GET /reset HTTP/1.0\r\n\r\n").unwrap();
        assert!(!reset_requested(&head));

        let head = parse_request_head(b"GET /reset?do=1 HTTP/1.1\r\n\r\n").unwrap();
        assert!(reset_requested(&head));
    }

    #[test]
    fn finds_end_of_head() {
        assert_eq!(head_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(18));
        assert_eq!(head_end(b"GET / HTTP/1.1\r\n"), None);
    }
}
