//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A fully parsed HTTP/1.1 request.
///
/// Query parameters are decoded once at parse time, so
/// [`Request::query_param`] distinguishes a parameter that is absent
/// (`None`) from one that is present but empty (`Some("")`).
///
/// # Examples
///
/// ```
/// use greeting_cache::http::request::Request;
///
/// let raw = b"GET /api/httpget?name=Ada%20Lovelace HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/api/httpget");
/// assert_eq!(request.query_param("name"), Some("Ada Lovelace"));
/// assert_eq!(request.query_param("missing"), None);
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    params: HashMap<String, String>,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body
    /// begins in `buf`.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the header block has not fully arrived.
    /// - [`RequestError::Parse`] — the data is malformed.
    /// - [`RequestError::MissingField`] — method, path or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let Ok(method) = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>();

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query)),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let params = query.map(parse_query_string).unwrap_or_default();

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                params,
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the decoded value of a query parameter.
    ///
    /// When a key is repeated, the first occurrence wins.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns `true` if the `Accept` header lists `mime` explicitly.
    ///
    /// Media-type parameters such as `q=0.9` are ignored. Wildcards do not
    /// count: `*/*` is not a request for JSON.
    pub fn accepts(&self, mime: &str) -> bool {
        self.headers.get("accept").is_some_and(|accept| {
            accept.split(',').any(|entry| {
                entry
                    .split(';')
                    .next()
                    .is_some_and(|media| media.trim().eq_ignore_ascii_case(mime))
            })
        })
    }

    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 only with an explicit
    /// `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

/// Parses `key=value&key2=value2` into a map of decoded pairs.
///
/// `+` becomes a space before percent-decoding, so `%2B` still yields a
/// literal `+`. Bytes that are not valid UTF-8 after decoding are replaced
/// with U+FFFD.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(decode_component(key))
            .or_insert_with(|| decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn parse_simple_get() {
        let raw = b"GET /api/httpget HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/api/httpget");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(req.query_param("name"), None);
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn absent_and_empty_params_differ() {
        let req = parse("GET /api/httpget?name= HTTP/1.1\r\n\r\n");
        assert_eq!(req.query_param("name"), Some(""));

        let req = parse("GET /api/httpget?name HTTP/1.1\r\n\r\n");
        assert_eq!(req.query_param("name"), Some(""));

        let req = parse("GET /api/httpget?other=1 HTTP/1.1\r\n\r\n");
        assert_eq!(req.query_param("name"), None);
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let req = parse("GET /?name=Ada+Lovelace&city=Z%C3%BCrich&op=1%2B1 HTTP/1.1\r\n\r\n");
        assert_eq!(req.query_param("name"), Some("Ada Lovelace"));
        assert_eq!(req.query_param("city"), Some("Zürich"));
        assert_eq!(req.query_param("op"), Some("1+1"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let req = parse("GET /?name=%FF HTTP/1.1\r\n\r\n");
        assert_eq!(req.query_param("name"), Some("\u{FFFD}"));
    }

    #[test]
    fn first_repeated_param_wins() {
        let req = parse("GET /?name=Ada&name=Grace HTTP/1.1\r\n\r\n");
        assert_eq!(req.query_param("name"), Some("Ada"));
    }

    #[test]
    fn accept_matching_ignores_parameters_and_wildcards() {
        let req = parse("GET / HTTP/1.1\r\nAccept: text/html, application/json;q=0.9\r\n\r\n");
        assert!(req.accepts("application/json"));

        let req = parse("GET / HTTP/1.1\r\nAccept: */*\r\n\r\n");
        assert!(!req.accepts("application/json"));

        let req = parse("GET / HTTP/1.1\r\n\r\n");
        assert!(!req.accepts("application/json"));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        assert!(parse("GET / HTTP/1.1\r\n\r\n").is_keep_alive());
        assert!(!parse("GET / HTTP/1.0\r\n\r\n").is_keep_alive());
        assert!(!parse("GET / HTTP/1.1\r\nConnection: close\r\n\r\n").is_keep_alive());
    }

    #[test]
    fn content_length() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }
}
