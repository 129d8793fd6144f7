//! HTTP request observer.
//!
//! Recognition is a cheap prefix test; recognized payloads have their
//! request line and headers parsed with the
//! [httparse](https://docs.rs/httparse) crate. Bodies are not parsed.

use httparse::{Request, EMPTY_HEADER};

/// Prefixes that mark a payload as HTTP traffic.
const HTTP_PREFIXES: [&[u8]; 7] = [
    b"GET ",
    b"POST ",
    b"PUT ",
    b"DELETE ",
    b"HEAD ",
    b"OPTIONS ",
    b"HTTP/",
];

/// Returns `true` if the first bytes of `payload` look like an HTTP request
/// line or status line. Payloads shorter than 16 bytes are never classified
/// as HTTP.
pub fn looks_like_http(payload: &[u8]) -> bool {
    if payload.len() < 16 {
        return false;
    }
    HTTP_PREFIXES
        .iter()
        .any(|prefix| payload.starts_with(prefix))
}

/// A parsed HTTP request line plus the headers of interest.
#[derive(Debug, Default, Clone)]
pub struct HttpRequestSummary {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub host: Option<String>,
    pub user_agent: Option<String>,
}

/// Parses the request line and headers from `data`, or `None` if the bytes
/// are not an HTTP request ("not HTTP" is a normal outcome; the caller falls
/// back to raw payload inspection either way).
pub fn parse_request(data: &[u8]) -> Option<HttpRequestSummary> {
    const NUM_OF_HEADERS: usize = 20;
    let mut headers = [EMPTY_HEADER; NUM_OF_HEADERS];
    let mut req = Request::new(&mut headers[..]);
    req.parse(data).ok()?;

    let mut summary = HttpRequestSummary {
        method: req.method?.to_owned(),
        uri: req.path?.to_owned(),
        version: format!("HTTP/1.{}", req.version?),
        ..Default::default()
    };
    for hdr in &headers {
        match hdr.name.to_lowercase().as_str() {
            "host" => summary.host = Some(String::from_utf8_lossy(hdr.value).into_owned()),
            "user-agent" => {
                summary.user_agent = Some(String::from_utf8_lossy(hdr.value).into_owned())
            }
            _ => (),
        }
    }
    Some(summary)
}
