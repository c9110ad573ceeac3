use crate::{Body, ClientConfig, Method, MultipartForm, RequestOptions};

/// Wire-ready body produced by [`prepare`].
#[derive(Clone, Debug, PartialEq)]
pub enum WireBody {
    /// Serialized JSON or caller-provided raw bytes.
    Bytes(Vec<u8>),
    Multipart(MultipartForm),
}

/// Everything a [`Transport`](crate::Transport) needs to issue one attempt.
///
/// Built once per call and reused unchanged by every attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<WireBody>,
}

impl PreparedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub(crate) fn prepare(config: &ClientConfig, path: &str, options: &RequestOptions) -> PreparedRequest {
    PreparedRequest {
        method: options.method,
        url: resolve_url(&config.base_url, path),
        headers: build_headers(options, config),
        body: options.body.as_ref().map(encode_body),
    }
}

/// Absolute `http(s)://` paths pass through; anything else is joined onto
/// `base_url` with a single `/`.
pub(crate) fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{path}")
    }
}

pub(crate) fn build_headers(options: &RequestOptions, config: &ClientConfig) -> Vec<(String, String)> {
    let mut headers = vec![("Accept".to_owned(), "application/json".to_owned())];
    if let Some(agent) = config.user_agent.as_deref().filter(|agent| !agent.trim().is_empty()) {
        headers.push(("User-Agent".to_owned(), agent.to_owned()));
    }
    for (name, value) in &options.headers {
        upsert_header(&mut headers, name, value);
    }

    let opaque_body = options.body.as_ref().is_some_and(Body::is_opaque);
    if !opaque_body && find_header(&headers, "content-type").is_none() {
        headers.push(("Content-Type".to_owned(), "application/json".to_owned()));
    }

    let token = options
        .auth_token
        .as_deref()
        .or(config.auth_token.as_deref())
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = token {
        if find_header(&headers, "authorization").is_none() {
            headers.push(("Authorization".to_owned(), normalize_bearer_authorization(token)));
        }
    }

    headers
}

/// Tokens that already carry a `Bearer ` scheme (any case) are kept as is.
fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

fn encode_body(body: &Body) -> WireBody {
    match body {
        Body::Json(value) => WireBody::Bytes(value.to_string().into_bytes()),
        Body::Bytes(bytes) => WireBody::Bytes(bytes.clone()),
        Body::Multipart(form) => WireBody::Multipart(form.clone()),
    }
}

fn upsert_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers
        .iter_mut()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
    {
        Some(entry) => *entry = (name.to_owned(), value.to_owned()),
        None => headers.push((name.to_owned(), value.to_owned())),
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
