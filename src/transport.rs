use std::future::Future;
use std::pin::Pin;

use crate::builder::find_header;
use crate::{AppError, Method, MultipartForm, MultipartPart, PreparedRequest, WireBody};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw reply of a single attempt, body already read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// `None` when the body could not be read.
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure of the underlying network call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, broken stream and the like.
    #[error("network error: {0}")]
    Network(#[source] BoxError),
    /// Already normalized upstream; passed through untouched.
    #[error(transparent)]
    App(AppError),
    #[error("transport error: {0}")]
    Other(#[source] BoxError),
}

/// Executes one prepared request. Implementations must not retry or time
/// out on their own; the client owns both.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a PreparedRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>>;
}

/// [`Transport`] over a shared `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a PreparedRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let mut builder = self.http.request(request.method.into(), &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match &request.body {
                Some(WireBody::Bytes(bytes)) => builder.body(bytes.clone()),
                Some(WireBody::Multipart(form)) => builder.multipart(to_reqwest_form(form)?),
                None => builder,
            };

            let response = builder.send().await.map_err(classify_reqwest_error)?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_owned(), value.to_owned()))
                })
                .collect();

            let body = match response.bytes().await {
                Ok(bytes) => Some(bytes.to_vec()),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(status, error = %_err, "response body could not be read");
                    None
                }
            };

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

fn to_reqwest_form(form: &MultipartForm) -> Result<reqwest::multipart::Form, TransportError> {
    let mut out = reqwest::multipart::Form::new();
    for part in form.parts() {
        out = match part {
            MultipartPart::Text { name, value } => out.text(name.clone(), value.clone()),
            MultipartPart::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let mut file = reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file
                        .mime_str(mime)
                        .map_err(|err| TransportError::Other(Box::new(err)))?;
                }
                out.part(name.clone(), file)
            }
        };
    }
    Ok(out)
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_builder() || err.is_redirect() {
        return TransportError::Other(Box::new(err));
    }
    if err.is_connect() || err.is_request() || err.is_body() || err.is_timeout() {
        return TransportError::Network(Box::new(err));
    }
    TransportError::Other(Box::new(err))
}
