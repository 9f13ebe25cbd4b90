//! Interface to the external request-issuing layer.
//!
//! The engine treats "issue one request and get back a timing + status
//! result" as an opaque operation: protocol semantics, TLS and DNS live
//! behind [`Requester`] implementations supplied by the embedding
//! application.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
    Options,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }
}

#[derive(Debug, Clone)]
pub struct Timings {
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
    pub timings: Timings,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("no request backend configured")]
    NoBackend,
}

pub type RequestFuture<'a> = Pin<Box<dyn Future<Output = Result<Response, RequestError>> + Send + 'a>>;
pub type BatchFuture<'a> = Pin<Box<dyn Future<Output = Vec<Result<Response, RequestError>>> + Send + 'a>>;

pub trait Requester: Send + Sync {
    fn request(&self, req: Request) -> RequestFuture<'_>;

    /// Issue an ordered sequence of requests, returning results in the same
    /// order. The default issues them sequentially; implementations may
    /// overlap them as long as ordering of results is preserved.
    fn batch(&self, reqs: Vec<Request>) -> BatchFuture<'_> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(reqs.len());
            for req in reqs {
                out.push(self.request(req).await);
            }
            out
        })
    }
}

/// Placeholder backend for runs whose iterations issue no requests.
#[derive(Debug, Default)]
pub struct NullRequester;

impl Requester for NullRequester {
    fn request(&self, _req: Request) -> RequestFuture<'_> {
        Box::pin(async { Err(RequestError::NoBackend) })
    }
}
