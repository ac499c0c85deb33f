use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;

use crate::types::{Model, SendMessageRequest, SendMessageResponse, SendSecureMessageResponse};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    #[snafu(display("backend returned status {status}: {body}"))]
    Status {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("network request failed: {message}"))]
    Network {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("failed to decode backend response: {message}"))]
    Decode {
        stage: &'static str,
        message: String,
    },
}

/// Network seam for the reconciliation controller. Implementations own
/// timeouts and retry policy; the engine treats every failure as a rolled
/// back send and never retries on its own.
pub trait Transport: Send + Sync {
    fn send_plain<'a>(
        &'a self,
        request: &'a SendMessageRequest,
    ) -> BoxFuture<'a, TransportResult<SendMessageResponse>>;

    fn send_secure<'a>(
        &'a self,
        request: &'a SendMessageRequest,
    ) -> BoxFuture<'a, TransportResult<SendSecureMessageResponse>>;

    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, TransportResult<Vec<Model>>>;
}
