//! cubegate server implementation
//!
//! The server is responsible for the HTTP dispatch facade: it normalizes
//! incoming reporting queries, hands each one to the downstream query
//! processor exactly once, and streams the terminal outcome back to the
//! caller.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
missing_debug_implementations,
clippy::explicit_iter_loop,
clippy::use_self,
clippy::clone_on_ref_ptr,
clippy::future_not_send
)]

pub mod context;
pub mod http;
pub mod overrides;

use crate::http::HttpApi;
use crate::http::route_request;
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum Error {
    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Serve the HTTP API on `listener` until the shutdown token fires.
///
/// Connections in flight when shutdown begins are allowed to finish.
pub async fn serve(
    http: Arc<HttpApi>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let make_svc = make_service_fn(move |_conn| {
        let http = Arc::clone(&http);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| route_request(Arc::clone(&http), req)))
        }
    });

    info!(%addr, "cubegate http server listening");
    hyper::Server::builder(AddrIncoming::from_listener(listener)?)
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("cubegate http server shut down");
    Ok(())
}
