//! HTTP API service implementation for the dispatch facade

use crate::context::{CallerIdentity, build_bucket_context};
use crate::overrides::apply_overrides;
use bytes::{Bytes, BytesMut};
use cubegate_internal_api::outcome::{Outcome, ProcessorHangup, outcome_channel};
use cubegate_internal_api::query_processor::{
    DispatchUnit, ProcessorError, QueryProcessor, SendableRowStream,
};
use cubegate_types::{CatalogError, CubeQuery, RegistryCatalog, ResultModel};
use futures::StreamExt;
use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use hyper::body::HttpBody;
use hyper::header::{CONTENT_ENCODING, CONTENT_TYPE};
use hyper::http::HeaderValue;
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::Poll;
use thiserror::Error;
use tracing::{debug, error, info};

pub(crate) const API_V1_QUERY: &str = "/api/v1/query/";
pub(crate) const API_HEALTH: &str = "/health";
pub(crate) const API_PING: &str = "/ping";

/// Maximum length for untrusted input when logging to prevent log flooding
const MAX_PATH_LENGTH_FOR_LOGGING: usize = 256;

/// Truncate a string for logging untrusted input to prevent log flooding
fn truncate_for_logging(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        // back off to a character boundary so multi-byte UTF-8 never splits
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The requested path has no registered handler.
    #[error("not found")]
    NoHandler,

    /// Unknown registry or schema, surfaced before any submission.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The client disconnected while the body was being read.
    #[error("client disconnected: {0}")]
    ClientHangup(hyper::Error),

    /// The client sent a request body that exceeds the configured maximum.
    #[error("max request size ({0} bytes) exceeded")]
    RequestSizeExceeded(usize),

    /// The `Content-Encoding` header is invalid and cannot be read.
    #[error("invalid content-encoding header: {0}")]
    NonUtf8ContentEncodingHeader(hyper::header::ToStrError),

    /// The specified `Content-Encoding` is not acceptable.
    #[error("unacceptable content-encoding: {0}")]
    InvalidContentEncoding(String),

    /// Decoding a gzip-compressed stream of data failed.
    #[error("error decoding gzip stream: {0}")]
    InvalidGzip(std::io::Error),

    /// The body did not deserialize into a canonical query.
    #[error("invalid query request body: {0}")]
    InvalidQueryBody(#[source] serde_json::Error),

    /// The query string did not deserialize into dispatch parameters.
    #[error("invalid dispatch parameters: {0}")]
    SerdeUrlDecoding(#[from] serde_urlencoded::de::Error),

    /// The HTTP request method is not supported for this resource
    #[error("unsupported method")]
    UnsupportedMethod,

    /// The processor resolved the unit as failed.
    #[error("query error: {0}")]
    Processor(#[from] ProcessorError),

    /// The processor never resolved the unit at all.
    #[error(transparent)]
    Hangup(#[from] ProcessorHangup),

    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("hyper http error: {0}")]
    Hyper(#[from] hyper::http::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NoHandler => StatusCode::NOT_FOUND,
            Self::Catalog(
                CatalogError::RegistryNotFound { .. } | CatalogError::SchemaNotFound { .. },
            ) => StatusCode::NOT_FOUND,
            Self::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RequestSizeExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMethod => StatusCode::METHOD_NOT_ALLOWED,
            Self::ClientHangup(_)
            | Self::NonUtf8ContentEncodingHeader(_)
            | Self::InvalidContentEncoding(_)
            | Self::InvalidGzip(_)
            | Self::InvalidQueryBody(_)
            | Self::SerdeUrlDecoding(_) => StatusCode::BAD_REQUEST,
            Self::Processor(_) | Self::Hangup(_) | Self::SerdeJson(_) | Self::Hyper(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn into_response(self) -> Response<Body> {
        let err: ErrorMessage<()> = ErrorMessage {
            error: self.to_string(),
            data: None,
        };
        let serialized = serde_json::to_string(&err).unwrap();
        Response::builder()
            .status(self.status_code())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serialized))
            .unwrap()
    }
}

#[derive(Debug, Serialize)]
struct ErrorMessage<T: Serialize> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct PingResponse {
    version: &'static str,
}

/// Per-call override parameters, deserialized from the query string
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DispatchParams {
    debug: bool,
    engine: String,
    revision: Option<i64>,
}

/// The HTTP dispatch facade over the asynchronous query processor
#[derive(Debug)]
pub struct HttpApi {
    catalog: Arc<RegistryCatalog>,
    processor: Arc<dyn QueryProcessor>,
    max_request_bytes: usize,
}

impl HttpApi {
    pub fn new(
        catalog: Arc<RegistryCatalog>,
        processor: Arc<dyn QueryProcessor>,
        max_request_bytes: usize,
    ) -> Self {
        Self {
            catalog,
            processor,
            max_request_bytes,
        }
    }

    /// Dispatch one reporting query to the downstream processor.
    ///
    /// Runs synchronously through schema resolution, body parsing, override
    /// application, and context building; fails fast with no submission if
    /// any of those reject the request. After the single `process` call the
    /// serving task suspends on the outcome handle until the processor
    /// resolves the unit one way or the other.
    async fn dispatch_query(
        &self,
        registry: &str,
        schema: &str,
        req: Request<Body>,
    ) -> Result<Response<Body>> {
        let schema = self.catalog.resolve(registry, schema)?.to_string();
        let identity = CallerIdentity::from_headers(req.headers());
        let params = match req.uri().query() {
            Some(query) => serde_urlencoded::from_str::<DispatchParams>(query)?,
            None => DispatchParams::default(),
        };

        // The body is consumed exactly once; parsing must fully succeed
        // before any override is applied.
        let raw_body = self.read_body(req).await?;
        let query =
            serde_json::from_slice::<CubeQuery>(&raw_body).map_err(Error::InvalidQueryBody)?;

        let query = apply_overrides(query, params.debug, &params.engine);
        let bucket = build_bucket_context(&identity, params.revision);

        info!(
            %registry,
            %schema,
            cube = %query.cube,
            debug = query.debug,
            engine = ?query.engine,
            user = %bucket.user_id,
            internal = bucket.is_internal,
            revision = ?bucket.forced_revision,
            "dispatching query"
        );

        // Callbacks are bound to the handle before the processor ever sees
        // the unit, so a processor that resolves from inside `process`
        // cannot race the registration.
        let (callbacks, handle) = outcome_channel();
        let unit = DispatchUnit {
            registry: registry.to_string(),
            query,
            raw_body,
            bucket,
        };
        self.processor.process(unit, callbacks).await;

        let outcome = handle.outcome().await.inspect_err(|_| {
            error!(%registry, "query processor dropped the unit without resolving an outcome");
        })?;

        match outcome {
            Outcome::Success(model, rows) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/json")
                .body(rows_stream_to_body(&model, rows)?)
                .map_err(Into::into),
            Outcome::Failure(failure) => Err(Error::Processor(failure.into())),
        }
    }

    fn health(&self) -> Result<Response<Body>> {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from("OK"))?)
    }

    fn ping(&self) -> Result<Response<Body>> {
        let body = serde_json::to_string(&PingResponse {
            version: env!("CARGO_PKG_VERSION"),
        })?;
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(Into::into)
    }

    /// Parse the request's body into raw bytes, applying the configured size
    /// limit and decoding any content encoding.
    async fn read_body(&self, req: Request<Body>) -> Result<Bytes> {
        let encoding = req
            .headers()
            .get(&CONTENT_ENCODING)
            .map(|v| v.to_str().map_err(Error::NonUtf8ContentEncodingHeader))
            .transpose()?;
        let ungzip = match encoding {
            None | Some("identity") => false,
            Some("gzip") => true,
            Some(v) => return Err(Error::InvalidContentEncoding(v.to_string())),
        };

        let mut payload = req.into_body();
        let mut body = BytesMut::new();
        while let Some(chunk) = payload.data().await {
            let chunk = chunk.map_err(Error::ClientHangup)?;
            // limit max size of in-memory payload
            if (body.len() + chunk.len()) > self.max_request_bytes {
                return Err(Error::RequestSizeExceeded(self.max_request_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        let body = body.freeze();

        if !ungzip {
            return Ok(body);
        }

        use std::io::Read;
        let decoder = flate2::read::MultiGzDecoder::new(&body[..]);

        // Read at most max_request_bytes bytes to prevent a decompression
        // bomb based DoS: read one extra byte beyond the limit and check the
        // resulting length to detect truncation.
        let mut decoder = decoder.take((self.max_request_bytes as u64).saturating_add(1));
        let mut decoded_data = Vec::new();
        decoder
            .read_to_end(&mut decoded_data)
            .map_err(Error::InvalidGzip)?;
        if decoded_data.len() > self.max_request_bytes {
            return Err(Error::RequestSizeExceeded(self.max_request_bytes));
        }

        Ok(decoded_data.into())
    }
}

/// Convert a result model and row stream into an incrementally written JSON
/// body of the form `{"model":{...},"rows":[...]}`.
///
/// The document prefix goes out on the first poll, before the row stream has
/// produced anything, so the transport starts writing while the processor is
/// still producing rows. The stream is single-pass; once the transport has
/// consumed it, it cannot be re-iterated.
fn rows_stream_to_body(model: &ResultModel, mut rows: SendableRowStream) -> Result<Body> {
    #[derive(Clone, Copy)]
    enum State {
        Prefix,
        Rows { first: bool },
        Done,
    }

    let mut prefix = BytesMut::from(&b"{\"model\":"[..]);
    prefix.extend_from_slice(&serde_json::to_vec(model)?);
    prefix.extend_from_slice(b",\"rows\":[");
    let mut prefix = Some(prefix.freeze());

    let mut state = State::Prefix;
    let stream = futures::stream::poll_fn(move |ctx| match state {
        State::Prefix => {
            state = State::Rows { first: true };
            Poll::Ready(Some(Ok(prefix.take().expect("prefix is emitted exactly once"))))
        }
        State::Rows { first } => match rows.poll_next_unpin(ctx) {
            Poll::Ready(Some(Ok(row))) => {
                let mut buf = if first { Vec::new() } else { vec![b','] };
                match serde_json::to_writer(&mut buf, &row) {
                    Ok(()) => {
                        state = State::Rows { first: false };
                        Poll::Ready(Some(Ok(Bytes::from(buf))))
                    }
                    Err(e) => {
                        state = State::Done;
                        Poll::Ready(Some(Err(Error::SerdeJson(e))))
                    }
                }
            }
            Poll::Ready(Some(Err(e))) => {
                state = State::Done;
                Poll::Ready(Some(Err(Error::Processor(e))))
            }
            Poll::Ready(None) => {
                state = State::Done;
                Poll::Ready(Some(Ok(Bytes::from_static(b"]}"))))
            }
            Poll::Pending => Poll::Pending,
        },
        State::Done => Poll::Ready(None),
    });

    Ok(Body::wrap_stream(stream))
}

/// Top-level request entry point: routes, then logs and renders errors.
pub async fn route_request(
    http_server: Arc<HttpApi>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    // extract from the request for logging before routing consumes it
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = perform_routing(http_server, req).await;

    let response = match response {
        Ok(mut response) => {
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            debug!(status = %response.status(), "successfully processed request");
            response
        }
        Err(error) => {
            let path = truncate_for_logging(uri.path(), MAX_PATH_LENGTH_FOR_LOGGING);
            error!(%error, %method, %path, "error while handling request");
            error.into_response()
        }
    };

    Ok(response)
}

async fn perform_routing(
    http_server: Arc<HttpApi>,
    req: Request<Body>,
) -> Result<Response<Body>> {
    // Handle CORS preflight checks permissively so browsers can query the
    // gateway directly; the check result may be cached for a day.
    if let Method::OPTIONS = *req.method() {
        info!(uri = ?req.uri(), "preflight request");
        return Response::builder()
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "*")
            .header("Access-Control-Allow-Headers", "*")
            .header("Access-Control-Max-Age", "86400")
            .status(204)
            .body(Body::empty())
            .map_err(Into::into);
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::GET, API_HEALTH) => http_server.health(),
        (Method::GET | Method::POST, API_PING) => http_server.ping(),
        (method, path) if path.starts_with(API_V1_QUERY) => {
            let rest = path.strip_prefix(API_V1_QUERY).unwrap();
            let mut segments = rest.split('/').filter(|s| !s.is_empty());
            let (Some(registry), Some(schema), None) =
                (segments.next(), segments.next(), segments.next())
            else {
                return Err(Error::NoHandler);
            };
            if method != Method::POST {
                return Err(Error::UnsupportedMethod);
            }
            http_server.dispatch_query(registry, schema, req).await
        }
        _ => Err(Error::NoHandler),
    }
}
