//! Caller identity extraction and bucket-context construction

use cubegate_types::BucketContext;
use hyper::HeaderMap;

/// Header carrying the calling user's identifier
pub const CALLER_USER_HEADER: &str = "x-cubegate-user";
/// Header flagging internal callers
pub const CALLER_INTERNAL_HEADER: &str = "x-cubegate-internal";

const UNKNOWN_USER: &str = "unknown";

/// Per-request caller identity, read once from the request headers.
///
/// Carried explicitly down the dispatch path; there is no ambient or
/// thread-local caller state anywhere in the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Raw value of the user header, if present and valid UTF-8
    pub user_id: Option<String>,
    /// Raw value of the internal-caller header, unparsed
    pub internal_flag: Option<String>,
}

impl CallerIdentity {
    /// Read the identity headers. Missing or non-UTF-8 values count as
    /// absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        Self {
            user_id: read(CALLER_USER_HEADER),
            internal_flag: read(CALLER_INTERNAL_HEADER),
        }
    }
}

/// Build the bucketing context for one dispatch.
///
/// The internal flag must never error its way back to the caller: a value
/// that does not parse as a bool is simply `false`, same as an absent one.
pub fn build_bucket_context(
    identity: &CallerIdentity,
    forced_revision: Option<i64>,
) -> BucketContext {
    BucketContext {
        user_id: identity
            .user_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_USER.to_string()),
        is_internal: identity
            .internal_flag
            .as_deref()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false),
        forced_revision,
    }
}
