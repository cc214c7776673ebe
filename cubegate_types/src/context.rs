//! Per-request bucketing context

use serde::{Deserialize, Serialize};

/// Routing/identity parameters influencing downstream processing decisions.
///
/// Built once per dispatch from the caller's identity headers plus the
/// explicit forced-revision parameter, and owned by the dispatch unit
/// thereafter. `forced_revision` stays optional end to end so that "not
/// forced" is never conflated with "revision 0 forced".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketContext {
    /// Identifier of the calling user, `"unknown"` when not supplied
    pub user_id: String,
    /// Whether the caller is an internal one; defaults to false
    pub is_internal: bool,
    /// Data revision pinned by the caller, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_revision: Option<i64>,
}
