//! Per-call override policy applied to a parsed query before submission

use cubegate_types::{CubeQuery, Engine};

/// Apply the caller's overrides to a parsed query, returning a new value.
///
/// Debug applies first, then engine forcing, each on the output of the
/// previous step. A blank `force_engine` forces nothing; an unrecognized
/// value (engine names are matched case-sensitively, as provided) is ignored
/// outright rather than raising an error, leaving any debug override in
/// place. With neither override set this is the identity transform.
pub fn apply_overrides(query: CubeQuery, debug: bool, force_engine: &str) -> CubeQuery {
    let query = if debug { query.with_debug() } else { query };
    if force_engine.trim().is_empty() {
        return query;
    }
    match force_engine.parse::<Engine>() {
        Ok(engine) => query.with_engine(engine),
        Err(_) => query,
    }
}
