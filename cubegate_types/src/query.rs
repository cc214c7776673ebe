//! Canonical query representation and the engine enumeration

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// A downstream query-execution backend.
///
/// Engines are registered generations of the processing service; a caller may
/// force one per request, otherwise the processor picks one itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Engine {
    EngineA,
    EngineB,
    EngineC,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown engine: {0}")]
pub struct UnknownEngine(String);

impl FromStr for Engine {
    type Err = UnknownEngine;

    /// Engine names match exactly, case included. Callers that want the
    /// lenient force-engine behaviour handle the error themselves.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EngineA" => Ok(Self::EngineA),
            "EngineB" => Ok(Self::EngineB),
            "EngineC" => Ok(Self::EngineC),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}

impl Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EngineA => write!(f, "EngineA"),
            Self::EngineB => write!(f, "EngineB"),
            Self::EngineC => write!(f, "EngineC"),
        }
    }
}

/// The parsed, validated representation of a reporting query.
///
/// Produced once per dispatch by deserializing the raw request body. Override
/// application returns a new value rather than mutating in place, so a shared
/// query is never observed half-overridden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeQuery {
    /// The cube this query runs against
    pub cube: String,
    /// Requested field names, in output order
    pub fields: Vec<String>,
    /// Optional row limit applied by the processor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Debug mode flag carried through to the downstream engine
    #[serde(default)]
    pub debug: bool,
    /// Pinned execution engine, when forced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<Engine>,
}

impl CubeQuery {
    /// Return a copy of this query with debug mode enabled
    pub fn with_debug(self) -> Self {
        Self {
            debug: true,
            ..self
        }
    }

    /// Return a copy of this query pinned to the given engine
    pub fn with_engine(self, engine: Engine) -> Self {
        Self {
            engine: Some(engine),
            ..self
        }
    }
}

/// Metadata describing the shape of a successful result document.
///
/// Emitted as the header of the streamed response body, ahead of any rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultModel {
    /// Name of the result set, typically the cube that produced it
    pub name: String,
    /// Column names, in row order
    pub columns: Vec<String>,
}
