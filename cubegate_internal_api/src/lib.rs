//! Interface between the cubegate HTTP facade and downstream query
//! processors.
//!
//! The facade depends only on the [`QueryProcessor`] trait and resolves each
//! submitted unit through the single-assignment primitive in [`outcome`];
//! concrete engine bindings live with their deployment, outside this
//! workspace.
//!
//! [`QueryProcessor`]: query_processor::QueryProcessor

pub mod outcome;
pub mod query_processor;

pub use outcome::{Outcome, OutcomeCallbacks, OutcomeHandle, ProcessorHangup, outcome_channel};
pub use query_processor::{
    DispatchUnit, ProcessorError, ProcessorFailure, QueryProcessor, Row, SendableRowStream,
};
