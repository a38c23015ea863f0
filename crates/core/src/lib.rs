//! Shared domain types for the airlock job broker.
//!
//! This crate is dependency-light on purpose: it holds the pieces every
//! other crate needs (the domain error enum, ID/timestamp aliases, and
//! submission payload validation) without pulling in the web or database
//! stacks.

pub mod error;
pub mod schema;
pub mod types;

pub use error::CoreError;
pub use schema::PayloadSchema;
