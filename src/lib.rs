//! warehouse-exec - resilient SQL execution for Redshift and PostgreSQL-wire
//! warehouses.
//!
//! The [`query::ExecutionGateway`] runs statements over one connection,
//! classifying every failure: ignored, interpreted as a success, retried
//! after a backoff, or fatal.

pub mod config;
pub mod db;
pub mod error;
pub mod failure;
pub mod logging;
pub mod query;
