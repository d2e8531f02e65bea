//! chatflow webhook server.
//!
//! Receives provider webhooks over HTTP and hands them to the workflow
//! engine, backed by Postgres stores.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
