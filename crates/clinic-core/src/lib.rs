//! clinic-core library.
//!
//! Group roster reconciliation and the case lifecycle state machine for the
//! legal-clinic tracker, backed by a transactional SQLite store.
//!
//! # Conventions
//!
//! - **Errors**: domain operations return [`error::ClinicResult`]; setup and
//!   plumbing (opening the database, loading config) use `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Actors**: every mutating call takes an explicit
//!   [`model::actor::ActorContext`]; there is no ambient current user.

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod identity;
pub mod lifecycle;
pub mod model;
pub mod roster;
