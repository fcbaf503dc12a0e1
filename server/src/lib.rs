//! Giveaway claim-queue core: item registry, per-item FIFO claim queue,
//! lifecycle coordinator and reclamation loop (see `../../SPEC_FULL.md`).
//!
//! Every module in this crate is a plain async function surface over a
//! `sqlx::PgPool` — there is no in-process global state that participates
//! in correctness. The HTTP adapter in `http` is a thin, replaceable
//! transport on top of that surface.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod models;
pub mod queue;
pub mod reclamation;
pub mod registry;
pub mod validation;
