//! bd-api: player reputation aggregator.
//!
//! Scrapes SourceBans sites, league ban lists, community BD lists, logs.tf and
//! serveme.tf into a relational store, and assembles composite player
//! profiles from it on demand.

pub mod app;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod services;
pub mod storage;
pub mod utils;

pub use app::App;
pub use error::{AppError, Result};
