//! lf-core - Core library for Linkfill
//!
//! This crate provides the shared record identifiers, the association link
//! type, configuration parsing for `linkfill.yml`, and SQL identifier helpers
//! used across all Linkfill components.

pub mod config;
pub mod error;
pub mod ids;
pub mod link;
pub mod sql_utils;

pub use config::{
    AssociationConfig, BackfillConfig, Config, DefaultTargetConfig, DefaultTargetSource,
    UnitOfWork, DEFAULT_BATCH_SIZE,
};
pub use error::{CoreError, CoreResult};
pub use ids::{SourceId, TargetId};
pub use link::AssociationLink;
