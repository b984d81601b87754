//! Bidirectional, ordered schema migrations with an applied-state ledger.

pub mod descriptor;
pub mod errors;
pub mod ledger;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod sql;

pub use descriptor::Migration;
pub use errors::{Error, Result};
pub use registry::Registry;
pub use runner::{MigrationState, MigrationStatus, PlannedStep, Rollback, RunReport, Runner};
