//! Database bootstrap for the sync system: schema migrations.

pub mod migration;

pub use migration::run_migrations;
