//! Infrastructure layer: event store, aggregate repository, read models,
//! projections and replay, configuration.

pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod repository;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, InfraConfig};
pub use repository::{AggregateRepository, Loaded, RepositoryError, UnknownEventPolicy};
