//! Concrete adapters for external services.

pub mod forcedecks;
