//! Adapters that live inside the domain crate for convenience.
//!
//! Intended for unit tests and local demos. Durable adapters (DynamoDB,
//! SQLite) live in their own crates under `adapters/`.

pub mod memory_repo;
