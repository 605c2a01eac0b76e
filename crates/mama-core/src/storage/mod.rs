//! Storage layer: SQLite backend with migrations.

pub mod migrations;
mod sqlite;

pub use sqlite::Storage;

pub(crate) use sqlite::{append_audit, row_to_entity, row_to_link, ENTITY_COLUMNS, LINK_COLUMNS};
