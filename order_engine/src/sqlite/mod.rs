//! SQLite backend for the order engine.
//!
//! [`SqliteDatabase`] implements every backend trait. The low-level queries live in [`db`] and take a connection, so
//! they can be composed inside a single transaction.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
