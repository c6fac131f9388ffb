//! Database layer
//!
//! SQLite is the default (single-binary deployment); MySQL is selected through
//! `database.driver` in the configuration. Everything above this module talks
//! to the repository traits in [`repositories`].

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
