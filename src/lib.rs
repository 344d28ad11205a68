pub mod api;
pub mod config;
pub mod cursor;
pub mod db;
pub(crate) mod disk;
pub(crate) mod txn;
#[cfg(feature = "typed")]
pub mod typed;
pub mod util;

pub use api::compare::Comparator;
pub use api::error::{Error, Result};
pub use api::tree::PutMode;
pub use api::Store;
pub use config::Config;
pub use cursor::Direction;
pub use db::Database;
