pub mod archive;
pub mod command;
pub mod config;
pub mod constants;
pub mod database;
mod db;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod retention;
pub mod storage;
pub mod upload;

pub use dispatcher::JobDispatcher;
pub use error::{BackupError, Result};
