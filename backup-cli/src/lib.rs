// 私有模块声明
mod app;
mod cli;
mod commands;
mod init;
mod utils;

// 通过 pub use 精确控制对外暴露的接口
pub use app::CliApp;
pub use cli::{AccountCommand, Cli, Commands, InventoryCommand, JobAddArgs, JobCommand};
pub use init::run_init;
pub use utils::setup_logging;
