mod account;
mod inventory;
mod job;
mod record;

// Account commands
pub use account::run_account_command;

// Inventory commands
pub use inventory::run_inventory_command;

// Job commands
pub use job::{run_job, run_job_command};

// Record commands
pub use record::{list_executions, list_records};
