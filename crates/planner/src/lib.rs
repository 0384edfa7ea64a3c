pub mod copy_command;
pub mod query;
