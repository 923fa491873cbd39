pub mod characters;
pub mod chat;
pub mod config_cmd;
pub mod estimate;
pub mod history;
pub mod pricing;
