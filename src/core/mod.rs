pub mod app;
pub mod builtin_providers;
pub mod catalog;
pub mod chooser;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod interrupt;
pub mod json_path;
pub mod message;
pub mod model_rules;
pub mod providers;
pub mod session;
