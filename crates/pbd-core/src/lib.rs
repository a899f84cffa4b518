pub mod config;
pub mod logging;

pub mod concurrency;
pub mod fetch;
pub mod identity;
pub mod input;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod url_model;
