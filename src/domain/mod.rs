pub mod config_cache;
pub mod gate;
pub mod lifecycle;
pub mod logs;
pub mod models;
pub mod permissions;
pub mod ports;
pub mod service;
