pub mod config;
pub mod container;
pub mod names;
pub mod permission;
pub mod project;
pub mod service;
