pub mod compose_cli;
pub mod docker;
