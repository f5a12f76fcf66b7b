pub mod command;
pub mod runner;

pub use command::{Platform, build};
pub use runner::{ProcessRunner, SystemRunner, resolve_program};
