pub mod commands;
pub mod handlers;

pub use commands::{normalize_args, CliArgs};
pub use handlers::handle_invocation;
