use genmf::cli::{handle_invocation, CliArgs};
use genmf::config::InvocationConfig;
use genmf::util::logging::resolve_level;
use genmf::util::{init_logging, LoggingConfig};
use genmf::VERSION;

use tracing::debug;

fn main() {
    let args = CliArgs::parse_ide(std::env::args_os());
    let config = InvocationConfig::from_args(&args);

    let level = resolve_level(args.log_level.as_deref(), config.log_level());
    init_logging(LoggingConfig::with_level(level).with_env());

    debug!("genmf v{} starting", VERSION);
    debug!("Arguments: {:?}", args);
    debug!("{}", config);

    let exit_code = handle_invocation(&config);

    std::process::exit(exit_code);
}
