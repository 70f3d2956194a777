//! Per-invocation configuration
//!
//! Each run of the tool is configured by the IDE's recipe line plus a few
//! environment variables. [`InvocationConfig`] gathers both into the values
//! the recipe handlers work with.
//!
//! # Environment Variables
//!
//! - `GENMF_LOG_LEVEL`: Logging level when neither `--log-level` nor a
//!   verbosity switch is given - default: derived from verbosity
//! - `GENMF_LOG_JSON`: Emit JSON log lines (true|false) - default: "false"
//! - `NUMBER_OF_PROCESSORS`: Parallel make jobs when `-make.processnum` is unset
//! - `MAKEFLAGS`: Extended with `-j<N>` for the `make` recipe
//!
//! # Verbosity
//!
//! `-verbose=<n>` sets the level directly. Otherwise it is 3, lowered to 0
//! by `-w` and raised to 5 by `-Wall` or 9 by `-Wextra`. At
//! [`KEEP_INTERMEDIATES_VERBOSITY`] and above the sidecar files survive the
//! Makefile generation.

use crate::cli::CliArgs;
use crate::step::{Recipe, StepRecord};
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::Level;

const DEFAULT_VERBOSITY: i32 = 3;
const QUIET_VERBOSITY: i32 = 0;
const WALL_VERBOSITY: i32 = 5;
const WEXTRA_VERBOSITY: i32 = 9;

/// Verbosity from which sidecars and snapshots are kept after aggregation
pub const KEEP_INTERMEDIATES_VERBOSITY: i32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A recipe was invoked without an option it depends on
    #[error("Recipe '{recipe}' requires the -{option} option")]
    MissingOption { recipe: Recipe, option: &'static str },
}

/// Paths and names describing the build, as handed over by the IDE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildContext {
    pub build_path: String,
    pub core_path: String,
    pub system_path: String,
    pub variant_path: String,
    pub variant_name: String,
    pub project_name: String,
    pub archive_file: String,
    pub serial_port: String,
    pub platform_version: String,
}

/// Toolchain directories prepended to the child search path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    pub cmds: Option<PathBuf>,
    pub compiler: Option<PathBuf>,
    pub uploader: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeOptions {
    pub command: String,
    /// Explicit job count; `None` means one job per processor
    pub jobs: Option<u32>,
}

impl Default for MakeOptions {
    fn default() -> Self {
        Self {
            command: "make".to_string(),
            jobs: None,
        }
    }
}

impl MakeOptions {
    /// Job count for `-j`: the explicit count, else `NUMBER_OF_PROCESSORS`,
    /// else the parallelism the OS reports.
    pub fn effective_jobs(&self) -> u32 {
        if let Some(jobs) = self.jobs {
            return jobs;
        }

        env::var("NUMBER_OF_PROCESSORS")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .or_else(|| {
                std::thread::available_parallelism()
                    .ok()
                    .map(|n| n.get() as u32)
            })
            .unwrap_or(1)
    }
}

/// Everything one invocation needs
#[derive(Debug, Clone, Default)]
pub struct InvocationConfig {
    /// Raw recipe name as given on the command line
    pub recipe_name: Option<String>,
    pub stage: String,
    pub source: String,
    pub target: String,
    pub context: BuildContext,
    pub tools: ToolPaths,
    pub make: MakeOptions,
    pub template: Option<PathBuf>,
    pub makefile: Option<PathBuf>,
    pub verbosity: i32,
    pub show_version: bool,
    /// Pass-through arguments after the recognised options
    pub flags: Vec<String>,
}

impl InvocationConfig {
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            recipe_name: args.recipe.clone(),
            stage: args.stage.clone(),
            source: args.source.clone(),
            target: args.target.clone(),
            context: BuildContext {
                build_path: args.build_path.clone(),
                core_path: args.core_path.clone(),
                system_path: args.system_path.clone(),
                variant_path: args.variant_path.clone(),
                variant_name: args.variant_name.clone(),
                project_name: args.project_name.clone(),
                archive_file: args.archive_file.clone(),
                serial_port: args.serial_port.clone(),
                platform_version: args.platform_version.clone(),
            },
            tools: ToolPaths {
                cmds: non_empty(&args.cmds_path),
                compiler: non_empty(&args.compiler_path),
                uploader: non_empty(&args.uploader_path),
            },
            make: MakeOptions {
                command: args.make_command.clone(),
                jobs: u32::try_from(args.make_processnum).ok().filter(|n| *n > 0),
            },
            template: non_empty(&args.template),
            makefile: non_empty(&args.makefile),
            verbosity: resolve_verbosity(args),
            show_version: args.version,
            flags: args.flags.clone(),
        }
    }

    /// Whether aggregation should leave sidecars and snapshots in place
    pub fn keep_intermediates(&self) -> bool {
        self.verbosity >= KEEP_INTERMEDIATES_VERBOSITY
    }

    /// Log level matching the verbosity
    pub fn log_level(&self) -> Level {
        verbosity_level(self.verbosity)
    }

    /// The step record this invocation describes
    pub fn step_record(&self, recipe: Recipe) -> StepRecord {
        StepRecord {
            stage: self.stage.clone(),
            recipe: recipe.as_str().to_string(),
            source: self.source.clone(),
            target: self.target.clone(),
            flags: self.flags.clone(),
            build_path: self.context.build_path.clone(),
            core_path: self.context.core_path.clone(),
            system_path: self.context.system_path.clone(),
            variant_path: self.context.variant_path.clone(),
            project_name: self.context.project_name.clone(),
            archive_file: self.context.archive_file.clone(),
            serial_port: self.context.serial_port.clone(),
        }
    }

    /// Checks that the options `recipe` depends on are present
    pub fn validate(&self, recipe: Recipe) -> Result<(), ConfigError> {
        let needs_build_path = !matches!(recipe, Recipe::Echo | Recipe::Make);
        if needs_build_path && self.context.build_path.is_empty() {
            return Err(ConfigError::MissingOption {
                recipe,
                option: "build.path",
            });
        }

        let needs_template = matches!(recipe, Recipe::Makefile) || recipe.is_preproc();
        if needs_template && self.template.is_none() {
            return Err(ConfigError::MissingOption {
                recipe,
                option: "template",
            });
        }

        Ok(())
    }
}

impl fmt::Display for InvocationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Invocation:")?;
        writeln!(f, "  Recipe: {}", self.recipe_name.as_deref().unwrap_or("-"))?;
        writeln!(f, "  Stage: {}", self.stage)?;
        writeln!(f, "  Source: {}", self.source)?;
        writeln!(f, "  Target: {}", self.target)?;
        writeln!(f, "  Build Path: {}", self.context.build_path)?;
        writeln!(f, "  Verbosity: {}", self.verbosity)?;
        writeln!(f, "  Flags: {}", self.flags.join(" "))?;
        Ok(())
    }
}

/// Verbosity from `-verbose`, or derived from the warning switches
pub fn resolve_verbosity(args: &CliArgs) -> i32 {
    if args.verbose != -1 {
        return args.verbose;
    }

    if args.warnings_extra {
        WEXTRA_VERBOSITY
    } else if args.warnings_all {
        WALL_VERBOSITY
    } else if args.warnings_off {
        QUIET_VERBOSITY
    } else {
        DEFAULT_VERBOSITY
    }
}

/// Maps a verbosity number onto a log level
pub fn verbosity_level(verbosity: i32) -> Level {
    match verbosity {
        i32::MIN..=0 => Level::WARN,
        1..=5 => Level::INFO,
        6..=8 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn non_empty(path: &str) -> Option<PathBuf> {
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
