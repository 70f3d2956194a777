//! genmf - Makefile generator driven by IDE build recipes
//!
//! The IDE runs one command per build step. Pointing those recipes at
//! `genmf` records each step instead of compiling it, and a final
//! `makefile` recipe turns the recorded steps into a standalone Makefile.
//!
//! # Core Concepts
//!
//! - **Recipe**: the kind of step being run ([`step::Recipe`]), e.g. a C
//!   compile (`c.o`), an archive (`ar`) or the final `makefile`
//! - **Sidecar**: a `.genmf` JSON file in the build directory holding one
//!   recorded step ([`step::StepRecord`])
//! - **Stage**: the build phase (`core`, `libraries`, `sketch`) that steps
//!   are attributed to, set by the `stage` recipe
//! - **Template**: a Makefile with `###<<<TOKEN>>>###` markers that are
//!   replaced by values collected from the sidecars
//!
//! # Example Usage
//!
//! ```no_run
//! use genmf::aggregate::{AggregateOptions, Aggregator};
//! use genmf::store::FsSidecarStore;
//!
//! let store = FsSidecarStore::new("/tmp/build");
//! let options = AggregateOptions {
//!     build_path: "/tmp/build".to_string(),
//!     template: "/hw/Makefile.template".into(),
//!     ..Default::default()
//! };
//! let report = Aggregator::new(&store, options).run()?;
//! println!("Wrote {}", report.output.display());
//! # Ok::<(), genmf::aggregate::AggregateError>(())
//! ```
//!
//! # Project Structure
//!
//! - [`cli`]: argument parsing and per-recipe handlers
//! - [`step`]: recipes, step records and sidecar naming
//! - [`store`]: sidecar persistence
//! - [`aggregate`]: Makefile generation from recorded steps
//! - [`preproc`]: include and macro discovery passes
//! - [`exec`]: running make and the toolchain

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod exec;
pub mod path;
pub mod preproc;
pub mod step;
pub mod store;
pub mod template;
pub mod util;

pub use aggregate::{AggregateError, AggregateOptions, Aggregator};
pub use config::{ConfigError, InvocationConfig};
pub use exec::{ExecError, Executor};
pub use step::{Recipe, StepKey, StepRecord};
pub use store::{FsSidecarStore, MemorySidecarStore, SidecarStore, StoreError};
pub use template::{ReplacementMap, Template, TemplateError};
pub use util::{init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
