//! Makefile generation from recorded steps
//!
//! The final invocation of a build reads every sidecar back, sorts the
//! compiled sources into the core, variant, library and sketch groups,
//! gathers the sketch compiler flags, takes project metadata from the link
//! step and renders the Makefile template with the result.

mod sources;

pub use sources::{source_block, sketch_flags, SourceGroup};

use crate::path::to_msys_path;
use crate::step::StepRecord;
use crate::store::{SidecarStore, StoreError};
use crate::template::{rendered_name, ReplacementMap, Template, TemplateError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CFLAGS_TOKEN: &str = "ARDUINO_CFLAGS";
pub const PROJECT_NAME_TOKEN: &str = "ARDUINO_PROJECT_NAME";
pub const SYSTEM_PATH_TOKEN: &str = "ARDUINO_SYSTEM_PATH";
pub const BUILD_PATH_TOKEN: &str = "ARDUINO_BUILD_PATH";
pub const CORE_PATH_TOKEN: &str = "ARDUINO_CORE_PATH";
pub const VARIANT_PATH_TOKEN: &str = "ARDUINO_VARIANT_PATH";
pub const ARCHIVE_FILE_TOKEN: &str = "ARDUINO_ARCHIVE_FILE";
pub const CORES_SRCS_TOKEN: &str = "ARDUINO_CORES_SRCS";
pub const VARIANT_SRCS_TOKEN: &str = "ARDUINO_VARIANT_SRCS";
pub const LIBRARIES_SRCS_TOKEN: &str = "ARDUINO_LIBRARIES_SRCS";
pub const SKETCH_SRCS_TOKEN: &str = "ARDUINO_SKETCH_SRCS";
pub const VARIANT_TOKEN: &str = "ARDUINO_VARIANT";
pub const PLATFORM_VERSION_TOKEN: &str = "ARDUINO_PLATFORM_VERSION";

#[derive(Debug, Error)]
pub enum AggregateError {
    /// No link step was recorded, so there is no project to describe
    #[error("No link step (ld) recorded under {0}; was the build run to completion?")]
    MissingLinkStep(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Inputs to Makefile generation that do not come from the sidecars
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub build_path: String,
    pub core_path: String,
    pub variant_path: String,
    pub variant_name: String,
    pub platform_version: String,
    pub template: PathBuf,
    /// Explicit output file; a bare file name lands in the build directory
    pub makefile: Option<PathBuf>,
    /// Leave sidecars and snapshots in place
    pub keep_intermediates: bool,
}

impl AggregateOptions {
    /// Where the rendered Makefile is written
    pub fn output_path(&self) -> PathBuf {
        let build_root = Path::new(&self.build_path);
        match &self.makefile {
            Some(makefile) if has_parent(makefile) => makefile.clone(),
            Some(makefile) => build_root.join(makefile),
            None => build_root.join(rendered_name(&self.template)),
        }
    }
}

fn has_parent(path: &Path) -> bool {
    path.parent()
        .map(|p| !p.as_os_str().is_empty())
        .unwrap_or(false)
}

/// Outcome of a successful generation
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub output: PathBuf,
    pub records: usize,
    pub removed: usize,
}

/// Sidecars read back from the store, sorted by name
#[derive(Debug, Clone, Default)]
pub struct RecordedSteps {
    pub names: Vec<String>,
    pub records: Vec<StepRecord>,
}

impl RecordedSteps {
    /// Reads every sidecar; unreadable or vanished ones are skipped
    pub fn load(store: &dyn SidecarStore) -> Result<Self, StoreError> {
        let mut names = store.list()?;
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in &names {
            match store.get(name) {
                Ok(record) => records.push(record),
                Err(e) if e.is_not_found() => debug!(sidecar = %name, "Sidecar vanished"),
                Err(e) => warn!(sidecar = %name, error = %e, "Skipping unreadable sidecar"),
            }
        }

        Ok(Self { names, records })
    }

    /// The link step supplying project metadata; the first one by sidecar
    /// name when several exist
    pub fn link_step(&self) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.is_link())
    }
}

/// Builds the replacement map for the Makefile template.
///
/// Aggregation keys override entries carried over from `base`.
pub fn replacement_map(
    steps: &RecordedSteps,
    options: &AggregateOptions,
    base: ReplacementMap,
) -> Result<ReplacementMap, AggregateError> {
    let link = steps
        .link_step()
        .ok_or_else(|| AggregateError::MissingLinkStep(options.build_path.clone()))?;

    let group = |g: SourceGroup| source_block(&steps.records, g, options);

    let mut map = base;
    let mut set = |key: &str, value: String| {
        map.insert(key.to_string(), value);
    };

    set(CFLAGS_TOKEN, sketch_flags(&steps.records).join(" "));
    set(PROJECT_NAME_TOKEN, to_msys_path(&link.project_name));
    set(SYSTEM_PATH_TOKEN, to_msys_path(&link.system_path));
    set(BUILD_PATH_TOKEN, to_msys_path(&link.build_path));
    set(CORE_PATH_TOKEN, to_msys_path(&link.core_path));
    set(VARIANT_PATH_TOKEN, to_msys_path(&link.variant_path));
    set(ARCHIVE_FILE_TOKEN, to_msys_path(&link.archive_file));
    set(CORES_SRCS_TOKEN, group(SourceGroup::Core));
    set(VARIANT_SRCS_TOKEN, group(SourceGroup::Variant));
    set(LIBRARIES_SRCS_TOKEN, group(SourceGroup::Libraries));
    set(SKETCH_SRCS_TOKEN, group(SourceGroup::Sketch));
    set(VARIANT_TOKEN, options.variant_name.clone());
    set(PLATFORM_VERSION_TOKEN, options.platform_version.clone());

    Ok(map)
}

/// Writes `content` next to `path` and renames it into place
pub fn replace_file(path: &Path, content: &str) -> Result<(), AggregateError> {
    let write_err = |source| AggregateError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    fs::write(&staging, content).map_err(write_err)?;
    fs::rename(&staging, path).map_err(|source| {
        let _ = fs::remove_file(&staging);
        AggregateError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Generates the Makefile from everything recorded in `store`
pub struct Aggregator<'a> {
    store: &'a dyn SidecarStore,
    options: AggregateOptions,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a dyn SidecarStore, options: AggregateOptions) -> Self {
        Self { store, options }
    }

    /// Renders the Makefile text without writing or cleaning anything
    pub fn render(&self, steps: &RecordedSteps) -> Result<String, AggregateError> {
        let base = self.store.read_preproc()?.unwrap_or_default();
        let map = replacement_map(steps, &self.options, base)?;
        debug!(tokens = map.len(), "Replacement map ready");

        let template = Template::load(&self.options.template)?;
        for token in template.tokens() {
            if !map.contains_key(token) {
                debug!(token, "No value for template token, its line is kept as is");
            }
        }
        Ok(template.render(&map))
    }

    pub fn run(&self) -> Result<AggregateReport, AggregateError> {
        let steps = RecordedSteps::load(self.store)?;
        info!(
            sidecars = steps.names.len(),
            build_path = %self.options.build_path,
            "Generating Makefile"
        );

        let content = self.render(&steps)?;
        let output = self.options.output_path();
        replace_file(&output, &content)?;
        info!(output = %output.display(), "Wrote Makefile");

        let removed = if self.options.keep_intermediates {
            debug!("Keeping sidecar files");
            0
        } else {
            self.cleanup(&steps)
        };

        Ok(AggregateReport {
            output,
            records: steps.records.len(),
            removed,
        })
    }

    fn cleanup(&self, steps: &RecordedSteps) -> usize {
        let mut removed = 0;
        for name in &steps.names {
            match self.store.delete(name) {
                Ok(()) => removed += 1,
                Err(e) => warn!(sidecar = %name, error = %e, "Failed to remove sidecar"),
            }
        }
        if let Err(e) = self.store.clear_snapshots() {
            warn!(error = %e, "Failed to remove stage/preproc snapshots");
        }
        removed
    }
}
