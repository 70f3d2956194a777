//! Include and macro discovery passes
//!
//! Before compiling, the IDE preprocesses the sketch twice: once to list
//! the headers it includes and once to dump its macros. Both passes run
//! through a generated Makefile so that they see the same toolchain setup
//! as the real build. The replacement entries written here accumulate in
//! the preprocessing snapshot and are picked up again when the final
//! Makefile is generated.

use crate::aggregate::{replace_file, AggregateError};
use crate::diagnostics::annotate_from_disk;
use crate::exec::{ExecError, Executor};
use crate::path::{normalize_path_flag, to_msys_path};
use crate::step::Recipe;
use crate::store::{SidecarStore, StoreError};
use crate::template::{rendered_name, ReplacementMap, Template, TemplateError};
use std::io::{BufRead, Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Starts the group of flags passed to the preprocessor
pub const INCLUDES_GROUP: &str = "-includes";
/// Starts the group of extra arguments passed to make
pub const MAKE_ARGS_GROUP: &str = "-make-args";

#[derive(Debug, Error)]
pub enum PreprocError {
    #[error("{0} is not a preprocessing recipe")]
    NotPreproc(Recipe),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Write(#[from] AggregateError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Which discovery pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocPass {
    Includes,
    Macros,
}

impl PreprocPass {
    pub fn from_recipe(recipe: Recipe) -> Option<Self> {
        match recipe {
            Recipe::PreprocIncludes => Some(PreprocPass::Includes),
            Recipe::PreprocMacros => Some(PreprocPass::Macros),
            _ => None,
        }
    }

    pub fn recipe(&self) -> Recipe {
        match self {
            PreprocPass::Includes => Recipe::PreprocIncludes,
            PreprocPass::Macros => Recipe::PreprocMacros,
        }
    }

    fn token_prefix(&self) -> &'static str {
        match self {
            PreprocPass::Includes => "ARDUINO_PREPROC_INCLUDES",
            PreprocPass::Macros => "ARDUINO_PREPROC_MACROS",
        }
    }

    pub fn flags_token(&self) -> String {
        format!("{}_FLAGS", self.token_prefix())
    }

    pub fn source_token(&self) -> String {
        format!("{}_SOURCE", self.token_prefix())
    }

    pub fn outfile_token(&self) -> String {
        format!("{}_OUTFILE", self.token_prefix())
    }
}

/// Pass-through flags split into preprocessor flags and make arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocFlags {
    pub includes: Vec<String>,
    pub make_args: Vec<String>,
}

impl PreprocFlags {
    /// Splits on the `-includes` / `-make-args` markers. Flags before any
    /// marker count as preprocessor flags.
    pub fn parse(flags: &[String]) -> Self {
        let mut parsed = Self::default();
        let mut in_make_args = false;

        for flag in flags {
            match flag.as_str() {
                INCLUDES_GROUP => in_make_args = false,
                MAKE_ARGS_GROUP => in_make_args = true,
                _ if in_make_args => parsed.make_args.push(flag.clone()),
                _ if flag.starts_with("-I") => parsed.includes.push(normalize_path_flag(flag)),
                _ => parsed.includes.push(flag.clone()),
            }
        }

        parsed
    }
}

/// Inputs of one preprocessing pass
#[derive(Debug, Clone)]
pub struct PreprocRequest {
    pub pass: PreprocPass,
    pub build_path: String,
    pub system_path: String,
    pub variant_path: String,
    pub source: String,
    pub target: String,
    pub template: PathBuf,
    /// Name of the generated Makefile inside the build directory
    pub makefile: Option<PathBuf>,
    pub make_command: String,
    pub flags: PreprocFlags,
}

impl PreprocRequest {
    /// Entries this pass contributes to the replacement map
    pub fn replacements(&self) -> ReplacementMap {
        let mut map = ReplacementMap::new();
        map.insert(
            "ARDUINO_SYSTEM_PATH".to_string(),
            to_msys_path(&self.system_path),
        );
        map.insert(
            "ARDUINO_VARIANT_PATH".to_string(),
            to_msys_path(&self.variant_path),
        );
        map.insert(
            self.pass.flags_token(),
            format!("\t{}", self.flags.includes.join(" ")),
        );
        map.insert(
            self.pass.source_token(),
            format!("\t{}", to_msys_path(&self.source)),
        );
        map.insert(
            self.pass.outfile_token(),
            format!("\t{}", to_msys_path(&self.target)),
        );
        map
    }

    /// Arguments for make: silent, run in the build directory, extra
    /// arguments, then the pass's recipe as the goal
    pub fn make_args(&self) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            "-C".to_string(),
            to_msys_path(&self.build_path),
        ];
        args.extend(self.flags.make_args.iter().cloned());
        args.push(self.pass.recipe().to_string());
        args
    }

    pub fn output_path(&self) -> PathBuf {
        let name = match &self.makefile {
            Some(makefile) => makefile.clone(),
            None => PathBuf::from(rendered_name(&self.template)),
        };
        Path::new(&self.build_path).join(name)
    }
}

/// Runs preprocessing passes against a store and an executor
pub struct PreprocDriver<'a> {
    store: &'a dyn SidecarStore,
    executor: &'a Executor,
}

impl<'a> PreprocDriver<'a> {
    pub fn new(store: &'a dyn SidecarStore, executor: &'a Executor) -> Self {
        Self { store, executor }
    }

    /// Merges this pass's entries into the snapshot and renders the
    /// Makefile; returns the file written
    pub fn prepare(&self, request: &PreprocRequest) -> Result<PathBuf, PreprocError> {
        let mut map = self.store.read_preproc()?.unwrap_or_default();
        map.extend(request.replacements());
        self.store.write_preproc(&map)?;

        let content = Template::load(&request.template)?.render(&map);
        let output = request.output_path();
        replace_file(&output, &content)?;
        debug!(makefile = %output.display(), "Wrote preprocessing Makefile");
        Ok(output)
    }

    /// Prepares and runs the pass. Compiler diagnostics are echoed to
    /// `diagnostics` with source context for missing includes. Returns
    /// make's exit code.
    pub fn run<W: Write>(&self, request: &PreprocRequest, diagnostics: &mut W) -> Result<i32, PreprocError> {
        self.prepare(request)?;

        let output = self
            .executor
            .run_captured(&request.make_command, &request.make_args())?;

        if !output.success() {
            warn!(recipe = %request.pass.recipe(), code = output.code, "Preprocessing failed");
        }

        for line in Cursor::new(&output.stdout).split(b'\n') {
            match line {
                Ok(line) => debug!(target: "genmf::make", "{}", String::from_utf8_lossy(&line)),
                Err(_) => break,
            }
        }

        if let Err(e) = annotate_from_disk(Cursor::new(&output.stderr), diagnostics) {
            warn!(error = %e, "Failed to echo compiler diagnostics");
        }
        Ok(output.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySidecarStore;
    use std::fs;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn request(dir: &TempDir, pass: PreprocPass, make_command: &str) -> PreprocRequest {
        let template = dir.path().join("preproc.mk.template");
        fs::write(
            &template,
            "FLAGS=###<<<ARDUINO_PREPROC_INCLUDES_FLAGS>>>###\n\
             MACROS=###<<<ARDUINO_PREPROC_MACROS_SOURCE>>>###\n",
        )
        .unwrap();

        PreprocRequest {
            pass,
            build_path: dir.path().to_string_lossy().into_owned(),
            system_path: "C:\\hw\\system".to_string(),
            variant_path: "/hw/variants/uno".to_string(),
            source: "C:\\build\\sketch\\Blink.ino.cpp".to_string(),
            target: "C:\\build\\preproc\\out.txt".to_string(),
            template,
            makefile: None,
            make_command: make_command.to_string(),
            flags: PreprocFlags::parse(&strings(&["-includes", "-IC:\\libs", "-DX"])),
        }
    }

    #[test]
    fn test_parse_flag_groups() {
        let flags = PreprocFlags::parse(&strings(&[
            "-w",
            "-includes",
            "-IC:\\hw\\cores",
            "-DARDUINO=10806",
            "-make-args",
            "V=1",
            "-k",
            "-includes",
            "-I/x",
        ]));

        assert_eq!(flags.includes, vec!["-w", "-I/c/hw/cores", "-DARDUINO=10806", "-I/x"]);
        assert_eq!(flags.make_args, vec!["V=1", "-k"]);
    }

    #[test]
    fn test_replacements_per_pass() {
        let dir = TempDir::new().unwrap();
        let includes = request(&dir, PreprocPass::Includes, "make").replacements();
        assert_eq!(includes["ARDUINO_SYSTEM_PATH"], "/c/hw/system");
        assert_eq!(includes["ARDUINO_PREPROC_INCLUDES_FLAGS"], "\t-I/c/libs -DX");
        assert_eq!(
            includes["ARDUINO_PREPROC_INCLUDES_SOURCE"],
            "\t/c/build/sketch/Blink.ino.cpp"
        );
        assert_eq!(includes["ARDUINO_PREPROC_INCLUDES_OUTFILE"], "\t/c/build/preproc/out.txt");
        assert!(!includes.contains_key("ARDUINO_PREPROC_MACROS_FLAGS"));

        let macros = request(&dir, PreprocPass::Macros, "make").replacements();
        assert!(macros.contains_key("ARDUINO_PREPROC_MACROS_OUTFILE"));
        assert!(!macros.contains_key("ARDUINO_PREPROC_INCLUDES_FLAGS"));
    }

    #[test]
    fn test_make_args() {
        let dir = TempDir::new().unwrap();
        let mut req = request(&dir, PreprocPass::Macros, "make");
        req.build_path = "C:\\build".to_string();
        req.flags.make_args = strings(&["V=1"]);

        assert_eq!(
            req.make_args(),
            vec!["-s", "-C", "/c/build", "V=1", "preproc.macros"]
        );
    }

    #[test]
    fn test_prepare_accumulates_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = MemorySidecarStore::new();
        let executor = Executor::default();
        let driver = PreprocDriver::new(&store, &executor);

        driver.prepare(&request(&dir, PreprocPass::Includes, "make")).unwrap();
        let output = driver.prepare(&request(&dir, PreprocPass::Macros, "make")).unwrap();

        let snapshot = store.read_preproc().unwrap().unwrap();
        assert!(snapshot.contains_key("ARDUINO_PREPROC_INCLUDES_FLAGS"));
        assert!(snapshot.contains_key("ARDUINO_PREPROC_MACROS_SOURCE"));

        assert_eq!(output, dir.path().join("preproc.mk"));
        assert_eq!(
            fs::read_to_string(output).unwrap(),
            "FLAGS=\t-I/c/libs -DX\nMACROS=\t/c/build/sketch/Blink.ino.cpp\n"
        );
    }

    /// Writes an executable shell script standing in for make
    #[cfg(unix)]
    fn fake_make(dir: &TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-make.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    struct BrokenPipe;

    #[cfg(unix)]
    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_echoes_non_utf8_stderr() {
        let dir = TempDir::new().unwrap();
        let make = fake_make(
            &dir,
            r"printf 'warning: first\n    3 | // comment \202\240 sjis\nwarning: last line\n' >&2",
        );
        let store = MemorySidecarStore::new();
        let executor = Executor::default();
        let driver = PreprocDriver::new(&store, &executor);

        let mut diagnostics = Vec::new();
        let code = driver
            .run(&request(&dir, PreprocPass::Includes, &make), &mut diagnostics)
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(
            diagnostics,
            b"warning: first\n    3 | // comment \x82\xa0 sjis\nwarning: last line\n".to_vec()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_annotates_missing_include() {
        let dir = TempDir::new().unwrap();
        let sketch = dir.path().join("Blink.ino.cpp");
        fs::write(&sketch, "#line 1\n#include <Servo.h>\nvoid setup() {}\n").unwrap();

        let make = fake_make(
            &dir,
            &format!(
                "echo '{}:2:10: fatal error: Servo.h: No such file or directory' >&2\n\
                 echo 'compilation terminated.' >&2\n\
                 exit 2",
                sketch.display()
            ),
        );
        let store = MemorySidecarStore::new();
        let executor = Executor::default();
        let driver = PreprocDriver::new(&store, &executor);

        let mut diagnostics = Vec::new();
        let code = driver
            .run(&request(&dir, PreprocPass::Includes, &make), &mut diagnostics)
            .unwrap();

        assert_eq!(code, 2);
        assert_eq!(
            String::from_utf8(diagnostics).unwrap(),
            format!(
                "{}:2:10: fatal error: Servo.h: No such file or directory\n \
                 #include <Servo.h>\n          ^\ncompilation terminated.\n",
                sketch.display()
            )
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_echo_keeps_make_exit_code() {
        let dir = TempDir::new().unwrap();
        let make = fake_make(&dir, "echo 'warning: x' >&2\nexit 3");
        let store = MemorySidecarStore::new();
        let executor = Executor::default();
        let driver = PreprocDriver::new(&store, &executor);

        let code = driver
            .run(&request(&dir, PreprocPass::Macros, &make), &mut BrokenPipe)
            .unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_propagates_exit_code() {
        let dir = TempDir::new().unwrap();
        let store = MemorySidecarStore::new();
        let executor = Executor::default();
        let driver = PreprocDriver::new(&store, &executor);

        let mut diagnostics = Vec::new();
        let code = driver
            .run(&request(&dir, PreprocPass::Includes, "false"), &mut diagnostics)
            .unwrap();
        assert_eq!(code, 1);

        let code = driver
            .run(&request(&dir, PreprocPass::Includes, "true"), &mut diagnostics)
            .unwrap();
        assert_eq!(code, 0);
        assert!(diagnostics.is_empty());
    }
}
