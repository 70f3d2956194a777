//! One handler per recipe
//!
//! Handlers return the process exit code. Recipes that wrap make report
//! make's own exit code; everything else exits 0 on success and 1 on
//! failure after logging the error.

use crate::aggregate::{AggregateOptions, Aggregator};
use crate::config::InvocationConfig;
use crate::exec::serial::{parse_serial_port, HostOs};
use crate::exec::{ExecError, Executor};
use crate::preproc::{PreprocDriver, PreprocError, PreprocFlags, PreprocPass, PreprocRequest};
use crate::step::{Recipe, StepKey};
use crate::store::{FsSidecarStore, SidecarStore};
use anyhow::{Context, Result};
use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Runs the recipe named in `config`
pub fn handle_invocation(config: &InvocationConfig) -> i32 {
    if config.show_version {
        if let Err(e) = write_version(&mut io::stdout()) {
            warn!(error = %e, "Failed to print version");
        }
    }

    let Some(name) = config.recipe_name.as_deref() else {
        return 0;
    };

    let recipe: Recipe = match name.parse() {
        Ok(recipe) => recipe,
        Err(e) => {
            warn!("{}, nothing to do", e);
            return 0;
        }
    };

    debug!(
        recipe = %recipe,
        stage = %config.stage,
        target = %config.target,
        source = %config.source,
        "Invocation"
    );

    if let Err(e) = config.validate(recipe) {
        error!("{}", e);
        return 1;
    }

    let store = FsSidecarStore::new(&config.context.build_path);

    let result = match recipe {
        Recipe::CppObject | Recipe::CObject | Recipe::AsmObject | Recipe::Archive | Recipe::Link => {
            handle_step(config, recipe, &store).map(|_| 0)
        }
        Recipe::Stage => handle_stage(config, &store).map(|_| 0),
        Recipe::Echo => handle_echo(config, &mut io::stdout()).map(|_| 0),
        Recipe::GenProjectC => handle_genprjc(config).map(|_| 0),
        Recipe::Make => return handle_make(config),
        Recipe::PreprocIncludes | Recipe::PreprocMacros => {
            return handle_preproc(config, recipe, &store)
        }
        Recipe::Makefile => handle_makefile(config, &store).map(|_| 0),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

/// Program name and version, followed by the project URL
pub fn write_version<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{} {}", crate::NAME, crate::VERSION)?;
    writeln!(out, "{}", env!("CARGO_PKG_REPOSITORY"))
}

/// Records a compile, archive or link step as a sidecar
pub fn handle_step(config: &InvocationConfig, recipe: Recipe, store: &dyn SidecarStore) -> Result<()> {
    let mut record = config.step_record(recipe);
    if let Some(stage) = store.read_stage().context("Failed to read the current stage")? {
        record.stage = stage;
    }

    let key = StepKey::new(recipe, &config.target, &config.source);
    let name = key.sidecar_name(&config.context.build_path);
    store
        .put(&name, &record)
        .with_context(|| format!("Failed to record {} step for {}", recipe, config.target))?;

    debug!(sidecar = %name, stage = %record.stage, "Recorded step");
    Ok(())
}

pub fn handle_stage(config: &InvocationConfig, store: &dyn SidecarStore) -> Result<()> {
    store
        .write_stage(&config.stage)
        .context("Failed to store the current stage")?;
    debug!(stage = %config.stage, "Stage set");
    Ok(())
}

pub fn handle_echo<W: Write>(config: &InvocationConfig, out: &mut W) -> Result<()> {
    writeln!(out, "{}", config.flags.join(" "))?;
    Ok(())
}

/// Creates an empty `<project>.c` for a `.ino`/`.pde` sketch unless one exists
pub fn handle_genprjc(config: &InvocationConfig) -> Result<()> {
    let project = &config.context.project_name;
    let Some(stem) = project
        .strip_suffix(".ino")
        .or_else(|| project.strip_suffix(".pde"))
    else {
        warn!(project = %project, "Project is not a sketch, no C file generated");
        return Ok(());
    };

    let path = Path::new(&config.context.build_path).join(format!("{}.c", stem));
    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(_) => debug!(path = %path.display(), "Created project C file"),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to create {}", path.display())),
    }
    Ok(())
}

fn executor(config: &InvocationConfig) -> Executor {
    Executor::new(
        config.tools.cmds.clone(),
        config.tools.compiler.clone(),
        config.tools.uploader.clone(),
    )
}

/// Make arguments addressing the upload port, if one is set
pub fn serial_make_args(port: &str, os: HostOs) -> Vec<String> {
    if port.is_empty() {
        return Vec::new();
    }
    match parse_serial_port(port, os) {
        Some(target) => target.make_args(),
        None => {
            warn!(port, "Unrecognised serial port name, not passing it to make");
            Vec::new()
        }
    }
}

/// Runs make in the foreground and exits with its status
pub fn handle_make(config: &InvocationConfig) -> i32 {
    let makeflags = format!(
        "{} -j{}",
        env::var("MAKEFLAGS").unwrap_or_default(),
        config.make.effective_jobs()
    );
    let zephyr_base = Path::new(&config.context.system_path).join("zephyr");

    let executor = executor(config)
        .env("MAKEFLAGS", makeflags)
        .env("ZEPHYR_BASE", zephyr_base.to_string_lossy());

    let mut args = serial_make_args(&config.context.serial_port, HostOs::current());
    args.extend(config.flags.iter().cloned());

    match executor.run_inherited(&config.make.command, &args) {
        Ok(code) => code,
        Err(e) => exec_failure(&e),
    }
}

fn exec_failure(e: &ExecError) -> i32 {
    error!("{}", e);
    e.exit_code()
}

pub fn preproc_request(config: &InvocationConfig, pass: PreprocPass) -> PreprocRequest {
    PreprocRequest {
        pass,
        build_path: config.context.build_path.clone(),
        system_path: config.context.system_path.clone(),
        variant_path: config.context.variant_path.clone(),
        source: config.source.clone(),
        target: config.target.clone(),
        template: config.template.clone().unwrap_or_default(),
        makefile: config.makefile.clone(),
        make_command: config.make.command.clone(),
        flags: PreprocFlags::parse(&config.flags),
    }
}

/// Runs an include or macro discovery pass and exits with make's status
pub fn handle_preproc(config: &InvocationConfig, recipe: Recipe, store: &dyn SidecarStore) -> i32 {
    let result = PreprocPass::from_recipe(recipe)
        .ok_or(PreprocError::NotPreproc(recipe))
        .and_then(|pass| {
            let executor = executor(config);
            let request = preproc_request(config, pass);
            PreprocDriver::new(store, &executor).run(&request, &mut io::stderr())
        });

    match result {
        Ok(code) => code,
        Err(PreprocError::Exec(e)) => exec_failure(&e),
        Err(e) => {
            error!("{} failed: {}", recipe, e);
            1
        }
    }
}

pub fn aggregate_options(config: &InvocationConfig) -> AggregateOptions {
    AggregateOptions {
        build_path: config.context.build_path.clone(),
        core_path: config.context.core_path.clone(),
        variant_path: config.context.variant_path.clone(),
        variant_name: config.context.variant_name.clone(),
        platform_version: config.context.platform_version.clone(),
        template: config.template.clone().unwrap_or_default(),
        makefile: config.makefile.clone(),
        keep_intermediates: config.keep_intermediates(),
    }
}

/// Generates the Makefile from all recorded steps
pub fn handle_makefile(config: &InvocationConfig, store: &dyn SidecarStore) -> Result<()> {
    let report = Aggregator::new(store, aggregate_options(config))
        .run()
        .context("Makefile generation failed")?;

    info!(
        output = %report.output.display(),
        steps = report.records,
        removed = report.removed,
        "Makefile generated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliArgs;
    use crate::store::MemorySidecarStore;

    fn config(argv: &[&str]) -> InvocationConfig {
        let mut full = vec!["genmf"];
        full.extend_from_slice(argv);
        InvocationConfig::from_args(&CliArgs::parse_ide(full))
    }

    #[test]
    fn test_step_is_recorded_under_its_key() {
        let store = MemorySidecarStore::new();
        let config = config(&[
            "-recipe=c.o",
            "-build.path=/build",
            "-source=/build/sketch/a.c",
            "-target=/build/sketch/a.c.o",
            "-stage=sketch",
            "-Os",
        ]);

        handle_step(&config, Recipe::CObject, &store).unwrap();

        let record = store.get("_sketch_a.c.o.c.o.genmf").unwrap();
        assert_eq!(record.stage, "sketch");
        assert_eq!(record.recipe, "c.o");
        assert_eq!(record.source, "/build/sketch/a.c");
        assert_eq!(record.flags, vec!["-Os"]);
    }

    #[test]
    fn test_stored_stage_overrides_argument() {
        let store = MemorySidecarStore::new();
        handle_stage(&config(&["-stage=core", "-build.path=/b"]), &store).unwrap();

        let step = config(&[
            "-build.path=/b",
            "-stage=sketch",
            "-source=/hw/cores/wiring.c",
            "-target=/b/core/wiring.c.o",
        ]);
        handle_step(&step, Recipe::CppObject, &store).unwrap();

        let record = store.get("_core_wiring.c.o.cpp.o.genmf").unwrap();
        assert_eq!(record.stage, "core");
    }

    #[test]
    fn test_echo() {
        let mut out = Vec::new();
        handle_echo(&config(&["-recipe=echo", "hello", "-x", "world"]), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello -x world\n");
    }

    #[test]
    fn test_version_lines() {
        let mut out = Vec::new();
        write_version(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("genmf {}", crate::VERSION));
        assert_eq!(lines[1], "https://github.com/soburi/intiki");
    }

    #[test]
    fn test_genprjc() {
        let dir = tempfile::TempDir::new().unwrap();
        let build = dir.path().to_string_lossy().into_owned();

        let ino = config(&[&format!("-build.path={}", build), "-project_name=Blink.ino"]);
        handle_genprjc(&ino).unwrap();
        assert!(dir.path().join("Blink.c").exists());

        std::fs::write(dir.path().join("Blink.c"), "int x;\n").unwrap();
        handle_genprjc(&ino).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Blink.c")).unwrap(),
            "int x;\n"
        );

        let pde = config(&[&format!("-build.path={}", build), "-project_name=Old.pde"]);
        handle_genprjc(&pde).unwrap();
        assert!(dir.path().join("Old.c").exists());

        let other = config(&[&format!("-build.path={}", build), "-project_name=main.cpp"]);
        handle_genprjc(&other).unwrap();
        assert!(!dir.path().join("main.cpp.c").exists());
    }

    #[test]
    fn test_serial_make_args() {
        assert!(serial_make_args("", HostOs::Linux).is_empty());
        assert_eq!(
            serial_make_args("/dev/ttyACM1", HostOs::Linux),
            vec!["USBDEVBASENAME=/dev/ttyACM", "MOTE=1"]
        );
        assert!(serial_make_args("bogus0x", HostOs::Linux).is_empty());
    }

    #[test]
    fn test_unknown_recipe_is_ignored() {
        assert_eq!(handle_invocation(&config(&["-recipe=size"])), 0);
        assert_eq!(handle_invocation(&config(&[])), 0);
    }

    #[test]
    fn test_missing_build_path_fails() {
        assert_eq!(handle_invocation(&config(&["-recipe=c.o"])), 1);
    }

    #[test]
    fn test_aggregate_options() {
        let options = aggregate_options(&config(&[
            "-build.path=/build",
            "-template=/hw/Makefile.template",
            "-verbose=10",
        ]));
        assert_eq!(options.build_path, "/build");
        assert!(options.keep_intermediates);
        assert_eq!(options.output_path(), Path::new("/build/Makefile"));
    }
}
