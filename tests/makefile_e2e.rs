//! End-to-end Makefile generation
//!
//! Records a small build the way the IDE would and renders it through a
//! template.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;
use yare::parameterized;

const TEMPLATE: &str = "\
PROJECT = ###<<<ARDUINO_PROJECT_NAME>>>###
CFLAGS = ###<<<ARDUINO_CFLAGS>>>###
VARIANT = ###<<<ARDUINO_VARIANT>>>###
CORE_SRCS = \\
###<<<ARDUINO_CORES_SRCS>>>###
VARIANT_SRCS = \\
###<<<ARDUINO_VARIANT_SRCS>>>###
LIB_SRCS = \\
###<<<ARDUINO_LIBRARIES_SRCS>>>###
SKETCH_SRCS = \\
###<<<ARDUINO_SKETCH_SRCS>>>###
UNKNOWN = ###<<<NOT_A_TOKEN>>>###
all:
\t$(CC) $(CFLAGS) -o $@
";

fn genmf(args: &[String]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_genmf"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("GENMF_LOG_LEVEL")
        .output()
        .expect("Failed to execute genmf")
}

struct Build {
    dir: TempDir,
    hw: TempDir,
}

impl Build {
    fn new() -> Self {
        let build = Self {
            dir: TempDir::new().unwrap(),
            hw: TempDir::new().unwrap(),
        };
        fs::write(build.template(), TEMPLATE).unwrap();
        build
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn template(&self) -> std::path::PathBuf {
        self.hw.path().join("Makefile.template")
    }

    fn core(&self) -> std::path::PathBuf {
        self.hw.path().join("cores").join("arduino")
    }

    fn variant(&self) -> std::path::PathBuf {
        self.hw.path().join("variants").join("uno")
    }

    fn common(&self) -> Vec<String> {
        vec![
            format!("-build.path={}", self.root().display()),
            format!("-build.core.path={}", self.core().display()),
            format!("-build.variant.path={}", self.variant().display()),
        ]
    }

    fn run(&self, recipe: &str, extra: &[String]) -> Output {
        let mut args = vec![format!("-recipe={}", recipe)];
        args.extend(self.common());
        args.extend(extra.iter().cloned());
        let output = genmf(&args);
        assert!(
            recipe == "makefile" || output.status.success(),
            "{} failed: {}",
            recipe,
            String::from_utf8_lossy(&output.stderr)
        );
        output
    }

    fn stage(&self, stage: &str) {
        self.run("stage", &[format!("-stage={}", stage)]);
    }

    fn compile(&self, recipe: &str, source: &Path, object: &str, flags: &[&str]) {
        let mut extra = vec![
            format!("-source={}", source.display()),
            format!("-target={}", self.root().join(object).display()),
        ];
        extra.extend(flags.iter().map(|f| f.to_string()));
        self.run(recipe, &extra);
    }

    fn record_full_build(&self) {
        self.stage("core");
        self.compile("c.o", &self.core().join("wiring.c"), "core/wiring.c.o", &["-Os"]);
        self.compile("cpp.o", &self.variant().join("variant.cpp"), "core/variant.cpp.o", &["-Os"]);

        self.stage("libraries");
        self.compile("cpp.o", Path::new("/libs/Servo/Servo.cpp"), "libraries/Servo.cpp.o", &["-Os"]);

        self.stage("sketch");
        self.compile("cpp.o", &self.root().join("sketch/Blink.ino.cpp"), "sketch/Blink.ino.cpp.o", &["-Os", "-DA"]);
        self.compile("c.o", &self.root().join("sketch/util.c"), "sketch/util.c.o", &["-DA", "-DB"]);

        self.run(
            "ld",
            &[
                "-project_name=Blink.ino".to_string(),
                format!("-target={}", self.root().join("Blink.ino.elf").display()),
                "-archive_file=core.a".to_string(),
            ],
        );
    }

    fn sidecars(&self) -> usize {
        fs::read_dir(self.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".genmf"))
            .count()
    }

    fn generate(&self, extra: &[String]) -> Output {
        let mut args = vec![
            format!("-template={}", self.template().display()),
            "-build.variant=uno".to_string(),
        ];
        args.extend(extra.iter().cloned());
        self.run("makefile", &args)
    }
}

#[test]
fn test_full_pipeline_renders_makefile() {
    let build = Build::new();
    build.record_full_build();
    assert_eq!(build.sidecars(), 6);

    let output = build.generate(&[]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let makefile = fs::read_to_string(build.root().join("Makefile")).unwrap();
    assert!(makefile.contains("PROJECT = Blink.ino\n"));
    assert!(makefile.contains("CFLAGS = -Os -DA -DB\n"));
    assert!(makefile.contains("VARIANT = uno\n"));
    assert!(makefile.contains(&format!("\t{}\n", build.core().join("wiring.c").display())));
    assert!(makefile.contains(&format!("\t{}\n", build.variant().join("variant.cpp").display())));
    assert!(makefile.contains("LIB_SRCS = \\\n\t/libs/Servo/Servo.cpp\n"));
    assert!(makefile.contains("UNKNOWN = ###<<<NOT_A_TOKEN>>>###\n"));
    assert!(makefile.contains("\t$(CC) $(CFLAGS) -o $@\n"));

    let sketch = format!(
        "SKETCH_SRCS = \\\n\t{} \\\n\t{}\n",
        build.root().join("sketch/Blink.ino.cpp").display(),
        build.root().join("sketch/util.c").display()
    );
    assert!(makefile.contains(&sketch), "{}", makefile);

    assert_eq!(build.sidecars(), 0);
    assert!(!build.root().join("genmf.stage").exists());
}

#[test]
fn test_missing_link_step_fails() {
    let build = Build::new();
    build.stage("sketch");
    build.compile("c.o", &build.root().join("sketch/a.c"), "sketch/a.c.o", &[]);

    let output = build.generate(&[]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No link step"));
    assert!(!build.root().join("Makefile").exists());
    assert_eq!(build.sidecars(), 1);
}

#[test]
fn test_high_verbosity_keeps_sidecars() {
    let build = Build::new();
    build.record_full_build();

    let output = build.generate(&["-verbose=10".to_string()]);
    assert!(output.status.success());
    assert!(build.root().join("Makefile").exists());
    assert_eq!(build.sidecars(), 6);
}

#[parameterized(
    bare_name = { Some("Project.mk"), "Project.mk" },
    default_name = { None, "Makefile" },
)]
fn test_output_name(makefile: Option<&str>, expected: &str) {
    let build = Build::new();
    build.record_full_build();

    let extra: Vec<String> = makefile
        .map(|m| vec![format!("-makefile={}", m)])
        .unwrap_or_default();
    let output = build.generate(&extra);
    assert!(output.status.success());
    assert!(build.root().join(expected).exists());
}

#[test]
fn test_missing_template_fails() {
    let build = Build::new();
    build.record_full_build();
    let output = build.run("makefile", &[]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("template"));
}
