use clap::Parser;
use std::ffi::OsString;

/// Records IDE build steps and assembles them into a Makefile
///
/// Option names follow the keys of the IDE's platform description, so a
/// recipe line such as `genmf -recipe=c.o -build.path={build.path} ...`
/// can be passed through unchanged. Everything after the recognised
/// options is treated as compiler flags.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "genmf",
    about = "Records IDE build steps and assembles them into a Makefile",
    disable_version_flag = true,
    long_about = "genmf is invoked by the IDE once per build step. Compile, archive and link \
                  steps are recorded as .genmf sidecar files in the build directory; the \
                  final 'makefile' recipe renders them into a Makefile from a template.\n\n\
                  Examples:\n  \
                  genmf -recipe=stage -stage=core -build.path=/tmp/build\n  \
                  genmf -recipe=c.o -build.path=/tmp/build -source=a.c -target=a.c.o -Os\n  \
                  genmf -recipe=makefile -build.path=/tmp/build -template=Makefile.template"
)]
pub struct CliArgs {
    #[arg(long = "recipe", value_name = "RECIPE", help = "Recipe to run")]
    pub recipe: Option<String>,

    #[arg(long = "stage", default_value = "", help = "Build stage")]
    pub stage: String,

    #[arg(long = "source", default_value = "", help = "Source file")]
    pub source: String,

    #[arg(long = "target", default_value = "", help = "Target file")]
    pub target: String,

    #[arg(long = "build.path", default_value = "", help = "Build directory")]
    pub build_path: String,

    #[arg(long = "build.core.path", default_value = "", help = "Core sources directory")]
    pub core_path: String,

    #[arg(long = "build.system.path", default_value = "", help = "System directory")]
    pub system_path: String,

    #[arg(long = "build.variant.path", default_value = "", help = "Board variant directory")]
    pub variant_path: String,

    /// Accepted so platform recipes parse; not used
    #[arg(long = "runtime.platform.path", default_value = "", hide = true)]
    pub platform_path: String,

    #[arg(long = "build.variant", default_value = "", help = "Board variant name")]
    pub variant_name: String,

    #[arg(long = "project_name", default_value = "", help = "Sketch project name")]
    pub project_name: String,

    #[arg(long = "archive_file", default_value = "", help = "Core archive file name")]
    pub archive_file: String,

    #[arg(long = "serial.port", default_value = "", help = "Upload serial port")]
    pub serial_port: String,

    #[arg(long = "template", value_name = "FILE", default_value = "", help = "Makefile template")]
    pub template: String,

    #[arg(long = "makefile", value_name = "FILE", default_value = "", help = "Generated Makefile name")]
    pub makefile: String,

    #[arg(long = "build.usr.bin.path", value_name = "DIR", default_value = "", help = "Auxiliary commands directory")]
    pub cmds_path: String,

    #[arg(long = "build.compiler.path", value_name = "DIR", default_value = "", help = "Compiler directory")]
    pub compiler_path: String,

    #[arg(long = "build.uploader.path", value_name = "DIR", default_value = "", help = "Uploader directory")]
    pub uploader_path: String,

    /// Accepted so platform recipes parse; not used
    #[arg(long = "contiki.target.main", default_value = "", hide = true)]
    pub contiki_target_main: String,

    #[arg(long = "platform.version", default_value = "", help = "Platform version")]
    pub platform_version: String,

    /// Accepted so platform recipes parse; include flags are read from the
    /// `-includes` group of the pass-through flags instead
    #[arg(long = "includes", default_value = "", hide = true)]
    pub includes: String,

    #[arg(long = "make.command", default_value = "make", help = "make executable")]
    pub make_command: String,

    #[arg(
        long = "make.processnum",
        default_value_t = -1,
        allow_negative_numbers = true,
        help = "Parallel make jobs (-1: number of processors)"
    )]
    pub make_processnum: i32,

    #[arg(
        long = "verbose",
        default_value_t = -1,
        allow_negative_numbers = true,
        help = "Verbosity level (-1: derive from -w/-Wall/-Wextra)"
    )]
    pub verbose: i32,

    #[arg(long = "w", help = "Only report errors")]
    pub warnings_off: bool,

    #[arg(long = "Wall", help = "Verbose output")]
    pub warnings_all: bool,

    #[arg(long = "Wextra", help = "Very verbose output, keeps sidecar files")]
    pub warnings_extra: bool,

    #[arg(long = "version", help = "Show program version")]
    pub version: bool,

    #[arg(long = "log-level", value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        value_name = "FLAGS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Compiler flags passed through to the recorded step"
    )]
    pub flags: Vec<String>,
}

/// Options taking a value, as spelled on the command line
const VALUE_OPTIONS: &[&str] = &[
    "recipe",
    "stage",
    "source",
    "target",
    "build.path",
    "build.core.path",
    "build.system.path",
    "build.variant.path",
    "runtime.platform.path",
    "build.variant",
    "project_name",
    "archive_file",
    "serial.port",
    "template",
    "makefile",
    "build.usr.bin.path",
    "build.compiler.path",
    "build.uploader.path",
    "contiki.target.main",
    "platform.version",
    "includes",
    "make.command",
    "make.processnum",
    "verbose",
    "log-level",
];

const SWITCH_OPTIONS: &[&str] = &["w", "Wall", "Wextra", "version", "help"];

impl CliArgs {
    /// Parses IDE-style arguments (see [`normalize_args`])
    pub fn parse_ide<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(normalize_args(args))
    }
}

/// Rewrites single-dash long options (`-build.path=x`, `-w`) into the
/// `--` form and fences off the pass-through flags.
///
/// Option parsing stops at the first argument that is not a known option;
/// that argument and everything after it are passed through verbatim after
/// a `--` separator. The first element is the program name.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut iter = args.into_iter().map(Into::into);
    let mut out: Vec<OsString> = iter.next().into_iter().collect();
    let rest: Vec<OsString> = iter.collect();

    let mut i = 0;
    while i < rest.len() {
        let Some(arg) = rest[i].to_str() else {
            break;
        };
        if arg == "--" {
            i += 1;
            break;
        }

        let Some(body) = option_body(arg) else {
            break;
        };
        let (name, value) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };

        if VALUE_OPTIONS.contains(&name) {
            // Joined so that values starting with '-' stay values.
            let mut joined = OsString::from(format!("--{}=", name));
            match value {
                Some(value) => joined.push(value),
                None => {
                    i += 1;
                    if let Some(next) = rest.get(i) {
                        joined.push(next);
                    }
                }
            }
            out.push(joined);
        } else if SWITCH_OPTIONS.contains(&name) && value.is_none() {
            out.push(format!("--{}", name).into());
        } else {
            break;
        }
        i += 1;
    }

    if i < rest.len() {
        out.push("--".into());
        out.extend(rest[i..].iter().cloned());
    }
    out
}

fn option_body(arg: &str) -> Option<&str> {
    let body = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'))?;
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}
