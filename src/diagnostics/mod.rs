//! Source context for "missing include" compiler errors
//!
//! When a preprocessing pass fails because an included header does not
//! exist, the offending source line is reprinted with a caret under the
//! failing column. This is a best-effort aid: the annotation is emitted on
//! the line following the diagnostic unless that line is itself an
//! `#include` directive, which does not hold for every compiler's layout.

use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Location reported by a "No such file or directory" diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingInclude {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

fn missing_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*):([0-9]+):([0-9]+): fatal error:.*: No such file or directory$")
            .expect("diagnostic pattern is valid")
    })
}

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*#[ \t]*include\s*[<"](\S+)[">]"#).expect("include pattern is valid")
    })
}

/// Parses a "fatal error: ...: No such file or directory" diagnostic
pub fn parse_missing_include(line: &str) -> Option<MissingInclude> {
    let caps = missing_file_regex().captures(line)?;
    Some(MissingInclude {
        file: caps[1].to_string(),
        line: caps[2].parse().ok()?,
        column: caps[3].parse().ok()?,
    })
}

pub fn is_include_directive(line: &str) -> bool {
    include_regex().is_match(line)
}

/// Splits `reader` on `\n`, yielding raw line bytes without the newline.
///
/// Compiler output echoes source text verbatim, so lines are not required
/// to be UTF-8.
fn raw_lines<R: BufRead>(mut reader: R) -> impl Iterator<Item = io::Result<Vec<u8>>> {
    std::iter::from_fn(move || {
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                Some(Ok(buf))
            }
            Err(e) => Some(Err(e)),
        }
    })
}

fn lossy_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Reads line `lineno` (1-based) of `path`
pub fn read_source_line(path: &Path, lineno: usize) -> io::Result<Option<String>> {
    if lineno == 0 {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    match raw_lines(reader).nth(lineno - 1) {
        Some(line) => line.map(|bytes| Some(lossy_text(&bytes))),
        None => Ok(None),
    }
}

/// Echoes every line of `diagnostics` to `out`, inserting source context
/// after "missing include" errors.
///
/// Lines are written back byte for byte, each terminated by `\n`.
/// `source_line` looks up a line of a source file; any lookup failure just
/// skips the annotation.
pub fn annotate<R, W, F>(diagnostics: R, out: &mut W, mut source_line: F) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(&Path, usize) -> io::Result<Option<String>>,
{
    let mut pending: Option<MissingInclude> = None;

    for bytes in raw_lines(diagnostics) {
        let bytes = bytes?;
        let line = lossy_text(&bytes);

        if let Some(missing) = parse_missing_include(&line) {
            pending = Some(missing);
        } else if let Some(missing) = pending.take() {
            if !is_include_directive(&line) {
                match source_line(Path::new(&missing.file), missing.line) {
                    Ok(Some(text)) => {
                        writeln!(out, " {}", text)?;
                        writeln!(out, "{}^", " ".repeat(missing.column))?;
                    }
                    Ok(None) => {}
                    Err(e) => debug!(file = %missing.file, error = %e, "No source context"),
                }
            }
        }

        out.write_all(&bytes)?;
        out.write_all(b"\n")?;
    }

    Ok(())
}

/// [`annotate`] reading source lines from disk
pub fn annotate_from_disk<R: BufRead, W: Write>(diagnostics: R, out: &mut W) -> io::Result<()> {
    annotate(diagnostics, out, read_source_line)
}
