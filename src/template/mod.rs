//! Makefile template rendering
//!
//! Templates are plain text with markers of the form `###<<<TOKEN>>>###`
//! (whitespace is allowed between the hashes and the angle brackets).
//! Substitution works one line at a time; a marker never spans lines.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, trace};

/// Token name to replacement text
pub type ReplacementMap = BTreeMap<String, String>;

/// Suffix removed from a template's file name to name the rendered file
pub const TEMPLATE_SUFFIX: &str = ".template";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"###\s*<<<([^<>\s]*)>>>\s*###").expect("marker pattern is valid")
    })
}

/// A loaded Makefile template
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let text = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(template = %path.display(), "Loaded template");
        Ok(Self { text })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Token names referenced by the template, in order of appearance
    pub fn tokens(&self) -> Vec<&str> {
        marker_regex()
            .captures_iter(&self.text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    /// Renders the template against `replacements`.
    ///
    /// A line is rewritten only when every marker on it has an entry in the
    /// map; otherwise it is emitted unchanged. Replacement text is inserted
    /// literally. Every output line ends with a single newline.
    pub fn render(&self, replacements: &ReplacementMap) -> String {
        let mut out = String::with_capacity(self.text.len());
        for line in self.text.lines() {
            out.push_str(&render_line(line, replacements));
            out.push('\n');
        }
        out
    }
}

/// Loads `path` and renders it against `replacements`
pub fn render_file(path: &Path, replacements: &ReplacementMap) -> Result<String, TemplateError> {
    Ok(Template::load(path)?.render(replacements))
}

fn render_line(line: &str, replacements: &ReplacementMap) -> String {
    let marker = marker_regex();
    if !marker.is_match(line) {
        return line.to_string();
    }

    let all_mapped = marker
        .captures_iter(line)
        .all(|c| replacements.contains_key(&c[1]));
    if !all_mapped {
        trace!(line, "Line has unmapped tokens, leaving it untouched");
        return line.to_string();
    }

    marker
        .replace_all(line, |c: &Captures| replacements[&c[1]].clone())
        .into_owned()
}

/// Name of the file rendered from `template`: its file name without the
/// template suffix
pub fn rendered_name(template: &Path) -> String {
    let name = template
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.replace(TEMPLATE_SUFFIX, "")
}
