use super::AggregateOptions;
use crate::path::{normalize_path_flag, to_msys_path};
use crate::step::StepRecord;

/// Groups of compiled sources listed separately in the Makefile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceGroup {
    /// Platform core sources: `core` stage under the core directory
    Core,
    /// Board variant sources: `core` stage under the variant directory
    Variant,
    Libraries,
    Sketch,
}

impl SourceGroup {
    pub fn contains(&self, record: &StepRecord, options: &AggregateOptions) -> bool {
        if !record.is_object() {
            return false;
        }

        match self {
            SourceGroup::Core => {
                record.stage == "core" && under(&record.source, &options.core_path)
            }
            SourceGroup::Variant => {
                record.stage == "core" && under(&record.source, &options.variant_path)
            }
            SourceGroup::Libraries => record.stage == "libraries",
            SourceGroup::Sketch => record.stage == "sketch",
        }
    }
}

// An unset root matches nothing.
fn under(path: &str, root: &str) -> bool {
    !root.is_empty() && path.starts_with(root)
}

/// Normalized sources of `group` as a Makefile continuation block: one
/// tab-indented path per line, lines joined by ` \`, ending in a newline.
pub fn source_block(records: &[StepRecord], group: SourceGroup, options: &AggregateOptions) -> String {
    let sources: Vec<String> = records
        .iter()
        .filter(|r| group.contains(r, options))
        .map(|r| to_msys_path(&r.source))
        .collect();

    format!("\t{}\n", sources.join(" \\\n\t"))
}

/// Compiler flags of all sketch objects, de-duplicated in first-seen order
/// across records, with `-I`/`-L` paths normalized
pub fn sketch_flags(records: &[StepRecord]) -> Vec<String> {
    let mut flags: Vec<String> = Vec::new();

    for record in records.iter().filter(|r| r.is_object() && r.stage == "sketch") {
        for flag in &record.flags {
            let flag = normalize_path_flag(flag);
            if !flags.contains(&flag) {
                flags.push(flag);
            }
        }
    }

    flags
}
