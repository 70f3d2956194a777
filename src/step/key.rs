use super::recipe::Recipe;

/// File extension shared by all step sidecars
pub const SIDECAR_EXTENSION: &str = "genmf";

/// Identity of one recorded step
///
/// The sidecar name is the target path relative to the build root with
/// separators and drive colons escaped, followed by the recipe. Archive
/// steps share a target (the core archive) and are told apart by their
/// member source. Two steps with the same key are the same logical step;
/// the later write replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepKey {
    pub target: String,
    pub source: Option<String>,
    pub recipe: Recipe,
}

impl StepKey {
    pub fn new(recipe: Recipe, target: impl Into<String>, source: impl Into<String>) -> Self {
        let source = match recipe {
            Recipe::Archive => Some(source.into()),
            _ => None,
        };

        Self {
            target: target.into(),
            source,
            recipe,
        }
    }

    /// File name of the sidecar, relative to `build_root`
    pub fn sidecar_name(&self, build_root: &str) -> String {
        let mut name = escape(strip_root(&self.target, build_root));
        if let Some(source) = &self.source {
            name.push('_');
            name.push_str(&escape(strip_root(source, build_root)));
        }
        format!("{}.{}.{}", name, self.recipe, SIDECAR_EXTENSION)
    }
}

fn strip_root<'a>(path: &'a str, build_root: &str) -> &'a str {
    path.strip_prefix(build_root).unwrap_or(path)
}

fn escape(path: &str) -> String {
    path.replace(['\\', '/', ':'], "_")
}
