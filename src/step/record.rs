use super::recipe::Recipe;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One build step as handed to the tool by the build driver
///
/// Every field defaults to empty so that sidecars written by older or newer
/// versions of the tool still decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepRecord {
    pub stage: String,
    pub recipe: String,
    pub source: String,
    pub target: String,
    pub flags: Vec<String>,
    pub build_path: String,
    pub core_path: String,
    pub system_path: String,
    pub variant_path: String,
    pub project_name: String,
    pub archive_file: String,
    pub serial_port: String,
}

impl StepRecord {
    /// Parsed recipe, `None` when the stored name is outside the vocabulary
    pub fn recipe_kind(&self) -> Option<Recipe> {
        self.recipe.parse().ok()
    }

    pub fn is_object(&self) -> bool {
        self.recipe.ends_with(".o")
    }

    pub fn is_link(&self) -> bool {
        self.recipe_kind() == Some(Recipe::Link)
    }

    /// Decodes a sidecar, recovering whatever fields are well-formed.
    ///
    /// A field holding the wrong JSON type is dropped to its default, the
    /// rest of the record is kept. Text that is not JSON at all yields an
    /// empty record.
    pub fn from_json_lenient(text: &str) -> Self {
        if let Ok(record) = serde_json::from_str::<StepRecord>(text) {
            return record;
        }

        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Sidecar is not valid JSON, using an empty record");
                return Self::default();
            }
        };

        let Some(object) = value.as_object() else {
            warn!("Sidecar is not a JSON object, using an empty record");
            return Self::default();
        };

        let text_field = |name: &str| -> String {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let flags = object
            .get("flags")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        warn!("Sidecar has mistyped fields, decoded partially");

        Self {
            stage: text_field("stage"),
            recipe: text_field("recipe"),
            source: text_field("source"),
            target: text_field("target"),
            flags,
            build_path: text_field("build_path"),
            core_path: text_field("core_path"),
            system_path: text_field("system_path"),
            variant_path: text_field("variant_path"),
            project_name: text_field("project_name"),
            archive_file: text_field("archive_file"),
            serial_port: text_field("serial_port"),
        }
    }
}
