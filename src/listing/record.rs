use indexmap::IndexMap;
use serde::Serialize;

/// One row of the export listing table.
///
/// `fields` is keyed by the scraped header label, in column order. The
/// `Status` column never appears there; its link (if any) is `status_url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportRecord {
    #[serde(flatten)]
    fields: IndexMap<String, String>,
    #[serde(rename = "statusUrl", skip_serializing_if = "Option::is_none")]
    status_url: Option<String>,
}

impl ExportRecord {
    pub fn new(fields: IndexMap<String, String>, status_url: Option<String>) -> Self {
        Self { fields, status_url }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields.get(label).map(String::as_str)
    }

    pub fn fields(&self) -> &IndexMap<String, String> {
        &self.fields
    }

    pub fn status_url(&self) -> Option<&str> {
        self.status_url.as_deref()
    }

    /// Whether the export has finished generating.
    pub fn is_ready(&self) -> bool {
        self.status_url.is_some()
    }

    /// True if `field` exists and contains `needle`.
    pub fn field_contains(&self, field: &str, needle: &str) -> bool {
        self.get(field).map_or(false, |v| v.contains(needle))
    }
}
