//! Export formats and the document generator.

use bridge_traits::time::{Clock, SystemClock};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use core_runtime::events::ProjectSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use crate::error::{ExportError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Markdown,
    PlainText,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
            ExportFormat::PlainText => "plain_text",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::PlainText => "txt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "markdown" | "md" => Some(ExportFormat::Markdown),
            "plain_text" | "text" | "txt" => Some(ExportFormat::PlainText),
            _ => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a project snapshot into file contents.
///
/// Implementations must be side-effect free; the export handler decides
/// where the bytes go.
pub trait DocumentGenerator: Send + Sync {
    fn generate(&self, project: &ProjectSnapshot, format: ExportFormat) -> Result<Bytes>;
}

/// File name for an exported project, `{title-slug}-{id}.{ext}`.
pub fn file_name(project: &ProjectSnapshot, format: ExportFormat) -> String {
    let id = sanitize(&project.id);
    let slug = slugify(&project.title);
    if slug.is_empty() {
        format!("{}.{}", id, format.extension())
    } else {
        format!("{}-{}.{}", slug, id, format.extension())
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').chars().take(60).collect()
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    id: &'a str,
    title: &'a str,
    status: &'a str,
    exported_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    content: &'a Value,
}

/// Built-in JSON, Markdown and plain text renderer.
pub struct StandardDocumentGenerator {
    clock: Arc<dyn Clock>,
}

impl Default for StandardDocumentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardDocumentGenerator {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn render_json(&self, project: &ProjectSnapshot) -> Result<Bytes> {
        let document = JsonDocument {
            id: &project.id,
            title: &project.title,
            status: &project.status,
            exported_at: self.clock.now(),
            updated_at: project.updated_at,
            content: &project.content,
        };
        Ok(Bytes::from(serde_json::to_vec_pretty(&document)?))
    }

    fn render_markdown(&self, project: &ProjectSnapshot) -> Result<Bytes> {
        let mut out = String::new();
        writeln!(out, "# {}", project.title).map_err(write_error)?;
        writeln!(out).map_err(write_error)?;
        writeln!(out, "- **Status:** {}", project.status).map_err(write_error)?;
        writeln!(out, "- **Exported:** {}", timestamp(self.clock.now())).map_err(write_error)?;
        if let Some(updated) = project.updated_at {
            writeln!(out, "- **Last updated:** {}", timestamp(updated)).map_err(write_error)?;
        }

        if let Value::Object(fields) = &project.content {
            for (key, value) in fields {
                if value.is_null() {
                    continue;
                }
                writeln!(out, "\n## {}\n", heading(key)).map_err(write_error)?;
                markdown_value(&mut out, value, 0).map_err(write_error)?;
            }
        } else if !project.content.is_null() {
            writeln!(out).map_err(write_error)?;
            markdown_value(&mut out, &project.content, 0).map_err(write_error)?;
        }
        Ok(Bytes::from(out))
    }

    fn render_plain_text(&self, project: &ProjectSnapshot) -> Result<Bytes> {
        let mut out = String::new();
        writeln!(out, "{}", project.title).map_err(write_error)?;
        writeln!(out, "{}", "=".repeat(project.title.chars().count().max(3))).map_err(write_error)?;
        writeln!(out, "Status: {}", project.status).map_err(write_error)?;
        writeln!(out, "Exported: {}", timestamp(self.clock.now())).map_err(write_error)?;

        let mut lines = Vec::new();
        flatten(&project.content, String::new(), &mut lines);
        if !lines.is_empty() {
            writeln!(out).map_err(write_error)?;
            for (path, value) in lines {
                if path.is_empty() {
                    writeln!(out, "{}", value).map_err(write_error)?;
                } else {
                    writeln!(out, "{}: {}", path, value).map_err(write_error)?;
                }
            }
        }
        Ok(Bytes::from(out))
    }
}

impl DocumentGenerator for StandardDocumentGenerator {
    fn generate(&self, project: &ProjectSnapshot, format: ExportFormat) -> Result<Bytes> {
        match format {
            ExportFormat::Json => self.render_json(project),
            ExportFormat::Markdown => self.render_markdown(project),
            ExportFormat::PlainText => self.render_plain_text(project),
        }
    }
}

fn write_error(err: fmt::Error) -> ExportError {
    ExportError::Generation(err.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `research_goals` -> `Research goals`
fn heading(key: &str) -> String {
    let spaced = key.replace(|c: char| c == '_' || c == '-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn markdown_value(out: &mut String, value: &Value, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Array(_) | Value::Object(_) => {
                        writeln!(out, "{}-", indent)?;
                        markdown_value(out, item, depth + 1)?;
                    }
                    other => writeln!(out, "{}- {}", indent, scalar(other))?,
                }
            }
            Ok(())
        }
        Value::Object(fields) => {
            for (key, item) in fields {
                match item {
                    Value::Null => {}
                    Value::Array(_) | Value::Object(_) => {
                        writeln!(out, "{}- **{}:**", indent, heading(key))?;
                        markdown_value(out, item, depth + 1)?;
                    }
                    other => writeln!(out, "{}- **{}:** {}", indent, heading(key), scalar(other))?,
                }
            }
            Ok(())
        }
        other if depth == 0 => writeln!(out, "{}", scalar(other)),
        other => writeln!(out, "{}- {}", indent, scalar(other)),
    }
}

fn flatten(value: &Value, path: String, lines: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(fields) => {
            for (key, item) in fields {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                flatten(item, child, lines);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten(item, format!("{}[{}]", path, index), lines);
            }
        }
        other => lines.push((path, scalar(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::FixedClock;
    use chrono::TimeZone;
    use serde_json::json;

    fn generator() -> StandardDocumentGenerator {
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap();
        StandardDocumentGenerator::with_clock(Arc::new(FixedClock(at)))
    }

    fn project() -> ProjectSnapshot {
        ProjectSnapshot::new("p-1", "Protein Folding Study", "Completed").with_content(json!({
            "summary": "Folding kinetics of variant B.",
            "findings": ["faster at 37C", "stable dimer"],
            "team": { "lead": "R. Okafor", "size": 4 },
            "notes": null
        }))
    }

    fn text(bytes: Bytes) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_format_parse_and_extension() {
        assert_eq!(ExportFormat::parse("MD"), Some(ExportFormat::Markdown));
        assert_eq!(ExportFormat::parse(" json "), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::parse("txt"), Some(ExportFormat::PlainText));
        assert_eq!(ExportFormat::parse("pdf"), None);
        assert_eq!(ExportFormat::PlainText.extension(), "txt");
    }

    #[test]
    fn test_file_name_is_slugged_and_safe() {
        assert_eq!(
            file_name(&project(), ExportFormat::Markdown),
            "protein-folding-study-p-1.md"
        );

        let odd = ProjectSnapshot::new("../etc", "!!!", "completed");
        assert_eq!(file_name(&odd, ExportFormat::Json), "___etc.json");
    }

    #[test]
    fn test_json_document_fields() {
        let bytes = generator().generate(&project(), ExportFormat::Json).unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["id"], "p-1");
        assert_eq!(json["status"], "Completed");
        assert_eq!(json["exported_at"], "2024-05-02T09:30:00Z");
        assert_eq!(json["content"]["team"]["size"], 4);
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn test_markdown_sections() {
        let md = text(generator().generate(&project(), ExportFormat::Markdown).unwrap());

        assert!(md.starts_with("# Protein Folding Study\n"));
        assert!(md.contains("- **Status:** Completed"));
        assert!(md.contains("- **Exported:** 2024-05-02T09:30:00Z"));
        assert!(md.contains("## Summary\n\nFolding kinetics of variant B."));
        assert!(md.contains("## Findings\n\n- faster at 37C\n- stable dimer"));
        assert!(md.contains("- **Lead:** R. Okafor"));
        assert!(!md.contains("## Notes"));
    }

    #[test]
    fn test_plain_text_flattens_content() {
        let txt = text(generator().generate(&project(), ExportFormat::PlainText).unwrap());

        assert!(txt.starts_with("Protein Folding Study\n=====================\n"));
        assert!(txt.contains("Status: Completed"));
        assert!(txt.contains("findings[1]: stable dimer"));
        assert!(txt.contains("team.lead: R. Okafor"));
        assert!(!txt.contains("notes"));
    }

    #[test]
    fn test_empty_content_renders_header_only() {
        let bare = ProjectSnapshot::new("p-2", "Bare", "completed");
        let txt = text(generator().generate(&bare, ExportFormat::PlainText).unwrap());
        assert_eq!(
            txt,
            "Bare\n====\nStatus: completed\nExported: 2024-05-02T09:30:00Z\n"
        );
    }

    #[test]
    fn test_heading_formatting() {
        assert_eq!(heading("research_goals"), "Research goals");
        assert_eq!(heading("x"), "X");
        assert_eq!(heading(""), "");
    }
}
