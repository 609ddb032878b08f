//! Table output for CLI commands, using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use crate::domain::models::{CallStatus, DatabaseSequence, QueryAnalysis, ToolResult};
use crate::domain::ports::ToolSchema;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn base_table(&self, header: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(
                header
                    .iter()
                    .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
            );
        table
    }

    /// Entities found in a query, one per row.
    pub fn format_analysis(&self, analysis: &QueryAnalysis) -> String {
        let mut table = self.base_table(&["Entity", "Type"]);
        for entity in &analysis.entities {
            table.add_row(vec![Cell::new(&entity.name), Cell::new(entity.entity_type)]);
        }
        table.to_string()
    }

    /// Ranked sources of a plan.
    pub fn format_plan(&self, plan: &DatabaseSequence) -> String {
        let mut table = self.base_table(&["Rank", "Source", "Database"]);
        for (rank, source) in plan.iter().enumerate() {
            table.add_row(vec![
                Cell::new(rank + 1),
                Cell::new(source.as_str()),
                Cell::new(source.display_name()),
            ]);
        }
        table.to_string()
    }

    /// Registered tools and what they accept.
    pub fn format_tools(&self, tools: &[ToolSchema]) -> String {
        let mut table = self.base_table(&["Tool", "Description", "Required"]);
        for tool in tools {
            let required = tool.parameters["required"]
                .as_array()
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(&tool.name),
                Cell::new(truncate_text(&tool.description, 60)),
                Cell::new(required),
            ]);
        }
        table.to_string()
    }

    /// Per-source outcomes of a batch.
    pub fn format_results(&self, results: &[ToolResult]) -> String {
        let mut table = self.base_table(&["Source", "Status", "Attempts", "Elapsed", "Detail"]);
        for result in results {
            let status = if self.use_colors {
                Cell::new(result.status).fg(status_color(result.status))
            } else {
                Cell::new(format!("{} {}", status_icon(result.status), result.status))
            };
            let detail = result
                .failure()
                .map(ToString::to_string)
                .unwrap_or_else(|| truncate_text(&result.to_message_content(), 50));
            table.add_row(vec![
                Cell::new(result.source.as_str()),
                status,
                Cell::new(result.attempts),
                Cell::new(format!("{}ms", result.elapsed_ms)),
                Cell::new(detail),
            ]);
        }
        table.to_string()
    }
}

fn status_color(status: CallStatus) -> Color {
    match status {
        CallStatus::Succeeded => Color::Green,
        CallStatus::Failed => Color::Red,
        CallStatus::Skipped => Color::Yellow,
        CallStatus::Pending | CallStatus::Running => Color::Cyan,
    }
}

fn status_icon(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Succeeded => "✓",
        CallStatus::Failed => "✗",
        CallStatus::Skipped => "-",
        CallStatus::Pending | CallStatus::Running => "…",
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
    format!("{kept}...")
}
