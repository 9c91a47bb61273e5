use serde::{Deserialize, Serialize};

use crate::record::{FieldPath, Record};

pub const COLUMN_WIDTH_MARGIN: usize = 2;

/// A displayed column: header title and the record field it shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub title: String,
    pub field: FieldPath,
}

impl TableColumn {
    pub fn new(title: &str, field: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            field: FieldPath::from_segments(field),
        }
    }

    pub fn user_columns() -> Vec<TableColumn> {
        vec![
            TableColumn::new("ID", &["id"]),
            TableColumn::new("Name", &["name"]),
            TableColumn::new("Email", &["email"]),
            TableColumn::new("Company", &["company", "name"]),
        ]
    }
}

pub fn cells(record: &Record, columns: &[TableColumn]) -> Vec<String> {
    columns.iter().map(|c| record.cell(&c.field)).collect()
}

/// Width per column: widest of header and cells plus a margin, capped at `max_width`.
pub fn column_widths(columns: &[TableColumn], rows: &[Vec<String>], max_width: usize) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .map(|(cidx, column)| {
            let data_width = rows
                .iter()
                .filter_map(|row| row.get(cidx))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0);
            let width = std::cmp::max(column.title.chars().count(), data_width) + COLUMN_WIDTH_MARGIN;
            std::cmp::min(width, max_width)
        })
        .collect()
}

/// Cuts `text` to `width` characters, marking the cut with "...".
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width < 3 {
        return text.chars().take(width).collect();
    }
    let mut reduced: String = text.chars().take(width - 3).collect();
    reduced.push_str("...");
    reduced
}

/// One CSV line, quoting cells that contain separators or quotes.
pub fn csv_row(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| wrap_cell_content(c))
        .collect::<Vec<String>>()
        .join(",")
}

fn wrap_cell_content(c: &str) -> String {
    let needs_escaping = c.contains('"');
    let needs_wrapping = c.chars().any(|c| c == ' ' || c == '\t' || c == ',' || c == '"');
    let mut out = String::from(c);

    if needs_escaping {
        out = out.replace('"', "\"\"");
    }
    if needs_wrapping {
        out = format!("\"{out}\"");
    }
    out
}
