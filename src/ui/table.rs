use tabled::{settings::Style, Table, Tabled};

use crate::records::ConversationPartRow;
use crate::storage::DbStats;

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Rows")]
    rows: usize,
}

#[derive(Tabled)]
struct PartRow {
    #[tabled(rename = "Part")]
    id: String,
    #[tabled(rename = "Type")]
    part_type: String,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Body")]
    body: String,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Shorten a part body to one line for display
fn preview(body: Option<&str>, width: usize) -> String {
    let Some(body) = body else {
        return "-".to_string();
    };
    let line = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() > width {
        format!("{}...", line.chars().take(width).collect::<String>())
    } else {
        line
    }
}

pub fn stats_table(stats: &DbStats) -> String {
    let rows: Vec<CountRow> = stats
        .tables
        .iter()
        .map(|t| CountRow { table: t.table.clone(), rows: t.rows })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn parts_table(parts: &[ConversationPartRow]) -> String {
    if parts.is_empty() {
        return String::new();
    }

    let rows: Vec<PartRow> = parts
        .iter()
        .map(|p| PartRow {
            id: p.id.clone(),
            part_type: or_dash(p.part_type.as_deref()),
            created_at: or_dash(p.created_at),
            body: preview(p.body.as_deref(), 60),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
