//! Table projection
//!
//! The most recent readings, newest first, formatted for display.

use serde::Serialize;
use std::fmt::Write;

use crate::model::SensorReading;

/// Default number of table rows
pub const DEFAULT_TABLE_ROWS: usize = 10;

/// One display row; floats carry one decimal place
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub id: i64,
    /// `HH:MM:SS` (UTC) of `created_at`, when the row has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub weight_g: String,
    pub temperature_c: String,
    pub gyro_x: String,
    pub gyro_y: String,
    pub gyro_z: String,
    pub ir_value: i64,
}

impl From<&SensorReading> for TableRow {
    fn from(r: &SensorReading) -> Self {
        Self {
            id: r.id,
            time: r.created_at.map(|t| t.format("%H:%M:%S").to_string()),
            weight_g: format!("{:.1}", r.weight_g),
            temperature_c: format!("{:.1}", r.temperature_c),
            gyro_x: format!("{:.1}", r.gyro_x),
            gyro_y: format!("{:.1}", r.gyro_y),
            gyro_z: format!("{:.1}", r.gyro_z),
            ir_value: r.ir_value,
        }
    }
}

/// Latest `limit` readings, newest first.
///
/// `readings` must be ascending by id, as a snapshot is.
pub fn table_rows(readings: &[SensorReading], limit: usize) -> Vec<TableRow> {
    readings.iter().rev().take(limit).map(TableRow::from).collect()
}

const HEADERS: [&str; 8] = [
    "ID",
    "Time",
    "Weight (g)",
    "Temp (°C)",
    "Gyro X",
    "Gyro Y",
    "Gyro Z",
    "IR Value",
];

/// Render rows as a fixed-width text table
pub fn render_table(rows: &[TableRow]) -> String {
    let cells: Vec<[String; 8]> = rows
        .iter()
        .map(|r| {
            [
                r.id.to_string(),
                r.time.clone().unwrap_or_else(|| "-".to_string()),
                r.weight_g.clone(),
                r.temperature_c.clone(),
                r.gyro_x.clone(),
                r.gyro_y.clone(),
                r.gyro_z.clone(),
                r.ir_value.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    push_line(&mut out, &header, &widths);

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);

    for row in &cells {
        push_line(&mut out, row, &widths);
    }

    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        // Pad by characters, not bytes (°)
        let pad = width.saturating_sub(cell.chars().count());
        let _ = write!(line, "{}{}", " ".repeat(pad), cell);
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(id: i64) -> SensorReading {
        SensorReading {
            id,
            created_at: None,
            weight_g: 100.0 + id as f64 * 0.26,
            temperature_c: 36.55,
            gyro_x: -0.04,
            gyro_y: 1.25,
            gyro_z: 0.0,
            ir_value: 50_000 + id,
        }
    }

    #[test]
    fn test_newest_first_and_limited() {
        let readings: Vec<_> = (1..=15).map(reading).collect();
        let rows = table_rows(&readings, DEFAULT_TABLE_ROWS);

        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].id, 15);
        assert_eq!(rows[9].id, 6);
    }

    #[test]
    fn test_formatting() {
        let row = TableRow::from(&reading(1));
        assert_eq!(row.weight_g, "100.3");
        assert_eq!(row.gyro_x, "-0.0");
        assert_eq!(row.gyro_z, "0.0");
        assert_eq!(row.ir_value, 50_001);
        assert!(row.time.is_none());
    }

    #[test]
    fn test_time_column() {
        let mut r = reading(1);
        r.created_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 7).unwrap());
        assert_eq!(TableRow::from(&r).time.as_deref(), Some("09:05:07"));
    }

    #[test]
    fn test_fewer_rows_than_limit() {
        let readings: Vec<_> = (1..=3).map(reading).collect();
        assert_eq!(table_rows(&readings, 10).len(), 3);
        assert!(table_rows(&[], 10).is_empty());
    }

    #[test]
    fn test_render_table() {
        let readings: Vec<_> = (1..=2).map(reading).collect();
        let text = render_table(&table_rows(&readings, 10));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("Weight (g)"));
        assert!(lines[1].starts_with("--"));
        assert!(lines[2].trim_start().starts_with('2'));
        assert!(lines[3].ends_with("50001"));
    }
}
