//! View Projection
//!
//! Pure functions from a synchronizer snapshot to what the dashboard shows:
//! chart series per field or panel, and a short newest-first table.

mod chart;
mod table;

pub use chart::{chart_series, panel_view, ChartPoint, ChartSeries, Field, Panel, PanelView};
pub use table::{render_table, table_rows, TableRow, DEFAULT_TABLE_ROWS};
