//! Chart projection
//!
//! Turns a snapshot into `{x: id, y: [..]}` points for the selected fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::SensorReading;

/// A plottable reading field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Weight,
    Temperature,
    GyroX,
    GyroY,
    GyroZ,
    IrValue,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Weight,
        Field::Temperature,
        Field::GyroX,
        Field::GyroY,
        Field::GyroZ,
        Field::IrValue,
    ];

    /// Value of this field on `reading`
    pub fn value(&self, reading: &SensorReading) -> f64 {
        match self {
            Field::Weight => reading.weight_g,
            Field::Temperature => reading.temperature_c,
            Field::GyroX => reading.gyro_x,
            Field::GyroY => reading.gyro_y,
            Field::GyroZ => reading.gyro_z,
            Field::IrValue => reading.ir_value as f64,
        }
    }

    /// Legend label
    pub fn label(&self) -> &'static str {
        match self {
            Field::Weight => "Weight",
            Field::Temperature => "Temperature",
            Field::GyroX => "Gyro X",
            Field::GyroY => "Gyro Y",
            Field::GyroZ => "Gyro Z",
            Field::IrValue => "IR Value",
        }
    }

    /// Column name on the readings table
    pub fn column(&self) -> &'static str {
        match self {
            Field::Weight => "weight_g",
            Field::Temperature => "temperature_c",
            Field::GyroX => "gyro_x",
            Field::GyroY => "gyro_y",
            Field::GyroZ => "gyro_z",
            Field::IrValue => "ir_value",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weight" | "weight_g" => Ok(Field::Weight),
            "temperature" | "temperature_c" | "temp" => Ok(Field::Temperature),
            "gyro_x" | "gyrox" => Ok(Field::GyroX),
            "gyro_y" | "gyroy" => Ok(Field::GyroY),
            "gyro_z" | "gyroz" => Ok(Field::GyroZ),
            "ir" | "ir_value" => Ok(Field::IrValue),
            other => Err(format!("unknown field: {}", other)),
        }
    }
}

/// Predefined dashboard panels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    Weight,
    Temperature,
    Gyroscope,
    Infrared,
}

impl Panel {
    pub fn title(&self) -> &'static str {
        match self {
            Panel::Weight => "Weight Over Time",
            Panel::Temperature => "Temperature Over Time",
            Panel::Gyroscope => "Gyroscope Over Time",
            Panel::Infrared => "IR Value Over Time (Finger Presence)",
        }
    }

    pub fn y_label(&self) -> &'static str {
        match self {
            Panel::Weight => "Weight (g)",
            Panel::Temperature => "Temp (°C)",
            Panel::Gyroscope => "Gyro (°/s)",
            Panel::Infrared => "IR Raw Value",
        }
    }

    pub fn fields(&self) -> &'static [Field] {
        match self {
            Panel::Weight => &[Field::Weight],
            Panel::Temperature => &[Field::Temperature],
            Panel::Gyroscope => &[Field::GyroX, Field::GyroY, Field::GyroZ],
            Panel::Infrared => &[Field::IrValue],
        }
    }
}

impl FromStr for Panel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weight" => Ok(Panel::Weight),
            "temperature" | "temp" => Ok(Panel::Temperature),
            "gyroscope" | "gyro" => Ok(Panel::Gyroscope),
            "infrared" | "ir" => Ok(Panel::Infrared),
            other => Err(format!("unknown panel: {}", other)),
        }
    }
}

/// One x position with a y value per selected field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: i64,
    pub y: Vec<f64>,
}

/// Chart-ready series: fields in legend order plus their points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub fields: Vec<Field>,
    pub labels: Vec<&'static str>,
    pub points: Vec<ChartPoint>,
}

/// A titled panel ready for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    pub panel: Panel,
    pub title: &'static str,
    pub y_label: &'static str,
    pub series: ChartSeries,
}

/// Project `readings` (ascending by id) onto `fields`
pub fn chart_series(readings: &[SensorReading], fields: &[Field]) -> ChartSeries {
    ChartSeries {
        fields: fields.to_vec(),
        labels: fields.iter().map(Field::label).collect(),
        points: readings
            .iter()
            .map(|r| ChartPoint {
                x: r.id,
                y: fields.iter().map(|f| f.value(r)).collect(),
            })
            .collect(),
    }
}

/// Project `readings` onto a predefined panel
pub fn panel_view(readings: &[SensorReading], panel: Panel) -> PanelView {
    PanelView {
        panel,
        title: panel.title(),
        y_label: panel.y_label(),
        series: chart_series(readings, panel.fields()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: i64, weight_g: f64, gyro: f64, ir_value: i64) -> SensorReading {
        SensorReading {
            id,
            created_at: None,
            weight_g,
            temperature_c: 21.5,
            gyro_x: gyro,
            gyro_y: -gyro,
            gyro_z: 0.0,
            ir_value,
        }
    }

    #[test]
    fn test_chart_series_follows_readings() {
        let readings = vec![reading(1, 10.0, 1.0, 100), reading(2, 12.5, 2.0, 200)];
        let series = chart_series(&readings, &[Field::Weight, Field::IrValue]);

        assert_eq!(series.labels, vec!["Weight", "IR Value"]);
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0], ChartPoint { x: 1, y: vec![10.0, 100.0] });
        assert_eq!(series.points[1], ChartPoint { x: 2, y: vec![12.5, 200.0] });
    }

    #[test]
    fn test_gyroscope_panel() {
        let readings = vec![reading(5, 0.0, 3.0, 0)];
        let view = panel_view(&readings, Panel::Gyroscope);

        assert_eq!(view.title, "Gyroscope Over Time");
        assert_eq!(view.series.fields, vec![Field::GyroX, Field::GyroY, Field::GyroZ]);
        assert_eq!(view.series.points[0].y, vec![3.0, -3.0, 0.0]);
    }

    #[test]
    fn test_empty_readings() {
        let series = chart_series(&[], &[Field::Temperature]);
        assert!(series.points.is_empty());
        assert_eq!(series.fields, vec![Field::Temperature]);
    }

    #[test]
    fn test_parse_field_and_panel() {
        assert_eq!("weight_g".parse::<Field>().unwrap(), Field::Weight);
        assert_eq!(" IR ".parse::<Field>().unwrap(), Field::IrValue);
        assert!("humidity".parse::<Field>().is_err());

        assert_eq!("gyro".parse::<Panel>().unwrap(), Panel::Gyroscope);
        assert!("pressure".parse::<Panel>().is_err());
    }

    #[test]
    fn test_field_serializes_snake_case() {
        let json = serde_json::to_string(&Field::GyroX).unwrap();
        assert_eq!(json, "\"gyro_x\"");
    }
}
