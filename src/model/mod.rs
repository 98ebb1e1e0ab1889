//! Sensor Reading Model
//!
//! The normalized shape of one reading coming off the `sensor_data` table,
//! and the lenient parsing rules applied to the raw rows the backend sends.
//!
//! Parsing never fails: a missing or garbled field becomes the field's zero
//! value, so one bad sample cannot take down a live chart.

mod reading;

pub use reading::{RawRecord, SensorReading};
