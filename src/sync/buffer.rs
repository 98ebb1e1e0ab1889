//! Bounded series buffer
//!
//! Holds the latest N readings strictly ascending by id with no duplicates.
//! Readings are never mutated in place; entries are only inserted or evicted
//! whole.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::SensorReading;

/// Result of offering one reading to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferInsert {
    /// Reading is now part of the series
    Added,
    /// A reading with this id is already buffered
    Duplicate,
    /// Buffer is full and the reading is older than everything in it
    Stale,
}

/// Latest-N readings, ascending by id
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    readings: VecDeque<SensorReading>,
    capacity: usize,
}

impl SeriesBuffer {
    /// Create an empty buffer holding at most `capacity` readings
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the contents with `readings`.
    ///
    /// Input order does not matter; the result is sorted, de-duplicated and
    /// trimmed to the newest `capacity` entries.
    pub fn install(&mut self, mut readings: Vec<SensorReading>) {
        readings.sort_by_key(|r| r.id);
        readings.dedup_by_key(|r| r.id);

        let skip = readings.len().saturating_sub(self.capacity);
        self.readings = readings.into_iter().skip(skip).collect();
    }

    /// Offer a single reading.
    ///
    /// The common case (id newer than everything buffered) is a push to the
    /// back; an out-of-order id is placed at its sorted position so the
    /// ascending invariant holds.
    pub fn insert(&mut self, reading: SensorReading) -> BufferInsert {
        match self.readings.back() {
            None => self.readings.push_back(reading),
            Some(last) if reading.id > last.id => self.readings.push_back(reading),
            Some(_) => match self.readings.binary_search_by_key(&reading.id, |r| r.id) {
                Ok(_) => return BufferInsert::Duplicate,
                Err(0) if self.is_full() => return BufferInsert::Stale,
                Err(pos) => self.readings.insert(pos, reading),
            },
        }

        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }

        BufferInsert::Added
    }

    pub fn contains(&self, id: i64) -> bool {
        self.readings
            .binary_search_by_key(&id, |r| r.id)
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.readings.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Id of the newest buffered reading
    pub fn newest_id(&self) -> Option<i64> {
        self.readings.back().map(|r| r.id)
    }

    /// Id of the oldest buffered reading
    pub fn oldest_id(&self) -> Option<i64> {
        self.readings.front().map(|r| r.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter()
    }

    /// Immutable copy of the current contents
    pub fn freeze(&self) -> Arc<[SensorReading]> {
        self.readings.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: i64) -> SensorReading {
        SensorReading {
            id,
            created_at: None,
            weight_g: id as f64,
            temperature_c: 0.0,
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: 0.0,
            ir_value: 0,
        }
    }

    fn ids(buffer: &SeriesBuffer) -> Vec<i64> {
        buffer.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_install_sorts_and_dedups() {
        let mut buffer = SeriesBuffer::new(10);
        buffer.install(vec![reading(3), reading(1), reading(2), reading(3)]);
        assert_eq!(ids(&buffer), vec![1, 2, 3]);
    }

    #[test]
    fn test_install_keeps_newest() {
        let mut buffer = SeriesBuffer::new(3);
        buffer.install((1..=6).map(reading).collect());
        assert_eq!(ids(&buffer), vec![4, 5, 6]);
    }

    #[test]
    fn test_append_evicts_oldest() {
        let mut buffer = SeriesBuffer::new(50);
        buffer.install((1..=50).map(reading).collect());

        assert_eq!(buffer.insert(reading(51)), BufferInsert::Added);
        assert_eq!(buffer.len(), 50);
        assert_eq!(buffer.oldest_id(), Some(2));
        assert_eq!(buffer.newest_id(), Some(51));
        assert_eq!(ids(&buffer), (2..=51).collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicate_is_noop() {
        let mut buffer = SeriesBuffer::new(5);
        buffer.install(vec![reading(1), reading(2)]);
        let before = ids(&buffer);

        assert_eq!(buffer.insert(reading(2)), BufferInsert::Duplicate);
        assert_eq!(buffer.insert(reading(1)), BufferInsert::Duplicate);
        assert_eq!(ids(&buffer), before);
    }

    #[test]
    fn test_out_of_order_is_placed() {
        let mut buffer = SeriesBuffer::new(5);
        buffer.install(vec![reading(1), reading(4)]);

        assert_eq!(buffer.insert(reading(2)), BufferInsert::Added);
        assert_eq!(ids(&buffer), vec![1, 2, 4]);
    }

    #[test]
    fn test_stale_when_full() {
        let mut buffer = SeriesBuffer::new(3);
        buffer.install(vec![reading(5), reading(6), reading(7)]);

        assert_eq!(buffer.insert(reading(2)), BufferInsert::Stale);
        assert_eq!(ids(&buffer), vec![5, 6, 7]);
    }

    #[test]
    fn test_invariants_hold_for_mixed_sequence() {
        let mut buffer = SeriesBuffer::new(8);
        let sequence = [5, 3, 9, 9, 1, 12, 7, 7, 15, 2, 20, 11, 11, 30, 4];

        for id in sequence {
            buffer.insert(reading(id));
            assert!(buffer.len() <= 8);

            let current = ids(&buffer);
            assert!(current.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let buffer = SeriesBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }

    #[test]
    fn test_freeze_is_detached() {
        let mut buffer = SeriesBuffer::new(5);
        buffer.insert(reading(1));
        let frozen = buffer.freeze();

        buffer.insert(reading(2));
        assert_eq!(frozen.len(), 1);
        assert!(buffer.contains(2));
    }
}
