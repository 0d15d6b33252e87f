use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: u64,
    pub direction: Direction,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Bounded record of the frames exchanged with a hub, oldest dropped first.
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    filter_rx: bool,
    filter_tx: bool,
}

impl LogStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
            filter_rx: true,
            filter_tx: true,
        }
    }

    pub fn set_filter(&mut self, show_rx: bool, show_tx: bool) {
        self.filter_rx = show_rx;
        self.filter_tx = show_tx;
    }

    pub fn push(&mut self, direction: Direction, data: Vec<u8>) {
        if self.max_entries == 0 {
            return;
        }
        self.entries.push_back(LogEntry {
            timestamp: now_millis(),
            direction,
            data,
        });

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render visible entries one per line, either as hex bytes or as the
    /// ASCII frame text with control bytes dropped.
    pub fn to_text(&self, show_timestamp: bool, show_hex: bool) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            if (entry.direction == Direction::Rx && !self.filter_rx)
                || (entry.direction == Direction::Tx && !self.filter_tx)
            {
                continue;
            }

            if show_timestamp {
                let millis = entry.timestamp % 1000;
                let secs = entry.timestamp / 1000;
                let hours = (secs / 3600) % 24;
                let minutes = (secs / 60) % 60;
                let seconds = secs % 60;
                result.push_str(&format!("[{hours:02}:{minutes:02}:{seconds:02}.{millis:03}] "));
            }
            result.push_str(match entry.direction {
                Direction::Rx => "RX: ",
                Direction::Tx => "TX: ",
            });

            if show_hex {
                let bytes: Vec<String> = entry.data.iter().map(|b| format!("{b:02X}")).collect();
                result.push_str(&bytes.join(" "));
            } else {
                result.extend(
                    entry
                        .data
                        .iter()
                        .filter(|b| !b.is_ascii_control())
                        .map(|&b| if b.is_ascii() { b as char } else { '?' }),
                );
            }
            result.push('\n');
        }
        result
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_past_capacity() {
        let mut log = LogStore::new(2);
        log.push(Direction::Tx, b"a".to_vec());
        log.push(Direction::Rx, b"b".to_vec());
        log.push(Direction::Tx, b"c".to_vec());
        let data: Vec<&[u8]> = log.entries().map(|e| e.data.as_slice()).collect();
        assert_eq!(data, vec![b"b".as_slice(), b"c".as_slice()]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut log = LogStore::new(0);
        log.push(Direction::Tx, b"a".to_vec());
        assert!(log.is_empty());
    }

    #[test]
    fn renders_ascii_frames() {
        let mut log = LogStore::new(8);
        log.push(Direction::Tx, b">0C010000\r\n".to_vec());
        log.push(Direction::Rx, b"<0C010000\r\n".to_vec());
        assert_eq!(log.to_text(false, false), "TX: >0C010000\nRX: <0C010000\n");
    }

    #[test]
    fn renders_hex_and_respects_filter() {
        let mut log = LogStore::new(8);
        log.push(Direction::Tx, vec![0x3E, 0x0A]);
        log.push(Direction::Rx, vec![0x3C]);
        log.set_filter(false, true);
        assert_eq!(log.to_text(false, true), "TX: 3E 0A\n");
    }
}
