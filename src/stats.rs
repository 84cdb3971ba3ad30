//! Interception statistics.
//!
//! Replacements report each hit to a [`StatsSink`]. Reporting is
//! fire-and-forget: the sink never fails the intercepted call and never
//! changes what the page sees.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::error::Result;

/// How often batched counts are flushed.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Message type carried by a flushed batch.
pub const STATS_MESSAGE_TYPE: &str = "UPDATE_STATS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatCategory {
    Canvas,
    Webgl,
    Audio,
    Navigator,
    Webrtc,
    Screen,
    Font,
    Timezone,
    Sensor,
}

impl StatCategory {
    pub const ALL: [StatCategory; 9] = [
        StatCategory::Canvas,
        StatCategory::Webgl,
        StatCategory::Audio,
        StatCategory::Navigator,
        StatCategory::Webrtc,
        StatCategory::Screen,
        StatCategory::Font,
        StatCategory::Timezone,
        StatCategory::Sensor,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Counter name in the flushed message.
    pub fn counter_name(self) -> &'static str {
        match self {
            StatCategory::Canvas => "canvasReads",
            StatCategory::Webgl => "webglCalls",
            StatCategory::Audio => "audioCalls",
            StatCategory::Navigator => "navigatorReads",
            StatCategory::Webrtc => "webrtcCalls",
            StatCategory::Screen => "screenReads",
            StatCategory::Font => "fontReads",
            StatCategory::Timezone => "timezoneReads",
            StatCategory::Sensor => "sensorReads",
        }
    }
}

impl fmt::Display for StatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.counter_name())
    }
}

/// Receives one call per intercepted read.
pub trait StatsSink {
    fn increment(&self, category: StatCategory);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatsSink for NullSink {
    fn increment(&self, _category: StatCategory) {}
}

/// Counts accumulated since the last flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBatch {
    pub canvas_reads: u64,
    pub webgl_calls: u64,
    pub audio_calls: u64,
    pub navigator_reads: u64,
    pub webrtc_calls: u64,
    pub screen_reads: u64,
    pub font_reads: u64,
    pub timezone_reads: u64,
    pub sensor_reads: u64,
}

impl StatsBatch {
    pub fn get(&self, category: StatCategory) -> u64 {
        match category {
            StatCategory::Canvas => self.canvas_reads,
            StatCategory::Webgl => self.webgl_calls,
            StatCategory::Audio => self.audio_calls,
            StatCategory::Navigator => self.navigator_reads,
            StatCategory::Webrtc => self.webrtc_calls,
            StatCategory::Screen => self.screen_reads,
            StatCategory::Font => self.font_reads,
            StatCategory::Timezone => self.timezone_reads,
            StatCategory::Sensor => self.sensor_reads,
        }
    }

    fn set(&mut self, category: StatCategory, value: u64) {
        let field = match category {
            StatCategory::Canvas => &mut self.canvas_reads,
            StatCategory::Webgl => &mut self.webgl_calls,
            StatCategory::Audio => &mut self.audio_calls,
            StatCategory::Navigator => &mut self.navigator_reads,
            StatCategory::Webrtc => &mut self.webrtc_calls,
            StatCategory::Screen => &mut self.screen_reads,
            StatCategory::Font => &mut self.font_reads,
            StatCategory::Timezone => &mut self.timezone_reads,
            StatCategory::Sensor => &mut self.sensor_reads,
        };
        *field = value;
    }

    pub fn total(&self) -> u64 {
        StatCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Envelope sent to the collector: `{type: "UPDATE_STATS", data: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StatsBatch,
}

impl StatsMessage {
    pub fn new(data: StatsBatch) -> Self {
        Self {
            kind: STATS_MESSAGE_TYPE.to_string(),
            data,
        }
    }
}

/// Delivers flushed batches (message passing, storage, a test buffer).
pub trait StatsReporter {
    fn report(&self, message: &StatsMessage) -> Result<()>;
}

/// Collects reports in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    messages: RefCell<Vec<StatsMessage>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StatsMessage> {
        self.messages.borrow().clone()
    }
}

impl StatsReporter for MemoryReporter {
    fn report(&self, message: &StatsMessage) -> Result<()> {
        self.messages.borrow_mut().push(message.clone());
        Ok(())
    }
}

/// Batching [`StatsSink`].
///
/// Counts accumulate in cells; once [`FLUSH_INTERVAL`] has passed since
/// the last flush the next increment sends the batch. Reporter failures
/// are dropped.
pub struct StatsTracker<R: StatsReporter> {
    reporter: R,
    counts: [Cell<u64>; 9],
    last_flush: Cell<Instant>,
    interval: Duration,
    debug: bool,
}

impl<R: StatsReporter> StatsTracker<R> {
    pub fn new(reporter: R) -> Self {
        Self::with_interval(reporter, FLUSH_INTERVAL)
    }

    pub fn with_interval(reporter: R, interval: Duration) -> Self {
        Self {
            reporter,
            counts: Default::default(),
            last_flush: Cell::new(Instant::now()),
            interval,
            debug: false,
        }
    }

    /// Log reporter failures at debug level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Counts not yet flushed.
    pub fn pending(&self) -> StatsBatch {
        let mut batch = StatsBatch::default();
        for category in StatCategory::ALL {
            batch.set(category, self.counts[category.slot()].get());
        }
        batch
    }

    /// Send pending counts now. Nothing is sent when there are none.
    pub fn flush(&self) {
        self.last_flush.set(Instant::now());
        let batch = self.pending();
        if batch.is_empty() {
            return;
        }
        for cell in &self.counts {
            cell.set(0);
        }
        if let Err(e) = self.reporter.report(&StatsMessage::new(batch)) {
            if self.debug {
                log::debug!("📊 Stats report dropped: {}", e);
            }
        }
    }
}

impl<R: StatsReporter> StatsSink for StatsTracker<R> {
    fn increment(&self, category: StatCategory) {
        let cell = &self.counts[category.slot()];
        cell.set(cell.get().saturating_add(1));
        if self.last_flush.get().elapsed() >= self.interval {
            self.flush();
        }
    }
}

impl<R: StatsReporter> fmt::Debug for StatsTracker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsTracker")
            .field("pending", &self.pending().total())
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShufflerError;

    struct FailingReporter;

    impl StatsReporter for FailingReporter {
        fn report(&self, _message: &StatsMessage) -> Result<()> {
            Err(ShufflerError::Host("receiving end does not exist".into()))
        }
    }

    #[test]
    fn test_counts_accumulate_until_flush() {
        let tracker = StatsTracker::with_interval(MemoryReporter::new(), Duration::from_secs(3600));
        tracker.increment(StatCategory::Canvas);
        tracker.increment(StatCategory::Canvas);
        tracker.increment(StatCategory::Font);

        assert!(tracker.reporter().messages().is_empty());
        assert_eq!(tracker.pending().canvas_reads, 2);
        assert_eq!(tracker.pending().font_reads, 1);

        tracker.flush();
        let messages = tracker.reporter().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, "UPDATE_STATS");
        assert_eq!(messages[0].data.canvas_reads, 2);
        assert!(tracker.pending().is_empty());
    }

    #[test]
    fn test_elapsed_interval_flushes_on_increment() {
        let tracker = StatsTracker::with_interval(MemoryReporter::new(), Duration::ZERO);
        tracker.increment(StatCategory::Webrtc);
        tracker.increment(StatCategory::Webrtc);
        let messages = tracker.reporter().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].data.webrtc_calls, 1);
    }

    #[test]
    fn test_empty_flush_sends_nothing() {
        let tracker = StatsTracker::new(MemoryReporter::new());
        tracker.flush();
        assert!(tracker.reporter().messages().is_empty());
    }

    #[test]
    fn test_reporter_errors_are_swallowed() {
        let tracker = StatsTracker::with_interval(FailingReporter, Duration::ZERO).debug(true);
        tracker.increment(StatCategory::Sensor);
        assert!(tracker.pending().is_empty());
    }

    #[test]
    fn test_message_wire_format() {
        let mut batch = StatsBatch::default();
        batch.set(StatCategory::Timezone, 4);
        let json = serde_json::to_value(StatsMessage::new(batch)).unwrap();
        assert_eq!(json["type"], "UPDATE_STATS");
        assert_eq!(json["data"]["timezoneReads"], 4);
        assert_eq!(json["data"]["canvasReads"], 0);
        assert_eq!(json["data"].as_object().unwrap().len(), 9);
    }

    #[test]
    fn test_counter_names_match_fields() {
        let json = serde_json::to_value(StatsBatch::default()).unwrap();
        for category in StatCategory::ALL {
            assert!(json.get(category.counter_name()).is_some(), "{}", category);
        }
    }
}
