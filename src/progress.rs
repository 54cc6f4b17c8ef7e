//! Reading-progress codec and update policy.
//!
//! A chapter stores its reading position in a single integer column. Two
//! renderers share that column: the native block renderer tracks an item
//! index plus a pixel offset, the web renderer tracks a scroll percentage.
//! Both are packed into disjoint ranges far above any legacy value (a plain
//! item index or a 0-100 percent), so every stored value decodes to exactly
//! one [`ReadingProgress`] variant.

use serde::{Deserialize, Serialize};

const NATIVE_SCROLL_MARKER: i64 = 5_000_000_000;
const NATIVE_SCROLL_OFFSET_BASE: i64 = 1_000_000;
const WEB_SCROLL_MARKER: i64 = 6_000_000_000;
const WEB_SCROLL_MAX_PERCENT: i64 = 100;
/// Highest index that still fits below the web marker.
const NATIVE_SCROLL_MAX_INDEX: i64 =
    (WEB_SCROLL_MARKER - NATIVE_SCROLL_MARKER) / NATIVE_SCROLL_OFFSET_BASE - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeScrollProgress {
    pub index: u32,
    pub offset_px: u32,
}

/// Pack a native position. The index is clamped to `0..=999` so the value
/// stays below the web marker; blocks past 999 all restore to index 999.
/// The offset is clamped to `0..=999_999` pixels.
pub fn encode_native_scroll(index: i64, offset_px: i64) -> i64 {
    let safe_index = index.clamp(0, NATIVE_SCROLL_MAX_INDEX);
    let safe_offset = offset_px.clamp(0, NATIVE_SCROLL_OFFSET_BASE - 1);
    NATIVE_SCROLL_MARKER + safe_index * NATIVE_SCROLL_OFFSET_BASE + safe_offset
}

pub fn decode_native_scroll(value: i64) -> Option<NativeScrollProgress> {
    if !(NATIVE_SCROLL_MARKER..WEB_SCROLL_MARKER).contains(&value) {
        return None;
    }
    let payload = value - NATIVE_SCROLL_MARKER;
    Some(NativeScrollProgress {
        index: (payload / NATIVE_SCROLL_OFFSET_BASE) as u32,
        offset_px: (payload % NATIVE_SCROLL_OFFSET_BASE) as u32,
    })
}

pub fn encode_web_percent(percent: i64) -> i64 {
    WEB_SCROLL_MARKER + percent.clamp(0, WEB_SCROLL_MAX_PERCENT)
}

pub fn decode_web_percent(value: i64) -> Option<u8> {
    if !(WEB_SCROLL_MARKER..=WEB_SCROLL_MARKER + WEB_SCROLL_MAX_PERCENT).contains(&value) {
        return None;
    }
    Some((value - WEB_SCROLL_MARKER) as u8)
}

/// Tagged view over a stored progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadingProgress {
    NativeScroll { index: u32, offset_px: u32 },
    WebPercent { percent: u8 },
    /// Pre-codec value: a raw item index or a raw percent, depending on the
    /// renderer asking.
    Legacy { raw: i64 },
}

impl ReadingProgress {
    pub fn from_stored(value: i64) -> Self {
        if let Some(native) = decode_native_scroll(value) {
            return ReadingProgress::NativeScroll {
                index: native.index,
                offset_px: native.offset_px,
            };
        }
        if let Some(percent) = decode_web_percent(value) {
            return ReadingProgress::WebPercent { percent };
        }
        ReadingProgress::Legacy { raw: value }
    }

    pub fn to_stored(self) -> i64 {
        match self {
            ReadingProgress::NativeScroll { index, offset_px } => {
                encode_native_scroll(index as i64, offset_px as i64)
            }
            ReadingProgress::WebPercent { percent } => encode_web_percent(percent as i64),
            ReadingProgress::Legacy { raw } => raw,
        }
    }
}

/// Where each renderer should start when a chapter is re-opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPosition {
    pub native_index: u32,
    pub native_offset_px: u32,
    pub web_percent: u8,
}

impl SavedPosition {
    pub fn from_stored(value: i64) -> Self {
        match ReadingProgress::from_stored(value) {
            ReadingProgress::NativeScroll { index, offset_px } => SavedPosition {
                native_index: index,
                native_offset_px: offset_px,
                web_percent: 0,
            },
            ReadingProgress::WebPercent { percent } => SavedPosition {
                native_index: 0,
                native_offset_px: 0,
                web_percent: percent,
            },
            ReadingProgress::Legacy { raw } => SavedPosition {
                native_index: raw.clamp(0, i32::MAX as i64) as u32,
                native_offset_px: 0,
                web_percent: raw.clamp(0, WEB_SCROLL_MAX_PERCENT) as u8,
            },
        }
    }
}

/// A progress write the caller should persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress: i64,
    pub read: bool,
    pub became_read: bool,
}

/// Applies the read/progress policy to scroll callbacks for one chapter.
///
/// `total_items == 100` is taken to mean the web renderer (percent based),
/// which uses a stricter read threshold than the paginated native renderer.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    initial_index: i64,
    last_saved_progress: i64,
    last_saved_read: bool,
    chapter_read: bool,
    has_progress_changed: bool,
    next_chapter_prefetch_triggered: bool,
}

impl ProgressTracker {
    pub fn new(stored_progress: i64, read: bool) -> Self {
        let initial_index = match ReadingProgress::from_stored(stored_progress) {
            ReadingProgress::NativeScroll { index, .. } => index as i64,
            ReadingProgress::WebPercent { percent } => percent as i64,
            ReadingProgress::Legacy { raw } => raw.clamp(i32::MIN as i64, i32::MAX as i64),
        };
        Self {
            initial_index,
            last_saved_progress: stored_progress,
            last_saved_read: read,
            chapter_read: read,
            has_progress_changed: false,
            next_chapter_prefetch_triggered: false,
        }
    }

    pub fn last_saved_progress(&self) -> i64 {
        self.last_saved_progress
    }

    pub fn is_read(&self) -> bool {
        self.chapter_read
    }

    /// Feed one scroll callback. Returns the write to persist, if any.
    pub fn on_progress(
        &mut self,
        current_index: i64,
        total_items: i64,
        persisted_progress: Option<i64>,
    ) -> Option<ProgressUpdate> {
        if total_items <= 0 || current_index < 0 {
            return None;
        }
        let resolved_progress = persisted_progress.unwrap_or(current_index);
        if !self.has_progress_changed {
            let same_index = current_index == self.initial_index;
            let same_progress = self.last_saved_progress == resolved_progress;
            if same_index && same_progress {
                return None;
            }
            self.has_progress_changed = true;
        }

        let read_threshold = if total_items == 100 { 0.99 } else { 0.95 };
        let reached_read_threshold = total_items > 1
            && (current_index + 1) as f64 / total_items as f64 >= read_threshold;
        let should_persist_read = self.last_saved_read || self.chapter_read || reached_read_threshold;
        let new_progress = if should_persist_read { 0 } else { resolved_progress };

        if self.last_saved_read == should_persist_read && self.last_saved_progress == new_progress {
            return None;
        }

        let became_read = !self.chapter_read && should_persist_read;
        self.last_saved_read = should_persist_read;
        self.last_saved_progress = new_progress;
        self.chapter_read = should_persist_read;
        Some(ProgressUpdate {
            progress: new_progress,
            read: should_persist_read,
            became_read,
        })
    }

    /// One-shot signal that the reader is far enough in to warm the next chapter.
    pub fn take_next_chapter_prefetch_signal(&mut self, current_index: i64, total_items: i64) -> bool {
        if self.next_chapter_prefetch_triggered {
            return false;
        }
        if !has_reached_prefetch_threshold(current_index, total_items) {
            return false;
        }
        self.next_chapter_prefetch_triggered = true;
        true
    }
}

fn has_reached_prefetch_threshold(current_index: i64, total_items: i64) -> bool {
    if total_items <= 0 || current_index < 0 {
        return false;
    }
    if total_items == 100 {
        current_index >= 50
    } else {
        total_items > 1 && (current_index + 1) as f64 / total_items as f64 >= 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_scroll_round_trips_and_clamps() {
        let encoded = encode_native_scroll(42, 1234);
        assert_eq!(encoded, 5_042_001_234);
        assert_eq!(
            decode_native_scroll(encoded),
            Some(NativeScrollProgress {
                index: 42,
                offset_px: 1234
            })
        );
        let clamped = decode_native_scroll(encode_native_scroll(-3, 5_000_000));
        assert_eq!(
            clamped,
            Some(NativeScrollProgress {
                index: 0,
                offset_px: 999_999
            })
        );
    }

    #[test]
    fn huge_indices_stay_inside_native_range() {
        let encoded = encode_native_scroll(5_000, 10);
        assert!(decode_native_scroll(encoded).is_some());
        assert_eq!(decode_web_percent(encoded), None);
    }

    #[test]
    fn native_index_saturates_at_999() {
        assert_eq!(encode_native_scroll(999, 5), 5_999_000_005);
        for index in [1_000, 5_000, i64::MAX] {
            let decoded = decode_native_scroll(encode_native_scroll(index, 5)).expect("native");
            assert_eq!(decoded.index, 999);
            assert_eq!(decoded.offset_px, 5);
        }
    }

    #[test]
    fn web_percent_clamps_into_range() {
        assert_eq!(decode_web_percent(encode_web_percent(55)), Some(55));
        assert_eq!(decode_web_percent(encode_web_percent(-10)), Some(0));
        assert_eq!(decode_web_percent(encode_web_percent(250)), Some(100));
    }

    #[test]
    fn encodings_never_overlap() {
        for value in [
            encode_native_scroll(0, 0),
            encode_native_scroll(999, 999_999),
            encode_native_scroll(12, 40),
        ] {
            assert_eq!(decode_web_percent(value), None);
        }
        for percent in [0, 50, 100] {
            assert_eq!(decode_native_scroll(encode_web_percent(percent)), None);
        }
        assert_eq!(decode_native_scroll(37), None);
        assert_eq!(decode_web_percent(37), None);
    }

    #[test]
    fn legacy_values_seed_both_renderers() {
        let position = SavedPosition::from_stored(37);
        assert_eq!(position.native_index, 37);
        assert_eq!(position.web_percent, 37);
        assert_eq!(ReadingProgress::from_stored(37), ReadingProgress::Legacy { raw: 37 });

        let position = SavedPosition::from_stored(encode_web_percent(80));
        assert_eq!(position.web_percent, 80);
        assert_eq!(position.native_index, 0);
    }

    #[test]
    fn tagged_progress_round_trips_through_storage() {
        let progress = ReadingProgress::NativeScroll {
            index: 7,
            offset_px: 300,
        };
        assert_eq!(ReadingProgress::from_stored(progress.to_stored()), progress);
    }

    #[test]
    fn tracker_skips_initial_callback_matching_saved_state() {
        let stored = encode_native_scroll(4, 0);
        let mut tracker = ProgressTracker::new(stored, false);
        assert_eq!(tracker.on_progress(4, 20, Some(stored)), None);

        let update = tracker
            .on_progress(5, 20, Some(encode_native_scroll(5, 12)))
            .expect("moved forward");
        assert_eq!(update.progress, encode_native_scroll(5, 12));
        assert!(!update.read);
    }

    #[test]
    fn web_renderer_needs_ninety_nine_percent_to_mark_read() {
        let mut tracker = ProgressTracker::new(0, false);
        let update = tracker
            .on_progress(97, 100, Some(encode_web_percent(97)))
            .expect("progress changed");
        assert!(!update.read);

        let update = tracker
            .on_progress(98, 100, Some(encode_web_percent(98)))
            .expect("reached threshold");
        assert!(update.read);
        assert!(update.became_read);
        assert_eq!(update.progress, 0);

        assert_eq!(tracker.on_progress(99, 100, Some(encode_web_percent(99))), None);
    }

    #[test]
    fn native_renderer_marks_read_at_ninety_five_percent() {
        let mut tracker = ProgressTracker::new(0, false);
        let update = tracker.on_progress(18, 20, None).expect("update");
        assert!(update.read);
        assert!(tracker.is_read());
    }

    #[test]
    fn prefetch_signal_fires_once() {
        let mut tracker = ProgressTracker::new(0, false);
        assert!(!tracker.take_next_chapter_prefetch_signal(49, 100));
        assert!(tracker.take_next_chapter_prefetch_signal(50, 100));
        assert!(!tracker.take_next_chapter_prefetch_signal(80, 100));
    }
}
