//! SRT captions built from word timings.

use std::fmt::Write as _;
use std::time::Duration;

use crate::transcribe::WordTimestamp;

/// Words shown together in one caption cue.
pub const WORDS_PER_CUE: usize = 3;

/// `HH:MM:SS,mmm`
fn srt_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, millis) = (rest / 1000, rest % 1000);
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Build an SRT document, [`WORDS_PER_CUE`] words per cue, with every
/// timestamp shifted by `offset` (the silence prepended to the narration).
///
/// Returns `None` when there are no words.
pub fn build_srt(words: &[WordTimestamp], offset: Duration) -> Option<String> {
    if words.is_empty() {
        return None;
    }

    let shift = offset.as_secs_f64();
    let mut srt = String::new();
    for (i, cue) in words.chunks(WORDS_PER_CUE).enumerate() {
        // chunks() never yields an empty slice
        let (first, last) = (&cue[0], &cue[cue.len() - 1]);
        let text = cue
            .iter()
            .map(|w| w.word.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let start = first.start + shift;
        let end = (last.end + shift).max(start);
        let _ = write!(
            srt,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(start),
            srt_timestamp(end),
            text
        );
    }
    Some(srt)
}
