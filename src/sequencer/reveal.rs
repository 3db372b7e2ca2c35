use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::text::TextSink;

/// Typewriter reveal of one segment's text into the sink, one character per
/// tick. A bracketed `[tag]` unit that survived segmentation is appended
/// whole in a single tick and simultaneously queued on `triggers` so the
/// consumer can fire the expression mid-reveal.
pub struct TextRevealer {
    sink: Arc<dyn TextSink>,
    delay: Duration,
}

impl TextRevealer {
    pub fn new(sink: Arc<dyn TextSink>, delay: Duration) -> Self {
        Self { sink, delay }
    }

    /// Returns early, mid-word, when `cancel` fires; the sink keeps
    /// whatever was revealed up to that point.
    pub async fn reveal(
        &self,
        text: &str,
        triggers: mpsc::UnboundedSender<String>,
        cancel: &CancellationToken,
    ) {
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if cancel.is_cancelled() {
                return;
            }
            if let Some(end) = bracketed_unit(&chars, i) {
                let unit: String = chars[i..=end].iter().collect();
                let tag: String = chars[i + 1..end].iter().collect();
                self.sink.append_text(&unit);
                let _ = triggers.send(tag);
                i = end + 1;
            } else {
                self.sink.append_text(&chars[i].to_string());
                i += 1;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(self.delay) => {}
            }
        }
    }
}

/// Index of the `]` closing a tag opened at `start`, if one exists. An
/// unmatched `[` is no unit; it reveals as a literal character.
fn bracketed_unit(chars: &[char], start: usize) -> Option<usize> {
    if chars[start] != '[' {
        return None;
    }
    chars[start + 1..]
        .iter()
        .position(|&c| c == ']')
        .map(|offset| start + 1 + offset)
}
