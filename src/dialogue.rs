/// A contiguous span of reply text with the expression tag that precedes it.
/// `emotion` is `None` for text before the first tag; `Some("")` for an
/// explicit empty tag `[]`, which resets the expression when applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub emotion: Option<String>,
    pub text: String,
}

/// PURE FUNCTION: splits a tagged reply like `[好奇]你好[脸红]吗` into ordered
/// segments. `[` opens a tag, the next `]` closes it; the tag applies to the
/// text that follows it until the next tag or end of input. Malformed tag
/// syntax (an unmatched `[`) degrades to literal text, never an error.
/// Whitespace-only spans are dropped; flushed text is trimmed.
pub fn segment(text: &str) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut emotion: Option<String> = None;
    let mut buf = String::new();

    let mut flush = |emotion: &Option<String>, buf: &mut String| {
        let trimmed = buf.trim();
        if !trimmed.is_empty() {
            segments.push(Segment {
                emotion: emotion.clone(),
                text: trimmed.to_string(),
            });
        }
        buf.clear();
    };

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '[' {
            if let Some(offset) = chars[i + 1..].iter().position(|&c| c == ']') {
                flush(&emotion, &mut buf);
                emotion = Some(chars[i + 1..i + 1 + offset].iter().collect());
                i += offset + 2;
                continue;
            }
            // No closing bracket ahead: literal character.
        }
        buf.push(chars[i]);
        i += 1;
    }
    flush(&emotion, &mut buf);

    segments
}

/// Removes parenthesized stage directions before text is sent to speech
/// synthesis; the revealed text keeps them. Uses the fullwidth pair `（）`
/// when the text contains one, the ASCII pair otherwise. Each open swallows
/// text up to the first close; an open with no close drops the bracket and
/// keeps the text.
pub fn strip_stage_directions(text: &str) -> String {
    let (open, close) = if text.contains('（') {
        ('（', '）')
    } else {
        ('(', ')')
    };

    text.split(open)
        .map(|piece| match piece.split_once(close) {
            Some((_, rest)) => rest,
            None => piece,
        })
        .collect()
}
