use anima::dialogue::{segment, strip_stage_directions, Segment};

#[test]
fn test_plain_reply_becomes_single_untagged_segment() {
    // 1. A reply with no tags at all.
    let segments = segment("  你好，今天过得怎么样？  ");

    // 2. One segment, trimmed, no emotion.
    assert_eq!(
        segments,
        vec![Segment {
            emotion: None,
            text: "你好，今天过得怎么样？".to_string(),
        }]
    );
}

#[test]
fn test_tagged_reply_splits_at_emotion_boundaries() {
    let segments = segment("[开心]你好呀！[害羞]其实我有点紧张。");

    assert_eq!(segments.len(), 2, "one segment per tag");
    assert_eq!(segments[0].emotion.as_deref(), Some("开心"));
    assert_eq!(segments[0].text, "你好呀！");
    assert_eq!(segments[1].emotion.as_deref(), Some("害羞"));
    assert_eq!(segments[1].text, "其实我有点紧张。");
}

#[test]
fn test_text_before_first_tag_carries_no_emotion() {
    let segments = segment("嗯……[开心]明白了！");

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].emotion, None);
    assert_eq!(segments[0].text, "嗯……");
    assert_eq!(segments[1].emotion.as_deref(), Some("开心"));
}

#[test]
fn test_unmatched_open_bracket_is_literal_text() {
    // No closing bracket anywhere ahead, so `[` is just a character.
    let segments = segment("数组用 arr[0 这种写法");

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].emotion, None);
    assert_eq!(segments[0].text, "数组用 arr[0 这种写法");
}

#[test]
fn test_empty_tag_is_kept_distinct_from_no_tag() {
    // `[]` is an explicit reset marker, not the absence of a tag.
    let segments = segment("前面[]后面");

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].emotion, None);
    assert_eq!(segments[1].emotion.as_deref(), Some(""));
    assert_eq!(segments[1].text, "后面");
}

#[test]
fn test_whitespace_only_spans_are_dropped() {
    // The text under [开心] is all whitespace and must not become a segment.
    let segments = segment("[开心]   [难过]唉。");

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].emotion.as_deref(), Some("难过"));
    assert_eq!(segments[0].text, "唉。");
}

#[test]
fn test_trailing_tag_with_no_text_yields_nothing() {
    let segments = segment("再见！[难过]");

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, "再见！");
}

#[test]
fn test_empty_input_yields_no_segments() {
    assert!(segment("").is_empty());
    assert!(segment("   \n  ").is_empty());
}

#[test]
fn test_strip_fullwidth_stage_directions() {
    let spoken = strip_stage_directions("（轻轻挥手）你好呀（微笑）很高兴见到你");
    assert_eq!(spoken, "你好呀很高兴见到你");
}

#[test]
fn test_strip_ascii_stage_directions() {
    let spoken = strip_stage_directions("(waves) hello there");
    assert_eq!(spoken, " hello there");
}

#[test]
fn test_fullwidth_pair_wins_when_both_present() {
    // A single fullwidth paren switches the whole pass to the fullwidth
    // pair; ASCII parens are then ordinary text.
    let spoken = strip_stage_directions("（笑）好的 (ok) 没问题");
    assert_eq!(spoken, "好的 (ok) 没问题");
}

#[test]
fn test_unclosed_direction_keeps_following_text() {
    let spoken = strip_stage_directions("等等（这里没有闭合");
    assert_eq!(spoken, "等等这里没有闭合");
}

#[test]
fn test_strip_leaves_plain_text_untouched() {
    assert_eq!(strip_stage_directions("就是普通的一句话"), "就是普通的一句话");
}
