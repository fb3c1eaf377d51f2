//! Splits long input into sentence-aligned segments.

const LOG_TARGET: &str = "balancer::segment";

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Sentence-like spans of `text`, in order.
///
/// A span runs up to and including a run of terminators. Trailing text with no
/// terminator becomes the last span, so the spans always concatenate back to
/// `text`.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !is_terminator(next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }
        out.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Length in characters, the unit `max_len` is expressed in.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Groups sentences into segments of at most `max_len` characters.
///
/// Text that already fits is returned as a single segment. A sentence longer
/// than `max_len` is not subdivided; it ends up alone in an oversized segment.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    if char_len(text) <= max_len {
        return vec![text.to_owned()];
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences(text) {
        let len = char_len(sentence);
        if current_len + len > max_len && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if len > max_len {
            tracing::warn!(
                target: LOG_TARGET,
                len,
                max_len,
                "sentence exceeds the segment limit and is sent unsplit"
            );
        }
        current.push_str(sentence);
        current_len += len;
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_cover_the_whole_input() {
        let text = "Hello there. How are you?! Fine。 Trailing bit";
        let spans = sentences(text);
        assert_eq!(
            spans,
            vec!["Hello there.", " How are you?!", " Fine。", " Trailing bit"]
        );
        assert_eq!(spans.concat(), text);
    }

    #[test]
    fn full_width_terminators_split() {
        assert_eq!(sentences("你好！今天好吗？好。"), vec!["你好！", "今天好吗？", "好。"]);
    }

    #[test]
    fn short_text_is_a_single_segment() {
        assert_eq!(split_text("A. B. C.", 100), vec!["A. B. C."]);
        assert_eq!(split_text("", 100), vec![""]);
    }

    #[test]
    fn segments_respect_the_limit_and_keep_order() {
        let text = "One one. Two two two. Three. Four four four. Five.";
        let segments = split_text(text, 20);
        for s in &segments {
            assert!(char_len(s) <= 20, "segment too long: {s:?}");
        }
        assert_eq!(segments.concat(), text);
        assert_eq!(
            segments,
            vec![
                "One one.",
                " Two two two. Three.",
                " Four four four.",
                " Five."
            ]
        );
    }

    #[test]
    fn oversized_sentence_gets_its_own_segment() {
        let long = "x".repeat(30) + ".";
        let text = format!("Hi. {long} Bye.");
        let segments = split_text(&text, 10);
        assert_eq!(segments, vec!["Hi.".to_owned(), format!(" {long}"), " Bye.".to_owned()]);
        assert!(segments.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let text = "日本語です。".repeat(4);
        // 6 characters per sentence, 18 bytes each.
        let segments = split_text(&text, 12);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| char_len(s) == 12));
    }

    #[test]
    fn nine_thousand_characters_make_three_segments() {
        let sentence = "The quick brown fox jumps over the lazy dogs.";
        assert_eq!(char_len(sentence), 45);
        let text = sentence.repeat(200);
        assert_eq!(char_len(&text), 9000);

        let segments = split_text(&text, 4096);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| char_len(s) <= 4096));
        assert_eq!(segments.concat(), text);
    }
}
