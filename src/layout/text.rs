use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{Point, TextLayout};

pub(crate) const LINE_HEIGHT_RATIO: f32 = 1.2;

static INSTANCE_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\d+)").unwrap());

/// Turns an entity id or a sentence into display lines of at most
/// `max_chars_per_line` characters (a single longer word keeps its own line).
///
/// Instance suffixes (`_3`) are dropped and `_`, `/` and spaces all separate words.
pub(crate) fn wrap_text(text: &str, max_chars_per_line: usize, split_on_period: bool) -> Vec<String> {
    let text = if split_on_period {
        text.split('.').next().unwrap_or_default()
    } else {
        text
    };
    let cleaned = INSTANCE_SUFFIX_RE.replace_all(text, "");
    let cleaned = cleaned.replace(['/', ' '], "_");

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in cleaned.split('_').map(str::trim) {
        if current.chars().count() + word.chars().count() <= max_chars_per_line {
            current.push_str(word);
            current.push(' ');
        } else {
            let line = current.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            current = format!("{word} ");
        }
    }
    let line = current.trim();
    if !line.is_empty() {
        lines.push(line.to_string());
    }
    lines
}

pub(crate) fn label(text: &str, max_chars_per_line: usize, anchor: Point, size: f32) -> TextLayout {
    TextLayout {
        lines: wrap_text(text, max_chars_per_line, false),
        anchor,
        size,
        line_height: size * LINE_HEIGHT_RATIO,
    }
}

/// Base type used for instruction matching: `kitchen_counter_0` -> `kitchen counter`.
pub(crate) fn readable_base(id: &str) -> String {
    let mut parts: Vec<&str> = id.split('_').collect();
    parts.pop();
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_instance_suffix_and_splits_words() {
        assert_eq!(wrap_text("kitchen_counter_12", 20, false), vec!["kitchen counter"]);
        assert_eq!(wrap_text("kitchen_counter_12", 8, false), vec!["kitchen", "counter"]);
    }

    #[test]
    fn long_single_word_keeps_its_own_line() {
        assert_eq!(
            wrap_text("refrigerator_0", 4, false),
            vec!["refrigerator"]
        );
    }

    #[test]
    fn slashes_and_spaces_separate_words() {
        assert_eq!(
            wrap_text("Put the cup/mug away", 12, false),
            vec!["Put the cup", "mug away"]
        );
    }

    #[test]
    fn split_on_period_keeps_the_first_sentence() {
        assert_eq!(wrap_text("bedroom_1.closet", 100, true), vec!["bedroom"]);
    }

    #[test]
    fn readable_base_joins_with_spaces() {
        assert_eq!(readable_base("living_room_0"), "living room");
        assert_eq!(readable_base("sofa"), "");
    }
}
