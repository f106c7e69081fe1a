use super::{parse_object, ExtractStrategy, JsonObject};

/// Candidate starts tried before giving up.  Bounds the scan to
/// `MAX_SCAN_STARTS * len` on text full of unmatched braces.
pub const MAX_SCAN_STARTS: usize = 64;

/// Last resort for objects embedded in prose.
///
/// Each `{` (up to [`MAX_SCAN_STARTS`]) is tried as a start.  Its partner `}` is found by depth counting
/// that skips over JSON string literals, so braces inside quoted values do
/// not end the span early.  The first span that parses as an object wins;
/// stray braces in the surrounding prose only cost a failed parse.
#[derive(Default)]
pub struct BalancedBraceScan;

impl ExtractStrategy for BalancedBraceScan {
    fn name(&self) -> &'static str {
        "balanced_brace"
    }

    fn extract(&self, text: &str) -> Option<JsonObject> {
        let bytes = text.as_bytes();
        bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'{')
            .take(MAX_SCAN_STARTS)
            .filter_map(|(start, _)| matching_close(bytes, start).map(|end| (start, end)))
            .find_map(|(start, end)| parse_object(&text[start..=end]))
    }
}

/// Index of the `}` closing the `{` at `open`, if the text ever balances.
/// Works on bytes: every byte compared is ASCII, and ASCII bytes never occur
/// inside a multi-byte UTF-8 sequence.
fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_between_prose() {
        let text = "Of course. {\"posts\": [{\"type\": \"story\"}]} Hope that helps!";
        let obj = BalancedBraceScan.extract(text).unwrap();
        assert_eq!(obj["posts"][0]["type"], "story");
    }

    #[test]
    fn prose_braces_before_and_after_do_not_poison_the_span() {
        let text = "Use {curly} braces wisely: {\"posts\": []} and close with }";
        let obj = BalancedBraceScan.extract(text).unwrap();
        assert!(obj["posts"].as_array().unwrap().is_empty());
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"result -> {"posts": [{"text": "smile :} {", "tip": "say \"hi\" }"}]} <- end"#;
        let obj = BalancedBraceScan.extract(text).unwrap();
        assert_eq!(obj["posts"][0]["text"], "smile :} {");
        assert_eq!(obj["posts"][0]["tip"], "say \"hi\" }");
    }

    #[test]
    fn multibyte_prose_is_handled() {
        let text = "はい、どうぞ！{\"posts\": [{\"text\": \"朝のコーヒー☕\"}]}以上です。";
        let obj = BalancedBraceScan.extract(text).unwrap();
        assert_eq!(obj["posts"][0]["text"], "朝のコーヒー☕");
    }

    #[test]
    fn unbalanced_text_yields_nothing() {
        assert!(BalancedBraceScan.extract("{\"posts\": [").is_none());
        assert!(BalancedBraceScan.extract("no braces at all").is_none());
    }

    #[test]
    fn matching_close_tracks_depth() {
        let bytes = b"{a{b}c}d";
        assert_eq!(matching_close(bytes, 0), Some(6));
        assert_eq!(matching_close(bytes, 2), Some(4));
    }

    #[test]
    fn gives_up_after_bounded_number_of_starts() {
        let noisy = format!("{}{{\"posts\": []}}", "{".repeat(MAX_SCAN_STARTS));
        assert!(BalancedBraceScan.extract(&noisy).is_none());

        let few = format!("{}{{\"posts\": []}}", "{ ".repeat(MAX_SCAN_STARTS - 1));
        assert!(BalancedBraceScan.extract(&few).is_some());
    }
}
