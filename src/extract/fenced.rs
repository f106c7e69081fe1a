use once_cell::sync::Lazy;
use regex::Regex;

use super::{parse_object, ExtractStrategy, JsonObject};

#[derive(Default)]
pub struct FencedBlock;

// Triple-backtick fence, optional (case-insensitive) json tag, lazy body.
static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)```").unwrap());

impl ExtractStrategy for FencedBlock {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn extract(&self, text: &str) -> Option<JsonObject> {
        FENCE_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|body| parse_object(body.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_and_untagged_fences() {
        let tagged = "Here you go:\n```json\n{\"a\": 1}\n```\nbye";
        let untagged = "```\n{\"a\": 1}\n```";
        let upper = "```JSON {\"a\": 1}```";
        for text in [tagged, untagged, upper] {
            assert_eq!(FencedBlock.extract(text).unwrap()["a"], 1, "{}", text);
        }
    }

    #[test]
    fn skips_fences_that_are_not_objects() {
        let text = "```\nnot json\n```\nand then\n```json\n{\"b\": true}\n```";
        assert_eq!(FencedBlock.extract(text).unwrap()["b"], true);
    }

    #[test]
    fn no_fence_yields_nothing() {
        assert!(FencedBlock.extract("{\"a\": 1}").is_none());
    }
}
