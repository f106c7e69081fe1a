use super::{parse_object, ExtractStrategy, JsonObject};

/// The happy path: the whole text is the object.
#[derive(Default)]
pub struct DirectParse;

impl ExtractStrategy for DirectParse {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn extract(&self, text: &str) -> Option<JsonObject> {
        parse_object(text)
    }
}
