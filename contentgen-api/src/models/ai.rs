use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DraftContentRequest {
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
}

/// Writing register injected into the system prompt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Article,
    Tutorial,
    Academic,
    Casual,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Article => "article",
            Tone::Tutorial => "tutorial",
            Tone::Academic => "academic",
            Tone::Casual => "casual",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToneQuery {
    #[serde(default)]
    pub tone: Tone,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationQuery {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub flagged: bool,
    pub categories: HashMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tone_query_default() {
        let query: ToneQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query.tone, Tone::Article);

        let query: ToneQuery = serde_json::from_value(json!({"tone": "casual"})).unwrap();
        assert_eq!(query.tone.as_str(), "casual");

        assert!(serde_json::from_value::<ToneQuery>(json!({"tone": "poetic"})).is_err());
    }
}
