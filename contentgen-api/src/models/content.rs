//! Tiptap (ProseMirror) document model used for post bodies.
//!
//! Posts store their body as JSON. Incoming documents are parsed into these
//! types, checked, and re-serialized so the database only ever holds
//! normalized documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ApiError, ApiResult, ValidationErrorBuilder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocType {
    #[default]
    #[serde(rename = "doc")]
    Doc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Doc,
    Paragraph,
    Heading,
    Text,
    Image,
    ImageBlock,
    Video,
    CodeBlock,
    OrderedList,
    BulletList,
    ListItem,
    Table,
    TableRow,
    TableCell,
    Blockquote,
    HorizontalRule,
    HardBreak,
}

impl NodeType {
    fn is_block(&self) -> bool {
        !matches!(self, NodeType::Text | NodeType::HardBreak)
    }
}

/// Width/height attributes arrive either as pixels or as CSS strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dimension {
    Pixels(i64),
    Css(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_align: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<Dimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Dimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<MarkAttrs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<NodeAttrs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<Mark>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TiptapDoc {
    #[serde(rename = "type", default)]
    pub doc_type: DocType,
    #[serde(default)]
    pub content: Vec<Node>,
}

impl TiptapDoc {
    /// Parse and check a raw JSON document
    pub fn from_value(value: Value) -> ApiResult<Self> {
        let doc: TiptapDoc = serde_json::from_value(value).map_err(|e| ApiError::Validation {
            message: "Invalid content document".to_string(),
            fields: vec![super::error::FieldError {
                field: "content".to_string(),
                message: e.to_string(),
                code: "INVALID_DOCUMENT".to_string(),
            }],
        })?;
        doc.check()?;
        Ok(doc)
    }

    fn check(&self) -> ApiResult<()> {
        let mut errors = ValidationErrorBuilder::new();
        for (i, node) in self.content.iter().enumerate() {
            check_node(node, &format!("content[{}]", i), &mut errors);
        }
        errors.build("Invalid content document")
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Text of the document with one line per top-level block
    pub fn plain_text(&self) -> String {
        self.content
            .iter()
            .map(|node| {
                let mut buf = String::new();
                collect_text(node, &mut buf);
                buf.trim().to_string()
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First `max_chars` characters of the text, cut at a word boundary
    pub fn excerpt(&self, max_chars: usize) -> Option<String> {
        let text = self.plain_text().replace('\n', " ");
        if text.is_empty() {
            return None;
        }
        if text.chars().count() <= max_chars {
            return Some(text);
        }
        let cut: String = text.chars().take(max_chars).collect();
        let trimmed = match cut.rfind(' ') {
            Some(idx) if idx > 0 => &cut[..idx],
            _ => cut.as_str(),
        };
        Some(format!("{}...", trimmed.trim_end()))
    }
}

fn check_node(node: &Node, path: &str, errors: &mut ValidationErrorBuilder) {
    match node.node_type {
        NodeType::Doc => errors.add_error(path, "Nested documents are not allowed"),
        NodeType::Text => {
            if node.text.as_deref().map_or(true, str::is_empty) {
                errors.add_error(path, "Text nodes must carry non-empty text");
            }
            if node.content.is_some() {
                errors.add_error(path, "Text nodes cannot have children");
            }
        }
        NodeType::Heading => {
            let level = node.attrs.as_ref().and_then(|a| a.level);
            if let Some(level) = level {
                if !(1..=6).contains(&level) {
                    errors.add_error(path, format!("Heading level {} is out of range 1-6", level));
                }
            }
        }
        _ => {}
    }

    if let Some(children) = &node.content {
        for (i, child) in children.iter().enumerate() {
            check_node(child, &format!("{}.content[{}]", path, i), errors);
        }
    }
}

fn collect_text(node: &Node, buf: &mut String) {
    match node.node_type {
        NodeType::Text => {
            if let Some(text) = &node.text {
                buf.push_str(text);
            }
        }
        NodeType::HardBreak => buf.push(' '),
        _ => {
            if let Some(children) = &node.content {
                for child in children {
                    collect_text(child, buf);
                    if child.node_type.is_block() && !buf.ends_with(' ') {
                        buf.push(' ');
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "type": "doc",
            "content": [
                {
                    "type": "heading",
                    "attrs": {"textAlign": "left", "level": 2},
                    "content": [{"type": "text", "text": "Getting started"}]
                },
                {
                    "type": "paragraph",
                    "attrs": {"textAlign": "left", "unknownAttr": true},
                    "content": [
                        {"type": "text", "text": "Read the "},
                        {
                            "type": "text",
                            "text": "docs",
                            "marks": [{"type": "link", "attrs": {"href": "https://docs.rs"}}]
                        }
                    ]
                },
                {
                    "type": "image",
                    "attrs": {"src": "http://localhost:9000/uploads/a.png", "width": "100%", "height": 320}
                }
            ]
        })
    }

    #[test]
    fn test_parses_valid_document() {
        let doc = TiptapDoc::from_value(sample()).unwrap();
        assert_eq!(doc.content.len(), 3);
        assert_eq!(doc.content[0].node_type, NodeType::Heading);

        let image_attrs = doc.content[2].attrs.as_ref().unwrap();
        assert_eq!(image_attrs.width, Some(Dimension::Css("100%".to_string())));
        assert_eq!(image_attrs.height, Some(Dimension::Pixels(320)));
    }

    #[test]
    fn test_normalized_output_drops_unknown_attrs() {
        let doc = TiptapDoc::from_value(sample()).unwrap();
        let value = doc.to_value();
        assert_eq!(value["content"][1]["attrs"], json!({"textAlign": "left"}));
        assert_eq!(value["type"], "doc");
    }

    #[test]
    fn test_rejects_unknown_top_level_field() {
        let result = TiptapDoc::from_value(json!({"type": "doc", "content": [], "extra": 1}));
        assert!(matches!(result, Err(ApiError::Validation { .. })));
    }

    #[test]
    fn test_rejects_unknown_node_type() {
        let result = TiptapDoc::from_value(json!({
            "type": "doc",
            "content": [{"type": "marquee"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_semantic_errors_carry_paths() {
        let result = TiptapDoc::from_value(json!({
            "type": "doc",
            "content": [
                {"type": "heading", "attrs": {"level": 9}, "content": [{"type": "text", "text": "x"}]},
                {"type": "paragraph", "content": [{"type": "text"}]}
            ]
        }));

        match result {
            Err(ApiError::Validation { fields, .. }) => {
                let paths: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(paths, vec!["content[0]", "content[1].content[0]"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_and_excerpt() {
        let doc = TiptapDoc::from_value(sample()).unwrap();
        assert_eq!(doc.plain_text(), "Getting started\nRead the docs");
        assert_eq!(doc.excerpt(500).as_deref(), Some("Getting started Read the docs"));
        assert_eq!(doc.excerpt(12).as_deref(), Some("Getting..."));
        assert_eq!(TiptapDoc::default().excerpt(10), None);
    }
}
