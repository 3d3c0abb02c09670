use serde::{Deserialize, Serialize};

use crate::model::TopicId;

//
// ─── BLOCKS ────────────────────────────────────────────────────────────────────
//

/// One typed block of concept material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        text: String,
    },
    List {
        #[serde(default)]
        ordered: bool,
        items: Vec<String>,
    },
    Table {
        #[serde(default)]
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Image {
        url: String,
        #[serde(default)]
        alt: Option<String>,
    },
}

//
// ─── SECTIONS ──────────────────────────────────────────────────────────────────
//

/// A titled section; sections nest to form the concept outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSection {
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub children: Vec<ConceptSection>,
}

impl ConceptSection {
    fn block_count(&self) -> usize {
        self.blocks.len()
            + self
                .children
                .iter()
                .map(ConceptSection::block_count)
                .sum::<usize>()
    }
}

/// Read-only concept material for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptContent {
    pub topic_id: TopicId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<ConceptSection>,
}

impl ConceptContent {
    /// Total number of blocks across all nested sections.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.sections.iter().map(ConceptSection::block_count).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_nested_sections_with_typed_blocks() {
        let json = r#"{
            "topicId": 3,
            "title": "DB basics",
            "sections": [{
                "title": "Keys",
                "blocks": [
                    {"type": "heading", "level": 2, "text": "Primary keys"},
                    {"type": "paragraph", "text": "Uniquely identify a row."}
                ],
                "children": [{
                    "title": "Composite",
                    "blocks": [
                        {"type": "list", "items": ["a", "b"]},
                        {"type": "table", "headers": ["col"], "rows": [["x"]]},
                        {"type": "image", "url": "https://cdn.example.com/er.png"}
                    ]
                }]
            }]
        }"#;

        let content: ConceptContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.topic_id, TopicId::new(3));
        assert_eq!(content.block_count(), 5);
        assert!(!content.is_empty());
        assert!(matches!(
            content.sections[0].children[0].blocks[0],
            ContentBlock::List { ordered: false, .. }
        ));
    }

    #[test]
    fn image_blocks_keep_relative_paths() {
        let json = r#"{
            "topicId": 3,
            "sections": [{
                "title": "Diagrams",
                "blocks": [{"type": "image", "url": "/img/erd.png", "alt": "ERD"}]
            }]
        }"#;

        let content: ConceptContent = serde_json::from_str(json).unwrap();
        assert_eq!(
            content.sections[0].blocks[0],
            ContentBlock::Image {
                url: "/img/erd.png".into(),
                alt: Some("ERD".into()),
            }
        );
    }
}
