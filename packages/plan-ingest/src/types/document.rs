//! Documents - plans enriched with classifier metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::plan::Plan;

/// Classification attributes attached to a plan.
///
/// This is also the structured-output schema requested from the classifier,
/// so every field is required and documented for the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metadata {
    /// Dominant stroke: "freestyle", "backstroke", "breaststroke", "butterfly", "medley" or "mixed"
    pub stroke: String,

    /// Main training goal: "endurance", "speed", "technique", "recovery" or "competition"
    pub focus: String,

    /// Swimmer level: "beginner", "intermediate" or "advanced"
    pub level: String,

    /// Intended audience, e.g. "masters", "youth", "triathlon", "fitness"
    pub target_group: String,

    /// Equipment the plan needs ("pull buoy", "fins", "kickboard", ...)
    pub equipment: Vec<String>,

    /// Free keywords useful for retrieval
    pub keywords: Vec<String>,
}

/// A plan together with its metadata, ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub plan: Plan,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(plan: Plan, metadata: Metadata) -> Self {
        Self { plan, metadata }
    }

    /// Text that gets embedded: title, description and the rendered table.
    pub fn page_content(&self) -> String {
        self.plan.text()
    }

    /// Filterable attribute map stored next to the embedding.
    pub fn attributes(&self) -> Map<String, Value> {
        let mut attrs = match serde_json::to_value(&self.metadata) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(url = %self.plan.url, value = %other, "Metadata is not a JSON object");
                Map::new()
            }
            Err(e) => {
                warn!(url = %self.plan.url, error = %e, "Failed to serialize metadata");
                Map::new()
            }
        };
        attrs.insert("plan_id".into(), Value::String(self.plan.id.to_string()));
        attrs.insert("url".into(), Value::String(self.plan.url.clone()));
        attrs.insert("title".into(), Value::String(self.plan.title.clone()));
        attrs.insert(
            "total_distance".into(),
            Value::from(self.plan.table.total_distance()),
        );
        attrs
    }

    /// Whether the plan has no exercise rows.
    pub fn is_empty(&self) -> bool {
        self.plan.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::plan::{Row, Table};

    fn sample_document() -> Document {
        let mut table = Table::new();
        table.push(Row::new(4, 100, "Kraul").with_intensity("GA1"));
        table.add_sum();
        table.update_sum();

        Document::new(
            Plan::new("https://example.com/plan/7", "Ausdauer 400", "Lockeres Einschwimmen", table),
            Metadata {
                stroke: "freestyle".into(),
                focus: "endurance".into(),
                level: "beginner".into(),
                target_group: "fitness".into(),
                equipment: vec![],
                keywords: vec!["ga1".into()],
            },
        )
    }

    #[test]
    fn test_attributes_include_plan_fields() {
        let doc = sample_document();
        let attrs = doc.attributes();

        assert_eq!(attrs["stroke"], "freestyle");
        assert_eq!(attrs["url"], "https://example.com/plan/7");
        assert_eq!(attrs["plan_id"], doc.plan.id.to_string());
        assert_eq!(attrs["total_distance"], 400);
    }

    #[test]
    fn test_page_content_contains_table() {
        let content = sample_document().page_content();

        assert!(content.starts_with("Ausdauer 400\nLockeres Einschwimmen\n"));
        assert!(content.contains("4 x 100m"));
        assert!(content.contains("Gesamt: 400m"));
    }
}
