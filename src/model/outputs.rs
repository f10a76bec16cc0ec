//! Typed payloads for the structured part of an analysis output.
//!
//! LLM answers are parsed into one of these variants before they reach the
//! store; anything that does not fit is quarantined by the caller instead of
//! being stored as a loose map.

use serde::{Deserialize, Serialize};

use super::AnalysisRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Product,
    Spec,
    Price,
    Regulation,
    CaseStudy,
    Recruitment,
}

impl ContentType {
    /// Product launches and spec changes get a follow-up comparison.
    pub fn warrants_comparison(&self) -> bool {
        matches!(self, ContentType::Product | ContentType::Spec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub price_band: Option<String>,
    #[serde(default)]
    pub specs: Vec<String>,
    #[serde(default)]
    pub topic_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendItem {
    pub keyword: String,
    #[serde(default)]
    pub frequency: f64,
    #[serde(default)]
    pub change_rate: f64,
    #[serde(default)]
    pub hypothesis: String,
    #[serde(default)]
    pub next_observation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDigest {
    pub trends: Vec<TrendItem>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub action: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub deadline: String,
    #[serde(default)]
    pub reason: String,
}

/// Department-keyed action plan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrategyPlan {
    #[serde(default)]
    pub sales: Vec<ActionItem>,
    #[serde(default)]
    pub design: Vec<ActionItem>,
    #[serde(default)]
    pub marketing: Vec<ActionItem>,
    #[serde(default)]
    pub product: Vec<ActionItem>,
}

impl StrategyPlan {
    pub fn is_empty(&self) -> bool {
        self.sales.is_empty()
            && self.design.is_empty()
            && self.marketing.is_empty()
            && self.product.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredOutput {
    Classification(Classification),
    Trend(TrendDigest),
    Strategy(StrategyPlan),
}

impl StructuredOutput {
    /// The only role this payload may be stored under.
    pub fn role(&self) -> AnalysisRole {
        match self {
            StructuredOutput::Classification(_) => AnalysisRole::Classify,
            StructuredOutput::Trend(_) => AnalysisRole::Trend,
            StructuredOutput::Strategy(_) => AnalysisRole::Strategy,
        }
    }

    pub fn as_classification(&self) -> Option<&Classification> {
        match self {
            StructuredOutput::Classification(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_trend(&self) -> Option<&TrendDigest> {
        match self {
            StructuredOutput::Trend(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_strategy(&self) -> Option<&StrategyPlan> {
        match self {
            StructuredOutput::Strategy(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_requires_a_known_type() {
        let ok: Classification = serde_json::from_str(
            r#"{"type":"product","company":"Acme Homes","topic_tags":["solar","ZEH"]}"#,
        )
        .unwrap();
        assert!(ok.content_type.warrants_comparison());
        assert_eq!(ok.topic_tags.len(), 2);
        assert!(ok.specs.is_empty());

        assert!(serde_json::from_str::<Classification>(r#"{"type":"gossip"}"#).is_err());
        assert!(serde_json::from_str::<Classification>(r#"{"company":"x"}"#).is_err());
    }

    #[test]
    fn structured_output_is_tagged_by_kind() {
        let out = StructuredOutput::Strategy(StrategyPlan::default());
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["kind"], "strategy");
        assert_eq!(out.role(), AnalysisRole::Strategy);
    }
}
