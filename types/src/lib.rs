use std::fmt;

use serde::{Deserialize, Serialize};

// ── Relation edge ────────────────────────────────────────────────────────

/// Which endpoint's source field the evidence was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSide {
    Subject,
    Object,
}

/// The literal data justifying an edge: usually text, sometimes the whole
/// source list (e.g. a monster's full drop list).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceValue {
    Text(String),
    List(Vec<String>),
}

impl EvidenceValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(v) => v.is_empty(),
        }
    }
}

impl fmt::Display for EvidenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::List(v) => write!(f, "[{}]", v.join("、")),
        }
    }
}

impl From<String> for EvidenceValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for EvidenceValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<String>> for EvidenceValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

/// A fixed-schema graph edge with its evidence trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub subject_id: String,
    pub predicate: String,
    pub object_id: String,
    /// Only the suits-weapon edges carry a rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    pub evidence_side: EvidenceSide,
    pub evidence_field: String,
    pub evidence_value: EvidenceValue,
    pub evidence_confidence: f64,
    pub evidence_rule: String,
    pub reasoning_hint: String,
}

impl Relation {
    /// Identity used for duplicate suppression. The flag keeps a list
    /// value apart from a text that renders the same.
    pub fn dedup_key(&self) -> (String, String, String, String, bool, String) {
        (
            self.subject_id.clone(),
            self.predicate.clone(),
            self.object_id.clone(),
            self.evidence_field.clone(),
            matches!(self.evidence_value, EvidenceValue::List(_)),
            self.evidence_value.to_string(),
        )
    }
}

/// Wrapper written for the team-strategy edge layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeFile {
    pub edges: Vec<Relation>,
    pub edge_count: usize,
}

impl EdgeFile {
    pub fn new(edges: Vec<Relation>) -> Self {
        let edge_count = edges.len();
        Self { edges, edge_count }
    }
}

// ── LLM checkpoint record ────────────────────────────────────────────────

/// One processed item of a batch extraction run. `llm_result` is `None`
/// when the external call failed; the item still counts as processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRecord {
    pub id: String,
    pub input_text: String,
    pub llm_result: Option<serde_json::Value>,
    pub time: String,
}

// ── Team composition hierarchy ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamTemplate {
    pub id: String,
    pub label: String,
    pub core_character: String,
    pub archetype_name: String,
    pub focus: bool,
    #[serde(default)]
    pub core_role: Option<String>,
    #[serde(default)]
    pub core_evidence: Option<String>,
    #[serde(default)]
    pub example_team_members: Vec<String>,
    #[serde(default)]
    pub example_team_evidence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    /// Every slot in the group must be filled.
    FixedRequired,
    /// Elemental slots: mutually exclusive, pick at most one.
    Flex,
    /// A single optional slot, pick zero or one.
    OptionalIndependent,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedRequired => "fixed_required",
            Self::Flex => "flex",
            Self::OptionalIndependent => "optional_independent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotGroup {
    pub id: String,
    pub label: String,
    pub team_template_id: String,
    pub name: String,
    pub group_type: GroupType,
    pub min_select: usize,
    pub max_select: usize,
    pub mutual_exclusive: bool,
    pub slot_template_ids: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotTemplate {
    pub id: String,
    pub label: String,
    pub team_template_id: String,
    pub slot: String,
    #[serde(default)]
    pub need: Option<String>,
    pub must: bool,
    #[serde(default)]
    pub evidence: Option<String>,
    pub slot_group_id: String,
}

/// Serialized as `{"TeamTemplate": [...], "SlotGroup": [...], "SlotTemplate": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStructure {
    #[serde(rename = "TeamTemplate", default)]
    pub team_templates: Vec<TeamTemplate>,
    #[serde(rename = "SlotGroup", default)]
    pub slot_groups: Vec<SlotGroup>,
    #[serde(rename = "SlotTemplate", default)]
    pub slot_templates: Vec<SlotTemplate>,
}
