use std::collections::HashMap;
use std::path::Path;

use kg_types::{EvidenceSide, EvidenceValue, Relation};
use tracing::info;

use crate::error::Result;
use crate::store;

/// Where an edge's justification came from.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub side: EvidenceSide,
    pub field: String,
    pub value: EvidenceValue,
    pub confidence: f64,
}

impl Evidence {
    /// Structural evidence read straight from a source field.
    pub fn exact(side: EvidenceSide, field: &str, value: impl Into<EvidenceValue>) -> Self {
        Self {
            side,
            field: field.to_string(),
            value: value.into(),
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Assemble one edge. Returns `None` when an endpoint id or the evidence
/// field is empty: an unresolved name never produces an edge.
pub fn link(
    subject_id: &str,
    predicate: &str,
    object_id: &str,
    evidence: Evidence,
    reasoning_hint: String,
) -> Option<Relation> {
    if subject_id.is_empty() || object_id.is_empty() || predicate.is_empty() || evidence.field.is_empty() {
        return None;
    }
    Some(Relation {
        subject_id: subject_id.to_string(),
        predicate: predicate.to_string(),
        object_id: object_id.to_string(),
        priority: None,
        evidence_side: evidence.side,
        evidence_rule: format!("{}=>{predicate}", evidence.field),
        evidence_field: evidence.field,
        evidence_value: evidence.value,
        evidence_confidence: evidence.confidence,
        reasoning_hint,
    })
}

/// Drop edges sharing (subject, predicate, object, evidence field, evidence
/// value). An edge keeps the position of its first occurrence and the
/// content of its last one.
pub fn dedup_relations(relations: Vec<Relation>) -> Vec<Relation> {
    let mut slot_of: HashMap<_, usize> = HashMap::with_capacity(relations.len());
    let mut out: Vec<Relation> = Vec::with_capacity(relations.len());
    for rel in relations {
        match slot_of.get(&rel.dedup_key()) {
            Some(&i) => out[i] = rel,
            None => {
                slot_of.insert(rel.dedup_key(), out.len());
                out.push(rel);
            }
        }
    }
    out
}

/// Deduplicate and write one relation file; returns the edge count.
pub fn write_relations(path: &Path, relations: Vec<Relation>) -> Result<usize> {
    let before = relations.len();
    let relations = dedup_relations(relations);
    store::write_json(path, &relations)?;
    info!(
        file = %path.display(),
        edges = relations.len(),
        duplicates = before - relations.len(),
        "wrote relations"
    );
    Ok(relations.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(value: &str, hint: &str) -> Relation {
        link(
            "character1",
            "needs_material",
            "material1",
            Evidence::exact(EvidenceSide::Object, "usage", value),
            hint.to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_link_fills_rule_and_rejects_missing_ids() {
        let r = edge("突破", "h");
        assert_eq!(r.evidence_rule, "usage=>needs_material");
        assert_eq!(r.evidence_confidence, 1.0);
        assert!(r.priority.is_none());

        let ev = || Evidence::exact(EvidenceSide::Subject, "drop", "x");
        assert!(link("", "p", "o", ev(), String::new()).is_none());
        assert!(link("s", "p", "", ev(), String::new()).is_none());
        assert!(link("s", "p", "o", Evidence::exact(EvidenceSide::Subject, "", "x"), String::new()).is_none());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let ev = Evidence::exact(EvidenceSide::Subject, "f", "v").with_confidence(1.7);
        assert_eq!(ev.confidence, 1.0);
    }

    #[test]
    fn test_dedup_keeps_one_edge_last_content_wins() {
        let out = dedup_relations(vec![edge("突破", "first"), edge("天赋", "other"), edge("突破", "second")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].reasoning_hint, "second");
        assert_eq!(out[1].evidence_value, EvidenceValue::from("天赋"));
    }

    #[test]
    fn test_list_and_text_evidence_dedup_separately() {
        let mut a = edge("x", "h");
        let mut b = edge("x", "h");
        a.evidence_value = EvidenceValue::List(vec!["x".into()]);
        b.evidence_value = EvidenceValue::List(vec!["x".into()]);
        assert_eq!(dedup_relations(vec![a, b, edge("x", "h")]).len(), 2);
    }

    #[test]
    fn test_text_rendered_like_a_list_is_not_merged() {
        let mut list = edge("x", "h");
        list.evidence_value = EvidenceValue::List(vec!["a".into(), "b".into()]);
        let text = edge("[a、b]", "h");
        assert_eq!(list.evidence_value.to_string(), "[a、b]");
        assert_eq!(dedup_relations(vec![list, text]).len(), 2);
    }

    #[test]
    fn test_write_relations_deduplicates_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("needs_material_relation.json");
        let n = write_relations(&path, vec![edge("a", "h"), edge("a", "h")]).unwrap();
        assert_eq!(n, 1);
        let back: Vec<Relation> = store::read_json(&path).unwrap();
        assert_eq!(back.len(), 1);
    }
}
