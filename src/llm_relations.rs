use kg_types::{EvidenceSide, LlmRecord, Relation};
use serde_json::Value;
use tracing::debug;

use crate::config::{DataLayout, RelationRules};
use crate::entity::{EntitySet, ROLE_TAG_FILE, RoleTag};
use crate::error::Result;
use crate::field::{lookup, safe_get};
use crate::name_index::NameIndex;
use crate::relation::{Evidence, link, write_relations};
use crate::role_align::{AliasIndex, build_alias_index, normalize_alias};
use crate::store;
use crate::tasks::LlmTask;

/// Used when the model omits a confidence or gives a non-number.
pub const DEFAULT_LLM_CONFIDENCE: f64 = 0.5;

pub const CHARACTER_RELATION_FILE: &str = "character_relation";
pub const BELONGS_ROLE_TAG_FILE: &str = "belongs_role_tag_relation";
pub const RESTRAINS_FILE: &str = "restrains_relation";

/// `0.8` and `"0.8"` are both accepted.
fn payload_confidence(v: &Value) -> f64 {
    match lookup(v, &["confidence"]).value() {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|c: &f64| c.is_finite())
    .unwrap_or(DEFAULT_LLM_CONFIDENCE)
}

/// Records whose result is a JSON object; failed calls and odd shapes are
/// skipped here.
fn object_results(records: &[LlmRecord]) -> impl Iterator<Item = (&LlmRecord, &Value)> {
    records.iter().filter_map(|r| match &r.llm_result {
        Some(v @ Value::Object(_)) => Some((r, v)),
        _ => {
            debug!(id = %r.id, "no usable llm result");
            None
        }
    })
}

fn array_field<'a>(v: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    match lookup(v, &[key]).value() {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  CHARACTER ↔ CHARACTER
// ═══════════════════════════════════════════════════════════════════════

pub fn character_relations(records: &[LlmRecord], index: &NameIndex, rules: &RelationRules) -> Vec<Relation> {
    let mut out = Vec::new();
    for (record, result) in object_results(records) {
        let Some(items) = array_field(result, "relations") else {
            debug!(id = %record.id, "result has no relations list");
            continue;
        };
        for item in items.iter().filter(|i| i.is_object()) {
            let predicate = safe_get(item, &["predicate"]);
            let predicate = predicate.trim();
            if predicate.is_empty() || rules.is_noise(predicate) {
                continue;
            }
            let predicate = rules.rewrite_predicate(predicate);

            let subject = safe_get(item, &["subject"]);
            let object = safe_get(item, &["object"]);
            let (Some(subject_id), Some(object_id)) = (index.resolve(&subject), index.resolve(&object)) else {
                continue;
            };
            let side = match safe_get(item, &["direction"]).as_str() {
                "reverse" => EvidenceSide::Object,
                _ => EvidenceSide::Subject,
            };
            let hint = match safe_get(item, &["reasoning_hint"]) {
                h if h.is_empty() => format!("{subject} 与 {object} 的关系是 {predicate}"),
                h => h,
            };
            out.extend(link(
                subject_id,
                predicate,
                object_id,
                Evidence::exact(side, "character_story", safe_get(item, &["evidence"]))
                    .with_confidence(payload_confidence(item)),
                hint,
            ));
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
//  CHARACTER → ROLE TAG
// ═══════════════════════════════════════════════════════════════════════

/// A role-tag label from the model: an exact id or a known name/alias.
fn resolve_role_tag<'a>(label: &str, role_tags: &'a [RoleTag], aliases: &'a AliasIndex) -> Option<&'a str> {
    if let Some(tag) = role_tags.iter().find(|t| t.id == label) {
        return Some(tag.id.as_str());
    }
    aliases.get(&normalize_alias(label)).map(String::as_str)
}

pub fn belongs_role_tag(records: &[LlmRecord], index: &NameIndex, role_tags: &[RoleTag]) -> Vec<Relation> {
    let aliases = build_alias_index(role_tags);
    let mut out = Vec::new();

    for record in records {
        let first = match &record.llm_result {
            Some(Value::Array(items)) => items.first(),
            Some(v @ Value::Object(_)) => array_field(v, "items").and_then(|items| items.first()),
            _ => None,
        };
        let Some(item) = first.filter(|i| i.is_object()) else {
            debug!(id = %record.id, "no role-tag item");
            continue;
        };

        let character = match safe_get(item, &["character"]) {
            c if index.contains(&c) => c,
            _ => record.id.clone(),
        };
        let Some(subject_id) = index.resolve(&character) else {
            continue;
        };
        let evidence_text = safe_get(item, &["evidence"]);
        let hint = safe_get(item, &["reasoning_hint"]);
        let confidence = payload_confidence(item);

        for label in lookup(item, &["role_tags"]).strings() {
            let Some(tag_id) = resolve_role_tag(label.trim(), role_tags, &aliases) else {
                continue;
            };
            out.extend(link(
                subject_id,
                "belongs_role_tag",
                tag_id,
                Evidence::exact(EvidenceSide::Subject, "role_paragraphs", evidence_text.as_str())
                    .with_confidence(confidence),
                if hint.is_empty() {
                    format!("{character} 的定位包含 {label}")
                } else {
                    hint.clone()
                },
            ));
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
//  CHARACTER → MONSTER
// ═══════════════════════════════════════════════════════════════════════

pub fn restrains(records: &[LlmRecord], index: &NameIndex) -> Vec<Relation> {
    let mut out = Vec::new();
    for (record, result) in object_results(records) {
        let subjects = lookup(result, &["subjects"]).strings();
        if subjects.is_empty() {
            continue;
        }
        let Some(monster_id) = index.resolve(&record.id) else {
            continue;
        };
        let evidence_text = match safe_get(result, &["evidence"]) {
            e if e.is_empty() => record.input_text.clone(),
            e => e,
        };
        let confidence = payload_confidence(result);
        let hint = safe_get(result, &["reasoning_hint"]);

        for name in &subjects {
            let Some(subject_id) = index.resolve(name) else {
                continue;
            };
            out.extend(link(
                subject_id,
                "restrains",
                monster_id,
                Evidence::exact(EvidenceSide::Object, "strategy", evidence_text.as_str())
                    .with_confidence(confidence),
                if hint.is_empty() {
                    format!("{name} 克制怪物 {}", record.id)
                } else {
                    hint.clone()
                },
            ));
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
//  RUN ALL
// ═══════════════════════════════════════════════════════════════════════

fn load_checkpoint(layout: &DataLayout, task: LlmTask) -> Result<Vec<LlmRecord>> {
    store::read_json(&layout.llm(task.output_name()))
}

/// Convert the three checkpoint files into relation files. A missing
/// checkpoint aborts: run the matching `llm` task first.
pub fn extract_all(layout: &DataLayout, rules: &RelationRules) -> Result<Vec<(&'static str, usize)>> {
    let entities = EntitySet::load(layout)?;
    let index = NameIndex::from_entities(&entities);
    let role_tags: Vec<RoleTag> = store::read_json(&layout.entity(ROLE_TAG_FILE))?;

    let story = load_checkpoint(layout, LlmTask::CharacterRelations)?;
    let roles = load_checkpoint(layout, LlmTask::RoleTags)?;
    let counters = load_checkpoint(layout, LlmTask::MonsterCounters)?;

    let batches = [
        (CHARACTER_RELATION_FILE, character_relations(&story, &index, rules)),
        (BELONGS_ROLE_TAG_FILE, belongs_role_tag(&roles, &index, &role_tags)),
        (RESTRAINS_FILE, restrains(&counters, &index)),
    ];
    let mut counts = Vec::with_capacity(batches.len());
    for (name, relations) in batches {
        counts.push((name, write_relations(&layout.relation(name), relations)?));
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Character, Monster};
    use kg_types::EvidenceValue;
    use serde_json::json;

    fn record(id: &str, result: Option<Value>) -> LlmRecord {
        LlmRecord {
            id: id.into(),
            input_text: format!("input for {id}"),
            llm_result: result,
            time: "2025-01-01T00:00:00+08:00".into(),
        }
    }

    fn index() -> NameIndex {
        let character = |id: &str, name: &str| Character {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        };
        NameIndex::from_entities(&EntitySet {
            characters: vec![
                character("character1", "胡桃"),
                character("character2", "钟离"),
                character("character3", "行秋"),
            ],
            monsters: vec![Monster {
                id: "monster1".into(),
                name: "丘丘人".into(),
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    #[test]
    fn test_character_relations_filter_and_rewrite() {
        let records = vec![record(
            "胡桃",
            Some(json!({"relations": [
                {"subject": "胡桃", "predicate": "挚友", "object": "钟离", "direction": "forward",
                 "evidence": "客卿", "confidence": 0.9},
                {"subject": "胡桃", "predicate": "提及", "object": "钟离"},
                {"subject": "胡桃", "predicate": "上司", "object": "钟离", "direction": "reverse",
                 "confidence": "0.7"},
                {"subject": "胡桃", "predicate": "朋友", "object": "不存在"},
                "garbage"
            ]})),
        )];
        let edges = character_relations(&records, &index(), &RelationRules::default());
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].predicate, "朋友");
        assert_eq!(edges[0].evidence_side, EvidenceSide::Subject);
        assert_eq!(edges[0].evidence_confidence, 0.9);
        assert_eq!(edges[1].predicate, "上下级");
        assert_eq!(edges[1].evidence_side, EvidenceSide::Object);
        assert_eq!(edges[1].evidence_confidence, 0.7);
    }

    #[test]
    fn test_malformed_results_contribute_nothing() {
        let records = vec![
            record("a", None),
            record("b", Some(json!("text"))),
            record("c", Some(json!({"relations": "not a list"}))),
            record("d", Some(json!({"other": []}))),
        ];
        let rules = RelationRules::default();
        assert!(character_relations(&records, &index(), &rules).is_empty());
        assert!(restrains(&records, &index()).is_empty());
        assert!(belongs_role_tag(&records, &index(), &[]).is_empty());
    }

    #[test]
    fn test_belongs_role_tag_first_item_only() {
        let role_tags = vec![
            RoleTag {
                id: "role_main_dps".into(),
                name: "主C".into(),
                ..Default::default()
            },
            RoleTag {
                id: "role_enabler_pyro".into(),
                name: "火元素附着".into(),
                aliases: vec!["挂火".into()],
                ..Default::default()
            },
        ];
        let records = vec![
            record(
                "胡桃",
                Some(json!({"items": [
                    {"character": "胡桃", "role_tags": ["主C", "挂 火", "未知定位"],
                     "evidence": "站场输出", "confidence": 0.95, "reasoning_hint": "攻略称其为主C"},
                    {"character": "胡桃", "role_tags": ["role_healer"]}
                ]})),
            ),
            record("钟离", Some(json!([{"role_tags": ["role_main_dps"]}]))),
        ];
        let edges = belongs_role_tag(&records, &index(), &role_tags);
        let pairs: Vec<(&str, &str)> = edges
            .iter()
            .map(|e| (e.subject_id.as_str(), e.object_id.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("character1", "role_main_dps"),
                ("character1", "role_enabler_pyro"),
                ("character2", "role_main_dps"),
            ]
        );
        assert_eq!(edges[0].reasoning_hint, "攻略称其为主C");
        assert_eq!(edges[0].evidence_confidence, 0.95);
    }

    #[test]
    fn test_restrains_needs_subjects_and_known_monster() {
        let records = vec![
            record(
                "丘丘人",
                Some(json!({"subjects": ["胡桃", "路人"], "evidence": "火克木盾"})),
            ),
            record("丘丘人", Some(json!({"subjects": []}))),
            record("未知怪物", Some(json!({"subjects": ["胡桃"]}))),
        ];
        let edges = restrains(&records, &index());
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].subject_id, "character1");
        assert_eq!(edges[0].object_id, "monster1");
        assert_eq!(edges[0].evidence_value, EvidenceValue::from("火克木盾"));
        assert_eq!(edges[0].evidence_confidence, DEFAULT_LLM_CONFIDENCE);
    }
}
