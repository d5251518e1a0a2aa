use std::collections::HashMap;
use std::sync::LazyLock;

use kg_types::{GroupType, LlmRecord, SlotGroup, SlotTemplate, TeamStructure, TeamTemplate};
use regex::Regex;
use serde_json::Value;

use crate::config::RelationRules;
use crate::field::{lookup, safe_get};

pub const TEAM_ENTITIES_FILE: &str = "team_strategy_entities";

const FIXED_REQUIRED: &str = "fixed_required";
const FLEX_ELEMENT: &str = "flex_element";

// ── Slugs and ids ──────────────────────────────────────────────────

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\u{4e00}-\u{9fff}0-9A-Za-z_-]+").unwrap());
static RE_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Id-safe form of a free-text name: `"胡桃 (蒸发)"` → `"胡桃_蒸发"`.
pub fn slug(text: &str) -> String {
    let s = RE_WHITESPACE.replace_all(text.trim(), "_");
    let s = RE_DISALLOWED.replace_all(&s, "_");
    let s = RE_UNDERSCORES.replace_all(&s, "_");
    let s = s.trim_matches('_');
    if s.is_empty() {
        "UNKNOWN".to_string()
    } else {
        s.to_string()
    }
}

pub fn team_template_id(core: &str, archetype: &str) -> String {
    format!("TT:{}:{}", slug(core), slug(archetype))
}

pub fn slot_group_id(team_template_id: &str, group: &str) -> String {
    format!("SG:{team_template_id}:{group}")
}

pub fn slot_template_id(slot_group_id: &str, slot: &str) -> String {
    format!("ST:{slot_group_id}:{}", slug(slot))
}

// ── Reading the model output ───────────────────────────────────────

fn opt_text(v: &Value, key: &str) -> Option<String> {
    match lookup(v, &[key]).value() {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn objects<'a>(v: &'a Value, keys: &[&str]) -> impl Iterator<Item = &'a Value> {
    let items: &'a [Value] = match lookup(v, keys).value() {
        Some(Value::Array(items)) => items,
        _ => &[],
    };
    items.iter().filter(|i| i.is_object())
}

fn text_or(v: &Value, key: &str, fallback: &str) -> String {
    match safe_get(v, &[key]) {
        s if s.trim().is_empty() => fallback.to_string(),
        s => s,
    }
}

/// Core character named by one checkpoint record.
pub fn core_character(record: &LlmRecord) -> String {
    let from_result = record
        .llm_result
        .as_ref()
        .map(|r| safe_get(r, &["core_character"]))
        .unwrap_or_default();
    if !from_result.trim().is_empty() {
        from_result
    } else if !record.id.is_empty() {
        record.id.clone()
    } else {
        "UNKNOWN_CORE".to_string()
    }
}

/// The archetype objects of one checkpoint record.
pub fn archetypes(record: &LlmRecord) -> Vec<&Value> {
    match &record.llm_result {
        Some(result) => objects(result, &["archetypes"]).collect(),
        None => Vec::new(),
    }
}

pub fn archetype_name(archetype: &Value) -> String {
    text_or(archetype, "name", "UNKNOWN_ARCHETYPE")
}

// ═══════════════════════════════════════════════════════════════════════
//  STRUCTURER
// ═══════════════════════════════════════════════════════════════════════

/// Which group a slot lands in.
enum Bucket {
    Required,
    Element,
    Optional,
}

fn structure_archetype(core: &str, archetype: &Value, rules: &RelationRules, out: &mut TeamStructure) {
    let name = archetype_name(archetype);
    let tt_id = team_template_id(core, &name);

    let example = lookup(archetype, &["example_team"]).value();
    out.team_templates.push(TeamTemplate {
        id: tt_id.clone(),
        label: "TeamTemplate".to_string(),
        core_character: core.to_string(),
        archetype_name: name,
        focus: lookup(archetype, &["focus"]).value().and_then(Value::as_bool).unwrap_or(false),
        core_role: opt_text(archetype, "core_role"),
        core_evidence: opt_text(archetype, "core_evidence"),
        example_team_members: example.map(|e| lookup(e, &["members"]).strings()).unwrap_or_default(),
        example_team_evidence: example.and_then(|e| opt_text(e, "evidence")),
    });

    let required_id = slot_group_id(&tt_id, FIXED_REQUIRED);
    let flex_id = slot_group_id(&tt_id, FLEX_ELEMENT);
    let mut required: Vec<String> = Vec::new();
    let mut flex: Vec<String> = Vec::new();
    let mut optional: Vec<(String, String, String)> = Vec::new();

    for s in objects(archetype, &["slots"]) {
        let slot = text_or(s, "slot", "UNKNOWN_SLOT");
        let must = lookup(s, &["must"]).value().and_then(Value::as_bool).unwrap_or(false);
        let bucket = match (must, rules.is_element_slot(&slot)) {
            (true, _) => Bucket::Required,
            (false, true) => Bucket::Element,
            (false, false) => Bucket::Optional,
        };
        let group_id = match bucket {
            Bucket::Required => required_id.clone(),
            Bucket::Element => flex_id.clone(),
            Bucket::Optional => slot_group_id(&tt_id, &format!("opt_{}", slug(&slot))),
        };
        let st_id = slot_template_id(&group_id, &slot);

        match bucket {
            Bucket::Required => required.push(st_id.clone()),
            Bucket::Element => flex.push(st_id.clone()),
            Bucket::Optional => optional.push((group_id.clone(), st_id.clone(), slug(&slot))),
        }

        out.slot_templates.push(SlotTemplate {
            id: st_id,
            label: "SlotTemplate".to_string(),
            team_template_id: tt_id.clone(),
            slot,
            need: opt_text(s, "need"),
            must,
            evidence: opt_text(s, "evidence"),
            slot_group_id: group_id,
        });
    }

    if !required.is_empty() {
        out.slot_groups.push(SlotGroup {
            id: required_id,
            label: "SlotGroup".to_string(),
            team_template_id: tt_id.clone(),
            name: FIXED_REQUIRED.to_string(),
            group_type: GroupType::FixedRequired,
            min_select: required.len(),
            max_select: required.len(),
            mutual_exclusive: false,
            slot_template_ids: required,
            description: "该组内所有 Slot 必须全部满足（固定必选）。".to_string(),
        });
    }
    if !flex.is_empty() {
        out.slot_groups.push(SlotGroup {
            id: flex_id,
            label: "SlotGroup".to_string(),
            team_template_id: tt_id.clone(),
            name: FLEX_ELEMENT.to_string(),
            group_type: GroupType::Flex,
            min_select: 0,
            max_select: 1,
            mutual_exclusive: true,
            slot_template_ids: flex,
            description: "元素灵活位：水/火/冰/雷/草/风 等位通常互斥，最多选择一个。".to_string(),
        });
    }
    for (group_id, st_id, slot_slug) in optional {
        out.slot_groups.push(SlotGroup {
            id: group_id,
            label: "SlotGroup".to_string(),
            team_template_id: tt_id.clone(),
            name: format!("opt_{slot_slug}"),
            group_type: GroupType::OptionalIndependent,
            min_select: 0,
            max_select: 1,
            mutual_exclusive: false,
            slot_template_ids: vec![st_id],
            description: "独立可选位：该槽可选填 0 或 1 个。".to_string(),
        });
    }
}

/// Keep one record per id: first position, last content.
pub fn dedup_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &str) -> Vec<T> {
    let mut slot_of: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        match slot_of.get(id(&item)) {
            Some(&i) => out[i] = item,
            None => {
                slot_of.insert(id(&item).to_string(), out.len());
                out.push(item);
            }
        }
    }
    out
}

/// Turn team-strategy checkpoint records into the template → group → slot
/// hierarchy. Records without a usable result contribute nothing.
pub fn structure_teams(records: &[LlmRecord], rules: &RelationRules) -> TeamStructure {
    let mut out = TeamStructure::default();
    for record in records {
        let core = core_character(record);
        for archetype in archetypes(record) {
            structure_archetype(&core, archetype, rules, &mut out);
        }
    }
    TeamStructure {
        team_templates: dedup_by_id(out.team_templates, |t| t.id.as_str()),
        slot_groups: dedup_by_id(out.slot_groups, |g| g.id.as_str()),
        slot_templates: dedup_by_id(out.slot_templates, |s| s.id.as_str()),
    }
}

/// `(team template id, slot name)` → slot template id.
pub fn slot_lookup(structure: &TeamStructure) -> HashMap<(&str, &str), &str> {
    structure
        .slot_templates
        .iter()
        .map(|st| ((st.team_template_id.as_str(), st.slot.as_str()), st.id.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(result: Value) -> LlmRecord {
        LlmRecord {
            id: "胡桃".into(),
            input_text: String::new(),
            llm_result: Some(result),
            time: String::new(),
        }
    }

    fn hutao_vaporize() -> LlmRecord {
        record(json!({
            "core_character": "胡桃",
            "archetypes": [{
                "name": "蒸发 队",
                "focus": true,
                "slots": [
                    {"slot": "主C", "must": true, "need": "站场输出"},
                    {"slot": "水位", "must": false, "need": "后台挂水"},
                    {"slot": "冰位", "must": false},
                    {"slot": "奶妈", "must": false, "need": "治疗"}
                ],
                "example_team": {"members": ["胡桃", "行秋"], "evidence": "经典"}
            }]
        }))
    }

    #[test]
    fn test_slug_rules() {
        assert_eq!(slug("  胡桃 (蒸发)  "), "胡桃_蒸发");
        assert_eq!(slug("a  b__c"), "a_b_c");
        assert_eq!(slug("!!!"), "UNKNOWN");
        assert_eq!(slug(""), "UNKNOWN");
        assert_eq!(team_template_id("胡桃", "蒸发 队"), "TT:胡桃:蒸发_队");
    }

    #[test]
    fn test_slots_partition_into_three_group_kinds() {
        let s = structure_teams(&[hutao_vaporize()], &RelationRules::default());
        assert_eq!(s.team_templates.len(), 1);
        assert_eq!(s.slot_templates.len(), 4);

        let of_type = |t: GroupType| s.slot_groups.iter().filter(move |g| g.group_type == t).collect::<Vec<_>>();

        let fixed = of_type(GroupType::FixedRequired);
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].slot_template_ids.len(), 1);
        assert_eq!(fixed[0].id, "SG:TT:胡桃:蒸发_队:fixed_required");

        let flex = of_type(GroupType::Flex);
        assert_eq!(flex.len(), 1);
        assert_eq!(flex[0].slot_template_ids.len(), 2);
        assert_eq!(flex[0].max_select, 1);
        assert!(flex[0].mutual_exclusive);
        assert_eq!(flex[0].name, "flex_element");

        let optional = of_type(GroupType::OptionalIndependent);
        assert_eq!(optional.len(), 1);
        assert_eq!(optional[0].name, "opt_奶妈");
        assert_eq!(optional[0].max_select, 1);
    }

    #[test]
    fn test_every_slot_links_to_exactly_one_group() {
        let s = structure_teams(&[hutao_vaporize()], &RelationRules::default());
        for st in &s.slot_templates {
            let owners: Vec<&SlotGroup> = s
                .slot_groups
                .iter()
                .filter(|g| g.slot_template_ids.contains(&st.id))
                .collect();
            assert_eq!(owners.len(), 1, "{}", st.id);
            assert_eq!(owners[0].id, st.slot_group_id);
            assert!(st.id.starts_with(&format!("ST:{}:", st.slot_group_id)));
        }
        let tt = &s.team_templates[0];
        assert_eq!(tt.example_team_members, vec!["胡桃", "行秋"]);
        assert!(tt.focus);
    }

    #[test]
    fn test_colliding_archetypes_last_seen_wins() {
        let r = record(json!({
            "core_character": "胡桃",
            "archetypes": [
                {"name": "蒸发队", "core_role": "first"},
                {"name": "蒸发-队!", "core_role": "ignored"},
                {"name": "蒸发队", "core_role": "second"}
            ]
        }));
        let s = structure_teams(&[r], &RelationRules::default());
        assert_eq!(s.team_templates.len(), 2);
        assert_eq!(s.team_templates[0].core_role.as_deref(), Some("second"));
    }

    #[test]
    fn test_missing_result_or_names_fall_back() {
        let mut failed = hutao_vaporize();
        failed.llm_result = None;
        assert!(structure_teams(&[failed], &RelationRules::default()).team_templates.is_empty());

        let r = LlmRecord {
            id: "钟离".into(),
            input_text: String::new(),
            llm_result: Some(json!({"archetypes": [{"slots": [{"must": true}]}]})),
            time: String::new(),
        };
        let s = structure_teams(&[r], &RelationRules::default());
        assert_eq!(s.team_templates[0].id, "TT:钟离:UNKNOWN_ARCHETYPE");
        assert_eq!(s.slot_templates[0].slot, "UNKNOWN_SLOT");
    }

    #[test]
    fn test_serialized_structure_has_no_provenance_fields() {
        let s = structure_teams(&[hutao_vaporize()], &RelationRules::default());
        let v = serde_json::to_value(&s).unwrap();
        let tt = &v["TeamTemplate"][0];
        assert!(tt.get("source_time").is_none());
        assert!(tt.get("source_entry_id").is_none());
        assert_eq!(v["SlotGroup"][0]["group_type"], "fixed_required");
    }
}
