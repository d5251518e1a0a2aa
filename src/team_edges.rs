use std::collections::HashSet;

use kg_types::{EdgeFile, EvidenceSide, LlmRecord, Relation, TeamStructure};
use serde_json::Value;
use tracing::info;

use crate::config::{DataLayout, RelationRules};
use crate::entity::{CHARACTER_FILE, Character, ROLE_TAG_FILE, RoleTag};
use crate::error::Result;
use crate::field::{lookup, safe_get};
use crate::name_index::NameIndex;
use crate::relation::{Evidence, dedup_relations, link};
use crate::role_align::{AliasIndex, align_role_text_to_role_ids, build_alias_index};
use crate::store;
use crate::tasks::LlmTask;
use crate::team::{
    TEAM_ENTITIES_FILE, archetype_name, archetypes, core_character, slot_lookup, structure_teams,
    team_template_id,
};

pub const TEAM_EDGES_FILE: &str = "team_strategy_edges";

pub const HAS_SLOT_GROUP: &str = "HAS_SLOT_GROUP";
pub const HAS_SLOT: &str = "HAS_SLOT";
pub const REQUIRES_ROLE_TAG: &str = "REQUIRES_ROLE_TAG";
pub const CORE: &str = "CORE";
pub const EXAMPLE_MEMBER: &str = "EXAMPLE_MEMBER";
pub const CANDIDATE: &str = "CANDIDATE";

/// Alignment is keyword-based, so its edges never claim certainty.
pub const ROLE_ALIGN_CONFIDENCE: f64 = 0.85;

/// Longest candidate evidence kept, in characters.
const MAX_CANDIDATE_EVIDENCE: usize = 800;

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ── Structural edges ───────────────────────────────────────────────

/// template → group → slot → role tag.
pub fn structure_edges(structure: &TeamStructure, aliases: &AliasIndex, known_roles: &HashSet<&str>) -> Vec<Relation> {
    let mut edges = Vec::new();

    for g in &structure.slot_groups {
        let evidence = format!(
            "group_type={} min={} max={} mutual_exclusive={} slots=[{}]",
            g.group_type.as_str(),
            g.min_select,
            g.max_select,
            g.mutual_exclusive,
            g.slot_template_ids.join(", ")
        );
        edges.extend(link(
            &g.team_template_id,
            HAS_SLOT_GROUP,
            &g.id,
            Evidence::exact(EvidenceSide::Object, "SlotGroup.team_template_id", evidence),
            format!("{} 包含槽位组 {}", g.team_template_id, g.name),
        ));
    }

    for st in &structure.slot_templates {
        let need = st.need.as_deref().unwrap_or_default();
        let evidence = format!(
            "slot={} must={} need={need} evidence={}",
            st.slot,
            st.must,
            st.evidence.as_deref().unwrap_or_default()
        );
        edges.extend(link(
            &st.slot_group_id,
            HAS_SLOT,
            &st.id,
            Evidence::exact(EvidenceSide::Object, "SlotTemplate.slot_group_id", evidence),
            format!("{} 包含槽位 {}", st.slot_group_id, st.slot),
        ));

        if need.trim().is_empty() {
            continue;
        }
        let (role_ids, used_tokens) = align_role_text_to_role_ids(need, aliases);
        for role_id in role_ids.iter().filter(|r| known_roles.contains(r.as_str())) {
            edges.extend(link(
                &st.id,
                REQUIRES_ROLE_TAG,
                role_id,
                Evidence::exact(
                    EvidenceSide::Subject,
                    "slot.need",
                    format!("need={need} -> tokens=[{}]", used_tokens.join(", ")),
                )
                .with_confidence(ROLE_ALIGN_CONFIDENCE),
                format!("{} 槽位需要能力：{need}（对齐到 {role_id}）", st.slot),
            ));
        }
    }
    edges
}

// ── Membership edges from the model output ─────────────────────────

/// template → core / example members, slot → candidates.
pub fn member_edges(
    records: &[LlmRecord],
    structure: &TeamStructure,
    characters: &NameIndex,
    rules: &RelationRules,
) -> Vec<Relation> {
    let slots = slot_lookup(structure);
    let mut edges = Vec::new();

    for record in records {
        let core = core_character(record);
        for arch in archetypes(record) {
            let name = archetype_name(arch);
            let tt_id = team_template_id(&core, &name);

            if let Some(core_id) = characters.resolve(&core) {
                edges.extend(link(
                    &tt_id,
                    CORE,
                    core_id,
                    Evidence::exact(EvidenceSide::Subject, "archetype.core_evidence", safe_get(arch, &["core_evidence"])),
                    format!("{core} 是 {name} 模板的核心"),
                ));
            }

            let example = lookup(arch, &["example_team"]);
            let example_evidence = example.value().map(|e| safe_get(e, &["evidence"])).unwrap_or_default();
            let members = example.value().map(|e| lookup(e, &["members"]).strings()).unwrap_or_default();
            for member in &members {
                let Some(member_id) = characters.resolve(member) else {
                    continue;
                };
                edges.extend(link(
                    &tt_id,
                    EXAMPLE_MEMBER,
                    member_id,
                    Evidence::exact(EvidenceSide::Subject, "example_team.evidence", example_evidence.as_str()),
                    format!("{member} 出现在 {tt_id} 的示例队伍中"),
                ));
            }

            let candidates: &[Value] = match lookup(arch, &["candidates"]).value() {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            };
            for c in candidates.iter().filter(|c| c.is_object()) {
                let slot = safe_get(c, &["slot"]);
                let character = safe_get(c, &["character"]);
                let (Some(&st_id), Some(cid)) = (slots.get(&(tt_id.as_str(), slot.as_str())), characters.resolve(&character))
                else {
                    continue;
                };
                let fit = lookup(c, &["fit"]).value().and_then(Value::as_str);
                let mut reasons = lookup(c, &["why"]).strings();
                reasons.extend(lookup(c, &["evidence"]).strings());
                edges.extend(link(
                    st_id,
                    CANDIDATE,
                    cid,
                    Evidence::exact(
                        EvidenceSide::Subject,
                        "candidate.why/evidence",
                        truncate_chars(&reasons.join(" | "), MAX_CANDIDATE_EVIDENCE),
                    )
                    .with_confidence(rules.fit_to_confidence(fit)),
                    format!(
                        "{character} 可作为 {slot} 的候选（fit={} role={}）",
                        fit.unwrap_or("-"),
                        safe_get(c, &["role"])
                    ),
                ));
            }
        }
    }
    edges
}

// ═══════════════════════════════════════════════════════════════════════
//  RUN
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct TeamSummary {
    pub team_templates: usize,
    pub slot_groups: usize,
    pub slot_templates: usize,
    pub edges: usize,
}

/// Structure the team-strategy checkpoint and derive its edge layer.
pub fn build_team_layer(layout: &DataLayout, rules: &RelationRules) -> Result<TeamSummary> {
    let records: Vec<LlmRecord> = store::read_json(&layout.llm(LlmTask::TeamStrategy.output_name()))?;
    let characters: Vec<Character> = store::read_json(&layout.entity(CHARACTER_FILE))?;
    let role_tags: Vec<RoleTag> = store::read_json(&layout.entity(ROLE_TAG_FILE))?;

    let structure = structure_teams(&records, rules);
    store::write_json(&layout.entity(TEAM_ENTITIES_FILE), &structure)?;

    let mut character_index = NameIndex::default();
    character_index.extend(&characters);
    let aliases = build_alias_index(&role_tags);
    let known_roles: HashSet<&str> = role_tags.iter().map(|t| t.id.as_str()).collect();

    let mut edges = structure_edges(&structure, &aliases, &known_roles);
    edges.extend(member_edges(&records, &structure, &character_index, rules));
    let edges = dedup_relations(edges);
    store::write_json(&layout.relation(TEAM_EDGES_FILE), &EdgeFile::new(edges.clone()))?;
    info!(edges = edges.len(), "team strategy edges written");

    Ok(TeamSummary {
        team_templates: structure.team_templates.len(),
        slot_groups: structure.slot_groups.len(),
        slot_templates: structure.slot_templates.len(),
        edges: edges.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<LlmRecord> {
        vec![LlmRecord {
            id: "胡桃".into(),
            input_text: String::new(),
            llm_result: Some(json!({
                "core_character": "胡桃",
                "archetypes": [{
                    "name": "蒸发",
                    "core_evidence": "火伤主C",
                    "slots": [
                        {"slot": "主C", "must": true},
                        {"slot": "水位", "must": false, "need": "后台挂水"},
                        {"slot": "奶妈", "must": false, "need": "治疗、护盾"}
                    ],
                    "candidates": [
                        {"slot": "水位", "character": "行秋", "fit": "good", "why": ["挂水稳定"], "evidence": ["原文"]},
                        {"slot": "奶妈", "character": "钟离", "fit": "great"},
                        {"slot": "不存在", "character": "行秋", "fit": "ok"},
                        {"slot": "水位", "character": "路人", "fit": "ok"}
                    ],
                    "example_team": {"members": ["胡桃", "行秋", "无名"], "evidence": "胡行钟夜"}
                }]
            })),
            time: String::new(),
        }]
    }

    fn characters() -> NameIndex {
        let mut index = NameIndex::default();
        index.extend(&[
            Character {
                id: "character1".into(),
                name: "胡桃".into(),
                ..Default::default()
            },
            Character {
                id: "character2".into(),
                name: "行秋".into(),
                ..Default::default()
            },
            Character {
                id: "character3".into(),
                name: "钟离".into(),
                ..Default::default()
            },
        ]);
        index
    }

    fn by_predicate<'a>(edges: &'a [Relation], predicate: &str) -> Vec<&'a Relation> {
        edges.iter().filter(|e| e.predicate == predicate).collect()
    }

    #[test]
    fn test_structure_edges_link_every_level() {
        let rules = RelationRules::default();
        let structure = structure_teams(&records(), &rules);
        let known: HashSet<&str> = ["role_enabler_hydro", "role_healer"].into_iter().collect();
        let edges = structure_edges(&structure, &AliasIndex::new(), &known);

        assert_eq!(by_predicate(&edges, HAS_SLOT_GROUP).len(), 3);
        assert_eq!(by_predicate(&edges, HAS_SLOT).len(), 3);

        let requires = by_predicate(&edges, REQUIRES_ROLE_TAG);
        let targets: Vec<&str> = requires.iter().map(|e| e.object_id.as_str()).collect();
        // role_shielder is aligned but not a known role tag
        assert_eq!(targets, vec!["role_enabler_hydro", "role_healer"]);
        assert!(requires.iter().all(|e| e.evidence_confidence == ROLE_ALIGN_CONFIDENCE));
    }

    #[test]
    fn test_member_edges_resolve_characters_and_slots() {
        let rules = RelationRules::default();
        let structure = structure_teams(&records(), &rules);
        let edges = member_edges(&records(), &structure, &characters(), &rules);

        let core = by_predicate(&edges, CORE);
        assert_eq!(core.len(), 1);
        assert_eq!(core[0].subject_id, "TT:胡桃:蒸发");
        assert_eq!(core[0].object_id, "character1");

        assert_eq!(by_predicate(&edges, EXAMPLE_MEMBER).len(), 2);

        let candidates = by_predicate(&edges, CANDIDATE);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].subject_id, "ST:SG:TT:胡桃:蒸发:flex_element:水位");
        assert_eq!(candidates[0].evidence_confidence, 0.85);
        assert_eq!(candidates[0].evidence_value.to_string(), "挂水稳定 | 原文");
        assert_eq!(candidates[1].subject_id, "ST:SG:TT:胡桃:蒸发:opt_奶妈:奶妈");
        assert_eq!(candidates[1].evidence_confidence, rules.fit_fallback);
    }

    #[test]
    fn test_candidate_evidence_is_truncated() {
        let long = "很".repeat(2000);
        assert_eq!(truncate_chars(&long, MAX_CANDIDATE_EVIDENCE).chars().count(), 800);
        assert_eq!(truncate_chars("短", MAX_CANDIDATE_EVIDENCE), "短");
    }

    #[test]
    fn test_build_team_layer_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), None);
        store::write_json(&layout.llm(LlmTask::TeamStrategy.output_name()), &records()).unwrap();
        store::write_json(
            &layout.entity(CHARACTER_FILE),
            &json!([{"id": "character1", "name": "胡桃"}, {"id": "character2", "name": "行秋"}]),
        )
        .unwrap();
        store::write_json(
            &layout.entity(ROLE_TAG_FILE),
            &json!([{"id": "role_enabler_hydro", "name": "挂水"}]),
        )
        .unwrap();

        let summary = build_team_layer(&layout, &RelationRules::default()).unwrap();
        assert_eq!(summary.team_templates, 1);
        assert_eq!(summary.slot_templates, 3);

        let file: EdgeFile = store::read_json(&layout.relation(TEAM_EDGES_FILE)).unwrap();
        assert_eq!(file.edge_count, file.edges.len());
        assert_eq!(file.edge_count, summary.edges);
        let structure: TeamStructure = store::read_json(&layout.entity(TEAM_ENTITIES_FILE)).unwrap();
        assert_eq!(structure.slot_groups.len(), 3);
    }
}
