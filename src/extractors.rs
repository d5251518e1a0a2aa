use kg_types::{EvidenceSide, Relation};
use tracing::info;

use crate::config::{DataLayout, RelationRules};
use crate::entity::*;
use crate::error::Result;
use crate::name_index::NameIndex;
use crate::relation::{Evidence, link, write_relations};
use crate::store;

/// Subjective (guide-derived) edges sit just below structural ones.
pub const GUIDE_CONFIDENCE: f64 = 0.9;

const ARTIFACT_GUIDE_FIELD: &str = "圣遗物-角色攻略文本推理";
const WEAPON_GUIDE_FIELD: &str = "角色-武器攻略文本推理";

// ═══════════════════════════════════════════════════════════════════════
//  STRUCTURAL EXTRACTORS
// ═══════════════════════════════════════════════════════════════════════

/// character/weapon → material, from each material's usage map.
pub fn needs_material(materials: &[Material], index: &NameIndex, rules: &RelationRules) -> Vec<Relation> {
    let mut out = Vec::new();
    for mat in materials {
        let rule = rules.material_rule(&mat.kind);
        for (subject_name, usage) in &mat.usage {
            if usage.is_empty() {
                continue;
            }
            let Some(subject_id) = index.resolve(subject_name) else {
                continue;
            };
            out.extend(link(
                subject_id,
                &rule.predicate,
                &mat.id,
                Evidence::exact(EvidenceSide::Object, "usage", usage.as_str()),
                rule.render_hint(subject_name, &mat.name, usage),
            ));
        }
    }
    out
}

/// monster → material. The evidence is the whole drop list.
pub fn drops_material(monsters: &[Monster], index: &NameIndex) -> Vec<Relation> {
    let mut out = Vec::new();
    for m in monsters {
        for item in &m.drop {
            let Some(object_id) = index.resolve(item) else {
                continue;
            };
            out.extend(link(
                &m.id,
                "drops_material",
                object_id,
                Evidence::exact(EvidenceSide::Subject, "drop", m.drop.clone()),
                format!("击杀怪物 {} 掉落材料 {item}", m.name),
            ));
        }
    }
    out
}

/// Exact name match between a character field and a catalogue entry.
fn match_catalog(
    characters: &[Character],
    catalog: &[CatalogEntity],
    predicate: &str,
    field: &str,
    pick: impl Fn(&Character) -> &str,
    hint: impl Fn(&str, &str) -> String,
) -> Vec<Relation> {
    let mut out = Vec::new();
    for c in characters {
        let value = pick(c);
        if value.is_empty() {
            continue;
        }
        for entry in catalog.iter().filter(|e| e.name == value) {
            out.extend(link(
                &c.id,
                predicate,
                &entry.id,
                Evidence::exact(EvidenceSide::Subject, field, value),
                hint(&c.name, value),
            ));
        }
    }
    out
}

pub fn from_country(characters: &[Character], countries: &[CatalogEntity]) -> Vec<Relation> {
    match_catalog(
        characters,
        countries,
        "from_country",
        "country",
        |c| c.country.as_str(),
        |name, country| format!("角色 {name} 来自于 {country} 地区"),
    )
}

pub fn has_element(characters: &[Character], elements: &[CatalogEntity]) -> Vec<Relation> {
    match_catalog(
        characters,
        elements,
        "has_element",
        "element",
        |c| c.element.as_str(),
        |name, element| format!("角色 {name} 拥有 {element} 元素能力"),
    )
}

/// element/reaction → reaction, when the source's name appears in the
/// reaction's trigger text.
pub fn triggers_reaction(reactions: &[Reaction], elements: &[CatalogEntity]) -> Vec<Relation> {
    let sources = elements
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .chain(reactions.iter().map(|r| (r.id.as_str(), r.name.as_str())));
    let sources: Vec<(&str, &str)> = sources.filter(|(_, name)| !name.is_empty()).collect();

    let mut out = Vec::new();
    for r in reactions {
        let trigger = r.trigger_text();
        if trigger.is_empty() {
            continue;
        }
        for &(source_id, source_name) in &sources {
            if source_id == r.id || !trigger.contains(source_name) {
                continue;
            }
            out.extend(link(
                source_id,
                "triggers_reaction",
                &r.id,
                Evidence::exact(EvidenceSide::Object, "trigger_elements", trigger),
                format!("{source_name} 参与触发反应 {}", r.name),
            ));
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
//  GUIDE-DERIVED EXTRACTORS
// ═══════════════════════════════════════════════════════════════════════

/// character → artifact, from each artifact's recommended-role blocks.
pub fn suits_artifact(artifacts: &[Artifact], index: &NameIndex) -> Vec<Relation> {
    let mut out = Vec::new();
    for a in artifacts {
        for block in a.recommended_roles.iter().filter(|b| !b.roles.is_empty()) {
            for name in &block.roles {
                let Some(subject_id) = index.resolve(name) else {
                    continue;
                };
                out.extend(link(
                    subject_id,
                    "suits",
                    &a.id,
                    Evidence::exact(EvidenceSide::Object, ARTIFACT_GUIDE_FIELD, block.desc.as_str())
                        .with_confidence(GUIDE_CONFIDENCE),
                    format!("角色 {name} 适配圣遗物 {} 的套装效果", a.name),
                ));
            }
        }
    }
    out
}

/// character → weapon, ranked by the guide's recommendation order.
pub fn suits_weapon(strategies: &[CharacterStrategy], index: &NameIndex) -> Vec<Relation> {
    let mut out = Vec::new();
    for s in strategies {
        let Some(subject_id) = index.resolve(&s.character) else {
            continue;
        };
        for w in s.weapons.iter().filter(|w| !w.description.is_empty()) {
            let Some(object_id) = index.resolve(&w.weapon) else {
                continue;
            };
            let edge = link(
                subject_id,
                "suits_weapon",
                object_id,
                Evidence::exact(EvidenceSide::Subject, WEAPON_GUIDE_FIELD, w.description.as_str())
                    .with_confidence(GUIDE_CONFIDENCE),
                format!("角色 {} 适合武器 {} 的效果", s.character, w.weapon),
            );
            out.extend(edge.map(|mut r| {
                r.priority = Some(w.priority);
                r
            }));
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
//  RUN ALL
// ═══════════════════════════════════════════════════════════════════════

pub const NEEDS_MATERIAL_FILE: &str = "needs_material_relation";
pub const DROPS_MATERIAL_FILE: &str = "drops_material_relation";
pub const FROM_COUNTRY_FILE: &str = "from_country_relation";
pub const HAS_ELEMENT_FILE: &str = "has_element_relation";
pub const SUITS_ARTIFACT_FILE: &str = "suits_artifact_relation";
pub const SUITS_WEAPON_FILE: &str = "suits_weapon_relation";
pub const TRIGGERS_REACTION_FILE: &str = "triggers_reaction_relation";

/// Load the consolidated entities, run every structural extractor and write
/// one file per relation kind. Returns `(file, edge count)` pairs.
pub fn extract_all(layout: &DataLayout, rules: &RelationRules) -> Result<Vec<(&'static str, usize)>> {
    let entities = EntitySet::load(layout)?;
    let strategies: Vec<CharacterStrategy> = store::read_json(&layout.external(STRATEGY_FILE))?;
    let index = NameIndex::from_entities(&entities);
    info!(names = index.len(), "name index built");

    let batches = [
        (NEEDS_MATERIAL_FILE, needs_material(&entities.materials, &index, rules)),
        (DROPS_MATERIAL_FILE, drops_material(&entities.monsters, &index)),
        (FROM_COUNTRY_FILE, from_country(&entities.characters, &entities.countries)),
        (HAS_ELEMENT_FILE, has_element(&entities.characters, &entities.elements)),
        (SUITS_ARTIFACT_FILE, suits_artifact(&entities.artifacts, &index)),
        (SUITS_WEAPON_FILE, suits_weapon(&strategies, &index)),
        (TRIGGERS_REACTION_FILE, triggers_reaction(&entities.reactions, &entities.elements)),
    ];

    let mut counts = Vec::with_capacity(batches.len());
    for (name, relations) in batches {
        counts.push((name, write_relations(&layout.relation(name), relations)?));
    }
    Ok(counts)
}
