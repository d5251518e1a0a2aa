use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::info;

use crate::config::DataLayout;
use crate::entity::*;
use crate::error::Result;
use crate::field::{UsagePolicy, extract_char_usage, lookup, safe_get, split_list, split_words};
use crate::snapshot;
use crate::store;

/// Material type whose usage lists name every character that needs it.
pub const ASCENSION_MATERIAL_TYPE: &str = "天赋培养素材";
/// Usage key standing for "any character" in ascension material usage text.
pub const ANY_CHARACTER_KEY: &str = "角色";
/// Separator between monster strategy snippets.
pub const STRATEGY_SEPARATOR: &str = "\n---\n";

const LIST_DELIMS: &[char] = &['、'];
const MONSTER_LIST_DELIMS: &[char] = &[',', '、'];

// ── Character detail sections ──────────────────────────────────────

/// Which block of a character's wiki page a detail record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailSection {
    /// Section titled with the character's own name: title, region, artworks.
    Profile,
    /// 其他信息: nicknames, birthday, voice actor.
    OtherInfo,
    /// 角色故事: narrative text.
    Stories,
}

impl DetailSection {
    /// Classify a detail record's `section` for the given character.
    /// Sections the pipeline does not use (突破, 命之座, ...) yield `None`.
    pub fn from_section_name(character: &str, section: &str) -> Option<Self> {
        match section {
            "其他信息" => Some(Self::OtherInfo),
            "角色故事" => Some(Self::Stories),
            s if !s.is_empty() && s == character => Some(Self::Profile),
            _ => None,
        }
    }
}

/// Detail records keyed by `(character, section)`. When the crawler
/// emitted the same pair twice the first record is kept.
#[derive(Debug, Default)]
pub struct DetailIndex<'a> {
    records: HashMap<(String, DetailSection), &'a Value>,
}

impl<'a> DetailIndex<'a> {
    pub fn build(details: &'a [Value]) -> Self {
        let mut records = HashMap::new();
        for d in details {
            let character = safe_get(d, &["character"]);
            let section = safe_get(d, &["section"]);
            if let Some(kind) = DetailSection::from_section_name(&character, &section) {
                records.entry((character, kind)).or_insert(d);
            }
        }
        Self { records }
    }

    /// The matching record, or an empty object so every field defaults.
    pub fn get(&self, character: &str, section: DetailSection) -> &Value {
        static EMPTY: Value = Value::Null;
        self.records
            .get(&(character.to_string(), section))
            .copied()
            .unwrap_or(&EMPTY)
    }
}

// ── Field derivations ──────────────────────────────────────────────

/// The traveler appears as `旅行者/空` or `旅行者/荧`; the graph calls them
/// `空主` / `荧主`.
pub fn normalize_character_name(raw: &str) -> String {
    if raw.contains("旅行者/")
        && let Some(last) = raw.chars().last()
    {
        return format!("{last}主");
    }
    raw.to_string()
}

/// `"5"` → `"5星"`; anything already carrying text is left alone.
pub fn with_star_suffix(rarity: &str) -> String {
    if !rarity.is_empty() && rarity.chars().all(|c| c.is_ascii_digit()) {
        format!("{rarity}星")
    } else {
        rarity.to_string()
    }
}

/// Spread the shared `角色` usage to every character listed without one,
/// then drop the placeholder. Specific usages are never replaced.
pub fn backfill_shared_usage(material: &mut Material) {
    if material.kind != ASCENSION_MATERIAL_TYPE {
        return;
    }
    let Some(shared) = material.usage.remove(ANY_CHARACTER_KEY) else {
        return;
    };
    for usage in material.usage.values_mut() {
        if usage.is_empty() {
            usage.clone_from(&shared);
        }
    }
}

fn first_artwork_url(profile: &Value) -> String {
    match lookup(profile, &["artworks"]).value() {
        Some(Value::Array(items)) => items.first().map(|a| safe_get(a, &["url"])).unwrap_or_default(),
        _ => String::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  PURE BUILDERS: raw records → canonical records
// ═══════════════════════════════════════════════════════════════════════

pub fn build_characters(rows: &[Value], details: &[Value]) -> (Vec<Character>, Vec<CharacterStory>) {
    let index = DetailIndex::build(details);
    let mut characters = Vec::with_capacity(rows.len());
    let mut stories = Vec::with_capacity(rows.len());

    for (i, c) in rows.iter().enumerate() {
        let name = normalize_character_name(&safe_get(c, &["名称"]));
        let profile = index.get(&name, DetailSection::Profile);
        let other = index.get(&name, DetailSection::OtherInfo);
        let story = index.get(&name, DetailSection::Stories);

        characters.push(Character {
            id: format!("character{}", i + 1),
            nickname: split_list(&safe_get(other, &["table", "昵称/外号"]), LIST_DELIMS),
            title: safe_get(profile, &["table", "称号"]),
            gender: safe_get(c, &["性别"]),
            body_type: safe_get(other, &["table", "体型"]),
            rarity: safe_get(c, &["稀有度"]),
            element: safe_get(c, &["元素属性"]),
            primordial_force: safe_get(profile, &["table", "始基力"]),
            weapon_type: safe_get(c, &["武器类型"]),
            country: safe_get(profile, &["table", "所属地区"]),
            affiliation: safe_get(other, &["table", "所属"]),
            profession: safe_get(other, &["table", "职业"]),
            species: safe_get(profile, &["table", "种族"]),
            constellation: safe_get(profile, &["table", "命之座"]),
            special_dish: safe_get(profile, &["table", "特殊料理"]),
            tags: split_list(&safe_get(c, &["TAG"]), LIST_DELIMS),
            description: safe_get(profile, &["table", "介绍"]),
            birthday: safe_get(other, &["table", "生日"]),
            cn_cv: safe_get(other, &["table", "中文CV"]),
            img_src: first_artwork_url(profile),
            name: name.clone(),
        });

        stories.push(CharacterStory {
            id: format!("character_story{}", i + 1),
            stories: lookup(story, &["table"])
                .value()
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default())),
            name,
        });
    }

    (characters, stories)
}

pub fn build_weapons(rows: &[Value]) -> Vec<Weapon> {
    rows.iter()
        .enumerate()
        .map(|(i, w)| Weapon {
            id: format!("weapon{}", i + 1),
            name: safe_get(w, &["名称"]),
            kind: safe_get(w, &["类型"]),
            rarity: with_star_suffix(&safe_get(w, &["稀有度"])),
            source: safe_get(w, &["获取途径"]),
            min_attack: safe_get(w, &["初始攻击力"]),
            max_attack: safe_get(w, &["最高攻击力"]),
            min_subproperty: safe_get(w, &["初始副属性"]),
            max_subproperty: safe_get(w, &["最高副属性"]),
            effect: safe_get(w, &["技能"]),
            img_src: safe_get(w, &["图标"]),
        })
        .collect()
}

pub fn build_materials(rows: &[Value]) -> Vec<Material> {
    rows.iter()
        .enumerate()
        .map(|(i, m)| {
            let mut material = Material {
                id: format!("material{}", i + 1),
                name: safe_get(m, &["name"]),
                kind: safe_get(m, &["type"]),
                rarity: safe_get(m, &["rarity"]),
                source: safe_get(m, &["source"]),
                usage: extract_char_usage(&safe_get(m, &["usage"]), UsagePolicy::KeepLatestNonEmpty),
                img_src: safe_get(m, &["icon"]),
            };
            backfill_shared_usage(&mut material);
            material
        })
        .collect()
}

pub fn build_monsters(rows: &[Value]) -> Vec<Monster> {
    rows.iter()
        .enumerate()
        .map(|(i, m)| {
            // set semantics: duplicates collapse, crawler order is not kept
            let drop: BTreeSet<String> = lookup(m, &["drop"]).strings().into_iter().collect();

            let mut parts = lookup(m, &["recommend"]).strings();
            parts.retain(|p| !p.is_empty());
            let info = safe_get(m, &["info"]);
            if !info.is_empty() {
                parts.push(info);
            }

            Monster {
                id: format!("monster{}", i + 1),
                name: safe_get(m, &["name"]),
                element: safe_get(m, &["element"]),
                kind: safe_get(m, &["type"]),
                refresh_time: safe_get(m, &["refresh time"]),
                region: split_words(&safe_get(m, &["location"]), MONSTER_LIST_DELIMS),
                tags: split_words(&safe_get(m, &["TAG"]), MONSTER_LIST_DELIMS),
                drop: drop.into_iter().collect(),
                strategy: parts.join(STRATEGY_SEPARATOR),
                img_src: safe_get(m, &["icon"]),
            }
        })
        .collect()
}

pub fn build_artifacts(rows: &[Value]) -> Vec<Artifact> {
    rows.iter()
        .enumerate()
        .map(|(i, a)| {
            let recommended_roles: Vec<RecommendedRoles> = match lookup(a, &["recommended_roles"]).value() {
                Some(Value::Array(blocks)) => blocks
                    .iter()
                    .filter(|b| b.is_object())
                    .map(|b| RecommendedRoles {
                        desc: safe_get(b, &["desc"]),
                        roles: lookup(b, &["roles"]).strings(),
                    })
                    .collect(),
                _ => Vec::new(),
            };
            let suits_roles = recommended_roles
                .iter()
                .flat_map(|r| r.roles.iter().cloned())
                .collect();

            Artifact {
                id: format!("artifact{}", i + 1),
                name: safe_get(a, &["名称"]),
                rarity_range: safe_get(a, &["最低/高稀有度"]),
                source: safe_get(a, &["获取途径"]),
                two_piece_effect: safe_get(a, &["两件套效果"]),
                four_piece_effect: safe_get(a, &["四件套效果"]),
                img_src: safe_get(a, &["图标"]),
                suits_roles,
                recommended_roles,
            }
        })
        .collect()
}

/// One voice line per entry; the id counter runs across all characters.
pub fn build_voices(rows: &[Value]) -> Vec<VoiceLine> {
    let mut voices = Vec::new();
    for row in rows {
        let name = safe_get(row, &["character"]);
        let Some(Value::Array(lines)) = lookup(row, &["voices"]).value() else {
            continue;
        };
        for v in lines.iter().filter(|v| v.is_object()) {
            voices.push(VoiceLine {
                id: format!("character_voice_{}", voices.len() + 1),
                name: name.clone(),
                title: safe_get(v, &["title"]),
                cn_text: safe_get(v, &["cn_text"]),
                cn_audio: safe_get(v, &["cn_audio"]),
            });
        }
    }
    voices
}

/// The crawler stores weapons as `{name: reason}` in page order; turn that
/// into a ranked list. A pre-ranked list is accepted as is.
pub fn build_strategies(rows: &[Value]) -> Vec<CharacterStrategy> {
    rows.iter()
        .map(|s| {
            let weapons = match lookup(s, &["weapons"]).value() {
                Some(Value::Object(map)) => map
                    .iter()
                    .filter(|(name, _)| !name.trim().is_empty())
                    .enumerate()
                    .map(|(i, (name, desc))| WeaponPick {
                        weapon: name.trim().to_string(),
                        description: desc.as_str().unwrap_or_default().to_string(),
                        priority: i as u32 + 1,
                    })
                    .collect(),
                Some(Value::Array(items)) => items
                    .iter()
                    .filter(|w| w.is_object())
                    .enumerate()
                    .map(|(i, w)| WeaponPick {
                        weapon: safe_get(w, &["weapon"]),
                        description: safe_get(w, &["description"]),
                        priority: lookup(w, &["priority"])
                            .value()
                            .and_then(Value::as_u64)
                            .map(|p| p as u32)
                            .unwrap_or(i as u32 + 1),
                    })
                    .collect(),
                _ => Vec::new(),
            };

            CharacterStrategy {
                character: safe_get(s, &["character"]),
                role_paragraphs: lookup(s, &["role_paragraphs"]).strings(),
                weapons,
                lineups: lookup(s, &["lineups"]).value().cloned().unwrap_or(Value::Null),
            }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
//  FILE-BACKED CONSOLIDATION
// ═══════════════════════════════════════════════════════════════════════

pub fn consolidate_characters(layout: &DataLayout) -> Result<(Vec<Character>, Vec<CharacterStory>)> {
    let rows: Vec<Value> = snapshot::load_latest(&layout.raw_dir, snapshot::CHARACTER)?;
    let details: Vec<Value> = snapshot::load_latest(&layout.raw_dir, snapshot::CHARACTER_DETAIL)?;
    let (characters, stories) = build_characters(&rows, &details);
    store::write_json(&layout.entity(CHARACTER_FILE), &characters)?;
    store::write_json(&layout.external(STORY_FILE), &stories)?;
    Ok((characters, stories))
}

pub fn consolidate_weapons(layout: &DataLayout) -> Result<Vec<Weapon>> {
    let rows: Vec<Value> = snapshot::load_latest(&layout.raw_dir, snapshot::WEAPON)?;
    let weapons = build_weapons(&rows);
    store::write_json(&layout.entity(WEAPON_FILE), &weapons)?;
    Ok(weapons)
}

pub fn consolidate_materials(layout: &DataLayout) -> Result<Vec<Material>> {
    let rows: Vec<Value> = snapshot::load_latest(&layout.raw_dir, snapshot::MATERIAL)?;
    let materials = build_materials(&rows);
    store::write_json(&layout.entity(MATERIAL_FILE), &materials)?;
    Ok(materials)
}

pub fn consolidate_monsters(layout: &DataLayout) -> Result<Vec<Monster>> {
    let rows: Vec<Value> = snapshot::load_latest(&layout.raw_dir, snapshot::MONSTER)?;
    let monsters = build_monsters(&rows);
    store::write_json(&layout.entity(MONSTER_FILE), &monsters)?;
    Ok(monsters)
}

pub fn consolidate_artifacts(layout: &DataLayout) -> Result<Vec<Artifact>> {
    let rows: Vec<Value> = snapshot::load_latest(&layout.raw_dir, snapshot::ARTIFACT)?;
    let artifacts = build_artifacts(&rows);
    store::write_json(&layout.entity(ARTIFACT_FILE), &artifacts)?;
    Ok(artifacts)
}

pub fn consolidate_voices(layout: &DataLayout) -> Result<Vec<VoiceLine>> {
    let rows: Vec<Value> = snapshot::load_latest(&layout.raw_dir, snapshot::CHARACTER_VOICE)?;
    let voices = build_voices(&rows);
    store::write_json(&layout.external(VOICE_FILE), &voices)?;
    Ok(voices)
}

pub fn consolidate_strategies(layout: &DataLayout) -> Result<Vec<CharacterStrategy>> {
    let rows: Vec<Value> = snapshot::load_latest(&layout.raw_dir, snapshot::CHARACTER_STRATEGY)?;
    let strategies = build_strategies(&rows);
    store::write_json(&layout.external(STRATEGY_FILE), &strategies)?;
    Ok(strategies)
}

/// Entity counts from one consolidation run.
#[derive(Debug, Default)]
pub struct ConsolidationStats {
    pub counts: Vec<(&'static str, usize)>,
}

/// Run every consolidator. The first missing snapshot aborts the run.
pub fn consolidate_all(layout: &DataLayout) -> Result<ConsolidationStats> {
    let mut stats = ConsolidationStats::default();

    let (characters, stories) = consolidate_characters(layout)?;
    stats.counts.push((CHARACTER_FILE, characters.len()));
    stats.counts.push((STORY_FILE, stories.len()));
    stats.counts.push((WEAPON_FILE, consolidate_weapons(layout)?.len()));
    stats.counts.push((MATERIAL_FILE, consolidate_materials(layout)?.len()));
    stats.counts.push((MONSTER_FILE, consolidate_monsters(layout)?.len()));
    stats.counts.push((ARTIFACT_FILE, consolidate_artifacts(layout)?.len()));
    stats.counts.push((VOICE_FILE, consolidate_voices(layout)?.len()));
    stats.counts.push((STRATEGY_FILE, consolidate_strategies(layout)?.len()));

    for (name, count) in &stats.counts {
        info!(entity = name, count, "consolidated");
    }
    Ok(stats)
}
