use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::DataLayout;
use crate::error::Result;
use crate::store;

/// Anything that can be looked up by name in the graph.
pub trait Named {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

macro_rules! impl_named {
    ($($ty:ty),* $(,)?) => {
        $(impl Named for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

// ── Consolidated entities ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub nickname: Vec<String>,
    pub title: String,
    pub gender: String,
    pub body_type: String,
    pub rarity: String,
    pub element: String,
    pub primordial_force: String,
    pub weapon_type: String,
    pub country: String,
    pub affiliation: String,
    pub profession: String,
    pub species: String,
    pub constellation: String,
    pub special_dish: String,
    #[serde(rename = "TAG")]
    pub tags: Vec<String>,
    pub description: String,
    pub birthday: String,
    #[serde(rename = "cn_CV")]
    pub cn_cv: String,
    pub img_src: String,
}

/// Narrative text of one character, kept outside the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterStory {
    pub id: String,
    pub name: String,
    pub stories: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceLine {
    pub id: String,
    pub name: String,
    pub title: String,
    pub cn_text: String,
    pub cn_audio: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weapon {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub rarity: String,
    pub source: String,
    pub min_attack: String,
    pub max_attack: String,
    pub min_subproperty: String,
    pub max_subproperty: String,
    pub effect: String,
    pub img_src: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub rarity: String,
    pub source: String,
    /// User name → what the material is used for.
    pub usage: BTreeMap<String, String>,
    pub img_src: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Monster {
    pub id: String,
    pub name: String,
    pub element: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub refresh_time: String,
    pub region: Vec<String>,
    #[serde(rename = "TAG")]
    pub tags: Vec<String>,
    pub drop: Vec<String>,
    pub strategy: String,
    pub img_src: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendedRoles {
    pub desc: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    #[serde(rename = "min/max_rarity")]
    pub rarity_range: String,
    pub source: String,
    #[serde(rename = "2piece_effect")]
    pub two_piece_effect: String,
    #[serde(rename = "4piece_effect")]
    pub four_piece_effect: String,
    pub img_src: String,
    pub suits_roles: Vec<String>,
    pub recommended_roles: Vec<RecommendedRoles>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponPick {
    pub weapon: String,
    pub description: String,
    /// 1 = first recommendation.
    pub priority: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterStrategy {
    pub character: String,
    pub role_paragraphs: Vec<String>,
    pub weapons: Vec<WeaponPick>,
    pub lineups: Value,
}

// ── Curated entities (maintained by hand, only read here) ──────────

/// Country or element node: only `id` and `name` matter to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogEntity {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reaction {
    pub id: String,
    pub name: String,
    /// Free text naming the elements/reactions that trigger this one.
    pub trigger_elements: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reaction {
    /// Curated files written by hand sometimes use the Chinese column name.
    pub fn trigger_text(&self) -> &str {
        if !self.trigger_elements.is_empty() {
            return &self.trigger_elements;
        }
        self.extra
            .get("触发元素")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleTag {
    pub id: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_named!(
    Character,
    Weapon,
    Material,
    Monster,
    Artifact,
    CatalogEntity,
    Reaction,
    RoleTag,
);

// ── Entity files on disk ───────────────────────────────────────────

pub const CHARACTER_FILE: &str = "character";
pub const WEAPON_FILE: &str = "weapon";
pub const MATERIAL_FILE: &str = "material";
pub const MONSTER_FILE: &str = "monster";
pub const ARTIFACT_FILE: &str = "artifact";
pub const COUNTRY_FILE: &str = "country";
pub const ELEMENT_FILE: &str = "element";
pub const REACTION_FILE: &str = "reaction";
pub const ROLE_TAG_FILE: &str = "role_tag";
pub const STORY_FILE: &str = "character_story";
pub const VOICE_FILE: &str = "character_voice";
pub const STRATEGY_FILE: &str = "character_strategy";

/// Every node list the relation extractors need, loaded together.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    pub characters: Vec<Character>,
    pub materials: Vec<Material>,
    pub weapons: Vec<Weapon>,
    pub monsters: Vec<Monster>,
    pub artifacts: Vec<Artifact>,
    pub countries: Vec<CatalogEntity>,
    pub elements: Vec<CatalogEntity>,
    pub reactions: Vec<Reaction>,
}

impl EntitySet {
    /// Read every entity file; any missing file aborts.
    pub fn load(layout: &DataLayout) -> Result<Self> {
        Ok(Self {
            characters: store::read_json(&layout.entity(CHARACTER_FILE))?,
            materials: store::read_json(&layout.entity(MATERIAL_FILE))?,
            weapons: store::read_json(&layout.entity(WEAPON_FILE))?,
            monsters: store::read_json(&layout.entity(MONSTER_FILE))?,
            artifacts: store::read_json(&layout.entity(ARTIFACT_FILE))?,
            countries: store::read_json(&layout.entity(COUNTRY_FILE))?,
            elements: store::read_json(&layout.entity(ELEMENT_FILE))?,
            reactions: store::read_json(&layout.entity(REACTION_FILE))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sparse_records_deserialize_with_defaults() {
        let c: Character = serde_json::from_value(json!({"name": "胡桃"})).unwrap();
        assert_eq!(c.name, "胡桃");
        assert!(c.id.is_empty() && c.tags.is_empty());

        let m: Material = serde_json::from_value(json!({
            "name": "夜泊石", "type": "天赋培养素材", "usage": {"胡桃": ""}
        }))
        .unwrap();
        assert_eq!(m.kind, "天赋培养素材");
        assert_eq!(m.usage["胡桃"], "");
    }

    #[test]
    fn test_reaction_accepts_chinese_trigger_key_and_keeps_extras() {
        let r: Reaction = serde_json::from_value(json!({
            "id": "reaction1", "name": "蒸发", "触发元素": "水元素 火元素", "倍率": "1.5"
        }))
        .unwrap();
        assert!(r.trigger_elements.is_empty());
        assert_eq!(r.trigger_text(), "水元素 火元素");
        assert_eq!(r.extra["倍率"], "1.5");
    }

    #[test]
    fn test_renamed_fields_round_trip_names() {
        let c = Character {
            tags: vec!["火".into()],
            cn_cv: "高晨".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["TAG"], json!(["火"]));
        assert_eq!(v["cn_CV"], "高晨");

        let a = Artifact::default();
        let v = serde_json::to_value(&a).unwrap();
        assert!(v.get("min/max_rarity").is_some());
        assert!(v.get("2piece_effect").is_some());
    }
}
