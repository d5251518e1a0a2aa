use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store;

// ═══════════════════════════════════════════════════════════════════════
//  DATA LAYOUT
// ═══════════════════════════════════════════════════════════════════════

/// Where every stage reads and writes. Built once from the CLI and passed
/// to each task.
#[derive(Debug, Clone)]
pub struct DataLayout {
    /// Crawler output: `<prefix><timestamp>.json` snapshots.
    pub raw_dir: PathBuf,
    /// Graph node files (`character.json`, curated `role_tag.json`, ...).
    pub entities_dir: PathBuf,
    /// Side data that is not loaded as graph nodes (stories, voice lines).
    pub external_dir: PathBuf,
    pub relations_dir: PathBuf,
    /// Batch LLM checkpoint files.
    pub llm_dir: PathBuf,
}

impl DataLayout {
    pub fn new(root: &Path, raw_dir: Option<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.unwrap_or_else(|| PathBuf::from("srccrawler/data")),
            entities_dir: root.join("dataKG").join("entities"),
            external_dir: root.join("dataExternal"),
            relations_dir: root.join("dataKG").join("relations"),
            llm_dir: root.join("dataKG").join("LLM_extracted"),
        }
    }

    pub fn entity(&self, name: &str) -> PathBuf {
        self.entities_dir.join(format!("{name}.json"))
    }

    pub fn external(&self, name: &str) -> PathBuf {
        self.external_dir.join(format!("{name}.json"))
    }

    pub fn relation(&self, name: &str) -> PathBuf {
        self.relations_dir.join(format!("{name}.json"))
    }

    pub fn llm(&self, name: &str) -> PathBuf {
        self.llm_dir.join(format!("{name}.json"))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  RELATION RULES
// ═══════════════════════════════════════════════════════════════════════

pub const DEFAULT_RULE_KEY: &str = "DEFAULT";

/// Predicate and explanation template for one material type.
///
/// The template understands `{subject_name}`, `{material_name}` and `{usage}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRule {
    pub predicate: String,
    pub hint_template: String,
}

impl MaterialRule {
    pub fn render_hint(&self, subject_name: &str, material_name: &str, usage: &str) -> String {
        self.hint_template
            .replace("{subject_name}", subject_name)
            .replace("{material_name}", material_name)
            .replace("{usage}", usage)
    }
}

impl Default for MaterialRule {
    fn default() -> Self {
        Self {
            predicate: "needs_material".to_string(),
            hint_template: "{subject_name} 需要材料 {material_name} 用于{usage}".to_string(),
        }
    }
}

/// The tunable tables the relation extractors consult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationRules {
    /// Material type → rule; `DEFAULT` covers unmapped types.
    pub material_rules: BTreeMap<String, MaterialRule>,
    /// LLM character-relation predicates that carry no information.
    pub noise_predicates: Vec<String>,
    /// LLM predicate → canonical predicate.
    pub predicate_rewrites: BTreeMap<String, String>,
    /// Slot names that form the mutually exclusive elemental group.
    pub element_slots: Vec<String>,
    /// Candidate fit label → confidence.
    pub fit_confidence: BTreeMap<String, f64>,
    /// Confidence for a missing or unknown fit label.
    pub fit_fallback: f64,
}

impl Default for RelationRules {
    fn default() -> Self {
        let material_rules = BTreeMap::from([(DEFAULT_RULE_KEY.to_string(), MaterialRule::default())]);

        let noise_predicates = ["提及", "相关", "认识", "同场出现", "对话", "未知"]
            .into_iter()
            .map(str::to_string)
            .collect();

        let predicate_rewrites = [
            ("好友", "朋友"),
            ("挚友", "朋友"),
            ("老友", "朋友"),
            ("师父", "师徒"),
            ("徒弟", "师徒"),
            ("老师", "师徒"),
            ("学生", "师徒"),
            ("上司", "上下级"),
            ("下属", "上下级"),
            ("部下", "上下级"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let element_slots = ["水位", "火位", "冰位", "雷位", "草位", "风位"]
            .into_iter()
            .map(str::to_string)
            .collect();

        let fit_confidence = [("good", 0.85), ("ok", 0.65), ("bad", 0.35)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Self {
            material_rules,
            noise_predicates,
            predicate_rewrites,
            element_slots,
            fit_confidence,
            fit_fallback: 0.5,
        }
    }
}

impl RelationRules {
    /// Read overrides from a JSON file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        store::read_json(path)
    }

    /// Rule for `material_type`, falling back to `DEFAULT`, then to the
    /// built-in rule when the table has no `DEFAULT` either.
    pub fn material_rule(&self, material_type: &str) -> MaterialRule {
        self.material_rules
            .get(material_type)
            .or_else(|| self.material_rules.get(DEFAULT_RULE_KEY))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_noise(&self, predicate: &str) -> bool {
        self.noise_predicates.iter().any(|p| p == predicate)
    }

    pub fn rewrite_predicate<'a>(&'a self, predicate: &'a str) -> &'a str {
        self.predicate_rewrites
            .get(predicate)
            .map(String::as_str)
            .unwrap_or(predicate)
    }

    pub fn is_element_slot(&self, slot: &str) -> bool {
        self.element_slots.iter().any(|s| s == slot)
    }

    pub fn fit_to_confidence(&self, fit: Option<&str>) -> f64 {
        fit.and_then(|f| self.fit_confidence.get(f))
            .copied()
            .unwrap_or(self.fit_fallback)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  LLM CLIENT SETTINGS
// ═══════════════════════════════════════════════════════════════════════

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.siliconflow.cn/v1";
pub const DEFAULT_LLM_MODEL: &str = "Qwen/Qwen3-8B";

/// Settings for the chat-completions extractor.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Pause before every call; enforced by the batch runner.
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            temperature: 0.1,
            delay: Duration::from_secs(6),
            timeout: Duration::from_secs(120),
        }
    }
}
