use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::entity::RoleTag;

/// Normalized role-tag name or alias → role-tag id.
pub type AliasIndex = HashMap<String, String>;

// ── Vocabulary ─────────────────────────────────────────────────────

/// Words that join two requirements into one phrase: 输出兼挂水.
pub const CONJUNCTIONS: &[&str] = &["以及", "同时", "兼", "及", "与", "和", "并"];

/// Modifiers that narrow a requirement without naming a role.
pub const QUALIFIERS: &[&str] = &[
    "高频", "持续", "稳定", "对群", "对单", "泛用", "可持续", "主要", "一般",
    "能力", "收益", "体系", "配合", "提供", "维持", "帮助", "绑定",
];

/// Keyword fallback, checked in order. One token may hit several roles.
pub const HEURISTICS: &[(&str, &[&str])] = &[
    ("role_sub_dps", &["后台输出", "副C", "脱手", "协同攻击", "后台伤害"]),
    ("role_buffer", &["增伤", "增益", "加攻", "伤害加成", "攻击力加成", "输出辅助"]),
    ("role_debuffer", &["减抗", "抗性减益", "减防", "全元素减抗"]),
    ("role_healer", &["治疗", "回复", "奶"]),
    ("role_shielder", &["护盾", "盾辅"]),
    ("role_survivability", &["生存", "减伤", "抗打断"]),
    ("role_driver", &["驾驶员"]),
    ("role_energy_support", &["充能", "回能", "产球", "充电宝"]),
    ("role_enabler_hydro", &["挂水", "水元素附着"]),
    ("role_enabler_pyro", &["挂火", "火元素附着"]),
    ("role_enabler_electro", &["挂雷", "雷元素附着"]),
    ("role_enabler_cryo", &["挂冰", "冰元素附着"]),
    ("role_enabler_dendro", &["挂草", "草元素附着"]),
];

/// Alternation over `words`, longest first so `可持续` wins over `持续`.
fn build_alternation(words: &[&str]) -> String {
    let mut all: Vec<&str> = words.to_vec();
    all.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    all.dedup();
    let escaped: Vec<String> = all.iter().map(|w| regex::escape(w)).collect();
    format!("(?:{})", escaped.join("|"))
}

static RE_CONJUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&build_alternation(CONJUNCTIONS)).unwrap());

static RE_QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&build_alternation(QUALIFIERS)).unwrap());

static RE_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[/、,，+|｜]+").unwrap());

// ── Normalization ──────────────────────────────────────────────────

/// Whitespace carries no meaning in a need text or an alias key:
/// `后 台输出` == `后台输出`.
pub fn normalize_alias(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Index every role tag's name and aliases.
pub fn build_alias_index(role_tags: &[RoleTag]) -> AliasIndex {
    let mut index = AliasIndex::new();
    for tag in role_tags.iter().filter(|t| !t.id.is_empty()) {
        for alias in std::iter::once(&tag.name).chain(&tag.aliases) {
            let key = normalize_alias(alias);
            if !key.is_empty() {
                index.insert(key, tag.id.clone());
            }
        }
    }
    index
}

// ── Alignment ──────────────────────────────────────────────────────

/// Split a requirement phrase into candidate tokens.
pub fn split_role_text(text: &str) -> Vec<String> {
    let text = normalize_alias(text);
    if text.is_empty() {
        return Vec::new();
    }
    let flattened = RE_CONJUNCTION.replace_all(&text, "/");
    RE_SPLIT
        .split(&flattened)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keyword fallback for a token that is not a known alias.
pub fn heuristic_roles(token: &str) -> BTreeSet<&'static str> {
    HEURISTICS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| token.contains(k)))
        .map(|(role, _)| *role)
        .collect()
}

/// Map a slot's free-text need to role-tag ids.
///
/// Returns the sorted, deduplicated ids and the raw tokens that produced
/// at least one of them. Tokens are first looked up as aliases (after
/// dropping qualifier words); only a miss falls back to the keyword table.
pub fn align_role_text_to_role_ids(text: &str, alias_index: &AliasIndex) -> (Vec<String>, Vec<String>) {
    let mut role_ids: BTreeSet<String> = BTreeSet::new();
    let mut used_tokens = Vec::new();

    for raw in split_role_text(text) {
        let token = normalize_alias(&RE_QUALIFIER.replace_all(&raw, ""));
        if token.is_empty() {
            continue;
        }
        if let Some(id) = alias_index.get(&token) {
            role_ids.insert(id.clone());
            used_tokens.push(raw);
            continue;
        }
        let hits = heuristic_roles(&token);
        if !hits.is_empty() {
            role_ids.extend(hits.into_iter().map(str::to_string));
            used_tokens.push(raw);
        }
    }

    (role_ids.into_iter().collect(), used_tokens)
}
