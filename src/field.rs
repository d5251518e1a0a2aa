use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

// ── Safe nested lookup ─────────────────────────────────────────────

/// Outcome of walking a key path through nested JSON objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// Every key resolved; this is the value at the end of the path.
    Found(&'a Value),
    /// A key was absent or an intermediate value was not an object.
    Default,
}

impl<'a> Lookup<'a> {
    pub fn value(self) -> Option<&'a Value> {
        match self {
            Self::Found(v) => Some(v),
            Self::Default => None,
        }
    }

    /// Scalar text of the found value; `""` for anything else.
    pub fn text(self) -> String {
        self.text_or("")
    }

    pub fn text_or(self, default: &str) -> String {
        match self {
            Self::Found(Value::String(s)) => s.clone(),
            Self::Found(Value::Number(n)) => n.to_string(),
            Self::Found(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// String elements of a found array (non-strings are dropped).
    pub fn strings(self) -> Vec<String> {
        match self {
            Self::Found(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Follow `keys` through nested objects. Never panics on a missing key or a
/// wrong-typed intermediate; those yield [`Lookup::Default`].
pub fn lookup<'a>(data: &'a Value, keys: &[&str]) -> Lookup<'a> {
    let mut cur = data;
    for key in keys {
        match cur {
            Value::Object(map) => match map.get(*key) {
                Some(v) => cur = v,
                None => return Lookup::Default,
            },
            _ => return Lookup::Default,
        }
    }
    Lookup::Found(cur)
}

/// Shorthand for `lookup(data, keys).text()`.
pub fn safe_get(data: &Value, keys: &[&str]) -> String {
    lookup(data, keys).text()
}

// ── List splitting ─────────────────────────────────────────────────

/// Split on any of `delims`, trimming pieces and dropping empty ones.
pub fn split_list(text: &str, delims: &[char]) -> Vec<String> {
    text.split(|c| delims.contains(&c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Like [`split_list`] but whitespace also separates items.
pub fn split_words(text: &str, delims: &[char]) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || delims.contains(&c))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Name (usage) parsing ───────────────────────────────────────────
//
// Real data:
//   恰斯卡 （80级突破） 温迪 （80级突破） 法尔伽 法尔伽 （80级突破）
//   角色 （天赋升级） 胡桃 钟离
//
// A run of CJK characters is a name; an optional full- or half-width
// parenthesised group right after it is that name's usage.

static RE_NAME_USAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<name>[\u{4e00}-\u{9fa5}]+)(?:\s*[（(]\s*(?P<usage>[^）)]+?)\s*[）)])?").unwrap()
});

/// How repeated names in a usage string are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsagePolicy {
    /// The first occurrence fixes the usage; later ones are ignored.
    KeepFirst,
    /// Each later non-empty usage replaces the recorded one; an empty usage
    /// never erases a recorded value. With `A(x) A A(y) A` the result is `y`.
    KeepLatestNonEmpty,
}

/// Parse `"名A (用途) 名B 名B (用途)"` into `{name: usage}`.
pub fn extract_char_usage(text: &str, policy: UsagePolicy) -> BTreeMap<String, String> {
    let mut result: BTreeMap<String, String> = BTreeMap::new();

    for caps in RE_NAME_USAGE.captures_iter(text) {
        let name = caps["name"].trim().to_string();
        let usage = caps
            .name("usage")
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        match policy {
            UsagePolicy::KeepFirst => {
                result.entry(name).or_insert(usage);
            }
            UsagePolicy::KeepLatestNonEmpty => {
                let slot = result.entry(name).or_default();
                if !usage.is_empty() {
                    *slot = usage;
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_and_defaults() {
        let d = json!({"table": {"称号": "雪霁梅香", "n": 3}, "flat": "x"});
        assert_eq!(safe_get(&d, &["table", "称号"]), "雪霁梅香");
        assert_eq!(safe_get(&d, &["table", "n"]), "3");
        assert_eq!(safe_get(&d, &["table", "missing"]), "");
        // "flat" is a string, so descending into it falls back to the default
        assert_eq!(lookup(&d, &["flat", "deeper"]), Lookup::Default);
        assert_eq!(lookup(&d, &["table", "称号"]).text_or("-"), "雪霁梅香");
        assert_eq!(lookup(&json!(null), &["a"]).text_or("-"), "-");
    }

    #[test]
    fn test_lookup_non_scalar_text_is_empty() {
        let d = json!({"artworks": [{"url": "a.png"}]});
        assert!(lookup(&d, &["artworks"]).value().is_some());
        assert_eq!(safe_get(&d, &["artworks"]), "");
    }

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" 堂主 、、 胡堂主 ", &['、']), vec!["堂主", "胡堂主"]);
        assert!(split_list("", &['、']).is_empty());
    }

    #[test]
    fn test_split_words_uses_whitespace_and_delims() {
        assert_eq!(
            split_words("蒙德, 璃月 、稻妻", &[',', '、']),
            vec!["蒙德", "璃月", "稻妻"]
        );
    }

    #[test]
    fn test_usage_keep_first() {
        let m = extract_char_usage("恰斯卡 （80级突破） 法尔伽 法尔伽 （90级突破）", UsagePolicy::KeepFirst);
        assert_eq!(m["恰斯卡"], "80级突破");
        assert_eq!(m["法尔伽"], "");
    }

    #[test]
    fn test_usage_keep_latest_non_empty() {
        let m = extract_char_usage(
            "法尔伽 （80级突破） 法尔伽 温迪 (天赋)",
            UsagePolicy::KeepLatestNonEmpty,
        );
        assert_eq!(m["法尔伽"], "80级突破");
        assert_eq!(m["温迪"], "天赋");
    }

    #[test]
    fn test_usage_keep_latest_alternating_repeats() {
        let m = extract_char_usage("胡桃（甲） 胡桃 胡桃（乙） 胡桃", UsagePolicy::KeepLatestNonEmpty);
        assert_eq!(m["胡桃"], "乙");
        assert_eq!(m.len(), 1);
    }
}
