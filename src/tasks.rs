use clap::ValueEnum;
use serde_json::Value;

use crate::config::DataLayout;
use crate::entity::{MONSTER_FILE, STORY_FILE, STRATEGY_FILE};
use crate::error::Result;
use crate::field::{lookup, safe_get};
use crate::llm::Extractor;
use crate::prompts;
use crate::runner::{BatchRunner, RunSummary};
use crate::store;

/// One batch extraction job: which records go in, how each is rendered,
/// and where the checkpoint file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmTask {
    /// Functional role of each character, from strategy role paragraphs.
    RoleTags,
    /// Characters recommended against each monster.
    MonsterCounters,
    /// Character-to-character relations from story text.
    CharacterRelations,
    /// Team archetypes, slots and candidates from lineup guides.
    TeamStrategy,
}

pub const ROLE_TAG_LLM_FILE: &str = "role_tag_LLM";
pub const MONSTER_LLM_FILE: &str = "character_monster_LLM";
pub const CHARACTER_RELATION_LLM_FILE: &str = "character_relation_LLM";
pub const TEAM_STRATEGY_LLM_FILE: &str = "team_strategy_LLM";

impl LlmTask {
    pub fn prompt(self) -> &'static str {
        match self {
            Self::RoleTags => prompts::ROLE_TAG_PROMPT,
            Self::MonsterCounters => prompts::MONSTER_PROMPT,
            Self::CharacterRelations => prompts::CHARACTER_RELATION_PROMPT,
            Self::TeamStrategy => prompts::TEAM_STRATEGY_PROMPT,
        }
    }

    pub fn output_name(self) -> &'static str {
        match self {
            Self::RoleTags => ROLE_TAG_LLM_FILE,
            Self::MonsterCounters => MONSTER_LLM_FILE,
            Self::CharacterRelations => CHARACTER_RELATION_LLM_FILE,
            Self::TeamStrategy => TEAM_STRATEGY_LLM_FILE,
        }
    }

    /// Field of each input record used as the checkpoint id.
    pub fn id_key(self) -> &'static str {
        match self {
            Self::RoleTags | Self::TeamStrategy => "character",
            Self::MonsterCounters | Self::CharacterRelations => "name",
        }
    }

    /// Read this task's input records from the consolidated files.
    pub fn load_items(self, layout: &DataLayout) -> Result<Vec<Value>> {
        let items: Vec<Value> = match self {
            Self::RoleTags | Self::TeamStrategy => store::read_json(&layout.external(STRATEGY_FILE))?,
            Self::CharacterRelations => store::read_json(&layout.external(STORY_FILE))?,
            Self::MonsterCounters => {
                let monsters: Vec<Value> = store::read_json(&layout.entity(MONSTER_FILE))?;
                monsters
                    .into_iter()
                    .filter(|m| !safe_get(m, &["strategy"]).is_empty())
                    .collect()
            }
        };
        Ok(items)
    }

    /// The text sent to the model for one record; empty means "skip".
    pub fn render(self, item: &Value) -> String {
        match self {
            Self::RoleTags => lookup(item, &["role_paragraphs"]).strings().join("\n"),
            Self::MonsterCounters => format!(
                "monster:{}, strategy:{}",
                safe_get(item, &["name"]),
                safe_get(item, &["strategy"])
            ),
            Self::CharacterRelations => render_stories(item),
            Self::TeamStrategy => render_lineups(item),
        }
    }

    /// Run the task through `runner`, resuming from its checkpoint file.
    pub fn run(self, layout: &DataLayout, runner: &BatchRunner, extractor: &dyn Extractor) -> Result<RunSummary> {
        let items = self.load_items(layout)?;
        runner.run(
            &items,
            self.prompt(),
            |item| self.render(item),
            extractor,
            &layout.llm(self.output_name()),
            self.id_key(),
        )
    }
}

fn render_stories(item: &Value) -> String {
    let Some(Value::Object(stories)) = lookup(item, &["stories"]).value() else {
        return String::new();
    };
    let body: Vec<String> = stories
        .iter()
        .filter_map(|(title, text)| {
            let text = text.as_str()?.trim();
            (!text.is_empty()).then(|| format!("【{title}】{text}"))
        })
        .collect();
    if body.is_empty() {
        return String::new();
    }
    format!("角色:{}\n{}", safe_get(item, &["name"]), body.join("\n"))
}

fn render_lineups(item: &Value) -> String {
    let lineups = match lookup(item, &["lineups"]).value() {
        None | Some(Value::Null) => return String::new(),
        Some(Value::String(s)) if s.trim().is_empty() => return String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(a)) if a.is_empty() => return String::new(),
        Some(Value::Object(o)) if o.is_empty() => return String::new(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    format!("核心角色:{}\n{lineups}", safe_get(item, &["character"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_tag_render_joins_paragraphs() {
        let s = json!({"character": "胡桃", "role_paragraphs": ["主C", "火元素附着"]});
        assert_eq!(LlmTask::RoleTags.render(&s), "主C\n火元素附着");
        assert_eq!(LlmTask::RoleTags.render(&json!({"character": "x"})), "");
    }

    #[test]
    fn test_story_render_skips_empty_sections() {
        let s = json!({"name": "胡桃", "stories": {"角色故事1": "往生堂第七十七代堂主", "角色故事2": " "}});
        assert_eq!(
            LlmTask::CharacterRelations.render(&s),
            "角色:胡桃\n【角色故事1】往生堂第七十七代堂主"
        );
        assert_eq!(LlmTask::CharacterRelations.render(&json!({"name": "x", "stories": {}})), "");
    }

    #[test]
    fn test_lineup_render_empty_means_skip() {
        assert_eq!(LlmTask::TeamStrategy.render(&json!({"character": "胡桃", "lineups": []})), "");
        let text = LlmTask::TeamStrategy.render(&json!({"character": "胡桃", "lineups": ["胡行钟夜"]}));
        assert!(text.starts_with("核心角色:胡桃\n"));
        assert!(text.contains("胡行钟夜"));
    }

    #[test]
    fn test_monster_items_without_strategy_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path(), None);
        store::write_json(
            &layout.entity(MONSTER_FILE),
            &json!([{"name": "丘丘人", "strategy": "用火"}, {"name": "史莱姆", "strategy": ""}]),
        )
        .unwrap();
        let items = LlmTask::MonsterCounters.load_items(&layout).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(LlmTask::MonsterCounters.render(&items[0]), "monster:丘丘人, strategy:用火");
    }

    #[test]
    fn test_every_task_has_distinct_output() {
        let mut names: Vec<&str> = LlmTask::value_variants().iter().map(|t| t.output_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
    }
}
