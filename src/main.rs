mod config;
mod consolidate;
mod entity;
mod error;
mod extractors;
mod field;
mod llm;
mod llm_relations;
mod name_index;
mod prompts;
mod relation;
mod role_align;
mod runner;
mod snapshot;
mod store;
mod tasks;
mod team;
mod team_edges;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, DataLayout, LlmConfig, RelationRules};
use entity::{ROLE_TAG_FILE, RoleTag};
use llm::ChatClient;
use runner::{BatchRunner, RunSummary};
use tasks::LlmTask;

#[derive(Parser)]
#[command(
    name = "genshin_kg",
    about = "Build the Genshin wiki knowledge graph from crawler snapshots"
)]
struct Cli {
    /// Root holding dataKG/ and dataExternal/
    #[arg(long, global = true, default_value = "data_preprocess", env = "KG_DATA_ROOT")]
    data_root: PathBuf,

    /// Directory of raw crawler snapshots
    #[arg(long, global = true, env = "KG_RAW_DIR")]
    raw_dir: Option<PathBuf>,

    /// JSON file overriding the relation rule tables
    #[arg(long, global = true, env = "KG_RULES")]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Consolidate the newest raw snapshots into entity files
    Consolidate,
    /// Extract structural relations from the entity files
    Relations,
    /// Run one batch LLM extraction task (resumable)
    Llm {
        #[arg(value_enum)]
        task: LlmTask,
        #[command(flatten)]
        client: LlmArgs,
    },
    /// Turn LLM checkpoint files into relation files
    LlmRelations,
    /// Structure team strategies and emit their edges
    Team,
    /// Align a free-text slot requirement to role-tag ids
    Align {
        /// Requirement text, e.g. "后台输出，高频挂水"
        text: Vec<String>,
    },
    /// consolidate + relations, then the LLM-derived layers whose
    /// checkpoints exist
    All,
}

#[derive(Args)]
struct LlmArgs {
    #[arg(long, env = "KG_LLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "KG_LLM_BASE_URL", default_value = DEFAULT_LLM_BASE_URL)]
    base_url: String,

    #[arg(long, env = "KG_LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    model: String,

    /// Seconds to wait before every model call
    #[arg(long, env = "KG_LLM_DELAY_SECS", default_value_t = 6)]
    delay_secs: u64,

    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 0.1)]
    temperature: f32,
}

impl LlmArgs {
    fn into_config(self) -> LlmConfig {
        LlmConfig {
            base_url: self.base_url,
            model: self.model,
            api_key: self.api_key,
            temperature: self.temperature,
            delay: Duration::from_secs(self.delay_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let layout = DataLayout::new(&cli.data_root, cli.raw_dir);
    let rules = match &cli.rules {
        Some(path) => {
            RelationRules::load(path).with_context(|| format!("loading rules from {}", path.display()))?
        }
        None => RelationRules::default(),
    };

    match cli.command {
        Some(Command::Consolidate) => run_consolidate(&layout),
        Some(Command::Relations) => run_relations(&layout, &rules),
        Some(Command::Llm { task, client }) => run_llm(&layout, task, client.into_config()),
        Some(Command::LlmRelations) => run_llm_relations(&layout, &rules),
        Some(Command::Team) => run_team(&layout, &rules),
        Some(Command::Align { text }) => run_align(&layout, &text.join(" ")),
        Some(Command::All) | None => run_all(&layout, &rules),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  RUN SUMMARIES
// ═══════════════════════════════════════════════════════════════════════

fn banner(title: &str) {
    eprintln!("\n══ {title} ══");
}

fn print_counts(counts: &[(&str, usize)]) {
    for (name, count) in counts {
        eprintln!("  {name:<32} {count}");
    }
}

fn print_run_summary(task: LlmTask, s: &RunSummary) {
    eprintln!("  task        {}", task.output_name());
    eprintln!("  processed   {} ({} failed, recorded as null)", s.processed, s.failed);
    eprintln!("  resumed     {}", s.resumed);
    eprintln!("  skipped     {}", s.skipped);
    eprintln!("  checkpoint  {} records", s.total);
}

// ═══════════════════════════════════════════════════════════════════════
//  SUBCOMMANDS
// ═══════════════════════════════════════════════════════════════════════

fn run_consolidate(layout: &DataLayout) -> Result<()> {
    let stats = consolidate::consolidate_all(layout).context("consolidation aborted")?;
    banner("Entities");
    print_counts(&stats.counts);
    Ok(())
}

fn run_relations(layout: &DataLayout, rules: &RelationRules) -> Result<()> {
    let counts = extractors::extract_all(layout, rules).context("relation extraction aborted")?;
    banner("Relations");
    print_counts(&counts);
    Ok(())
}

fn run_llm(layout: &DataLayout, task: LlmTask, config: LlmConfig) -> Result<()> {
    let runner = BatchRunner::new(config.delay);
    let client = ChatClient::new(config).context("cannot create LLM client")?;
    let summary = task
        .run(layout, &runner, &client)
        .with_context(|| format!("LLM task {} aborted", task.output_name()))?;
    banner("LLM extraction");
    print_run_summary(task, &summary);
    Ok(())
}

fn run_llm_relations(layout: &DataLayout, rules: &RelationRules) -> Result<()> {
    let counts = llm_relations::extract_all(layout, rules).context("LLM relation extraction aborted")?;
    banner("LLM relations");
    print_counts(&counts);
    Ok(())
}

fn run_team(layout: &DataLayout, rules: &RelationRules) -> Result<()> {
    let s = team_edges::build_team_layer(layout, rules).context("team structuring aborted")?;
    banner("Team strategy");
    print_counts(&[
        ("TeamTemplate", s.team_templates),
        ("SlotGroup", s.slot_groups),
        ("SlotTemplate", s.slot_templates),
        (team_edges::TEAM_EDGES_FILE, s.edges),
    ]);
    Ok(())
}

fn run_align(layout: &DataLayout, text: &str) -> Result<()> {
    let role_tags: Vec<RoleTag> = store::read_json(&layout.entity(ROLE_TAG_FILE)).context("loading role tags")?;
    let index = role_align::build_alias_index(&role_tags);
    let (role_ids, used_tokens) = role_align::align_role_text_to_role_ids(text, &index);

    #[derive(serde::Serialize)]
    struct Alignment<'a> {
        text: &'a str,
        role_ids: Vec<String>,
        used_tokens: Vec<String>,
    }

    let json = serde_json::to_string_pretty(&Alignment {
        text,
        role_ids,
        used_tokens,
    })?;
    println!("{json}");
    Ok(())
}

fn run_all(layout: &DataLayout, rules: &RelationRules) -> Result<()> {
    run_consolidate(layout)?;
    run_relations(layout, rules)?;

    let has_checkpoint = |task: LlmTask| layout.llm(task.output_name()).exists();
    if [LlmTask::CharacterRelations, LlmTask::RoleTags, LlmTask::MonsterCounters]
        .into_iter()
        .all(has_checkpoint)
    {
        run_llm_relations(layout, rules)?;
    } else {
        info!("LLM checkpoints incomplete, skipping llm-relations");
    }
    if has_checkpoint(LlmTask::TeamStrategy) {
        run_team(layout, rules)?;
    } else {
        info!("no team strategy checkpoint, skipping team");
    }
    Ok(())
}
