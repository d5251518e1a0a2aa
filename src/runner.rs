use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::Local;
use kg_types::LlmRecord;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::field::safe_get;
use crate::llm::Extractor;
use crate::store;

/// Counts from one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items sent to the extractor during this run.
    pub processed: usize,
    /// Items whose extraction returned nothing (recorded with a null result).
    pub failed: usize,
    /// Items already present in the checkpoint file.
    pub resumed: usize,
    /// Items with no id or an empty rendered text.
    pub skipped: usize,
    /// Records in the checkpoint file after the run.
    pub total: usize,
}

/// Sequential, resumable driver for one extraction task.
///
/// The output file doubles as the checkpoint: it is rewritten after every
/// item, so a killed run loses at most the in-flight item and a rerun
/// skips every id already recorded. Failed items stay recorded with a null
/// result and are not retried.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    /// Pause before every external call.
    pub delay: Duration,
}

impl BatchRunner {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn run<E, F>(
        &self,
        items: &[Value],
        prompt: &str,
        render: F,
        extractor: &E,
        output: &Path,
        id_key: &str,
    ) -> Result<RunSummary>
    where
        E: Extractor + ?Sized,
        F: Fn(&Value) -> String,
    {
        let mut records: Vec<LlmRecord> = store::read_json_opt(output)?.unwrap_or_default();
        let mut done: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        let mut summary = RunSummary::default();
        info!(file = %output.display(), checkpointed = done.len(), "starting batch");

        for item in items {
            let id = safe_get(item, &[id_key]);
            if id.is_empty() {
                summary.skipped += 1;
                continue;
            }
            if done.contains(&id) {
                summary.resumed += 1;
                continue;
            }
            let text = render(item);
            if text.trim().is_empty() {
                debug!(id, "empty input text, skipped");
                summary.skipped += 1;
                continue;
            }

            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let result = extractor.extract(prompt, &text);
            if result.is_none() {
                summary.failed += 1;
            }
            summary.processed += 1;

            records.push(LlmRecord {
                id: id.clone(),
                input_text: text,
                llm_result: result,
                time: Local::now().to_rfc3339(),
            });
            done.insert(id.clone());
            store::write_json(output, &records)?;
            info!(id, "processed");
        }

        summary.total = records.len();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    /// Counts calls; fails for inputs containing "坏".
    struct CountingExtractor {
        calls: Cell<usize>,
    }

    impl Extractor for CountingExtractor {
        fn extract(&self, _prompt: &str, text: &str) -> Option<Value> {
            self.calls.set(self.calls.get() + 1);
            if text.contains('坏') {
                None
            } else {
                Some(json!({"echo": text}))
            }
        }
    }

    fn items() -> Vec<Value> {
        vec![
            json!({"name": "丘丘人", "strategy": "用火"}),
            json!({"name": "史莱姆", "strategy": ""}),
            json!({"name": "坏怪", "strategy": "坏"}),
            json!({"strategy": "无名"}),
        ]
    }

    fn render(m: &Value) -> String {
        let strategy = safe_get(m, &["strategy"]);
        if strategy.is_empty() {
            return String::new();
        }
        format!("monster:{}, strategy:{strategy}", safe_get(m, &["name"]))
    }

    #[test]
    fn test_second_run_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("character_monster_LLM.json");
        let runner = BatchRunner::new(Duration::ZERO);
        let ex = CountingExtractor { calls: Cell::new(0) };

        let first = runner.run(&items(), "p", render, &ex, &out, "name").unwrap();
        assert_eq!(first.processed, 2);
        assert_eq!(first.failed, 1);
        assert_eq!(first.skipped, 2);
        assert_eq!(ex.calls.get(), 2);
        let after_first = std::fs::read_to_string(&out).unwrap();

        let second = runner.run(&items(), "p", render, &ex, &out, "name").unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.resumed, 2);
        assert_eq!(ex.calls.get(), 2);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), after_first);
    }

    #[test]
    fn test_failed_item_is_recorded_with_null_result() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.json");
        let ex = CountingExtractor { calls: Cell::new(0) };
        BatchRunner::new(Duration::ZERO)
            .run(&items(), "p", render, &ex, &out, "name")
            .unwrap();

        let records: Vec<LlmRecord> = store::read_json(&out).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["丘丘人", "坏怪"]);
        assert!(records[1].llm_result.is_none());
        assert_eq!(records[0].input_text, "monster:丘丘人, strategy:用火");
        assert!(!records[0].time.is_empty());
    }

    #[test]
    fn test_resume_continues_after_existing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.json");
        let existing = vec![LlmRecord {
            id: "丘丘人".into(),
            input_text: "old".into(),
            llm_result: None,
            time: "t".into(),
        }];
        store::write_json(&out, &existing).unwrap();

        let ex = CountingExtractor { calls: Cell::new(0) };
        let summary = BatchRunner::new(Duration::ZERO)
            .run(&items(), "p", render, &ex, &out, "name")
            .unwrap();
        assert_eq!(ex.calls.get(), 1);
        assert_eq!(summary.resumed, 1);
        assert_eq!(summary.total, 2);

        let records: Vec<LlmRecord> = store::read_json(&out).unwrap();
        // the earlier null result is kept, not retried
        assert_eq!(records[0].input_text, "old");
    }
}
