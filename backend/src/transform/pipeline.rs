//! Ordered execution of cleaning stages.
//!
//! # Example
//!
//! ```rust,ignore
//! use excel_cleaner::transform::{run_pipeline, StageSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! let stages: Vec<StageSpec> = serde_json::from_str(r#"[
//!     {"stage_kind": "trim_normalize"},
//!     {"stage_kind": "deduplicate", "enabled": false}
//! ]"#)?;
//! let outcome = run_pipeline(&table, &stages, &CancellationToken::new())?;
//! println!("{} rows left", outcome.table.row_count());
//! ```

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::stages::CleaningStage;
use crate::api::logs::{log_info, log_info_indent, log_success, log_warning_indent};
use crate::error::{ConfigError, ErrorSite, PipelineError, PipelineResult};
use crate::models::Table;

/// A stage plus its on/off switch.
///
/// On the wire the stage parameters and `enabled` share one object:
/// `{"stage_kind": "deduplicate", "subset": ["id"], "enabled": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StageSpecDef")]
pub struct StageSpec {
    #[serde(flatten)]
    pub stage: CleaningStage,
    pub enabled: bool,
}

#[derive(Deserialize)]
struct StageSpecDef {
    #[serde(flatten)]
    stage: CleaningStage,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<StageSpecDef> for StageSpec {
    type Error = ConfigError;

    fn try_from(def: StageSpecDef) -> Result<Self, Self::Error> {
        def.stage.validate()?;
        Ok(Self {
            stage: def.stage,
            enabled: def.enabled,
        })
    }
}

impl StageSpec {
    pub fn new(stage: CleaningStage) -> Result<Self, ConfigError> {
        stage.validate()?;
        Ok(Self { stage, enabled: true })
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// One line of the cleaning log; disabled stages get one too.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningLogEntry {
    /// Position in the stage list.
    pub index: usize,
    pub stage_kind: String,
    pub enabled: bool,
    pub rows_before: usize,
    pub rows_after: usize,
    pub cells_changed: usize,
    pub notes: Vec<String>,
}

/// Cleaned table plus what happened to it.
#[derive(Debug, Clone)]
pub struct CleaningOutcome {
    pub table: Table,
    pub log: Vec<CleaningLogEntry>,
}

/// Run `stages` in order over `table`.
///
/// The token is checked before every stage; once it fires the run stops with
/// [`PipelineError::Cancelled`] and no table is returned. Disabled stages
/// keep their index in the log and in error sites.
pub fn run_pipeline(
    table: &Table,
    stages: &[StageSpec],
    cancel: &CancellationToken,
) -> PipelineResult<CleaningOutcome> {
    log_info(format!("🧹 Cleaning: {} stage(s)", stages.len()));

    let mut current = table.clone();
    let mut log = Vec::with_capacity(stages.len());

    for (index, spec) in stages.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { completed: index });
        }

        let rows_before = current.row_count();
        if !spec.enabled {
            log_info_indent(format!("[{}] {} (disabled, skipped)", index, spec.stage.kind()), 1);
            log.push(CleaningLogEntry {
                index,
                stage_kind: spec.stage.kind().to_string(),
                enabled: false,
                rows_before,
                rows_after: rows_before,
                cells_changed: 0,
                notes: vec!["skipped".to_string()],
            });
            continue;
        }

        log_info_indent(format!("[{}] {}", index, spec.stage.describe()), 1);
        let output = spec.stage.apply(&current, ErrorSite::Stage(index))?;

        for note in &output.notes {
            log_info_indent(note.clone(), 2);
        }
        if output.table.row_count() != rows_before {
            log_warning_indent(format!("rows: {} → {}", rows_before, output.table.row_count()), 2);
        }

        log.push(CleaningLogEntry {
            index,
            stage_kind: spec.stage.kind().to_string(),
            enabled: true,
            rows_before,
            rows_after: output.table.row_count(),
            cells_changed: output.cells_changed,
            notes: output.notes,
        });
        current = output.table;
    }

    log_success(format!(
        "Cleaning done: {} → {} rows",
        table.row_count(),
        current.row_count()
    ));

    Ok(CleaningOutcome { table: current, log })
}
