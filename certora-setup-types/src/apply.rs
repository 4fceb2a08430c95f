use crate::plan::ToolInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of running a [`crate::plan::SetupPlan`], in dry-run or execute
/// mode. Mutation failures are fatal to the process, so there is no
/// "failed" status here; every recorded action either applied or was
/// skipped (dry-run, or marker-guarded append).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupApply {
    pub schema: String,
    pub tool: ToolInfo,
    pub plan_id: String,

    /// True when filesystem mutation actually happened (execute mode).
    pub applied: bool,

    #[serde(default)]
    pub run: RunInfo,

    #[serde(default)]
    pub results: Vec<ActionResult>,

    #[serde(default)]
    pub summary: ApplySummary,
}

impl SetupApply {
    pub fn new(tool: ToolInfo, plan_id: String) -> Self {
        Self {
            schema: crate::schema::CERTORA_SETUP_APPLY_V1.to_string(),
            tool,
            plan_id,
            applied: false,
            run: RunInfo {
                started_at: Some(Utc::now()),
                ended_at: None,
            },
            results: vec![],
            summary: ApplySummary::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Applied,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub id: String,
    pub description: String,
    pub status: ApplyStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<FileChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub before_sha256: String,
    pub after_sha256: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplySummary {
    pub attempted: u64,
    pub applied: u64,
    pub skipped: u64,
}
