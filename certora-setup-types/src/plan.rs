use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ordered list of filesystem mutations that prepares one package for
/// Certora verification. Built in full before anything is touched; applied
/// only when the caller asks for real execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupPlan {
    pub schema: String,
    pub tool: ToolInfo,
    pub plan_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    pub workspace_root: Utf8PathBuf,
    pub package_root: Utf8PathBuf,
    pub package_name: String,

    #[serde(default)]
    pub policy: AppendPolicy,

    #[serde(default)]
    pub actions: Vec<PlannedAction>,

    pub summary: PlanSummary,
}

impl SetupPlan {
    pub fn new(
        tool: ToolInfo,
        workspace_root: Utf8PathBuf,
        package_root: Utf8PathBuf,
        package_name: String,
        policy: AppendPolicy,
    ) -> Self {
        Self {
            schema: crate::schema::CERTORA_SETUP_PLAN_V1.to_string(),
            tool,
            plan_id: Uuid::new_v4().to_string(),
            created_at: Some(Utc::now()),
            workspace_root,
            package_root,
            package_name,
            policy,
            actions: vec![],
            summary: PlanSummary::default(),
        }
    }

    /// Recompute the summary from the current action list.
    pub fn summarize(&mut self) {
        let mut files = std::collections::BTreeSet::new();
        let mut appends = 0u64;
        for pa in &self.actions {
            files.insert(pa.action.target().to_owned());
            if matches!(pa.action, Action::AppendFile { .. }) {
                appends += 1;
            }
        }
        self.summary = PlanSummary {
            actions_total: self.actions.len() as u64,
            appends,
            files_touched: files.len() as u64,
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// What to do when an append target already carries the fragment's marker
/// line from an earlier run.
///
/// `Always` reproduces the historical behavior: every execute run appends
/// the block again, and the `.orig` backup is overwritten with the
/// pre-append content of *that* run. `SkipIfMarked` makes re-runs no-ops
/// for already-extended files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendPolicy {
    #[default]
    Always,
    SkipIfMarked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Stable, human-readable id (e.g. "extend-workspace-manifest").
    pub id: String,
    pub description: String,
    pub action: Action,
}

/// A single filesystem mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Write `contents` to `path`, creating or replacing it. The contents
    /// are rendered at plan time so preview and apply describe the same
    /// bytes.
    WriteFile {
        path: Utf8PathBuf,
        contents: String,
    },
    /// Back up `path` to `<path>.orig` (when `backup` is set), then append
    /// a blank separator, the trimmed fragment, and a trailing newline.
    AppendFile {
        path: Utf8PathBuf,
        fragment: String,
        backup: bool,
    },
    /// Copy `source` to `dest`.
    CopyFile {
        source: Utf8PathBuf,
        dest: Utf8PathBuf,
    },
    /// Recursively delete `path` if it exists. Irreversible.
    RemoveDir {
        path: Utf8PathBuf,
    },
}

impl Action {
    /// The path this action mutates (the destination, for copies).
    pub fn target(&self) -> &Utf8Path {
        match self {
            Action::WriteFile { path, .. } => path,
            Action::AppendFile { path, .. } => path,
            Action::CopyFile { dest, .. } => dest,
            Action::RemoveDir { path } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    pub actions_total: u64,
    pub appends: u64,
    pub files_touched: u64,
}
