//! Edit engine for certora-setup plans.
//!
//! Responsibilities:
//! - Render the package justfile template.
//! - Apply plan actions (backup-then-append, write, copy, remove).
//! - Generate a unified diff preview for dry runs.
//!
//! Manifests are treated as opaque text to append to; nothing here parses
//! TOML.

use camino::{Utf8Path, Utf8PathBuf};
use certora_setup_types::apply::{
    ActionResult, ApplyStatus, FileChange, SetupApply,
};
use certora_setup_types::plan::{Action, AppendPolicy, SetupPlan, ToolInfo};
use chrono::Utc;
use diffy::PatchFormatter;
use fs_err as fs;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("template file {path} does not exist")]
    MissingTemplate { path: Utf8PathBuf },

    #[error("template {template} references unknown placeholder {{{placeholder}}}")]
    Substitution {
        placeholder: String,
        template: Utf8PathBuf,
    },

    #[error("{path}: does not exist")]
    MissingFile { path: Utf8PathBuf },

    #[error("{path}: does not exist")]
    MissingManifest { path: Utf8PathBuf },

    #[error("io error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

impl SetupError {
    fn io(path: &Utf8Path, source: std::io::Error) -> Self {
        SetupError::Io {
            path: path.to_owned(),
            source,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// When set, no file is touched; every action only logs what it would do.
    pub dry_run: bool,
}

/// Render a template file, substituting every `{placeholder}` from the
/// supplied mapping. `{{` and `}}` pass through untouched so justfile
/// interpolation syntax survives rendering. An unknown or malformed
/// placeholder is an error, never a pass-through.
pub fn render_template(
    path: &Utf8Path,
    substitutions: &BTreeMap<String, String>,
) -> Result<String, SetupError> {
    if !path.exists() {
        return Err(SetupError::MissingTemplate {
            path: path.to_owned(),
        });
    }
    let content = fs::read_to_string(path).map_err(|e| SetupError::io(path, e))?;
    substitute(&content, substitutions).map_err(|placeholder| SetupError::Substitution {
        placeholder,
        template: path.to_owned(),
    })
}

fn substitute(input: &str, subs: &BTreeMap<String, String>) -> Result<String, String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' {
            if chars.peek() == Some(&'{') {
                chars.next();
                out.push_str("{{");
                continue;
            }
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) if c.is_ascii_alphanumeric() || c == '_' => name.push(c),
                    _ => return Err(name),
                }
            }
            match subs.get(&name) {
                Some(v) => out.push_str(v),
                None => return Err(name),
            }
        } else if c == '}' && chars.peek() == Some(&'}') {
            chars.next();
            out.push_str("}}");
        } else {
            out.push(c);
        }
    }

    Ok(out)
}

/// The marker line of an append fragment: its first non-empty line. Used by
/// [`AppendPolicy::SkipIfMarked`] to detect an already-extended target.
pub fn fragment_marker(fragment: &str) -> Option<&str> {
    fragment.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Separator + trimmed fragment + trailing newline, exactly the bytes an
/// append adds to its target.
fn append_suffix(fragment: &str) -> String {
    format!("\n\n\n{}\n", fragment.trim())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn file_change(path: &Utf8Path, before: &str, after: &str) -> FileChange {
    FileChange {
        path: path.to_string(),
        before_sha256: sha256_hex(before.as_bytes()),
        after_sha256: sha256_hex(after.as_bytes()),
        before_bytes: Some(before.len() as u64),
        after_bytes: Some(after.len() as u64),
    }
}

/// Apply a plan in strict action order. With `opts.dry_run` every action
/// only reports; otherwise mutations happen immediately and any I/O failure
/// aborts the run with no rollback of earlier actions.
pub fn apply_plan(
    plan: &SetupPlan,
    tool: ToolInfo,
    opts: &ApplyOptions,
) -> Result<SetupApply, SetupError> {
    let mut apply = SetupApply::new(tool, plan.plan_id.clone());
    apply.applied = !opts.dry_run;

    for planned in &plan.actions {
        let mut result = ActionResult {
            id: planned.id.clone(),
            description: planned.description.clone(),
            status: ApplyStatus::Skipped,
            message: None,
            files_changed: vec![],
        };

        if opts.dry_run {
            preview_action(&planned.action, plan.policy);
            result.message = Some("dry-run: not written".to_string());
            apply.summary.skipped += 1;
            apply.results.push(result);
            continue;
        }

        apply.summary.attempted += 1;
        match run_action(&planned.action, plan.policy)? {
            ActionOutcome::Applied(changes) => {
                result.status = ApplyStatus::Applied;
                result.files_changed = changes;
                apply.summary.applied += 1;
            }
            ActionOutcome::Skipped(reason) => {
                result.message = Some(reason);
                apply.summary.skipped += 1;
            }
        }
        apply.results.push(result);
    }

    apply.run.ended_at = Some(Utc::now());
    Ok(apply)
}

enum ActionOutcome {
    Applied(Vec<FileChange>),
    Skipped(String),
}

fn preview_action(action: &Action, policy: AppendPolicy) {
    match action {
        Action::WriteFile { path, .. } => info!("Would generate {path}"),
        Action::AppendFile { path, fragment, .. } => {
            if already_marked(path, fragment, policy) {
                info!("Would skip {path} (already extended)");
            } else {
                info!("Would append Certora content to {path}");
            }
        }
        Action::CopyFile { source, dest } => info!("Would copy {source} to {dest}"),
        Action::RemoveDir { path } => info!("Would delete {path}"),
    }
}

fn already_marked(path: &Utf8Path, fragment: &str, policy: AppendPolicy) -> bool {
    if policy != AppendPolicy::SkipIfMarked {
        return false;
    }
    let Some(marker) = fragment_marker(fragment) else {
        return false;
    };
    match fs::read_to_string(path) {
        Ok(content) => content.contains(marker),
        Err(_) => false,
    }
}

fn run_action(action: &Action, policy: AppendPolicy) -> Result<ActionOutcome, SetupError> {
    match action {
        Action::WriteFile { path, contents } => {
            let before = fs::read_to_string(path).unwrap_or_default();
            fs::write(path, contents).map_err(|e| SetupError::io(path, e))?;
            info!("Generated {path}");
            Ok(ActionOutcome::Applied(vec![file_change(
                path, &before, contents,
            )]))
        }

        Action::AppendFile {
            path,
            fragment,
            backup,
        } => {
            if *backup && !path.exists() {
                return Err(SetupError::MissingFile {
                    path: path.clone(),
                });
            }
            let before = fs::read_to_string(path).unwrap_or_default();

            if already_marked(path, fragment, policy) {
                info!("Skipping {path}: already extended");
                return Ok(ActionOutcome::Skipped(
                    "already extended (marker present)".to_string(),
                ));
            }

            if *backup {
                let orig = backup_path(path);
                fs::copy(path, &orig).map_err(|e| SetupError::io(&orig, e))?;
            }

            let after = format!("{before}{}", append_suffix(fragment));
            fs::write(path, &after).map_err(|e| SetupError::io(path, e))?;
            info!("Appended Certora content to {path}");
            Ok(ActionOutcome::Applied(vec![file_change(
                path, &before, &after,
            )]))
        }

        Action::CopyFile { source, dest } => {
            if !source.exists() {
                return Err(SetupError::MissingFile {
                    path: source.clone(),
                });
            }
            let before = fs::read_to_string(dest).unwrap_or_default();
            fs::copy(source, dest).map_err(|e| SetupError::io(dest, e))?;
            info!("Copied {source} to {dest}");
            let after = fs::read_to_string(dest).unwrap_or_default();
            Ok(ActionOutcome::Applied(vec![file_change(
                dest, &before, &after,
            )]))
        }

        Action::RemoveDir { path } => {
            if !path.exists() {
                return Ok(ActionOutcome::Skipped("not present".to_string()));
            }
            fs::remove_dir_all(path).map_err(|e| SetupError::io(path, e))?;
            info!("Deleted {path}");
            Ok(ActionOutcome::Applied(vec![]))
        }
    }
}

/// `<name>.orig` sibling of a file. An existing backup is overwritten.
pub fn backup_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut s = path.to_string();
    s.push_str(".orig");
    Utf8PathBuf::from(s)
}

/// Unified diff of what applying the plan would change, computed entirely
/// in memory. Used for dry-run previews; never touches the filesystem
/// beyond reads.
pub fn preview_patch(plan: &SetupPlan) -> Result<String, SetupError> {
    let mut before: BTreeMap<Utf8PathBuf, String> = BTreeMap::new();
    let mut after: BTreeMap<Utf8PathBuf, String> = BTreeMap::new();

    for planned in &plan.actions {
        match &planned.action {
            Action::WriteFile { path, contents } => {
                let old = fs::read_to_string(path).unwrap_or_default();
                before.entry(path.clone()).or_insert(old);
                after.insert(path.clone(), contents.clone());
            }
            Action::AppendFile { path, fragment, .. } => {
                let old = fs::read_to_string(path).unwrap_or_default();
                let base = after.get(path).cloned().unwrap_or_else(|| old.clone());
                before.entry(path.clone()).or_insert(old);
                if already_marked(path, fragment, plan.policy) {
                    after.insert(path.clone(), base);
                } else {
                    after.insert(path.clone(), format!("{base}{}", append_suffix(fragment)));
                }
            }
            // Binary copy and directory removal have no meaningful text diff.
            Action::CopyFile { .. } | Action::RemoveDir { .. } => {}
        }
    }

    Ok(render_patch(&before, &after))
}

fn render_patch(
    before: &BTreeMap<Utf8PathBuf, String>,
    after: &BTreeMap<Utf8PathBuf, String>,
) -> String {
    let mut out = String::new();
    let formatter = PatchFormatter::new();

    for (path, old) in before {
        let new = after.get(path).unwrap_or(old);
        if old == new {
            continue;
        }

        out.push_str(&format!("diff --git a/{0} b/{0}\n", path));
        out.push_str(&format!("--- a/{0}\n+++ b/{0}\n", path));

        let patch = diffy::create_patch(old, new);
        out.push_str(&format!("{}", formatter.fmt_patch(&patch)));
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitute_replaces_known_placeholders() {
        let out = substitute(
            "go up {relative_workspace_path} for {package_name}",
            &subs(&[
                ("relative_workspace_path", "../../"),
                ("package_name", "vault"),
            ]),
        )
        .unwrap();
        assert_eq!(out, "go up ../../ for vault");
    }

    #[test]
    fn substitute_rejects_unknown_placeholder() {
        let err = substitute("{mystery}", &subs(&[])).unwrap_err();
        assert_eq!(err, "mystery");
    }

    #[test]
    fn substitute_rejects_unterminated_placeholder() {
        assert!(substitute("{package_name", &subs(&[("package_name", "v")])).is_err());
    }

    #[test]
    fn double_braces_pass_through() {
        let out = substitute("run {{rule}} in {package_name}", &subs(&[("package_name", "vault")]))
            .unwrap();
        assert_eq!(out, "run {{rule}} in vault");
    }

    #[test]
    fn append_suffix_is_separator_trimmed_fragment_newline() {
        assert_eq!(append_suffix("\n  a = 1  \n"), "\n\n\na = 1\n");
    }

    #[test]
    fn fragment_marker_is_first_nonempty_line() {
        assert_eq!(
            fragment_marker("\n# === Certora CVLR ===\n[dependencies.cvlr]\n"),
            Some("# === Certora CVLR ===")
        );
        assert_eq!(fragment_marker("  \n \n"), None);
    }

    #[test]
    fn backup_path_appends_orig() {
        assert_eq!(
            backup_path(Utf8Path::new("/ws/Cargo.toml")),
            Utf8PathBuf::from("/ws/Cargo.toml.orig")
        );
    }
}
