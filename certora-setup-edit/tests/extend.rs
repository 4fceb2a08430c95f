//! Backup-then-append behavior, dry-run isolation, and append policies.

use camino::{Utf8Path, Utf8PathBuf};
use certora_setup_edit::{
    apply_plan, backup_path, preview_patch, render_template, ApplyOptions, SetupError,
};
use certora_setup_types::apply::ApplyStatus;
use certora_setup_types::plan::{
    Action, AppendPolicy, PlannedAction, SetupPlan, ToolInfo,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

const FRAGMENT: &str = r#"
# === Certora CVLR ===
[workspace.dependencies.cvlr]
version = "0.4.0"
"#;

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "certora-setup".to_string(),
        version: Some("0.0.0".to_string()),
    }
}

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf-8 temp path")
}

fn create_temp_workspace() -> (TempDir, Utf8PathBuf) {
    let td = tempfile::tempdir().expect("tempdir");
    let root = utf8(td.path());
    fs::write(
        root.join("Cargo.toml"),
        "[workspace]\nmembers = [\"programs/vault\"]\n",
    )
    .unwrap();
    (td, root)
}

fn append_plan(root: &Utf8Path, policy: AppendPolicy) -> SetupPlan {
    let mut plan = SetupPlan::new(
        tool_info(),
        root.to_owned(),
        root.to_owned(),
        "vault".to_string(),
        policy,
    );
    plan.actions.push(PlannedAction {
        id: "extend-workspace-manifest".to_string(),
        description: "append cvlr dependency pins".to_string(),
        action: Action::AppendFile {
            path: root.join("Cargo.toml"),
            fragment: FRAGMENT.to_string(),
            backup: true,
        },
    });
    plan.summarize();
    plan
}

#[test]
fn execute_backs_up_then_appends() {
    let (_td, root) = create_temp_workspace();
    let manifest = root.join("Cargo.toml");
    let original = fs::read_to_string(&manifest).unwrap();

    let plan = append_plan(&root, AppendPolicy::Always);
    let apply = apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap();

    assert!(apply.applied);
    assert_eq!(apply.summary.applied, 1);

    let backup = fs::read_to_string(backup_path(&manifest)).unwrap();
    assert_eq!(backup, original);

    let extended = fs::read_to_string(&manifest).unwrap();
    assert_eq!(extended, format!("{original}\n\n\n{}\n", FRAGMENT.trim()));
}

#[test]
fn dry_run_touches_nothing() {
    let (_td, root) = create_temp_workspace();
    let manifest = root.join("Cargo.toml");
    let original = fs::read_to_string(&manifest).unwrap();

    let plan = append_plan(&root, AppendPolicy::Always);
    let apply = apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: true }).unwrap();

    assert!(!apply.applied);
    assert_eq!(apply.summary.applied, 0);
    assert_eq!(apply.summary.skipped, 1);
    assert_eq!(apply.results[0].status, ApplyStatus::Skipped);

    assert_eq!(fs::read_to_string(&manifest).unwrap(), original);
    assert!(!backup_path(&manifest).exists());
}

#[test]
fn append_to_missing_file_is_fatal() {
    let (_td, root) = create_temp_workspace();
    fs::remove_file(root.join("Cargo.toml")).unwrap();

    let plan = append_plan(&root, AppendPolicy::Always);
    let err = apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap_err();
    assert!(matches!(err, SetupError::MissingFile { .. }));
}

#[test]
fn always_policy_duplicates_on_second_run() {
    let (_td, root) = create_temp_workspace();
    let manifest = root.join("Cargo.toml");
    let plan = append_plan(&root, AppendPolicy::Always);

    apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap();
    let once = fs::read_to_string(&manifest).unwrap();
    apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap();
    let twice = fs::read_to_string(&manifest).unwrap();

    // The block appears twice, and the second run's backup captured the
    // once-extended content, not the pristine original.
    assert_eq!(twice.matches("# === Certora CVLR ===").count(), 2);
    assert_eq!(fs::read_to_string(backup_path(&manifest)).unwrap(), once);
}

#[test]
fn skip_if_marked_policy_is_idempotent() {
    let (_td, root) = create_temp_workspace();
    let manifest = root.join("Cargo.toml");
    let plan = append_plan(&root, AppendPolicy::SkipIfMarked);

    apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap();
    let once = fs::read_to_string(&manifest).unwrap();

    let second = apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap();
    assert_eq!(second.summary.skipped, 1);
    assert_eq!(second.results[0].status, ApplyStatus::Skipped);
    assert_eq!(fs::read_to_string(&manifest).unwrap(), once);
}

#[test]
fn write_file_replaces_contents() {
    let (_td, root) = create_temp_workspace();
    let mut plan = SetupPlan::new(
        tool_info(),
        root.clone(),
        root.clone(),
        "vault".to_string(),
        AppendPolicy::Always,
    );
    plan.actions.push(PlannedAction {
        id: "write-justfile".to_string(),
        description: "write generated justfile".to_string(),
        action: Action::WriteFile {
            path: root.join("justfile"),
            contents: "build:\n    cargo certora-sbf\n".to_string(),
        },
    });

    apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap();
    assert_eq!(
        fs::read_to_string(root.join("justfile")).unwrap(),
        "build:\n    cargo certora-sbf\n"
    );
}

#[test]
fn copy_missing_source_is_fatal() {
    let (_td, root) = create_temp_workspace();
    let mut plan = SetupPlan::new(
        tool_info(),
        root.clone(),
        root.clone(),
        "vault".to_string(),
        AppendPolicy::Always,
    );
    plan.actions.push(PlannedAction {
        id: "install-build-wrapper".to_string(),
        description: "install certora_build".to_string(),
        action: Action::CopyFile {
            source: root.join("no-such-binary"),
            dest: root.join("certora_build"),
        },
    });

    let err = apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap_err();
    assert!(matches!(err, SetupError::MissingFile { .. }));
    assert!(!root.join("certora_build").exists());
}

#[test]
fn remove_dir_deletes_and_tolerates_absence() {
    let (_td, root) = create_temp_workspace();
    fs::create_dir_all(root.join(".git").join("objects")).unwrap();
    fs::write(root.join(".git").join("HEAD"), "ref: refs/heads/main\n").unwrap();

    let mut plan = SetupPlan::new(
        tool_info(),
        root.clone(),
        root.clone(),
        "vault".to_string(),
        AppendPolicy::Always,
    );
    plan.actions.push(PlannedAction {
        id: "remove-git-dir".to_string(),
        description: "delete version-control metadata".to_string(),
        action: Action::RemoveDir {
            path: root.join(".git"),
        },
    });

    let first = apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap();
    assert_eq!(first.summary.applied, 1);
    assert!(!root.join(".git").exists());

    let second = apply_plan(&plan, tool_info(), &ApplyOptions { dry_run: false }).unwrap();
    assert_eq!(second.summary.skipped, 1);
}

#[test]
fn render_template_fails_on_missing_file() {
    let (_td, root) = create_temp_workspace();
    let err = render_template(&root.join("nope.template"), &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, SetupError::MissingTemplate { .. }));
}

#[test]
fn render_template_substitutes_and_rejects_unknowns() {
    let (_td, root) = create_temp_workspace();
    let template = root.join("package-justfile.template");
    fs::write(
        &template,
        "# {package_name}\nup := \"{relative_workspace_path}\"\n",
    )
    .unwrap();

    let mut subs = BTreeMap::new();
    subs.insert("package_name".to_string(), "vault".to_string());
    subs.insert("relative_workspace_path".to_string(), "../../".to_string());

    let out = render_template(&template, &subs).unwrap();
    assert_eq!(out, "# vault\nup := \"../../\"\n");
    assert!(!out.contains('{'));

    let err = render_template(&template, &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, SetupError::Substitution { .. }));
}

#[test]
fn preview_patch_shows_append_without_mutation() {
    let (_td, root) = create_temp_workspace();
    let manifest = root.join("Cargo.toml");
    let original = fs::read_to_string(&manifest).unwrap();

    let plan = append_plan(&root, AppendPolicy::Always);
    let patch = preview_patch(&plan).unwrap();

    assert!(patch.contains("+# === Certora CVLR ==="));
    assert!(patch.contains(&format!("a/{manifest}")));
    assert_eq!(fs::read_to_string(&manifest).unwrap(), original);
    assert!(!backup_path(&manifest).exists());
}
