//! Plan construction for the workspace integrator.
//!
//! Validates preconditions (both manifests present), computes the
//! workspace-relative path, renders the justfile, and emits the ordered
//! action list. Nothing here mutates the filesystem.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use certora_setup_edit::{render_template, SetupError};
use certora_setup_types::plan::{
    Action, AppendPolicy, PlannedAction, SetupPlan, ToolInfo,
};
use std::collections::BTreeMap;

/// First line of every appended fragment; `AppendPolicy::SkipIfMarked` keys
/// off it.
pub const MARKER: &str = "# === Certora CVLR ===";

const WORKSPACE_MANIFEST_FRAGMENT: &str = r#"
# === Certora CVLR ===
[workspace.dependencies.cvlr]
version = "0.4.0"

[workspace.dependencies.cvlr-solana]
version = "0.4.4"
"#;

const PACKAGE_MANIFEST_FRAGMENT: &str = r#"
# === Certora CVLR ===
[dependencies.cvlr]
workspace = true
optional = true

[dependencies.cvlr-solana]
workspace = true
optional = true

[package.metadata.certora]
sources = [ "src/**/*.rs" ]
solana_inlining = [ "src/certora/envs/solana_inlining.txt" ]
solana_summaries = [ "src/certora/envs/solana_summaries.txt" ]
"#;

const GITIGNORE_FRAGMENT: &str = "
.certora
.certora_internal
certora_out
";

#[derive(Debug, Clone)]
pub struct PlanContext {
    /// Absolute workspace root.
    pub workspace_root: Utf8PathBuf,
    /// Absolute package root (equal to or nested below the workspace root).
    pub package_root: Utf8PathBuf,
    pub package_name: String,
    /// Justfile template path.
    pub template: Utf8PathBuf,
    /// Build wrapper to install into the package.
    pub wrapper_source: Utf8PathBuf,
    pub policy: AppendPolicy,
}

/// `../` repeated once per directory level separating the package from the
/// workspace root.
pub fn relative_workspace_path(
    workspace_root: &Utf8Path,
    package_root: &Utf8Path,
) -> anyhow::Result<String> {
    let rel = package_root.strip_prefix(workspace_root).with_context(|| {
        format!("package {package_root} is not inside workspace {workspace_root}")
    })?;
    Ok("../".repeat(rel.components().count()))
}

pub fn plan(ctx: &PlanContext, tool: ToolInfo) -> anyhow::Result<SetupPlan> {
    let workspace_manifest = ctx.workspace_root.join("Cargo.toml");
    let package_manifest = ctx.package_root.join("Cargo.toml");

    // Both manifests must exist before anything is planned, let alone done.
    for manifest in [&workspace_manifest, &package_manifest] {
        if !manifest.exists() {
            return Err(SetupError::MissingManifest {
                path: manifest.clone(),
            }
            .into());
        }
    }

    let relative = relative_workspace_path(&ctx.workspace_root, &ctx.package_root)?;

    let mut substitutions = BTreeMap::new();
    substitutions.insert("relative_workspace_path".to_string(), relative);
    substitutions.insert("package_name".to_string(), ctx.package_name.clone());
    let justfile = render_template(&ctx.template, &substitutions)
        .with_context(|| format!("render {}", ctx.template))?;

    let mut plan = SetupPlan::new(
        tool,
        ctx.workspace_root.clone(),
        ctx.package_root.clone(),
        ctx.package_name.clone(),
        ctx.policy,
    );

    plan.actions = vec![
        PlannedAction {
            id: "write-justfile".to_string(),
            description: format!("generate {}", ctx.package_root.join("justfile")),
            action: Action::WriteFile {
                path: ctx.package_root.join("justfile"),
                contents: justfile,
            },
        },
        PlannedAction {
            id: "extend-workspace-manifest".to_string(),
            description: format!("append cvlr dependency pins to {workspace_manifest}"),
            action: Action::AppendFile {
                path: workspace_manifest,
                fragment: WORKSPACE_MANIFEST_FRAGMENT.to_string(),
                backup: true,
            },
        },
        PlannedAction {
            id: "extend-package-manifest".to_string(),
            description: format!(
                "append optional cvlr dependencies and certora metadata to {package_manifest}"
            ),
            action: Action::AppendFile {
                path: package_manifest,
                fragment: PACKAGE_MANIFEST_FRAGMENT.to_string(),
                backup: true,
            },
        },
        PlannedAction {
            id: "install-build-wrapper".to_string(),
            description: format!(
                "install {} as {}",
                ctx.wrapper_source,
                ctx.package_root.join("certora_build")
            ),
            action: Action::CopyFile {
                source: ctx.wrapper_source.clone(),
                dest: ctx.package_root.join("certora_build"),
            },
        },
        PlannedAction {
            id: "extend-gitignore".to_string(),
            description: format!(
                "append certora scratch directories to {}",
                ctx.workspace_root.join(".gitignore")
            ),
            action: Action::AppendFile {
                path: ctx.workspace_root.join(".gitignore"),
                fragment: GITIGNORE_FRAGMENT.to_string(),
                backup: true,
            },
        },
        // The tool runs from a vendored copy of the repository; its history
        // must not ship to the prover.
        PlannedAction {
            id: "remove-git-dir".to_string(),
            description: "delete version-control metadata at the invocation directory"
                .to_string(),
            action: Action::RemoveDir {
                path: Utf8PathBuf::from(".git"),
            },
        },
    ];
    plan.summarize();

    Ok(plan)
}
