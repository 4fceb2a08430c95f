mod planner;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use certora_setup_edit::{apply_plan, preview_patch, ApplyOptions};
use certora_setup_types::plan::{AppendPolicy, ToolInfo};
use clap::Parser;
use fs_err as fs;
use planner::PlanContext;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "certora-setup",
    version,
    about = "Prepare a Solana Cargo workspace package for Certora CVLR verification."
)]
struct Cli {
    /// Path to the workspace root.
    #[arg(long)]
    workspace: Utf8PathBuf,

    /// Path to the package (default: two levels up from the invocation directory).
    #[arg(long, default_value = "../../")]
    package: Utf8PathBuf,

    /// Name of the package, substituted into generated files.
    #[arg(long)]
    package_name: String,

    /// Perform the setup steps. Without this flag, run a dry-run preview.
    #[arg(long, default_value_t = false)]
    execute: bool,

    /// Skip appends whose marker line is already present (idempotent re-runs).
    #[arg(long, default_value_t = false)]
    skip_if_marked: bool,

    /// Justfile template to render into the package.
    #[arg(long, default_value = "just/package-justfile.template")]
    template: Utf8PathBuf,

    /// Build wrapper to install (default: the certora-build binary next to
    /// this executable).
    #[arg(long)]
    wrapper: Option<Utf8PathBuf>,

    /// Write the computed plan as JSON to this path.
    #[arg(long)]
    plan_json: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        error!("{:?}", e);
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let workspace_root = canonicalize_utf8(&cli.workspace)
        .with_context(|| format!("resolve workspace path {}", cli.workspace))?;
    let package_root = canonicalize_utf8(&cli.package)
        .with_context(|| format!("resolve package path {}", cli.package))?;

    let wrapper_source = match cli.wrapper {
        Some(path) => path,
        None => default_wrapper_source()?,
    };

    let policy = if cli.skip_if_marked {
        AppendPolicy::SkipIfMarked
    } else {
        AppendPolicy::Always
    };

    let ctx = PlanContext {
        workspace_root,
        package_root,
        package_name: cli.package_name,
        template: cli.template,
        wrapper_source,
        policy,
    };

    let plan = planner::plan(&ctx, tool_info()).context("build setup plan")?;

    if let Some(path) = &cli.plan_json {
        write_json(path, &plan)?;
        info!("wrote plan to {path}");
    }

    if !cli.execute {
        // Preview what execute mode would change, then walk the plan in
        // log-only mode.
        let patch = preview_patch(&plan).context("preview patch")?;
        if !patch.is_empty() {
            print!("{patch}");
        }
    }

    let opts = ApplyOptions {
        dry_run: !cli.execute,
    };
    apply_plan(&plan, tool_info(), &opts).context("apply setup plan")?;

    if !cli.execute {
        info!("Execution flag not set. No files have been changed. Run with --execute option.");
    }

    Ok(())
}

fn canonicalize_utf8(path: &Utf8Path) -> anyhow::Result<Utf8PathBuf> {
    let abs = fs::canonicalize(path.as_std_path())?;
    Utf8PathBuf::from_path_buf(abs).map_err(|p| anyhow::anyhow!("non-utf8 path {}", p.display()))
}

/// The companion `certora-build` binary shipped next to this executable.
fn default_wrapper_source() -> anyhow::Result<Utf8PathBuf> {
    let exe = std::env::current_exe().context("locate current executable")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("executable has no parent directory"))?;
    Utf8PathBuf::from_path_buf(dir.join("certora-build"))
        .map_err(|p| anyhow::anyhow!("non-utf8 path {}", p.display()))
}

fn write_json<T: serde::Serialize>(path: &Utf8Path, v: &T) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize json")?;
    fs::write(path, s).with_context(|| format!("write {}", path))?;
    Ok(())
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "certora-setup".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    }
}
