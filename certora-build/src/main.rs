//! Build wrapper around `cargo certora-sbf`.
//!
//! The Certora prover invokes this binary on every build-and-prove cycle.
//! It runs the verification build with the working directory pinned to the
//! wrapper's own installation directory, captures or streams the tool's
//! output, and exits 0/1 so the prover can branch on the result. The
//! output itself is never interpreted here.

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use std::process::{Command, ExitCode, Stdio};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "certora-build",
    version,
    about = "Compile a Solana package and emit JSON build metadata for the Certora prover."
)]
struct Cli {
    /// Ask the build tool for JSON-formatted output on the console.
    #[arg(long)]
    json: bool,

    /// Feature names forwarded to the build tool.
    #[arg(long = "cargo_features", num_args = 1..)]
    cargo_features: Vec<String>,

    /// Emit diagnostics on stderr.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Stream build output live instead of capturing it to temp files.
    #[arg(short = 'l', long)]
    log: bool,
}

/// The exact argument vector handed to the OS. No shell interpretation.
fn build_command(json: bool, features: &[String]) -> Vec<String> {
    let mut cmd = vec!["cargo".to_string(), "certora-sbf".to_string()];
    if json {
        cmd.push("--json".to_string());
    }
    if !features.is_empty() {
        cmd.push("--features".to_string());
        cmd.extend(features.iter().cloned());
    }
    cmd
}

struct RunOutcome {
    stdout_log: Option<Utf8PathBuf>,
    stderr_log: Option<Utf8PathBuf>,
    success: bool,
}

/// Run the build command, blocking until it exits. In streaming mode the
/// child inherits this process's stdio; otherwise its output is redirected
/// to two kept temp files.
fn run_command(command: &[String], to_stdout: bool) -> anyhow::Result<RunOutcome> {
    debug!("Running: {}", command.join(" "));

    let cwd = script_dir()?;
    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..]).current_dir(&cwd);

    if to_stdout {
        let status = cmd
            .status()
            .with_context(|| format!("run {}", command[0]))?;
        return Ok(RunOutcome {
            stdout_log: None,
            stderr_log: None,
            success: status.success(),
        });
    }

    let (stdout_file, stdout_path) = capture_file(".stdout")?;
    let (stderr_file, stderr_path) = capture_file(".stderr")?;
    let status = cmd
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .status()
        .with_context(|| format!("run {}", command[0]))?;

    Ok(RunOutcome {
        stdout_log: Some(stdout_path),
        stderr_log: Some(stderr_path),
        success: status.success(),
    })
}

/// A kept temp file for captured output. Never deleted by this process, so
/// the logs stay inspectable after the run; retention is the caller's
/// responsibility.
fn capture_file(suffix: &str) -> anyhow::Result<(std::fs::File, Utf8PathBuf)> {
    let file = tempfile::Builder::new()
        .prefix("certora_build_")
        .suffix(suffix)
        .tempfile()
        .context("create capture file")?;
    let (file, path) = file.keep().context("persist capture file")?;
    let path = Utf8PathBuf::from_path_buf(path)
        .map_err(|p| anyhow::anyhow!("non-utf8 temp path {}", p.display()))?;
    Ok((file, path))
}

/// The wrapper's installation directory. Builds run from here, so the
/// caller's working directory never matters.
fn script_dir() -> anyhow::Result<Utf8PathBuf> {
    let exe = std::env::current_exe().context("locate current executable")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("executable has no parent directory"))?;
    Utf8PathBuf::from_path_buf(dir.to_path_buf())
        .map_err(|p| anyhow::anyhow!("non-utf8 path {}", p.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(if cli.verbose { "debug" } else { "warn" }))
        .with_writer(std::io::stderr)
        .init();

    let command = build_command(cli.json, &cli.cargo_features);

    match run_command(&command, cli.log) {
        Ok(outcome) => {
            if let (Some(out), Some(err)) = (&outcome.stdout_log, &outcome.stderr_log) {
                debug!("Temporary log files located at:\n\t{out}\nand\n\t{err}");
            }
            if outcome.success {
                ExitCode::from(0)
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            error!("Error running command: {e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_command_is_cargo_certora_sbf() {
        assert_eq!(build_command(false, &[]), ["cargo", "certora-sbf"]);
    }

    #[test]
    fn json_flag_follows_the_subcommand() {
        assert_eq!(
            build_command(true, &[]),
            ["cargo", "certora-sbf", "--json"]
        );
    }

    #[test]
    fn features_come_last_in_order() {
        let features = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            build_command(true, &features),
            ["cargo", "certora-sbf", "--json", "--features", "a", "b"]
        );
    }

    #[test]
    fn no_features_flag_without_features() {
        assert!(!build_command(true, &[]).contains(&"--features".to_string()));
    }
}
