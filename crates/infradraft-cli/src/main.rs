//! infradraft - multi-candidate infrastructure artifact generation
//!
//! ## Commands
//!
//! - `run`: draft, review and publish infrastructure artifacts for a project
//! - `audit`: verify a saved audit log and print its decision summary

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::error;

use infradraft_core::{
    read_audit_file, HumanPrompt, HumanResponse, InfraError, PipelineConfig, PromptError,
    RenderedProposal, RunContext, RunReport, StagePipeline, StageSelector,
};

#[derive(Parser, Debug)]
#[command(name = "infradraft")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Draft, review and publish infrastructure artifacts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON run report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one stage, or all stages, against a project
    Run {
        /// Project root the artifacts are written to
        #[arg(short, long)]
        project: PathBuf,

        /// Stage to run: dockerfile, compose, kubernetes, cicd, observability or all
        #[arg(short, long, default_value = "all")]
        stage: StageSelector,

        /// Directory audit logs are saved to
        #[arg(long, env = "INFRADRAFT_AUDIT_DIR")]
        audit_dir: Option<PathBuf>,

        /// Wall-clock bound for one generation round, in seconds
        #[arg(long)]
        generator_timeout_secs: Option<u64>,

        /// Let high-confidence drafts skip the review prompt
        #[arg(long)]
        auto_approve: bool,
    },

    /// Verify a saved audit log and print its summary
    Audit {
        /// Path to `<run_id>.json`
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    infradraft_core::init_tracing(cli.json, infradraft_core::level_for(cli.verbose));

    let outcome = match cli.command {
        Commands::Run {
            project,
            stage,
            audit_dir,
            generator_timeout_secs,
            auto_approve,
        } => {
            cmd_run(
                &project,
                stage,
                audit_dir,
                generator_timeout_secs,
                auto_approve,
                cli.json,
            )
            .await
        }
        Commands::Audit { file } => cmd_audit(&file, cli.json),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "infradraft failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn cmd_run(
    project: &Path,
    selector: StageSelector,
    audit_dir: Option<PathBuf>,
    generator_timeout_secs: Option<u64>,
    auto_approve: bool,
    json: bool,
) -> Result<ExitCode> {
    let mut config = PipelineConfig::from_env().context("Invalid configuration")?;
    if let Some(dir) = audit_dir {
        config.audit_dir = dir;
    }
    if let Some(secs) = generator_timeout_secs {
        config.generator_timeout_secs = secs;
    }
    if auto_approve {
        config.auto_approve = true;
    }
    config.validate().context("Invalid configuration")?;

    let ctx = RunContext::new(config);
    let mut pipeline = match StagePipeline::builder(ctx, project, Arc::new(StdinPrompt)).build() {
        Ok(pipeline) => pipeline,
        Err(InfraError::ProjectNotFound(path)) => {
            eprintln!("Error: project path does not exist: {path}");
            return Ok(ExitCode::from(2));
        }
        Err(err) => return Err(err).context("Failed to set up the pipeline"),
    };

    println!("infradraft run {}", pipeline.run_id());
    let report = pipeline
        .run_stages(selector)
        .await
        .context("Run did not complete")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &pipeline);
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_report(report: &RunReport, pipeline: &StagePipeline) {
    println!();
    for result in &report.results {
        let via = result.published_via.as_deref().unwrap_or("-");
        println!(
            "  {:<14} {:<8} cycles={} published={}",
            result.stage_name,
            result.status.as_str(),
            result.cycles,
            via
        );
    }
    for (stage, reason) in &report.failures {
        println!("  {:<14} FAILED   {}", stage.key(), reason);
    }
    println!();
    println!("{}", pipeline.audit().summary());
    println!("Audit log: {}", report.audit_path.display());
}

fn cmd_audit(file: &Path, json: bool) -> Result<ExitCode> {
    let record = read_audit_file(file)
        .with_context(|| format!("Failed to verify audit log {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("Run:       {}", record.run_id);
        println!("Started:   {}", record.started_at);
        println!("Completed: {}", record.completed_at);
        println!("Entries:   {}", record.entries.len());
        println!("{}", record.summary());
    }
    Ok(ExitCode::SUCCESS)
}

/// Interactive review gate on stdin/stdout.
struct StdinPrompt;

#[async_trait]
impl HumanPrompt for StdinPrompt {
    async fn ask(&self, proposal: &RenderedProposal) -> Result<HumanResponse, PromptError> {
        let rendered = proposal.to_string();
        tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            writeln!(stdout, "{rendered}")?;
            ask_lines(&mut stdin.lock(), &mut stdout)
        })
        .await
        .map_err(|join| PromptError::Io(std::io::Error::other(join)))?
    }
}

/// Read one decision; `r` is followed by a feedback line. EOF aborts.
fn ask_lines(input: &mut impl BufRead, out: &mut impl Write) -> Result<HumanResponse, PromptError> {
    loop {
        write!(out, "Approve [y], refine [r] or reject [n]? ")?;
        out.flush()?;
        let Some(answer) = read_line(input)? else {
            return Err(PromptError::Aborted);
        };
        match answer.to_ascii_lowercase().as_str() {
            "y" | "yes" | "approve" => return Ok(HumanResponse::approve()),
            "n" | "no" | "reject" => return Ok(HumanResponse::reject()),
            "r" | "refine" => {
                write!(out, "Feedback: ")?;
                out.flush()?;
                let Some(feedback) = read_line(input)? else {
                    return Err(PromptError::Aborted);
                };
                return Ok(HumanResponse::refine(feedback));
            }
            _ => writeln!(out, "Please answer y, r or n.")?,
        }
    }
}

fn read_line(input: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use infradraft_core::{Decision, StageKind};
    use std::io::Cursor;

    #[test]
    fn test_run_defaults_to_all_stages() {
        let cli = Cli::try_parse_from(["infradraft", "run", "--project", "./app"]).unwrap();
        match cli.command {
            Commands::Run {
                project,
                stage,
                auto_approve,
                generator_timeout_secs,
                ..
            } => {
                assert_eq!(project, PathBuf::from("./app"));
                assert_eq!(stage, StageSelector::All);
                assert!(!auto_approve);
                assert_eq!(generator_timeout_secs, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_accepts_stage_alias_and_flags() {
        let cli = Cli::try_parse_from([
            "infradraft",
            "--json",
            "run",
            "--project",
            "./app",
            "--stage",
            "k8s",
            "--generator-timeout-secs",
            "30",
            "--auto-approve",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                stage,
                generator_timeout_secs,
                auto_approve,
                ..
            } => {
                assert_eq!(stage, StageSelector::One(StageKind::Kubernetes));
                assert_eq!(generator_timeout_secs, Some(30));
                assert!(auto_approve);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_stage_is_a_parse_error() {
        assert!(Cli::try_parse_from(["infradraft", "run", "-p", ".", "--stage", "terraform"]).is_err());
    }

    #[test]
    fn test_prompt_refine_reads_feedback_line() {
        let mut input = Cursor::new("r\nuse alpine\n");
        let mut out = Vec::new();
        let response = ask_lines(&mut input, &mut out).unwrap();
        assert_eq!(response.decision, Decision::Refine);
        assert_eq!(response.feedback, "use alpine");
    }

    #[test]
    fn test_prompt_reasks_on_unknown_answer() {
        let mut input = Cursor::new("maybe\nY\n");
        let mut out = Vec::new();
        let response = ask_lines(&mut input, &mut out).unwrap();
        assert_eq!(response.decision, Decision::Approve);
        assert!(String::from_utf8(out).unwrap().contains("Please answer"));
    }

    #[test]
    fn test_prompt_eof_aborts() {
        let mut input = Cursor::new("");
        let mut out = Vec::new();
        assert!(matches!(
            ask_lines(&mut input, &mut out),
            Err(PromptError::Aborted)
        ));
    }

    #[test]
    fn test_audit_command_rejects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = infradraft_core::AuditLog::new("cafe0001");
        let path = log.save(dir.path()).unwrap();
        std::fs::write(&path, "{}").unwrap();
        assert!(cmd_audit(&path, false).is_err());
    }
}
