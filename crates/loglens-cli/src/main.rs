//! loglens - local-first CI/CD failure analysis engine CLI
//!
//! Wires the sanitizer, compressor, extractor, pattern matcher, fix
//! generator, and (optionally) the auto-fixer into a single `analyze`
//! entry point, returning the exit codes documented in the engine's
//! exit-code contract.

mod telemetry;

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};

use loglens_domain::error::LoglensError;
use loglens_domain::EngineConfig;
use loglens_extract::{compress, extract, sanitize};
use loglens_fix::AutoFixer;
use loglens_learn::{FeedbackRecorder, ResponseCache};
use loglens_patterns::{generate_suggestions, match_failures, PatternStore, TemplateStore};

const EXIT_SUCCESS: i32 = 0;
const EXIT_ANALYSIS_FAILURE: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_CANCELLED: i32 = 3;
const EXIT_AUTOFIX_ROLLED_BACK: i32 = 4;
const EXIT_AUTOFIX_ROLLBACK_FAILED: i32 = 5;

#[derive(Parser)]
#[command(name = "loglens")]
#[command(author = "loglens contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local-first CI/CD failure analysis engine", long_about = None)]
struct Cli {
    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sanitize, extract, match, and propose fixes for one CI log.
    Analyze {
        /// Path to the raw (unsanitized) CI log file.
        log_file: PathBuf,

        /// Workflow name, for reporting.
        #[arg(long, default_value = "workflow")]
        workflow: String,

        /// Job name, for reporting.
        #[arg(long, default_value = "job")]
        job: String,

        /// Project root used for context-requirement checks and, when
        /// `--apply` is set, as the root fixes may mutate.
        #[arg(long, default_value = ".")]
        project_root: PathBuf,

        /// Directory holding user-supplied pattern/template JSON files.
        #[arg(long)]
        rules_dir: Option<PathBuf>,

        /// Directory used for learned patterns, snapshots, and caches.
        #[arg(long, default_value = ".loglens")]
        state_dir: PathBuf,

        /// Command names an auto-fix may invoke.
        #[arg(long, value_delimiter = ',', default_value = "pip,pytest")]
        allowed_commands: Vec<String>,

        /// Apply the top auto-applicable fix suggestion, if any.
        #[arg(long)]
        apply: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.json, level);

    let code = match cli.command {
        Commands::Analyze {
            log_file,
            workflow,
            job,
            project_root,
            rules_dir,
            state_dir,
            allowed_commands,
            apply,
        } => {
            run_analyze(AnalyzeArgs {
                log_file,
                workflow,
                job,
                project_root,
                rules_dir,
                state_dir,
                allowed_commands,
                apply,
            })
            .await
        }
    };

    std::process::exit(code);
}

struct AnalyzeArgs {
    log_file: PathBuf,
    workflow: String,
    job: String,
    project_root: PathBuf,
    rules_dir: Option<PathBuf>,
    state_dir: PathBuf,
    allowed_commands: Vec<String>,
    apply: bool,
}

async fn run_analyze(args: AnalyzeArgs) -> i32 {
    let config = EngineConfig::default();

    let raw_log = match std::fs::read_to_string(&args.log_file) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, path = %args.log_file.display(), "failed to read log file");
            return EXIT_CONFIG_ERROR;
        }
    };

    let sanitized = sanitize(&raw_log);
    let compressed = compress(&sanitized, config.token_budget, &config.model_family);
    let compressed = match compressed {
        Ok(c) => c,
        Err(e) => return exit_code_for_error(&e),
    };
    if compressed.truncated {
        warn!("log was truncated to fit the token budget");
    }

    let execution = extract(&compressed.text, &args.workflow, &args.job, config.context_lines as usize);
    let failures = execution.all_failures();
    info!(failures = failures.len(), "extraction complete");

    let learned_store_path = args.state_dir.join("learned_patterns.json");
    let pattern_store = match PatternStore::load(args.rules_dir.as_deref(), Some(&learned_store_path)) {
        Ok(store) => store,
        Err(e) => return exit_code_for_error(&e),
    };

    let known_pattern_ids: HashSet<String> = pattern_store
        .all_enabled(None)
        .into_iter()
        .map(|p| p.id)
        .collect();
    let command_allowlist: HashSet<String> = args.allowed_commands.into_iter().collect();

    let template_store = match TemplateStore::load(args.rules_dir.as_deref(), &known_pattern_ids, &command_allowlist) {
        Ok(store) => store,
        Err(e) => return exit_code_for_error(&e),
    };

    let compiled_patterns: Vec<_> = pattern_store
        .snapshot()
        .data
        .by_id
        .values()
        .filter(|cp| cp.pattern.enabled)
        .cloned()
        .collect();

    let matches = match_failures(&failures, &compiled_patterns, &args.project_root, &compressed.text, config.confidence_threshold);
    info!(matches = matches.len(), "pattern matching complete");

    let mut all_suggestions = Vec::new();
    for m in &matches {
        let suggestions = generate_suggestions(
            m,
            &template_store,
            config.auto_fix_risk_tolerance,
            config.auto_fix_confidence_threshold,
            &command_allowlist,
        );
        all_suggestions.extend(suggestions);
    }

    let cache = ResponseCache::new(config.cache_byte_budget, std::time::Duration::from_secs(config.cache_ttl_secs));
    let cache_key = format!("analyze:{}:{}", args.workflow, args.job);
    let report = serde_json::json!({
        "workflow": args.workflow,
        "job": args.job,
        "failures": failures.len(),
        "matches": matches.len(),
        "suggestions": all_suggestions.len(),
    });
    cache.put(&cache_key, report.clone(), report.to_string().len() as u64);
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());

    if !args.apply {
        return EXIT_SUCCESS;
    }

    let Some(top_suggestion) = all_suggestions
        .iter()
        .filter(|s| s.auto_applicable)
        .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
    else {
        info!("no auto-applicable fix suggestion found");
        return EXIT_SUCCESS;
    };

    let feedback_recorder = FeedbackRecorder::new(
        args.state_dir.join("feedback.jsonl"),
        config.feedback_fsync_batch_size,
        std::time::Duration::from_secs(config.feedback_fsync_interval_secs),
    );
    let _ = feedback_recorder; // constructed here; wired into an interactive feedback flow out of CLI scope.

    let fixer = AutoFixer {
        project_root: args.project_root.clone(),
        cache_root: args.state_dir.clone(),
        command_timeout: std::time::Duration::from_secs(config.command_timeout_secs),
        lock_retry_window: std::time::Duration::from_secs(config.lock_retry_window_secs),
        command_allowlist,
    };

    match fixer.apply(top_suggestion, true).await {
        Ok(result) if result.success => {
            info!(suggestion_id = %top_suggestion.id, "fix applied successfully");
            EXIT_SUCCESS
        }
        Ok(result) if result.rollback_available => {
            warn!(suggestion_id = %top_suggestion.id, "fix failed, rollback succeeded");
            EXIT_AUTOFIX_ROLLED_BACK
        }
        Ok(_) => {
            error!(suggestion_id = %top_suggestion.id, "fix failed and rollback did not fully succeed");
            EXIT_AUTOFIX_ROLLBACK_FAILED
        }
        Err(e) => exit_code_for_error(&e),
    }
}

fn exit_code_for_error(err: &LoglensError) -> i32 {
    match err {
        LoglensError::Config { .. } => EXIT_CONFIG_ERROR,
        LoglensError::Cancelled => EXIT_CANCELLED,
        LoglensError::RollbackFailed { .. } => EXIT_AUTOFIX_ROLLBACK_FAILED,
        _ => {
            error!(error = %err, kind = %err.kind(), "analysis failed");
            EXIT_ANALYSIS_FAILURE
        }
    }
}
