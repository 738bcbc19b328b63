use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use text_patcher::config::{discover_rule_files, load_from_path, RuleSet};
use text_patcher::{
    run, DocumentStore, FileStore, MatchPolicy, MemoryStore, RuleOutcome, RunError, RunMode,
    RunSummary,
};
use tracing_subscriber::EnvFilter;

const ROOT_ENV: &str = "TEXT_PATCHER_ROOT";

#[derive(Parser)]
#[command(name = "text-patcher")]
#[command(about = "Apply ordered find/replace rules to generated source files", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply rule files to their target files
    Apply {
        /// Rule file, or directory of rule files applied in name order
        #[arg(short, long)]
        rules: PathBuf,

        /// Target file (overrides `meta.target` in every rule file)
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Directory that relative `meta.target` paths resolve against
        #[arg(long)]
        root: Option<PathBuf>,

        /// Policy for rules that do not set `on_missing`
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check whether every rule would apply cleanly, without writing
    Check {
        /// Rule file, or directory of rule files applied in name order
        #[arg(short, long)]
        rules: PathBuf,

        /// Target file (overrides `meta.target` in every rule file)
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Directory that relative `meta.target` paths resolve against
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// List rule files, their targets and rules
    List {
        /// Rule file, or directory of rule files
        #[arg(short, long)]
        rules: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Strict,
    WarnAndSkip,
    SilentSkip,
}

impl From<PolicyArg> for MatchPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Strict => MatchPolicy::Strict,
            PolicyArg::WarnAndSkip => MatchPolicy::WarnAndSkip,
            PolicyArg::SilentSkip => MatchPolicy::SilentSkip,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply {
            rules,
            target,
            root,
            policy,
            dry_run,
            diff,
            format,
        } => cmd_apply(
            &rules,
            target,
            root,
            policy.map(Into::into),
            dry_run,
            diff,
            format,
        ),

        Commands::Check {
            rules,
            target,
            root,
        } => cmd_check(&rules, target, root),

        Commands::List { rules } => cmd_list(&rules),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve the directory relative targets are joined onto.
///
/// Priority order:
/// 1. Explicit --root flag
/// 2. TEXT_PATCHER_ROOT environment variable
/// 3. Current directory
fn resolve_root(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_root {
        return Ok(path);
    }

    if let Ok(env_path) = env::var(ROOT_ENV) {
        let path = PathBuf::from(&env_path);
        if path.is_dir() {
            return Ok(path);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: {} is set but is not a directory: {}",
                ROOT_ENV, env_path
            )
            .yellow()
        );
    }

    env::current_dir().context("could not determine current directory")
}

/// `--target` is used as given; `meta.target` resolves against the root.
fn resolve_target(
    root: &Path,
    cli_target: Option<&Path>,
    rule_set: &RuleSet,
    rule_file: &Path,
) -> Result<PathBuf> {
    if let Some(target) = cli_target {
        return Ok(target.to_path_buf());
    }

    let Some(target) = rule_set.meta.target.as_deref() else {
        anyhow::bail!(
            "{} does not name a target; pass --target",
            rule_file.display()
        );
    };

    let target = PathBuf::from(target);
    if target.is_absolute() {
        Ok(target)
    } else {
        Ok(root.join(target))
    }
}

/// Documents staged in memory so dry runs see the output of earlier rule files.
#[derive(Default)]
struct Staging {
    stores: HashMap<PathBuf, MemoryStore>,
}

impl Staging {
    fn run(
        &mut self,
        target: &Path,
        rule_set: &RuleSet,
        policy: Option<MatchPolicy>,
        dry_run: bool,
    ) -> Result<RunSummary, RunError> {
        let patcher = rule_set.patcher(policy);

        if !dry_run {
            return run(&mut FileStore::new(target), &patcher, RunMode::Write);
        }

        let store = match self.stores.entry(target.to_path_buf()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let document = FileStore::new(target).load()?;
                entry.insert(MemoryStore::new(document.into_string()))
            }
        };
        run(store, &patcher, RunMode::Write)
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_outcomes(summary: &RunSummary, dry_run: bool) {
    for rule in &summary.report.rules {
        match &rule.outcome {
            RuleOutcome::Applied => {
                let verb = if dry_run { "Would apply" } else { "Applied" };
                println!("{} {}: {} ({})", "✓".green(), rule.id, verb, rule.kind);
            }
            RuleOutcome::AlreadyApplied => {
                println!("{} {}: Already applied", "⊙".yellow(), rule.id);
            }
            RuleOutcome::Skipped { reason } => {
                println!("{} {}: Skipped ({})", "⊘".cyan(), rule.id, reason);
            }
        }
    }

    if summary.report.is_unchanged() {
        println!("{}", "  Document unchanged".dimmed());
    }
}

fn cmd_apply(
    rules: &Path,
    target: Option<PathBuf>,
    root: Option<PathBuf>,
    policy: Option<MatchPolicy>,
    dry_run: bool,
    show_diff: bool,
    format: Format,
) -> Result<()> {
    let root = resolve_root(root)?;
    let rule_files = discover_rule_files(rules)?;
    let text = format == Format::Text;

    let mut staging = Staging::default();
    let mut json_results = Vec::new();
    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_skipped = 0;
    let mut failed = false;

    if text && dry_run {
        println!("{}", "[DRY RUN - no files will be modified]".cyan());
    }

    for rule_file in rule_files {
        let rule_set = load_from_path(&rule_file)?;
        let target_path = resolve_target(&root, target.as_deref(), &rule_set, &rule_file)?;

        if text {
            println!(
                "Applying {} to {}...",
                rule_file.display(),
                target_path.display()
            );
        }

        match staging.run(&target_path, &rule_set, policy, dry_run) {
            Ok(summary) => {
                total_applied += summary.report.count(|o| *o == RuleOutcome::Applied);
                total_already_applied +=
                    summary.report.count(|o| *o == RuleOutcome::AlreadyApplied);
                total_skipped += summary
                    .report
                    .count(|o| matches!(o, RuleOutcome::Skipped { .. }));

                if text {
                    print_outcomes(&summary, dry_run);
                    if show_diff && !summary.report.is_unchanged() {
                        display_diff(
                            &target_path,
                            summary.original.as_str(),
                            summary.report.document.as_str(),
                        );
                    }
                    println!();
                } else {
                    json_results.push(json!({
                        "rules_file": rule_file,
                        "target": target_path,
                        "written": summary.written && !dry_run,
                        "unchanged": summary.report.is_unchanged(),
                        "report": summary.report,
                    }));
                }
            }
            Err(e) => {
                failed = true;
                if text {
                    eprintln!("{} {}", "✗".red(), e.to_string().red());
                    eprintln!("  File: {}", target_path.display());
                    eprintln!("  {}", "Target left unmodified; later rule files not run".red());
                } else {
                    json_results.push(json!({
                        "rules_file": rule_file,
                        "target": target_path,
                        "error": e.to_string(),
                    }));
                }
                // Later rule files assume this one succeeded.
                break;
            }
        }
    }

    if text {
        println!("{}", "Summary:".bold());
        println!("  {} applied", format!("{}", total_applied).green());
        println!(
            "  {} already applied",
            format!("{}", total_already_applied).yellow()
        );
        println!("  {} skipped", format!("{}", total_skipped).cyan());
        if failed {
            println!("  {}", "1 failed".red());
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(rules: &Path, target: Option<PathBuf>, root: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(root)?;
    let rule_files = discover_rule_files(rules)?;

    println!("{}", "Checking rules...".bold());

    let mut staging = Staging::default();
    let mut clean = 0;
    let mut problems = 0;

    for rule_file in rule_files {
        let rule_set = load_from_path(&rule_file)?;
        let target_path = resolve_target(&root, target.as_deref(), &rule_set, &rule_file)?;
        println!("{} -> {}", rule_file.display(), target_path.display());

        match staging.run(&target_path, &rule_set, None, true) {
            Ok(summary) => {
                for rule in &summary.report.rules {
                    match &rule.outcome {
                        RuleOutcome::Applied => {
                            println!("{} {}: Would apply", "✓".green(), rule.id);
                            clean += 1;
                        }
                        RuleOutcome::AlreadyApplied => {
                            println!("{} {}: Already applied", "⊙".yellow(), rule.id);
                            clean += 1;
                        }
                        RuleOutcome::Skipped { reason } => {
                            eprintln!("{} {}: NO MATCH", "✗".red(), rule.id);
                            eprintln!("  {}", reason);
                            problems += 1;
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                problems += 1;
                break;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} ok", format!("{}", clean).green());
    println!("  {} problems", format!("{}", problems).red());

    if problems > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(rules: &Path) -> Result<()> {
    for rule_file in discover_rule_files(rules)? {
        let rule_set = load_from_path(&rule_file)?;
        let name = if rule_set.meta.name.is_empty() {
            rule_file.display().to_string()
        } else {
            rule_set.meta.name.clone()
        };

        println!("{} {}", name.bold(), format!("({})", rule_file.display()).dimmed());
        if let Some(description) = &rule_set.meta.description {
            println!("  {}", description);
        }
        println!(
            "  target: {}",
            rule_set.meta.target.as_deref().unwrap_or("<none>")
        );

        let patcher = rule_set.patcher(None);
        for rule in patcher.rules() {
            let policy = rule.on_missing.map(|p| format!(" [{:?}]", p)).unwrap_or_default();
            println!("  - {} ({}){}", rule.id, rule.rule.kind(), policy.dimmed());
        }
        println!();
    }

    Ok(())
}
