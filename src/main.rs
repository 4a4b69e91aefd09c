use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::path::{Path, PathBuf};
use textpatch::applier::{FileOutcome, PatchError};
use textpatch::config::{
    apply_manifests, load_from_path, restore_manifest, BatchOptions, BatchReport, BatchSummary,
    PatchManifest, RestoreResult,
};
use textpatch::diff::render_diff;
use textpatch::storage::FsStorage;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "textpatch")]
#[command(about = "Declarative literal/regex patching for front-end source trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch manifests to a workspace
    Apply {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific manifest to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Keep a copy of each file's pre-patch content next to it
        #[arg(short, long)]
        backup: bool,

        /// Print a JSON report instead of progress lines
        #[arg(long)]
        json: bool,

        /// Exit non-zero when any target is missing or fails
        #[arg(long)]
        strict: bool,
    },

    /// Check which targets would change, without writing
    Status {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific manifest to check (otherwise checks all in patches/)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// List manifests, their targets and rule counts
    List {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific manifest to list (otherwise lists all in patches/)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },

    /// Restore files from backups written by `apply --backup`
    Restore {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific manifest whose targets to restore
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply {
            workspace,
            manifest,
            dry_run,
            diff,
            backup,
            json,
            strict,
        } => cmd_apply(
            workspace,
            manifest,
            BatchOptions { dry_run, backup },
            diff,
            json,
            strict,
        ),

        Commands::Status {
            workspace,
            manifest,
        } => cmd_status(workspace, manifest),

        Commands::List {
            workspace,
            manifest,
        } => cmd_list(workspace, manifest),

        Commands::Restore {
            workspace,
            manifest,
        } => cmd_restore(workspace, manifest),
    }
}

/// Logs go to stderr so stdout stays the report.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Helper: Discover all .toml manifests in a patches/ directory.
///
/// Discovery order:
/// 1. `<workspace>/patches` (manifests kept alongside the target).
/// 2. `./patches` relative to the current working directory.
fn discover_manifests(workspace: &Path) -> Result<Vec<PathBuf>> {
    let cwd_patches_dir = env::current_dir().ok().map(|cwd| cwd.join("patches"));
    let workspace_patches_dir = workspace.join("patches");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(workspace_patches_dir)
        .chain(cwd_patches_dir)
        .collect();

    for patches_dir in candidate_dirs {
        if !patches_dir.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml manifests found in either ./patches or {}/patches",
        workspace.display()
    )
}

fn manifest_files(workspace: &Path, manifest: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    match manifest {
        Some(path) => Ok(vec![path]),
        None => discover_manifests(workspace),
    }
}

/// Resolve workspace path
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. TEXTPATCH_WORKSPACE environment variable
/// 3. Nearest ancestor of the current directory with a package.json
/// 4. The current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return Ok(path.canonicalize()?);
    }

    if let Ok(env_path) = env::var("TEXTPATCH_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.is_dir() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: TEXTPATCH_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    let current = env::current_dir()?.canonicalize()?;
    if let Some(path) = current
        .ancestors()
        .find(|ancestor| ancestor.join("package.json").is_file())
    {
        if path != current {
            eprintln!(
                "{}",
                format!("Auto-detected workspace: {}", path.display()).dimmed()
            );
        }
        return Ok(path.to_path_buf());
    }

    Ok(current)
}

fn display_path<'a>(workspace: &Path, path: &'a Path) -> std::borrow::Cow<'a, str> {
    match path.strip_prefix(workspace) {
        Ok(relative) => relative.to_string_lossy(),
        Err(_) => path.to_string_lossy(),
    }
}

fn print_report(workspace: &Path, report: &BatchReport, show_diff: bool) {
    for entry in &report.entries {
        let shown = entry
            .path
            .as_deref()
            .map(|p| display_path(workspace, p).into_owned())
            .unwrap_or_else(|| entry.target.clone());

        match &entry.result {
            Ok(FileOutcome::Changed {
                file,
                hits,
                original,
                patched,
                persisted,
                backup,
            }) => {
                if *persisted {
                    println!("{} Fixed {}", "✓".green(), shown);
                } else {
                    println!("{} Would fix {}", "✓".green(), shown);
                }
                if let Some(backup) = backup {
                    println!("  {}", format!("backup: {}", backup.display()).dimmed());
                }
                print_hits(hits);
                if show_diff {
                    print!("{}", render_diff(file, original, patched));
                }
            }
            Ok(FileOutcome::Unchanged { hits, .. }) => {
                println!("{} No changes needed: {}", "⊙".yellow(), shown);
                print_hits(hits);
            }
            Err(PatchError::NotFound { .. }) => {
                println!("{} File not found: {}", "✗".red(), shown);
            }
            Err(e) => {
                println!("{} Error processing {}: {}", "✗".red(), shown, e);
            }
        }
    }
}

/// Per-rule match counts, shown only at -v and above.
fn print_hits(hits: &[usize]) {
    if !tracing::enabled!(tracing::Level::INFO) || hits.is_empty() {
        return;
    }
    let rendered: Vec<String> = hits.iter().map(usize::to_string).collect();
    println!("  {}", format!("rule matches: [{}]", rendered.join(", ")).dimmed());
}

fn print_summary(summary: &BatchSummary, dry_run: bool) {
    println!("{}", "Summary:".bold());
    if dry_run {
        println!("  {} would be fixed", format!("{}", summary.changed).green());
    } else {
        println!("  {} fixed", format!("{}", summary.changed).green());
    }
    println!(
        "  {} no changes needed",
        format!("{}", summary.unchanged).yellow()
    );
    println!("  {} not found", format!("{}", summary.missing).red());
    println!("  {} failed", format!("{}", summary.failed).red());
}

fn load_all(files: &[PathBuf]) -> Result<Vec<(PathBuf, PatchManifest)>> {
    files
        .iter()
        .map(|file| Ok((file.clone(), load_from_path(file)?)))
        .collect()
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    manifest: Option<PathBuf>,
    options: BatchOptions,
    show_diff: bool,
    json: bool,
    strict: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let manifests = load_all(&manifest_files(&workspace, manifest)?)?;

    if !json {
        println!("Workspace: {}", workspace.display());
        println!();
    }

    let mut storage = FsStorage;
    let mut total = BatchSummary::default();
    let mut json_reports = Vec::new();

    let reports = apply_manifests(
        &mut storage,
        &workspace,
        manifests.iter().map(|(_, manifest)| manifest),
        options,
    );

    for ((path, _), report) in manifests.iter().zip(&reports) {
        total.merge(report.summary());

        if json {
            json_reports.push(report.to_json_report());
            continue;
        }

        println!("Applying {}...", path.display());
        if options.dry_run {
            println!("{}", "  [DRY RUN - no files will be written]".cyan());
        }
        print_report(&workspace, report, show_diff || options.dry_run);
        println!();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&json_reports)?);
    } else {
        print_summary(&total, options.dry_run);
    }

    if strict && total.has_problems() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(workspace: Option<PathBuf>, manifest: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let manifests = load_all(&manifest_files(&workspace, manifest)?)?;

    println!("{}", "Patch Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let mut pending = Vec::new();
    let mut done = Vec::new();
    let mut problems = Vec::new();

    let mut storage = FsStorage;
    let reports = apply_manifests(
        &mut storage,
        &workspace,
        manifests.iter().map(|(_, manifest)| manifest),
        BatchOptions {
            dry_run: true,
            backup: false,
        },
    );
    for report in reports {
        for entry in report.entries {
            let shown = entry
                .path
                .as_deref()
                .map(|p| display_path(&workspace, p).into_owned())
                .unwrap_or_else(|| entry.target.clone());
            match entry.result {
                Ok(FileOutcome::Changed { hits, .. }) => pending.push((shown, hits)),
                Ok(FileOutcome::Unchanged { hits, .. }) => done.push((shown, hits)),
                Err(e) => problems.push((shown, e.to_string())),
            }
        }
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} files)",
            "⊙".yellow(),
            "NEEDS PATCHING".yellow().bold(),
            pending.len()
        );
        for (file, hits) in &pending {
            println!("  - {} {}", file, format!("(rule matches: {:?})", hits).dimmed());
        }
        println!();
    }

    if !done.is_empty() {
        println!(
            "{} {} ({} files)",
            "✓".green(),
            "NO CHANGES NEEDED".green().bold(),
            done.len()
        );
        for (file, hits) in &done {
            println!("  - {} {}", file, format!("(rule matches: {:?})", hits).dimmed());
        }
        println!();
    }

    if !problems.is_empty() {
        println!(
            "{} {} ({} files)",
            "✗".red(),
            "PROBLEMS".red().bold(),
            problems.len()
        );
        for (file, reason) in &problems {
            println!("  - {} ({})", file, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_list(workspace: Option<PathBuf>, manifest: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let manifests = load_all(&manifest_files(&workspace, manifest)?)?;

    for (path, manifest) in &manifests {
        let name = if manifest.meta.name.is_empty() {
            path.display().to_string()
        } else {
            manifest.meta.name.clone()
        };
        println!("{} {}", name.bold(), format!("({})", path.display()).dimmed());
        if let Some(description) = &manifest.meta.description {
            println!("  {}", description);
        }
        for target in &manifest.targets {
            let kinds: Vec<String> = target.rules.iter().map(|r| r.kind.to_string()).collect();
            println!(
                "  - {} {}",
                target.file,
                format!("[{} rules: {}]", target.rules.len(), kinds.join(", ")).dimmed()
            );
        }
        println!();
    }

    Ok(())
}

fn cmd_restore(workspace: Option<PathBuf>, manifest: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let manifests = load_all(&manifest_files(&workspace, manifest)?)?;

    let mut restored = 0;
    let mut failed = 0;

    let mut storage = FsStorage;
    for (_, manifest) in &manifests {
        for result in restore_manifest(&mut storage, &workspace, manifest) {
            match result {
                RestoreResult::Restored { file, .. } => {
                    println!(
                        "{} Restored {}",
                        "✓".green(),
                        display_path(&workspace, &file)
                    );
                    restored += 1;
                }
                RestoreResult::NoBackup { .. } => {}
                RestoreResult::Failed { target, error } => {
                    println!("{} Error restoring {}: {}", "✗".red(), target, error);
                    failed += 1;
                }
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} restored", format!("{}", restored).green());
    println!("  {} failed", format!("{}", failed).red());

    Ok(())
}
