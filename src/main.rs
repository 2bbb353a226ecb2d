use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "jardiff", about = "Incremental JAR/ZIP diff creator and merger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a diff archive by comparing old and new archive versions
    Create {
        /// Path to the old (cached) archive
        #[arg(long)]
        old: PathBuf,
        /// Path to the new (target) archive
        #[arg(long)]
        new: PathBuf,
        /// Output path for the diff archive
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Merge one diff archive onto a base archive
    Merge {
        /// Path to the base archive
        #[arg(long)]
        base: PathBuf,
        /// Path to the diff archive
        #[arg(long)]
        diff: PathBuf,
        /// Output path for the merged archive
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Apply an ordered sequence of diffs to reach a target version
    Chain {
        /// Path to the base archive
        #[arg(long)]
        base: PathBuf,
        /// Diff archives, in order (repeatable)
        #[arg(long = "diff", required = true)]
        diffs: Vec<PathBuf>,
        /// Scratch directory for intermediate archives
        #[arg(long)]
        scratch: PathBuf,
        /// Where to place the final archive (defaults to the last intermediate)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Create { old, new, output } => {
            println!("Creating diff...");
            println!("  Old: {}", old.display());
            println!("  New: {}", new.display());
            println!("  Output: {}", output.display());

            let start = Instant::now();
            let stats = jardiff::create_diff(&old, &new, &output)?;
            let elapsed = start.elapsed();

            println!("\nDiff created successfully!");
            println!("  Entries added: {}", stats.added);
            println!("  Entries changed: {}", stats.changed);
            println!("  Entries moved: {}", stats.moved);
            println!("  Entries removed: {}", stats.removed);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Merge { base, diff, output } => {
            println!("Merging diff...");
            println!("  Base: {}", base.display());
            println!("  Diff: {}", diff.display());
            println!("  Output: {}", output.display());

            let start = Instant::now();
            let stats = jardiff::merge_files(&base, &diff, &output)?;
            let elapsed = start.elapsed();

            println!("\nMerge finished successfully!");
            println!("  Entries copied from diff: {}", stats.copied_from_diff);
            println!("  Entries moved: {}", stats.moved);
            println!("  Entries copied from base: {}", stats.copied_from_base);
            println!("  Entries removed: {}", stats.removed);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Chain {
            base,
            diffs,
            scratch,
            output,
        } => {
            println!("Applying chain of {} diff(s)...", diffs.len());
            println!("  Base: {}", base.display());
            println!("  Scratch: {}", scratch.display());

            let start = Instant::now();
            let final_path = jardiff::apply_chain(&base, &diffs, &scratch)?;
            let elapsed = start.elapsed();

            let final_path = match output {
                Some(output) => {
                    std::fs::copy(&final_path, &output)?;
                    if final_path != base {
                        let _ = std::fs::remove_file(&final_path);
                    }
                    output
                }
                None => final_path,
            };

            println!("\nChain applied successfully!");
            println!("  Final archive: {}", final_path.display());
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
    }

    Ok(())
}
