//! Stagehand - run workspace transition scripts
//!
//! Usage: `stagehand [--config <path>] [--project <dir>] <step>...`
//!
//! Steps are `preload:<id>`, `load:<id>`, `add:<id>`, `switch:<id>`,
//! `switch-nowait:<id>`, `revertable:<id>`, `revert`, `commit` and `reload`.
//! `--print-config` prints a sample `.stagehand.toml` and exits.

use anyhow::{bail, Context};
use stagehand::{init_tracing, resolve_config, Session, Step};
use stagehand_core::config::sample_config;
use std::path::PathBuf;

/// Command-line arguments
struct Args {
    /// Explicit config file
    config: Option<PathBuf>,
    /// Project directory searched for `.stagehand.toml`
    project: Option<PathBuf>,
    /// Print the sample config instead of running
    print_config: bool,
    /// Raw step arguments
    steps: Vec<String>,
}

impl Args {
    /// Parse command-line arguments
    fn parse() -> anyhow::Result<Self> {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut project = None;
        let mut print_config = false;
        let mut steps = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = Some(PathBuf::from(args.next().context("--config needs a path")?));
                }
                "--project" | "-p" => {
                    project = Some(PathBuf::from(args.next().context("--project needs a directory")?));
                }
                "--print-config" => print_config = true,
                _ if arg.starts_with('-') => bail!("unknown flag: {}", arg),
                _ => steps.push(arg),
            }
        }

        Ok(Self {
            config,
            project,
            print_config,
            steps,
        })
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse()?;

    if args.print_config {
        print!("{}", sample_config());
        return Ok(());
    }

    let steps = Step::parse_all(&args.steps)?;
    if steps.is_empty() {
        bail!("no steps given, e.g. `stagehand add:Title preload:Level1 switch:Level1`");
    }

    let project = match args.project {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = resolve_config(args.config.as_deref(), &project).context("Failed to load config")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(async move {
        let mut session = Session::new(&config).with_progress(true);

        for step in &steps {
            println!("{}", step);
            session
                .run(step)
                .await
                .with_context(|| format!("step {} failed", step))?;
            for event in session.drain_events() {
                println!("  {} {:<24} {}", event.transition, event.target, event.phase);
            }
        }

        session.settle().await;
        for event in session.drain_events() {
            println!("  {} {:<24} {}", event.transition, event.target, event.phase);
        }
        println!("{}", session.summary());
        Ok::<_, anyhow::Error>(())
    })
}
