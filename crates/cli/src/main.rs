use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use gleaner_core::config::ProjectConfig;
use gleaner_core::export::{render, schema_sql, write_file};
use gleaner_core::{
    BatchConfig, Cancellation, DetectConfig, Document, Element, FetchConfig, OutputFormat, Source, SynthesisConfig,
    derive_schema, detect_list_with_config, detect_table_with_config, extract_html, fetch_url, probe_tree, run_batch,
    synthesize_with_config,
};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

mod echo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build extraction rules from picked elements and run them over HTML pages
#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(version)]
#[command(about = "Point-and-click HTML extraction from the command line", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generate shell completion script
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a project against its targets
    Run {
        /// Project configuration (YAML, or JSON by extension)
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Run against this HTML (file or "-") instead of fetching the targets
        #[arg(long, value_name = "INPUT")]
        html: Option<String>,

        /// Output format (json, jsonl, sql); defaults to the project's format
        #[arg(short, long, value_name = "FORMAT")]
        format: Option<OutputFormat>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE", conflicts_with = "save")]
        output: Option<PathBuf>,

        /// Write to the project's output directory
        #[arg(long)]
        save: bool,

        /// Concurrent fetch workers; defaults to the project's setting
        #[arg(short, long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Execute a project's rules on one document and print the record as JSON
    Extract {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// URL to fetch, local HTML file, or "-" for stdin
        #[arg(value_name = "INPUT")]
        input: String,

        /// Print the record on a single line
        #[arg(long)]
        compact: bool,
    },

    /// Synthesize selectors for the first element a CSS query locates
    Select {
        /// URL to fetch, local HTML file, or "-" for stdin
        #[arg(value_name = "INPUT")]
        input: String,

        /// CSS query locating the element
        #[arg(value_name = "CSS")]
        css: String,

        /// Number of candidates to print
        #[arg(short = 'n', long, default_value = "3", value_name = "N")]
        candidates: usize,
    },

    /// Detect the repeating list around an element and print the rule as YAML
    DetectList {
        #[arg(value_name = "INPUT")]
        input: String,

        /// CSS query locating the seed element
        #[arg(value_name = "CSS")]
        css: String,

        /// Only take the run of siblings containing the seed
        #[arg(long)]
        contiguous: bool,

        /// Ancestor levels to climb looking for repetition
        #[arg(long, default_value = "0", value_name = "N")]
        max_climb: usize,

        /// Name of the generated list rule
        #[arg(long, default_value = "items")]
        name: String,
    },

    /// Detect the table around a cell and print the rule as YAML
    DetectTable {
        #[arg(value_name = "INPUT")]
        input: String,

        /// CSS query locating a cell
        #[arg(value_name = "CSS")]
        css: String,

        /// Name of the generated list rule
        #[arg(long, default_value = "table_data")]
        name: String,
    },

    /// Probe every rule's selector against a document
    Test {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        #[arg(value_name = "INPUT")]
        input: String,

        /// Print probe results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print SQL DDL for a project's tables
    Schema {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("gleaner=debug,gleaner_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn load_project(path: &Path) -> anyhow::Result<ProjectConfig> {
    ProjectConfig::load(path).with_context(|| format!("Failed to load project: {}", path.display()))
}

/// Reads a file or stdin, or fetches a URL.
async fn load_input(input: &str, fetch: &FetchConfig) -> anyhow::Result<String> {
    let source = Source::from_input(input);
    if let Some(local) = source.load_local() {
        return local.with_context(|| format!("Failed to read input: {}", source.label()));
    }

    fetch_url(input, fetch).await.with_context(|| format!("Failed to fetch URL: {}", input))
}

fn locate<'a>(doc: &'a Document, css: &str) -> anyhow::Result<Element<'a>> {
    doc.select_first(css)
        .with_context(|| format!("Invalid CSS query: {}", css))?
        .with_context(|| format!("No element matches {}", css))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "gleaner", &mut io::stdout());
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        bail!("No command given");
    };

    if cli.verbose {
        echo::print_banner();
        echo::print_info("Debug logging enabled");
        eprintln!();
    }

    match command {
        Commands::Run { config, html, format, output, save, jobs } => {
            cmd_run(cli.verbose, &config, html, format, output, save, jobs).await
        }
        Commands::Extract { config, input, compact } => cmd_extract(cli.verbose, &config, &input, compact).await,
        Commands::Select { input, css, candidates } => cmd_select(&input, &css, candidates).await,
        Commands::DetectList { input, css, contiguous, max_climb, name } => {
            let config =
                DetectConfig::default().with_contiguous_only(contiguous).with_max_climb(max_climb).with_list_name(name);
            cmd_detect_list(&input, &css, &config).await
        }
        Commands::DetectTable { input, css, name } => {
            cmd_detect_table(&input, &css, &DetectConfig::default().with_table_name(name)).await
        }
        Commands::Test { config, input, json } => cmd_test(&config, &input, json).await,
        Commands::Schema { config } => {
            let project = load_project(&config)?;
            let schema = derive_schema(&project.rules).context("Failed to derive schema")?;
            print!("{}", schema_sql(&schema));
            Ok(())
        }
    }
}

async fn cmd_run(
    verbose: bool, config: &Path, html: Option<String>, format: Option<OutputFormat>, output: Option<PathBuf>,
    save: bool, jobs: Option<usize>,
) -> anyhow::Result<()> {
    let started = Instant::now();

    if verbose {
        echo::print_step(1, 3, &format!("Loading project {}", config.display().bright_white()));
    }
    let mut project = load_project(config)?;
    if let Some(format) = format {
        project.output.format = format;
    }
    let format = project.output.format;

    let mut batch = BatchConfig::from(&project.fetch);
    if let Some(jobs) = jobs {
        batch = batch.with_concurrency(jobs);
    }

    let sources = match html {
        Some(input) => {
            let html = load_input(&input, &batch.fetch).await?;
            if verbose {
                echo::print_field("Override", format!("{} ({})", input, echo::format_size(html.len())));
            }
            vec![Source::Html(html)]
        }
        None if project.targets.is_empty() => {
            bail!("Project '{}' has no targets; pass --html to run against a local document", project.name)
        }
        None => project.targets.iter().cloned().map(Source::Url).collect(),
    };

    if verbose {
        echo::print_field("Project", &project.name);
        echo::print_field("Documents", sources.len());
        echo::print_field("Workers", batch.concurrency);
        eprintln!();
        echo::print_step(2, 3, "Extracting");
    }

    let cancellation = Cancellation::new();
    let token = cancellation.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            echo::print_warning("Interrupted, finishing documents already in progress");
            cancellation.cancel();
        }
    });

    let report = run_batch(&project.rules, sources, &batch, token).await.context("Failed to run project")?;
    echo::print_failures(&report.failures);

    if verbose {
        echo::print_run_summary(&report, started.elapsed());
    }
    if report.succeeded == 0 {
        bail!("No document could be extracted");
    }

    let destination = if save { Some(project.output_path()) } else { output };
    if verbose {
        echo::print_step(3, 3, &format!("Writing {}", format));
    }

    match destination {
        Some(path) => {
            write_file(&path, &report.tables, format)
                .with_context(|| format!("Failed to write to file: {}", path.display()))?;
            echo::print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => print!("{}", render(&report.tables, format).context("Failed to render output")?),
    }

    if report.cancelled {
        bail!("Run cancelled after {} of {} documents", report.succeeded, report.total());
    }

    Ok(())
}

async fn cmd_extract(verbose: bool, config: &Path, input: &str, compact: bool) -> anyhow::Result<()> {
    let project = load_project(config)?;

    if verbose {
        echo::print_step(1, 2, &format!("Reading {}", input.bright_white()));
    }
    let html = load_input(input, &project.fetch.to_fetch_config()).await?;

    if verbose {
        echo::print_field("Size", echo::format_size(html.len()));
        echo::print_step(2, 2, &format!("Executing {} rules", project.rules.len()));
    }
    let record = extract_html(&html, &project.rules).context("Failed to extract record")?;

    println!("{}", record.to_json_string(!compact)?);
    Ok(())
}

async fn cmd_select(input: &str, css: &str, candidates: usize) -> anyhow::Result<()> {
    let html = load_input(input, &FetchConfig::default()).await?;
    let doc = Document::parse(&html).context("Failed to parse HTML")?;
    let target = locate(&doc, css)?;

    let config = SynthesisConfig::default().with_max_candidates(candidates);
    let synthesized = synthesize_with_config(&doc, target, &config);
    if synthesized.iter().all(|c| c.is_low_robustness()) {
        echo::print_warning("Only a positional path resolves; it breaks when sibling order changes");
    }

    for candidate in &synthesized {
        println!(
            "{}\t{}\t{}",
            candidate.selector,
            format!("{:?}", candidate.strategy).to_lowercase(),
            format!("{:?}", candidate.robustness).to_lowercase()
        );
    }
    Ok(())
}

async fn cmd_detect_list(input: &str, css: &str, config: &DetectConfig) -> anyhow::Result<()> {
    let html = load_input(input, &FetchConfig::default()).await?;
    let doc = Document::parse(&html).context("Failed to parse HTML")?;
    let seed = locate(&doc, css)?;

    let detection = detect_list_with_config(&doc, seed, config).context("Failed to detect list")?;
    echo::print_list_details(&detection);

    print!("{}", serde_yaml_ng::to_string(&detection.rule)?);
    Ok(())
}

async fn cmd_detect_table(input: &str, css: &str, config: &DetectConfig) -> anyhow::Result<()> {
    let html = load_input(input, &FetchConfig::default()).await?;
    let doc = Document::parse(&html).context("Failed to parse HTML")?;
    let seed = locate(&doc, css)?;

    let detection = detect_table_with_config(&doc, seed, config).context("Failed to detect table")?;
    echo::print_table_details(&detection);

    print!("{}", serde_yaml_ng::to_string(&detection.rule)?);
    Ok(())
}

async fn cmd_test(config: &Path, input: &str, json: bool) -> anyhow::Result<()> {
    let project = load_project(config)?;
    let html = load_input(input, &project.fetch.to_fetch_config()).await?;
    let doc = Document::parse(&html).context("Failed to parse HTML")?;

    let probes = probe_tree(&doc, &project.rules);
    if json {
        println!("{}", serde_json::to_string_pretty(&probes)?);
    } else {
        for probe in &probes {
            println!("{}", echo::format_probe(probe));
        }
    }

    let failing = probes.iter().filter(|p| !p.is_success()).count();
    if failing == 0 {
        echo::print_success(&format!("All {} selectors matched", probes.len()));
    } else {
        echo::print_warning(&format!("{} of {} selectors matched nothing", failing, probes.len()));
    }
    Ok(())
}
