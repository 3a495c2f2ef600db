use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::Write;
use std::path::{Path, PathBuf};
use toram_core::assembler::{Assembler, AssemblerOptions, Listing};
use toram_core::browse::{Facets, ItemQuery, SortKey, SortOrder, paginate};
use toram_core::config::BrowserConfig;
use toram_core::database::open_store;
use toram_core::export::{write_csv, write_json};
use toram_core::models::CompleteView;
use toram_core::statting::{self, EquipmentKind, Formula, SimulationSummary};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "toram.toml";

#[derive(Parser)]
#[command(
    name = "toram",
    version = "0.1.0",
    about = "CLI tool for browsing the Toram item database",
    long_about = None
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true, env = "TORAM_DATABASE")]
    database: Option<PathBuf>,

    /// Path to TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write plain-text logs to this file
    #[arg(long, global = true, env = "TORAM_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Verbosity level (repeat for more verbose output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Fail on the first unreadable table instead of skipping it
    #[arg(long, global = true, default_value_t = false)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every table with its detected layout
    Tables {
        /// Also print column names
        #[arg(long, default_value_t = false)]
        columns: bool,
    },

    /// Browse equipment from every recognised table
    Equipment(ListArgs),

    /// Browse the crystal table
    Crystals(ListArgs),

    /// Report tables that were skipped or only partially mapped
    Audit,

    /// Statting estimates
    Statting {
        #[command(subcommand)]
        action: StattingAction,
    },
}

#[derive(Subcommand)]
enum StattingAction {
    /// Estimate the success rate of a formula and simulate attempts
    Simulate(SimulateArgs),

    /// Suggest target stats for a class and equipment kind
    Plan {
        /// Character class (Swordman, Mage, Archer, ...)
        #[arg(long)]
        class: String,

        /// weapon, armor or accessory
        #[arg(long)]
        kind: EquipmentKind,

        /// Equipment level
        #[arg(long, default_value_t = 1)]
        level: u32,

        /// Also list recipe suggestions
        #[arg(long, default_value_t = false)]
        recipes: bool,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Args)]
struct SimulateArgs {
    /// Materials used per attempt (repeat or comma-separate)
    #[arg(long = "material", required = true, value_delimiter = ',')]
    materials: Vec<String>,

    #[arg(long, default_value_t = 75.0)]
    base_rate: f64,

    #[arg(long, default_value_t = 50.0)]
    smith_level: f64,

    #[arg(long, default_value_t = 100.0)]
    base_level: f64,

    #[arg(long, default_value_t = 100)]
    start: i64,

    #[arg(long, default_value_t = 150)]
    target: i64,

    #[arg(long, default_value_t = 100)]
    iterations: usize,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = false)]
    json: bool,
}

impl SimulateArgs {
    fn formula(&self) -> Formula {
        Formula {
            materials: self.materials.clone(),
            base_success_rate: self.base_rate,
            smith_level: self.smith_level,
            base_level: self.base_level,
            starting_potential: self.start,
            target_potential: self.target,
        }
    }
}

#[derive(Args)]
struct ListArgs {
    /// Case-insensitive search over name and type
    #[arg(long)]
    search: Option<String>,

    /// Exact type filter
    #[arg(long = "type")]
    item_type: Option<String>,

    /// Only items with this stat label
    #[arg(long)]
    stat: Option<String>,

    /// Only items with this usage type (crystals)
    #[arg(long)]
    usage: Option<String>,

    /// Sort key: name, type, attributes, drops, usage, atk, def, stability
    #[arg(long, default_value = "name")]
    sort: SortKey,

    /// Sort descending
    #[arg(long, default_value_t = false)]
    desc: bool,

    /// Page number (1-based)
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Items per page (overrides config)
    #[arg(long)]
    page_size: Option<usize>,

    /// Output every match instead of one page
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Print the available filter values
    #[arg(long, default_value_t = false)]
    facets: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl ListArgs {
    fn query(&self) -> ItemQuery {
        ItemQuery {
            search: self.search.clone(),
            item_type: self.item_type.clone(),
            stat: self.stat.clone(),
            usage_type: self.usage.clone(),
            sort: self.sort,
            order: if self.desc { SortOrder::Desc } else { SortOrder::Asc },
        }
    }
}

fn verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Console logging on stderr, plus a non-blocking file layer when a log file
/// is given. `RUST_LOG` directives take precedence over `-v`.
fn setup_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity(verbose).into())
        .from_env_lossy();

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {:?}", path))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn load_config(cli: &Cli) -> Result<BrowserConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            BrowserConfig::from_file(path)?
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            BrowserConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => BrowserConfig::default(),
    };

    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if cli.strict {
        config.permissive = false;
    }
    Ok(config)
}

fn print_view(out: &mut impl Write, view: &CompleteView) -> std::io::Result<()> {
    let item = &view.item;
    writeln!(out, "{} [{}]  ({} #{})", item.name, item.item_type, view.table, item.id)?;
    if !item.sell_price.is_empty() || !item.secondary_cost.is_empty() {
        writeln!(out, "  price: {} / {}", item.sell_price, item.secondary_cost)?;
    }
    for attribute in &view.attributes {
        writeln!(out, "  {}: {}", attribute.label, attribute.value)?;
    }
    for entry in &view.drops {
        let mut line = format!("  drop: {}", entry.monster_name);
        if !entry.monster_level.is_empty() {
            line.push_str(&format!(" ({})", entry.monster_level));
        }
        if !entry.location_name.is_empty() {
            line.push_str(&format!(" @ {}", entry.location_name));
        }
        writeln!(out, "{}", line)?;
    }
    for usage in view.usage() {
        let location = if usage.location_name.is_empty() {
            String::new()
        } else {
            format!(" @ {}", usage.location_name)
        };
        writeln!(out, "  {}: {}{}", usage.usage_type, usage.item_name, location)?;
    }
    Ok(())
}

fn print_facets(out: &mut impl Write, facets: &Facets) -> std::io::Result<()> {
    writeln!(out, "Types: {}", facets.types.join(", "))?;
    if !facets.stats.is_empty() {
        writeln!(out, "Stats: {}", facets.stats.join(", "))?;
    }
    if !facets.usage_types.is_empty() {
        writeln!(out, "Usage: {}", facets.usage_types.join(", "))?;
    }
    writeln!(out)
}

fn run_listing(listing: &Listing, args: &ListArgs, default_page_size: usize, noun: &str) -> Result<()> {
    let matched = args.query().apply(&listing.views);
    let page_size = args.page_size.unwrap_or(default_page_size);
    if page_size == 0 {
        anyhow::bail!("--page-size must be at least 1");
    }
    let page = paginate(&matched, args.page, page_size);
    let selected: &[&CompleteView] = if args.all { &matched } else { page.items };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.format {
        OutputFormat::Json => write_json(selected, &mut out)?,
        OutputFormat::Csv => write_csv(selected, &mut out)?,
        OutputFormat::Text => {
            if args.facets {
                print_facets(&mut out, &Facets::collect(&listing.views))?;
            }
            for view in selected {
                print_view(&mut out, view)?;
            }
            if args.all {
                writeln!(out, "\n{} of {} {}", matched.len(), listing.views.len(), noun)?;
            } else if page.total_items > 0 {
                let window: Vec<String> = page.window().iter().map(|p| p.to_string()).collect();
                writeln!(
                    out,
                    "\nShowing {}-{} of {} {} (page {} of {}; pages {})",
                    page.start + 1,
                    page.end,
                    page.total_items,
                    noun,
                    page.page,
                    page.total_pages,
                    window.join(" ")
                )?;
            } else {
                writeln!(out, "No {} match", noun)?;
            }
        }
    }

    Ok(())
}

fn run_statting(action: &StattingAction) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match action {
        StattingAction::Simulate(args) => {
            let formula = args.formula();
            formula.validate()?;

            let mut rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let attempts = statting::simulate(&formula, args.iterations, &mut rng);
            let summary = SimulationSummary::from_attempts(&attempts);
            info!("Simulated {} attempts", summary.attempts);

            if args.json {
                let report = serde_json::json!({
                    "successRate": formula.success_rate(),
                    "costPerAttempt": formula.cost(),
                    "summary": summary,
                });
                serde_json::to_writer_pretty(&mut out, &report)?;
                writeln!(out)?;
            } else {
                writeln!(out, "Success rate: {:.1}%", formula.success_rate())?;
                writeln!(out, "Cost per attempt: {}", formula.cost())?;
                writeln!(
                    out,
                    "{} of {} attempts succeeded ({:.1}%)",
                    summary.successes, summary.attempts, summary.observed_rate
                )?;
                writeln!(
                    out,
                    "Potential: average {:.1}, best {}, worst {}",
                    summary.average_potential, summary.best_potential, summary.worst_potential
                )?;
                writeln!(out, "Total cost: {}", summary.total_cost)?;
            }
        }
        StattingAction::Plan {
            class,
            kind,
            level,
            recipes,
            json,
        } => {
            let plans = statting::plan_stats(class, *kind, *level);
            let suggestions = if *recipes { statting::suggest_recipes(&plans) } else { Vec::new() };

            if *json {
                let report = serde_json::json!({ "stats": plans, "recipes": suggestions });
                serde_json::to_writer_pretty(&mut out, &report)?;
                writeln!(out)?;
                return Ok(());
            }

            for plan in &plans {
                writeln!(
                    out,
                    "{:<12} {:>4} / {:<4} {:<6} cost {:.1}",
                    plan.name, plan.value, plan.max_value, plan.priority, plan.cost
                )?;
            }
            for recipe in &suggestions {
                writeln!(
                    out,
                    "  {}: {} ({}%, cost {:.1})",
                    recipe.stat,
                    recipe.materials.join(" + "),
                    recipe.success_rate,
                    recipe.cost
                )?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = setup_logging(cli.verbose, cli.log_file.as_deref())?;

    info!("Starting toram CLI");

    if let Commands::Statting { action } = &cli.command {
        return run_statting(action);
    }

    let config = load_config(&cli)?;
    // Audit always reads permissively and decides on the exit status itself.
    let permissive = config.permissive || matches!(cli.command, Commands::Audit);
    let store = open_store(&config.database, permissive)?;
    info!("Reading {:?}", config.database);

    match &cli.command {
        Commands::Tables { columns } => {
            let assembler = Assembler::new(store.as_ref(), config.assembler_options());
            let reports = assembler.inspect()?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();

            for report in &reports {
                match &report.error {
                    Some(error) => writeln!(out, "{:<28} error: {}", report.table, error)?,
                    None => writeln!(
                        out,
                        "{:<28} {:<13} {:>6} rows {:>4} columns {:>4} unmapped",
                        report.table,
                        report.shape.to_string(),
                        report.rows.unwrap_or(0),
                        report.columns.len(),
                        report.missing_columns.len()
                    )?,
                }
                if *columns && !report.columns.is_empty() {
                    writeln!(out, "    {}", report.columns.join(", "))?;
                }
            }
            info!("Inspected {} tables", reports.len());
        }
        Commands::Equipment(args) => {
            let assembler = Assembler::new(store.as_ref(), config.assembler_options());
            let listing = assembler.load_equipment()?;
            run_listing(&listing, args, config.page_size, "items")?;
        }
        Commands::Crystals(args) => {
            let assembler = Assembler::new(store.as_ref(), config.assembler_options());
            let listing = assembler.load_crystals()?;
            run_listing(&listing, args, config.page_size, "crystals")?;
        }
        Commands::Audit => {
            let options = AssemblerOptions {
                permissive: true,
                ..config.assembler_options()
            };
            let assembler = Assembler::new(store.as_ref(), options);
            let equipment = assembler.load_equipment()?;
            let crystals = assembler.load_crystals()?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            writeln!(out, "Equipment: {} items", equipment.views.len())?;
            writeln!(out, "Crystals: {} items", crystals.views.len())?;

            let diagnostics: Vec<_> = equipment.diagnostics.iter().chain(&crystals.diagnostics).collect();
            for diagnostic in &diagnostics {
                let marker = if diagnostic.is_skip() { "skipped" } else { "partial" };
                writeln!(out, "[{}] {}", marker, diagnostic)?;
            }

            let failures = diagnostics.iter().filter(|d| d.is_failure()).count();
            if cli.strict && failures > 0 {
                anyhow::bail!("{} tables could not be read", failures);
            }
        }
        Commands::Statting { action } => run_statting(action)?,
    }

    info!("Toram CLI finished");
    Ok(())
}
