use anyhow::{Context, Result};
use blinktracker::{
    BlinkTrackerConfig, BlinkTrackerOrchestrator, Collaborators, StatisticsModel,
    StatisticsRepository, StatisticsStore,
};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "blinktracker")]
#[command(about = "Tracks eye blinks and reminds you to blink")]
#[command(version)]
#[command(long_about = "Tracks eye blinks from a vision source, counts blinks per measuring \
period and reminds the user with a sound or vibration when the blink rate falls below the \
configured threshold. Per-period blink counts are kept as history.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "blinktracker.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,

    /// Override the vision source (simulated, stdin)
    #[arg(long, value_name = "SOURCE")]
    vision: Option<String>,

    /// Enable keyboard control (s = start, p = stop, q = quit)
    #[arg(long)]
    keyboard: bool,

    /// Start tracking immediately
    #[arg(long)]
    auto_start: bool,

    /// Print the blink history summary and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting blinktracker v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = BlinkTrackerConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(source) = &args.vision {
        config.vision.source = source.clone();
    }
    if args.auto_start {
        config.system.auto_start = true;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if args.stats {
        print_statistics(&config).await?;
        return Ok(());
    }

    let collaborators = Collaborators::from_config(&config)
        .await
        .context("Failed to open stores")?;

    let mut orchestrator = BlinkTrackerOrchestrator::new(config, collaborators);
    orchestrator.set_keyboard_enabled(args.keyboard);

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Blinktracker exited with code: {}", exit_code);

    // process::exit skips destructors; flush the file writer first
    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("blinktracker={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "blinktracker.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Blinktracker Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Any value can be overridden with BLINKTRACKER_<SECTION>__<KEY> variables");
    println!();
    let rendered = toml::to_string_pretty(&BlinkTrackerConfig::default())
        .context("Failed to render default configuration")?;
    println!("{}", rendered);
    Ok(())
}

async fn print_statistics(config: &BlinkTrackerConfig) -> Result<()> {
    let store = StatisticsStore::open(&config.statistics.path)
        .await
        .with_context(|| format!("Failed to open {}", config.statistics.path))?;
    let model = StatisticsModel::from_records(&store.observe().borrow());

    println!("Blink history ({})", config.statistics.path);
    println!("  periods tracked:    {}", model.minutes_tracked);
    println!("  total blinks:       {}", model.total_blinks);
    println!("  average per period: {:.1}", model.average_per_minute);
    if let (Some(min), Some(max)) = (model.min_per_minute, model.max_per_minute) {
        println!("  min / max:          {} / {}", min, max);
    }
    for record in model.records.iter().rev().take(10) {
        println!(
            "  {}  {:>4}",
            record.date.format("%Y-%m-%d %H:%M:%S"),
            record.blinks
        );
    }
    Ok(())
}
