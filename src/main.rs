use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use scry::checkpoint::{CheckpointSink, FileCheckpoint, RunCheckpoint};
use scry::cli::{Cli, Commands, ContactsArgs, FilesArgs, SharedArgs};
use scry::config::{self, AppConfig};
use scry::download::{format_size, Downloader};
use scry::export;
use scry::extract::{ContactMapper, EmailFormat, FileLinkMapper};
use scry::interrupt::{InterruptController, StdinPrompt};
use scry::logger::{HarvestLogger, VerbosityLevel};
use scry::orchestrator::{HarvestOrchestrator, RunMode, RunStatus};
use scry::query::{self, Query};
use scry::record::{HarvestRecord, RecordMapper};
use scry::source::api::ApiDriver;
use scry::source::browser::{marker_predicate, BrowserDriver};
use scry::source::SourceDriver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.show_examples {
        print_dork_examples();
        return Ok(());
    }

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("Created default configuration file at: {}", path.display());
                println!("Edit this file to customize settings, then run scry again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config_or_exit();

    match command {
        Commands::Contacts(args) => run_contacts(args, config).await,
        Commands::Files(args) => run_files(args, config).await,
    }
}

fn load_config_or_exit() -> AppConfig {
    match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => {
            match AppConfig::prompt_create_config() {
                Ok(Some(created_path)) => {
                    println!("Created default configuration file at: {}", created_path.display());
                    println!("Edit this file to customize settings, then run scry again.");
                    std::process::exit(0);
                }
                Ok(None) => {
                    eprintln!("Configuration file not found at: {}", path.display());
                    eprintln!("Run with --init to create a default configuration file.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Failed to create configuration file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_dork_examples() {
    println!("Example dorks:");
    for (dork, description) in query::DORK_EXAMPLES {
        println!("  {:<55} {}", dork, description);
    }
    println!("\nUse {{domain}} and {{company}} as placeholders. Replaced at runtime by -d and -c flags.");
}

fn build_logger(shared: &SharedArgs) -> HarvestLogger {
    let verbosity = if shared.quiet {
        VerbosityLevel::Silent
    } else {
        VerbosityLevel::from_verbose_count(shared.verbose)
    };
    match &shared.log_file {
        Some(path) => HarvestLogger::with_log_file(verbosity, path.clone()),
        None => HarvestLogger::new(verbosity),
    }
}

fn resolve_api_key(shared: &SharedArgs) -> Option<String> {
    shared
        .api_key
        .clone()
        .or_else(|| std::env::var("SERPER_API_KEY").ok())
        .filter(|k| !k.is_empty())
}

struct HarvestSetup {
    mode: RunMode,
    api_driver: Option<Arc<ApiDriver>>,
    browser: Option<Arc<dyn SourceDriver>>,
    interrupts: Arc<InterruptController>,
    logger: HarvestLogger,
}

/// Everything both subcommands share: source resolution, driver
/// construction, and the Ctrl+C handler.
fn prepare_harvest(
    shared: &SharedArgs,
    config: &AppConfig,
    logger: HarvestLogger,
) -> Result<HarvestSetup> {
    let api_key = resolve_api_key(shared);
    let mode = RunMode::resolve(&shared.source, api_key.is_some())?;

    let api_driver = match (mode, api_key) {
        (RunMode::ApiOnly | RunMode::Auto, Some(key)) => Some(Arc::new(ApiDriver::new(
            key,
            &config.search,
            &config.http.user_agent,
            config.http.request_timeout_secs,
        ))),
        _ => None,
    };

    let mut mode = mode;
    let browser: Option<Arc<dyn SourceDriver>> = if matches!(mode, RunMode::BrowserOnly | RunMode::Auto)
    {
        let delay = shared.delay.unwrap_or(config.search.browser_delay_secs);
        match BrowserDriver::launch(
            marker_predicate(&config.captcha.markers),
            config.search.browser_page_cap,
            delay,
        ) {
            Ok(driver) => Some(Arc::new(driver)),
            Err(e) if mode == RunMode::Auto => {
                // The API pass can still run on its own.
                logger.error(&format!("Browser unavailable, continuing with API only: {:#}", e));
                mode = RunMode::ApiOnly;
                None
            }
            Err(e) => return Err(e).context("Failed to launch browser session"),
        }
    } else {
        None
    };

    let interrupts = Arc::new(InterruptController::new(Arc::new(StdinPrompt)));
    interrupts
        .install_ctrlc_handler()
        .context("Failed to install Ctrl+C handler")?;

    Ok(HarvestSetup {
        mode,
        api_driver,
        browser,
        interrupts,
        logger,
    })
}

async fn run_harvest(
    setup: HarvestSetup,
    queries: &[Query],
    mapper: Arc<dyn RecordMapper>,
    config: &AppConfig,
    mode_label: &str,
) -> Result<(RunStatus, Vec<HarvestRecord>)> {
    let checkpoint: Arc<dyn CheckpointSink> = Arc::new(FileCheckpoint::new("."));

    let orchestrator = HarvestOrchestrator::new(
        Arc::clone(&setup.interrupts),
        checkpoint,
        mapper,
        setup.logger.clone(),
        config.search.api_workers,
    );

    setup
        .logger
        .info(&format!("Running {} queries ({} mode)", queries.len(), mode_label));

    let api = setup
        .api_driver
        .as_ref()
        .map(|d| Arc::clone(d) as Arc<dyn SourceDriver>);
    let outcome = orchestrator.run(setup.mode, queries, api, setup.browser).await;

    if let Some(api_driver) = &setup.api_driver {
        setup.logger.record_api_credits(api_driver.credits_used());
    }
    for _ in 0..outcome.queries_completed {
        setup.logger.record_query_completed();
    }
    setup.logger.record_records_found(outcome.records.len());

    // A finished run has no use for its crash checkpoint.
    if outcome.status != RunStatus::SourceFailed {
        let _ = RunCheckpoint::delete(Path::new("."));
    }

    Ok((outcome.status, outcome.records))
}

async fn run_contacts(args: ContactsArgs, config: AppConfig) -> Result<()> {
    args.validate().map_err(|e| anyhow::anyhow!(e))?;
    let logger = build_logger(&args.shared);

    let pages = args.shared.pages.unwrap_or(config.search.pages_per_query);
    let queries = query::plan_contact_queries(&args.domain, &args.company, pages)
        .context("Failed to build contact queries")?;

    if args.shared.dry_run {
        println!("Would run queries:");
        for q in &queries {
            println!("  {}", q.text);
        }
        return Ok(());
    }

    let format = EmailFormat::from_id(args.format)
        .ok_or_else(|| anyhow::anyhow!("email format must be 1-10"))?;
    let mapper: Arc<dyn RecordMapper> = Arc::new(ContactMapper::new(args.domain.clone(), format));

    let setup = prepare_harvest(&args.shared, &config, logger.clone())?;
    let (status, records) = run_harvest(setup, &queries, mapper, &config, "contacts").await?;

    if records.is_empty() {
        logger.info("No results found. Try broadening the query or check domain/company.");
        logger.export_logs().ok();
        return exit_for(status);
    }

    logger.info(&format!("{} unique emails generated", records.len()));

    let fmt = args.shared.format_output.as_str();
    if args.shared.stdout {
        export::write_to_stdout(&records, fmt)?;
        logger.export_logs().ok();
        return exit_for(status);
    }

    if let Some(base) = &args.shared.output_dir {
        let run_dir = export::make_run_dir(Path::new(base), "contacts", &args.company)?;
        export::export_records(&records, &path_str(&run_dir, &format!("emails.{}", fmt)), fmt)?;
        if fmt != "txt" {
            export::export_txt(&records, &path_str(&run_dir, "emails.txt"))?;
        }
        export::export_names(&records, &run_dir.join("names.txt"))?;
        export::export_raw_titles(&records, &run_dir.join("raw_titles.txt"))?;
        export::write_run_log(
            &run_dir,
            &run_log_lines("contacts", &args.company, &args.domain, &queries, records.len()),
        )?;
        logger.record_output_file(&run_dir.display().to_string());
        println!("Results saved to {}/", run_dir.display());
    } else {
        export::export_records(&records, &args.output, fmt)?;
        if let Some(names_path) = &args.save_names {
            export::export_names(&records, Path::new(names_path))?;
            println!("Names saved to {}", names_path);
        }
        logger.record_output_file(&args.output);
        println!("Saved to {}", args.output);
    }

    if !args.shared.quiet {
        logger.print_final_summary();
    }
    logger.export_logs().ok();
    exit_for(status)
}

async fn run_files(args: FilesArgs, config: AppConfig) -> Result<()> {
    args.validate().map_err(|e| anyhow::anyhow!(e))?;
    let logger = build_logger(&args.shared);

    // --input-file skips the search entirely and goes straight to the
    // downloader.
    if let Some(input) = &args.input_file {
        let urls = read_url_file(input)?;
        if urls.is_empty() {
            anyhow::bail!("no URLs found in {}", input);
        }
        let download_dir = PathBuf::from(&args.download_dir);
        run_downloads(&args, &config, &logger, &urls, download_dir).await?;
        logger.export_logs().ok();
        return Ok(());
    }

    let mut dorks = args.query.clone();
    if let Some(path) = &args.dorks_file {
        dorks.extend(read_dork_file(path)?);
    }

    let pages = args.shared.pages.unwrap_or(config.search.pages_per_query);
    let queries =
        query::plan_file_queries(&dorks, args.domain.as_deref(), args.company.as_deref(), pages)
            .context("Failed to build file queries")?;

    if args.shared.dry_run {
        println!("Would run queries:");
        for q in &queries {
            println!("  {}", q.text);
        }
        return Ok(());
    }

    let mapper: Arc<dyn RecordMapper> = Arc::new(FileLinkMapper);
    let setup = prepare_harvest(&args.shared, &config, logger.clone())?;
    let (status, records) = run_harvest(setup, &queries, mapper, &config, "files").await?;

    if records.is_empty() {
        logger.info("No file links found. Try different dorks or a broader domain.");
        logger.export_logs().ok();
        return exit_for(status);
    }

    logger.info(&format!("{} unique file links found", records.len()));

    let fmt = args.shared.format_output.as_str();
    if args.shared.stdout {
        export::write_to_stdout(&records, fmt)?;
        logger.export_logs().ok();
        return exit_for(status);
    }

    let label = args.domain.clone().unwrap_or_else(|| "files".to_string());
    let mut download_dir = PathBuf::from(&args.download_dir);

    if let Some(base) = &args.shared.output_dir {
        let run_dir = export::make_run_dir(Path::new(base), "files", &label)?;
        export::export_records(&records, &path_str(&run_dir, &format!("file_links.{}", fmt)), fmt)?;
        if fmt != "txt" {
            export::export_txt(&records, &path_str(&run_dir, "file_links.txt"))?;
        }
        export::write_run_log(
            &run_dir,
            &run_log_lines(
                "files",
                &label,
                args.domain.as_deref().unwrap_or("-"),
                &queries,
                records.len(),
            ),
        )?;
        logger.record_output_file(&run_dir.display().to_string());
        download_dir = run_dir.join("downloads");
        println!("Results saved to {}/", run_dir.display());
    } else {
        export::export_records(&records, &args.output, fmt)?;
        logger.record_output_file(&args.output);
        println!("Saved to {}", args.output);
    }

    if args.download {
        let urls: Vec<String> = records.iter().map(|r| r.content().to_string()).collect();
        run_downloads(&args, &config, &logger, &urls, download_dir).await?;
    }

    if !args.shared.quiet {
        logger.print_final_summary();
    }
    logger.export_logs().ok();
    exit_for(status)
}

async fn run_downloads(
    args: &FilesArgs,
    config: &AppConfig,
    logger: &HarvestLogger,
    urls: &[String],
    download_dir: PathBuf,
) -> Result<()> {
    let mut download_config = config.download.clone();
    if args.no_resume {
        download_config.resume = false;
    }

    logger.info(&format!("Downloading {} files to {}", urls.len(), download_dir.display()));
    let downloader = Downloader::new(
        download_dir,
        &download_config,
        args.proxy.as_deref(),
        args.flaresolverr.as_deref(),
        &config.http.user_agent,
        logger.clone(),
    )?;
    let summary = downloader.run(urls).await?;

    println!(
        "Downloads: {} succeeded, {} failed, {} skipped ({})",
        summary.succeeded,
        summary.failed,
        summary.skipped,
        format_size(summary.total_bytes as f64)
    );
    if !summary.by_extension.is_empty() {
        let mut extensions: Vec<_> = summary.by_extension.iter().collect();
        extensions.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let listing: Vec<String> = extensions
            .iter()
            .map(|(ext, count)| format!(".{} x{}", ext, count))
            .collect();
        println!("File types: {}", listing.join(", "));
    }
    Ok(())
}

fn run_log_lines(
    kind: &str,
    label: &str,
    domain: &str,
    queries: &[Query],
    record_count: usize,
) -> Vec<String> {
    vec![
        format!("scry {} run", kind),
        format!("Date: {}", chrono::Local::now().to_rfc3339()),
        format!("Label: {}", label),
        format!("Domain: {}", domain),
        format!("Queries: {}", queries.len()),
        format!("Unique records: {}", record_count),
    ]
}

fn read_dork_file(path: &str) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dorks file {}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

fn read_url_file(path: &str) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL file {}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("http"))
        .map(String::from)
        .collect())
}

fn path_str(dir: &Path, name: &str) -> String {
    dir.join(name).display().to_string()
}

/// Exit non-zero when every selected source aborted; gathered results
/// were still written out first.
fn exit_for(status: RunStatus) -> Result<()> {
    if status == RunStatus::SourceFailed {
        std::process::exit(1);
    }
    Ok(())
}
