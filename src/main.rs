mod api;
mod config;
mod crawl;
mod db;
mod fetch;
mod parser;
mod pipeline;
mod staging;
mod summarize;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use crate::config::Settings;
use crate::crawl::{CrawlOutcome, CrawlPlan, Crawler, ReviewTarget, SpecTarget};
use crate::db::{Store, VehicleKey};
use crate::summarize::{OpenAiCompleter, Summarizer};

#[derive(Parser)]
#[command(name = "car_sentiment", about = "Car review scraper, loader and summarizer")]
struct Cli {
    /// Settings file (TOML). Defaults to ./cars.toml when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CrawlKind {
    Reviews,
    Specs,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Crawl every configured model and year, then replace the stored rows
    Crawl {
        #[arg(value_enum)]
        kind: CrawlKind,
        /// Also write the crawled records to a JSONL staging file
        #[arg(long)]
        stage: Option<PathBuf>,
        /// Start at this MODEL:YEAR, skipping everything before it
        #[arg(long, value_parser = crawl::parse_resume_point)]
        resume_from: Option<VehicleKey>,
        /// Don't touch the database (use with --stage)
        #[arg(long)]
        no_load: bool,
    },
    /// Replace stored rows with the records in a staging file
    Load { file: PathBuf },
    /// Summarize stored reviews per vehicle
    Summarize,
    /// Serve the read API
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Write all summaries to a JSON file
    Export { file: PathBuf },
    /// Vehicles overview table
    Overview {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show row counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let store = Store::new(&settings.database.path);

    let result = match cli.command {
        Commands::Init => {
            store.init_schema()?;
            println!("Schema ready at {}", store.path().display());
            Ok(())
        }
        Commands::Crawl {
            kind,
            stage,
            resume_from,
            no_load,
        } => {
            store.init_schema()?;
            if resume_from.is_some() && !no_load {
                warn!("Loading a resumed crawl replaces every stored row; consider --stage with --no-load");
            }

            let fetcher = fetch::build(&settings.fetcher)?;
            let plan = CrawlPlan::from_settings(&settings.crawl).resume_from(resume_from);
            let mut crawler = Crawler::new(fetcher.as_ref(), settings.crawl.delay()?);
            println!(
                "Crawling {} vehicles ({} models x {} years)...",
                plan.work_items().len(),
                plan.models.len(),
                plan.years.len()
            );

            match kind {
                CrawlKind::Reviews => {
                    let outcome = crawler.run(&ReviewTarget::from_settings(&settings.crawl), &plan).await;
                    print_outcome("reviews", &outcome);
                    if let Some(path) = &stage {
                        let n = staging::write(path, &outcome.records)?;
                        println!("Staged {} reviews to {}", n, path.display());
                    }
                    if !no_load {
                        let report = pipeline::load_reviews(&store, &outcome.records)?;
                        println!(
                            "Loaded {} reviews ({} replaced, {} vehicles).",
                            report.inserted, report.cleared, report.vehicles
                        );
                    }
                }
                CrawlKind::Specs => {
                    let outcome = crawler.run(&SpecTarget::from_settings(&settings.crawl), &plan).await;
                    print_outcome("specs", &outcome);
                    if let Some(path) = &stage {
                        let n = staging::write(path, &outcome.records)?;
                        println!("Staged {} specs to {}", n, path.display());
                    }
                    if !no_load {
                        let report = pipeline::load_specs(&store, &outcome.records)?;
                        println!("Loaded {} vehicle specs ({} replaced).", report.inserted, report.cleared);
                    }
                }
            }
            Ok(())
        }
        Commands::Load { file } => {
            store.init_schema()?;
            let staged = staging::read(&file)?;
            if staged.reviews.is_empty() && staged.specs.is_empty() {
                println!("No records in {}.", file.display());
                return Ok(());
            }
            // Specs first: reloading cars clears vehicles that reviews re-register
            if !staged.specs.is_empty() {
                let report = pipeline::load_specs(&store, &staged.specs)?;
                println!("Loaded {} vehicle specs ({} replaced).", report.inserted, report.cleared);
            }
            if !staged.reviews.is_empty() {
                let report = pipeline::load_reviews(&store, &staged.reviews)?;
                println!(
                    "Loaded {} reviews ({} replaced, {} vehicles).",
                    report.inserted, report.cleared, report.vehicles
                );
            }
            Ok(())
        }
        Commands::Summarize => {
            store.init_schema()?;
            let completer = OpenAiCompleter::new(&settings.completion)?;
            let report = Summarizer::new(&completer, &settings.completion).run(&store).await?;
            println!("Summarized {} vehicles ({} failed).", report.summarized, report.failed.len());
            for (key, err) in &report.failed {
                println!("  {}: {}", key, truncate(err, 80));
            }
            Ok(())
        }
        Commands::Serve { bind } => {
            store.init_schema()?;
            let addr = bind.unwrap_or_else(|| settings.server.bind.clone());
            api::serve(store, &addr).await
        }
        Commands::Export { file } => {
            let summaries = pipeline::summaries_json(&store)?;
            let count = summaries.as_object().map_or(0, |m| m.len());
            std::fs::write(&file, serde_json::to_string_pretty(&summaries)?)?;
            println!("Exported {} summaries to {}", count, file.display());
            Ok(())
        }
        Commands::Overview { limit } => {
            store.init_schema()?;
            let rows = store.fetch_overview(limit)?;
            if rows.is_empty() {
                println!("No vehicles found. Run 'crawl specs' or 'crawl reviews' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<12} | {:>4} | {:<10} | {:>5} | {:>4} | {:>5} | {:<18} | {:>7} | {:<7}",
                "#", "Model", "Year", "MSRP", "HP", "MPG", "Seats", "Drive", "Reviews", "Summary"
            );
            println!("{}", "-".repeat(104));

            for (i, r) in rows.iter().enumerate() {
                let dash = || "-".to_string();
                let hp = r.horsepower.map(|h| format!("{:.0}", h)).unwrap_or_else(dash);
                let mpg = r.mpg.map(|m| m.to_string()).unwrap_or_else(dash);
                let seats = r.num_seats.map(|s| s.to_string()).unwrap_or_else(dash);
                let msrp = if r.msrp.is_empty() { dash() } else { truncate(&r.msrp, 10) };

                println!(
                    "{:>3} | {:<12} | {:>4} | {:<10} | {:>5} | {:>4} | {:>5} | {:<18} | {:>7} | {:<7}",
                    i + 1,
                    truncate(&r.model, 12),
                    r.year,
                    msrp,
                    hp,
                    mpg,
                    seats,
                    truncate(&r.drive_type, 18),
                    r.review_count,
                    if r.has_summary { "yes" } else { "no" },
                );
            }

            println!("\n{} vehicles", rows.len());
            Ok(())
        }
        Commands::Stats => {
            store.init_schema()?;
            let s = store.get_stats()?;
            println!("Vehicles:   {}", s.vehicles);
            println!("With specs: {}", s.with_specs);
            println!("Reviews:    {}", s.reviews);
            println!("Summaries:  {}", s.summaries);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_outcome<R>(what: &str, outcome: &CrawlOutcome<R>) {
    println!(
        "Crawled {} {} from {} pages across {} vehicles ({} failed).",
        outcome.records.len(),
        what,
        outcome.pages,
        outcome.pairs,
        outcome.failed.len()
    );
    for (key, err) in &outcome.failed {
        println!("  {}: {}", key, truncate(err, 80));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
