mod config;
mod crawler;
mod dom;
mod error;
mod export;
mod model;
mod normalize;
mod ordering;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use config::AppConfig;
use crawler::{CrawlOptions, CrawlReport, Crawler, StopReason};
use dom::chrome::ChromeDocument;
use dom::static_page::StaticDocument;
use normalize::Normalizer;

#[derive(Parser)]
#[command(name = "exam_crawler", about = "Exam question crawler and export cleaner")]
struct Cli {
    /// Config file (default: ./examcrawler.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the paginated question list and export it
    Crawl {
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        /// Fetch plain HTML instead of driving a browser (no login)
        #[arg(long = "static", conflicts_with = "headed")]
        static_html: bool,
        /// Override start_exam_url from the config
        #[arg(long)]
        start_url: Option<String>,
        /// Stop after this many pages
        #[arg(short = 'n', long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        max_pages: Option<usize>,
    },
    /// Extract questions from a saved question page
    Extract {
        html_file: PathBuf,
        /// URL the page was saved from (default: file:// path)
        #[arg(long)]
        url: Option<String>,
        /// Output directory (default: output_folder from the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Clean up an existing export (in place, with a .backup copy)
    Repair {
        input: PathBuf,
        /// Write here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize an export file
    Stats { file: PathBuf },
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
    let cfg = AppConfig::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Crawl {
            headed,
            static_html,
            start_url,
            max_pages,
        } => {
            let start_url = start_url.unwrap_or_else(|| cfg.start_exam_url.clone());
            if start_url.is_empty() {
                bail!("No start URL: set start_exam_url in the config or pass --start-url");
            }
            if !cfg.setting_exam_url.is_empty() {
                info!("Exam settings page: {}", cfg.setting_exam_url);
            }
            let options = CrawlOptions {
                delay: cfg.delay(),
                max_pages,
                ..CrawlOptions::new(start_url)
            };

            let report = if static_html {
                let doc = StaticDocument::http()?;
                let report = crawl(&doc, options)?.await;
                report
            } else {
                let mut doc = ChromeDocument::launch(headed, options.nav_timeout).await?;
                if cfg.has_credentials() {
                    let login_url = if cfg.login_url.is_empty() {
                        options.start_url.as_str()
                    } else {
                        cfg.login_url.as_str()
                    };
                    doc.login(login_url, &cfg.email, &cfg.password)
                        .await
                        .context("Login failed")?;
                } else {
                    warn!("No credentials configured; crawling without login");
                }
                let report = crawl(&doc, options)?.await;
                if let Err(e) = doc.close().await {
                    warn!("Browser did not close cleanly: {}", e);
                }
                report
            };

            if let StopReason::NavigationFailed(e) = &report.stop {
                warn!("Crawl stopped early, exporting partial results: {}", e);
            }
            let (questions, pages) = (report.records.len(), report.pages);
            let normalizer = Normalizer::new(&cfg.base_url);
            let (path, topics) = export::save(report.records, &normalizer, &cfg.output_folder)?;
            println!(
                "Crawled {} pages: {} questions in {} topics -> {}",
                pages,
                questions,
                topics,
                path.display()
            );
            Ok(())
        }
        Commands::Extract {
            html_file,
            url,
            output,
        } => {
            let html = std::fs::read_to_string(&html_file)
                .with_context(|| format!("Failed to read {}", html_file.display()))?;
            let url = match url {
                Some(u) => u,
                None => file_url(&html_file)?,
            };
            let doc = StaticDocument::from_html(&url, &html);
            let records = crawler::card::extract_page(&doc).await;
            if records.is_empty() {
                println!("No question cards found in {}", html_file.display());
                return Ok(());
            }

            let count = records.len();
            let out_dir = output.unwrap_or_else(|| cfg.output_folder.clone());
            let normalizer = Normalizer::new(&cfg.base_url);
            let (path, topics) = export::save(records, &normalizer, &out_dir)?;
            println!("Extracted {} questions in {} topics -> {}", count, topics, path.display());
            Ok(())
        }
        Commands::Repair { input, output } => {
            let normalizer = Normalizer::new(&cfg.base_url);
            let summary = export::repair(&input, output.as_deref(), &normalizer)
                .with_context(|| format!("Repair of {} failed", input.display()))?;
            if let Some(backup) = &summary.backup {
                println!("Backup:  {}", backup.display());
            }
            println!(
                "Repaired {} questions -> {}",
                summary.questions,
                summary.written_to.display()
            );
            Ok(())
        }
        Commands::Stats { file } => {
            let records = export::load(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let s = export::stats(&records);
            println!("Questions:     {}", s.total);
            println!("Text answers:  {}", s.text_answers);
            println!("Image answers: {}", s.image_answers);
            println!("Unanswered:    {}", s.unanswered);
            println!("With votes:    {}", s.with_votes);
            println!("Discussions:   {}", s.discussions);
            if !s.topics.is_empty() {
                println!("\n--- Topics ---");
                for (topic, count) in &s.topics {
                    println!("  {:<width$} {:>5}", topic_cell(topic), count, width = TOPIC_COLUMN);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

/// Build the crawler with a progress spinner; the returned future runs it.
fn crawl<'a, D: dom::Document>(
    doc: &'a D,
    options: CrawlOptions,
) -> anyhow::Result<impl std::future::Future<Output = CrawlReport> + 'a> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("starting");

    let crawler = Crawler::new(doc, options).with_progress(pb);
    Ok(async move { crawler.run().await })
}

fn file_url(path: &Path) -> anyhow::Result<String> {
    let abs = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    url::Url::from_file_path(&abs)
        .map(String::from)
        .map_err(|_| anyhow::anyhow!("Not a file path: {}", abs.display()))
}

const TOPIC_COLUMN: usize = 24;

/// Fit a topic name into the stats table's topic column, marking cuts with `…`.
fn topic_cell(topic: &str) -> String {
    if topic.chars().count() <= TOPIC_COLUMN {
        return topic.to_string();
    }
    let mut cell: String = topic.chars().take(TOPIC_COLUMN - 1).collect();
    cell.push('…');
    cell
}

/// Elapsed run time for the footer: `4.2s`, `3m 07s` or `1h 02m 09s`.
fn elapsed_label(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{m}m {s:02}s"),
        _ => format!("{h}h {m:02}m {s:02}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pages_must_be_positive() {
        assert!(Cli::try_parse_from(["exam_crawler", "crawl", "--max-pages", "0"]).is_err());

        let cli = Cli::try_parse_from(["exam_crawler", "crawl", "-n", "3", "--static"]).unwrap();
        match cli.command {
            Commands::Crawl {
                max_pages,
                static_html,
                ..
            } => {
                assert_eq!(max_pages, Some(3));
                assert!(static_html);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn static_and_headed_conflict() {
        assert!(Cli::try_parse_from(["exam_crawler", "crawl", "--static", "--headed"]).is_err());
    }

    #[test]
    fn topic_cell_fits_column() {
        assert_eq!(topic_cell("Topic 1"), "Topic 1");
        let long = topic_cell("Implement and manage virtual networking");
        assert_eq!(long.chars().count(), TOPIC_COLUMN);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn elapsed_labels() {
        assert_eq!(elapsed_label(Duration::from_millis(4200)), "4.2s");
        assert_eq!(elapsed_label(Duration::from_secs(187)), "3m 07s");
        assert_eq!(elapsed_label(Duration::from_secs(3729)), "1h 02m 09s");
    }
}
