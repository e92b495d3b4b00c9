use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use feedcast::settings::KEYS;
use feedcast::{
    Feed, FeedList, FeedRepository, LoadState, MediaCache, NoopReporter, ProgressEvent,
    ProgressReporter, ReqwestClient, ResetScope, SettingsStore, SharedProgressReporter,
    TimeRange,
};

// Emoji with fallback for terminals without Unicode support
static NEWSPAPER: Emoji<'_, '_> = Emoji("📰 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[p] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");

/// Headless companion for the feedcast reader
#[derive(Parser, Debug)]
#[command(name = "feedcast")]
#[command(about = "Browse feeds, cache podcast media, and manage settings")]
#[command(version)]
struct Args {
    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch feeds from the configured backend and list them
    Feeds {
        /// Only show feeds in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Only show feeds published within this many hours (0 for all)
        #[arg(long)]
        hours: Option<u32>,

        /// Only show feeds that carry a podcast
        #[arg(short, long)]
        podcasts: bool,
    },

    /// Download media into the playback cache
    Cache {
        /// Media URL
        url: String,

        /// Title shown while downloading
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Inspect or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print every setting
    Show,

    /// Change one setting
    Set { key: String, value: String },

    /// Restore defaults for a group of settings
    Reset {
        #[arg(value_enum, default_value = "all")]
        scope: Scope,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Scope {
    Proxy,
    Ai,
    All,
}

impl From<Scope> for ResetScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Proxy => ResetScope::Proxy,
            Scope::Ai => ResetScope::Ai,
            Scope::All => ResetScope::All,
        }
    }
}

/// Progress reporter drawing a single download bar
struct IndicatifReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn bar(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|bar| bar.clone())
    }

    fn start_bar(&self, title: &str, length: Option<u64>) {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = ProgressBar::new(length.unwrap_or(0));
        bar.set_style(style);
        bar.set_message(truncate_title(title, 40));

        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|mut bar| bar.take())
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::CacheHit { title, .. } => {
                println!(
                    "{SUCCESS}{} {}",
                    truncate_title(&title, 40).green(),
                    "(cached)".dimmed()
                );
            }

            ProgressEvent::DownloadStarting {
                title,
                content_length,
                ..
            } => self.start_bar(&title, content_length),

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                if let Some(bar) = self.bar() {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                }
            }

            ProgressEvent::Finalizing { .. } => {}

            ProgressEvent::DownloadCompleted {
                title,
                bytes_downloaded,
            } => {
                if let Some(bar) = self.take_bar() {
                    bar.set_position(bytes_downloaded);
                    bar.finish_and_clear();
                }
                println!("{SUCCESS}{}", truncate_title(&title, 40).green());
            }

            ProgressEvent::DownloadFailed { title, error } => {
                if let Some(bar) = self.take_bar() {
                    bar.abandon_with_message(format!(
                        "{FAILURE}{} - {}",
                        truncate_title(&title, 30).red(),
                        error.red()
                    ));
                }
            }

            ProgressEvent::CacheEvicted { removed, kept } => {
                println!(
                    "{BROOM}Evicted {} cache entries, {} kept",
                    removed.to_string().yellow(),
                    kept.to_string().cyan()
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
}

fn build_client(store: &SettingsStore) -> Result<ReqwestClient> {
    ReqwestClient::with_proxy(store.proxy().as_ref()).context("Failed to build HTTP client")
}

async fn list_feeds(
    store: &SettingsStore,
    category: Option<String>,
    hours: Option<u32>,
    podcasts: bool,
    quiet: bool,
) -> Result<()> {
    let settings = store.current();
    if settings.backend_url.trim().is_empty() {
        bail!("No backend URL configured; run `feedcast settings set backend_url <url>` first");
    }

    let client = build_client(store)?;
    let mut repository = FeedRepository::from_settings(client, &settings);
    if let Some(hours) = hours {
        repository = repository.with_window(chrono::TimeDelta::hours(i64::from(hours.max(1))));
    }

    if !quiet {
        println!("{SEARCH}Querying {}", repository.backend_url().cyan());
    }

    let mut list = FeedList::new();
    list.set_category(category);
    list.set_time_range(TimeRange::from_hours(hours.unwrap_or(settings.feed_window_hours)));
    list.refresh(&repository).await;

    if let LoadState::Error(message) = list.state() {
        bail!("Failed to fetch feeds: {message}");
    }

    let now = Utc::now();
    let feeds: Vec<Feed> = if podcasts {
        list.podcasts(now)
    } else {
        list.visible(now).into_iter().cloned().collect()
    };

    for feed in &feeds {
        print_feed(feed);
    }

    if !quiet {
        println!(
            "\n{} {} shown, {} fetched, categories: {}",
            "Feeds:".bold().green(),
            feeds.len().to_string().green().bold(),
            list.feeds().len().to_string().cyan(),
            list.categories().join(", ").dimmed()
        );
    }

    Ok(())
}

fn print_feed(feed: &Feed) {
    let labels = &feed.labels;
    let marker = if feed.is_podcast() { &HEADPHONES } else { &NEWSPAPER };
    let time = feed
        .published_at()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{marker}{} {} {}",
        time.dimmed(),
        labels.title.bold(),
        format!("[{}]", labels.category).cyan()
    );
    if !labels.link.is_empty() {
        println!("    {}", labels.link.blue());
    }
    let summary = feed.plain_summary();
    if !summary.is_empty() {
        println!("    {}", truncate_title(&summary, 100).dimmed());
    }
}

async fn cache_media(
    store: &SettingsStore,
    url: &str,
    title: Option<String>,
    quiet: bool,
) -> Result<()> {
    let client = build_client(store)?;
    let dir = MediaCache::default_dir().context("Could not determine the cache directory")?;
    let cache = MediaCache::new(dir);

    let reporter: SharedProgressReporter = if quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    let title = title.unwrap_or_else(|| url.to_string());
    let path = cache
        .fetch(&client, url, &title, &reporter)
        .await
        .with_context(|| format!("Failed to cache {url}"))?;

    let removed = cache.evict().context("Failed to evict old cache entries")?;
    if removed > 0 {
        let kept = cache.entries().map(|e| e.len()).unwrap_or(0);
        reporter.report(ProgressEvent::CacheEvicted { removed, kept });
    }

    if !quiet {
        println!("\n{FOLDER}Cached: {}\n", path.display().to_string().cyan());
    } else {
        println!("{}", path.display());
    }

    Ok(())
}

fn settings_command(store: &SettingsStore, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            for key in KEYS {
                let value = store.get(key)?;
                let shown = if key.contains("password") || key.contains("api_key") {
                    if value.is_empty() { value } else { "********".to_string() }
                } else {
                    value
                };
                println!("{} = {}", key.bold(), shown);
            }
            println!("\n{FOLDER}{}", store.path().display().to_string().dimmed());
        }

        SettingsAction::Set { key, value } => {
            store
                .set(&key, &value)
                .with_context(|| format!("Failed to update {key}"))?;
            println!("{SUCCESS}{} = {}", key.bold(), store.get(&key)?);
        }

        SettingsAction::Reset { scope } => {
            store.reset(scope.into()).context("Failed to reset settings")?;
            println!("{SUCCESS}Settings reset ({scope:?})");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let store = SettingsStore::open_default().context("Failed to open settings")?;

    match args.command {
        Command::Feeds {
            category,
            hours,
            podcasts,
        } => list_feeds(&store, category, hours, podcasts, args.quiet).await,
        Command::Cache { url, title } => cache_media(&store, &url, title, args.quiet).await,
        Command::Settings { action } => settings_command(&store, action),
    }
}
