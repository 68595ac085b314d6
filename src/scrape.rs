//! Concurrent article scraper: fetches each story URL and stores the
//! visible paragraph text as `<id>.txt`.

use crate::error::{PipelineError, Result};
use crate::story::StoryItem;
use reqwest::Client;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Desktop browser user agent; several publishers refuse obvious bots.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_5) AppleWebKit/601.3.9 (KHTML, like Gecko) Version/9.0.2 Safari/601.3.9";

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Concurrent fetchers.
    pub workers: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            timeout: Duration::from_secs(20),
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

/// Outcome counters for one scrape run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Articles fetched and written.
    pub written: usize,
    /// Stories skipped because they had no URL or were already on disk.
    pub skipped: usize,
    /// Fetches or writes that failed.
    pub failed: usize,
}

#[derive(Default)]
struct Metrics {
    written: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Metrics {
    fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> ScrapeSummary {
        ScrapeSummary {
            written: self.written.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Path of the article dump for story `id`.
pub fn article_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{id}.txt"))
}

/// Concatenated text of every `<p>` element, separated by blank lines.
pub fn extract_paragraphs(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };
    document
        .select(&selector)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

/// Fetches every story with a URL whose dump is not yet in `output_dir`.
///
/// Individual failures are logged and counted; they never abort the run.
pub async fn scrape_articles(
    stories: Vec<StoryItem>,
    output_dir: &Path,
    config: &ScrapeConfig,
) -> Result<ScrapeSummary> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|err| PipelineError::io(output_dir, err))?;

    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout)
        .build()
        .map_err(|source| PipelineError::RemoteFetch {
            url: String::new(),
            source,
        })?;

    let workers = config.workers.max(1);
    let (tx, rx) = mpsc::channel::<StoryItem>(workers * 2);
    let rx = Arc::new(Mutex::new(rx));
    let metrics = Arc::new(Metrics::default());

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let rx = rx.clone();
            let client = client.clone();
            let metrics = metrics.clone();
            let dir = output_dir.to_path_buf();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(story) = next else { break };
                    scrape_one(&client, &dir, &story, &metrics).await;
                }
            })
        })
        .collect();

    for story in stories {
        if story.url.is_empty() || article_path(output_dir, story.id).exists() {
            metrics.record_skipped();
            continue;
        }
        if tx.send(story).await.is_err() {
            break;
        }
    }
    drop(tx);

    for result in futures_util::future::join_all(handles).await {
        if let Err(err) = result {
            log::warn!("scrape worker crashed: {err}");
        }
    }
    Ok(metrics.summary())
}

async fn scrape_one(client: &Client, dir: &Path, story: &StoryItem, metrics: &Metrics) {
    let body = match fetch_body(client, &story.url).await {
        Ok(body) => body,
        Err(err) => {
            log::warn!("story {}: {err}", story.id);
            metrics.record_failed();
            return;
        }
    };
    let text = extract_paragraphs(&body);
    let path = article_path(dir, story.id);
    match tokio::fs::write(&path, text).await {
        Ok(()) => {
            log::info!("scraped story {} ({})", story.id, story.url);
            metrics.record_written();
        }
        Err(err) => {
            log::warn!("{}: {err}", path.display());
            metrics.record_failed();
        }
    }
}

async fn fetch_body(client: &Client, url: &str) -> Result<String> {
    let fetch_err = |source| PipelineError::RemoteFetch {
        url: url.to_string(),
        source,
    };
    client
        .get(url)
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(fetch_err)?
        .text()
        .await
        .map_err(fetch_err)
}
