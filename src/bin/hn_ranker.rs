use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use hn_ranker::story::{load_story_list, save_story_list};
use hn_ranker::training::{evaluate, load_story_data};
use hn_ranker::{
    fraction_above, registry, run_training, scrape_articles, Collection, Container, HnClient,
    PartialListing, ScrapeConfig, StopSignal, StoryItem, TrainArgs,
};
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};

#[derive(Parser, Debug)]
#[command(
    name = "hn-ranker",
    about = "Harvest Hacker News stories and train popularity classifiers"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot the current new and top story lists
    ListPosts {
        /// Output JSON (`{"new": [...], "top": [...]}`)
        output: PathBuf,
    },
    /// Walk backwards from stories old enough for their score to settle
    SaveStories {
        /// Output story list JSON
        output: PathBuf,

        /// Minimum story age in hours
        #[arg(long, env = "HN_MIN_AGE_HOURS", default_value_t = 72)]
        min_age_hours: i64,

        /// Stop after this many stories (default: until Ctrl+C)
        #[arg(long)]
        limit: Option<usize>,

        /// API root of the HN item service
        #[arg(long, env = "HN_API_ROOT", default_value = hn_ranker::hn_api::DEFAULT_API_ROOT)]
        api_root: String,
    },
    /// Download article text for every story in a list
    Scrape {
        /// Story list JSON
        story_list: PathBuf,

        /// Directory receiving `<id>.txt` files
        output_dir: PathBuf,

        /// Concurrent fetchers
        #[arg(long, env = "HN_SCRAPE_WORKERS", default_value_t = 10)]
        workers: usize,

        /// Per-request timeout in seconds
        #[arg(long, env = "HN_SCRAPE_TIMEOUT_SECS", default_value_t = 20)]
        timeout_secs: u64,
    },
    /// Train a classifier and save it with its vocabulary
    Train(TrainArgs),
    /// Report the accuracy of a saved classifier on a story list
    Classify {
        /// Container written by `train`
        container: PathBuf,

        /// Story list JSON
        story_list: PathBuf,

        /// Directory holding scraped `<id>.txt` articles
        article_dir: PathBuf,

        /// Score cutoffs between classes, comma separated
        #[arg(
            long,
            env = "HN_SCORE_CUTOFFS",
            value_delimiter = ',',
            default_value = "2,5,10,50"
        )]
        score_cutoffs: Vec<i64>,
    },
    /// Fraction of stories scoring strictly above a threshold
    ScoresAbove {
        /// Story list JSON
        story_list: PathBuf,

        /// Score threshold
        threshold: i64,
    },
}

#[derive(Serialize)]
struct PostCollections {
    new: Vec<StoryItem>,
    top: Vec<StoryItem>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let stop = StopSignal::new();
    watch_interrupts(&rt, stop.clone());

    match cli.command {
        Command::ListPosts { output } => {
            let client = HnClient::new()?;
            let (new, top) = rt.block_on(async {
                let new = client.fetch_collection(Collection::New).await;
                let top = client.fetch_collection(Collection::Top).await;
                (new, top)
            });
            let posts = PostCollections {
                new: new.items,
                top: top.items,
            };
            let data = serde_json::to_vec(&posts)?;
            fs::write(&output, data)
                .with_context(|| format!("failed to write {}", output.display()))?;
            log::info!(
                "saved {} new and {} top posts to {}",
                posts.new.len(),
                posts.top.len(),
                output.display()
            );
            if let Some(err) = new.error.or(top.error) {
                return Err(err).context("listing stopped early; partial lists were saved");
            }
        }
        Command::SaveStories {
            output,
            min_age_hours,
            limit,
            api_root,
        } => {
            let client = HnClient::with_root(api_root)?;
            let before = Utc::now() - ChronoDuration::hours(min_age_hours);
            let PartialListing { items, error } =
                rt.block_on(client.stories_before(before, limit, &stop));
            save_story_list(&output, &items)
                .with_context(|| format!("failed to save {} stories", items.len()))?;
            log::info!("saved {} stories to {}", items.len(), output.display());
            if let Some(err) = error {
                return Err(err).context("story walk stopped early; partial list was saved");
            }
        }
        Command::Scrape {
            story_list,
            output_dir,
            workers,
            timeout_secs,
        } => {
            let stories = read_list(&story_list)?;
            let config = ScrapeConfig {
                workers,
                timeout: std::time::Duration::from_secs(timeout_secs),
                ..ScrapeConfig::default()
            };
            let summary = rt.block_on(scrape_articles(stories, &output_dir, &config))?;
            println!("--- scrape summary ---");
            println!("written: {}", summary.written);
            println!("skipped: {}", summary.skipped);
            println!("failed: {}", summary.failed);
        }
        Command::Train(args) => {
            let config = args.build_config();
            let model = run_training(
                &args.story_list,
                &args.article_dir,
                &args.output,
                &config,
                registry(),
                &stop,
            )
            .context("training failed")?;
            println!("training: {}", model.training);
            println!("cross validation: {}", model.cross_validation);
        }
        Command::Classify {
            container,
            story_list,
            article_dir,
            score_cutoffs,
        } => {
            let (classifier, vocabulary) = Container::read_from(&container)
                .and_then(|c| c.into_classifier(registry()))
                .with_context(|| format!("failed to load {}", container.display()))?;
            let items = read_list(&story_list)?;
            let stories = load_story_data(&items, &article_dir);
            let report = evaluate(classifier.as_ref(), &vocabulary, &stories, &score_cutoffs);
            println!("classified {} stories: {report}", stories.len());
        }
        Command::ScoresAbove {
            story_list,
            threshold,
        } => {
            let stories = read_list(&story_list)?;
            let tally = fraction_above(&stories, threshold);
            println!(
                "{}/{} ({:.2}%) scored above {threshold}",
                tally.matched,
                tally.total,
                tally.fraction() * 100.0
            );
        }
    }
    Ok(())
}

/// First Ctrl+C requests a graceful stop; the second terminates.
fn watch_interrupts(rt: &Runtime, stop: StopSignal) {
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nCaught interrupt. Press Ctrl+C again to terminate.");
        stop.raise();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn read_list(path: &Path) -> Result<Vec<StoryItem>> {
    load_story_list(path).with_context(|| format!("failed to read {}", path.display()))
}
