//! Hacker News item API client and the time-indexed item locator.

use crate::classifier::StopSignal;
use crate::error::{PipelineError, Result};
use crate::story::{unix_to_utc, StoryItem};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Public Firebase endpoint of the HN API.
pub const DEFAULT_API_ROOT: &str = "https://hacker-news.firebaseio.com/v0/";
const USER_AGENT: &str = "hn-ranker/0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Minimal item shape needed to order items by time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Item {
    /// Item id.
    pub id: u64,
    /// Unix seconds when the item was created. Required: an item without a
    /// timestamp cannot be ordered.
    pub time: i64,
}

impl Item {
    /// Creation instant in UTC.
    pub fn created_at(&self) -> DateTime<Utc> {
        unix_to_utc(self.time)
    }
}

/// Read access to an append-only, time-ordered item space.
pub trait ItemSource {
    /// Largest item id currently allocated.
    fn max_item(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Fetches item `id`.
    fn item(&self, id: u64) -> impl Future<Output = Result<Item>> + Send;
}

/// Finds the newest item whose timestamp is strictly before `target`.
///
/// Probes `max - 1, max - 2, max - 4, ...` until an item older than `target`
/// turns up, then binary searches between that probe and the previous one.
/// Returns `None` when even item 0 is not older than `target`. Fetch errors
/// abort the search unchanged.
pub async fn locate_before<S: ItemSource>(source: &S, target: DateTime<Utc>) -> Result<Option<u64>> {
    let max = source.max_item().await?;
    log::debug!("locating newest item before {target} below max id {max}");

    // `upper` is exclusive: every id >= upper is known (or assumed, for max + 1)
    // not to precede the target.
    let mut upper = max.saturating_add(1);
    let mut lower = None;
    let mut step = 1u64;
    loop {
        let id = if step > max {
            if upper == 0 {
                break;
            }
            0
        } else {
            max - step
        };
        let item = source.item(id).await?;
        log::debug!("probe id={id} time={}", item.time);
        if item.created_at() < target {
            lower = Some(id);
            break;
        }
        upper = id;
        if id == 0 {
            break;
        }
        step = step.saturating_mul(2);
    }

    let Some(mut lower) = lower else {
        return Ok(None);
    };

    while upper > lower + 1 {
        let mid = lower + (upper - lower) / 2;
        let item = source.item(mid).await?;
        log::debug!("bisect id={mid} time={}", item.time);
        if item.created_at() < target {
            lower = mid;
        } else {
            upper = mid;
        }
    }
    Ok(Some(lower))
}

/// Story id lists published by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Most recent stories.
    New,
    /// Front-page ranking.
    Top,
    /// Best-scoring recent stories.
    Best,
}

impl Collection {
    fn path(self) -> &'static str {
        match self {
            Collection::New => "newstories.json",
            Collection::Top => "topstories.json",
            Collection::Best => "beststories.json",
        }
    }
}

/// Items gathered before an optional error cut the walk short.
#[derive(Debug, Default)]
pub struct PartialListing {
    /// Items fetched successfully.
    pub items: Vec<StoryItem>,
    /// Error that stopped the walk, if any.
    pub error: Option<PipelineError>,
}

/// HTTP client for the HN Firebase API.
#[derive(Clone)]
pub struct HnClient {
    client: Client,
    root: String,
}

impl HnClient {
    /// Client for the public API.
    pub fn new() -> Result<Self> {
        Self::with_root(DEFAULT_API_ROOT)
    }

    /// Client for an API mirror rooted at `root`.
    pub fn with_root(root: impl Into<String>) -> Result<Self> {
        let mut root = root.into();
        if !root.ends_with('/') {
            root.push('/');
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| PipelineError::RemoteFetch {
                url: root.clone(),
                source,
            })?;
        Ok(Self { client, root })
    }

    async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.root, path);
        let fetch_err = |source| PipelineError::RemoteFetch {
            url: url.clone(),
            source,
        };
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(fetch_err)?
            .bytes()
            .await
            .map_err(fetch_err)?;
        serde_json::from_slice(&body).map_err(|source| PipelineError::RemoteDecode {
            url: url.clone(),
            source,
        })
    }

    /// Fetches a full story item; `None` when the API has no item under `id`.
    pub async fn story(&self, id: u64) -> Result<Option<StoryItem>> {
        self.fetch_json(&format!("item/{id}.json")).await
    }

    /// Fetches the id list of `collection`.
    pub async fn collection_ids(&self, collection: Collection) -> Result<Vec<u64>> {
        self.fetch_json(collection.path()).await
    }

    /// Hydrates every item of `collection`, stopping at the first error.
    pub async fn fetch_collection(&self, collection: Collection) -> PartialListing {
        let mut listing = PartialListing::default();
        let ids = match self.collection_ids(collection).await {
            Ok(ids) => ids,
            Err(err) => {
                listing.error = Some(err);
                return listing;
            }
        };
        for id in ids {
            match self.story(id).await {
                Ok(Some(item)) => listing.items.push(item),
                Ok(None) => log::debug!("item {id} missing from {collection:?}"),
                Err(err) => {
                    listing.error = Some(err);
                    break;
                }
            }
        }
        listing
    }

    /// Walks ids downward from the newest item older than `before`, collecting
    /// stories until `limit` is reached, item 0 is passed, `stop` is raised, or
    /// a fetch fails.
    pub async fn stories_before(
        &self,
        before: DateTime<Utc>,
        limit: Option<usize>,
        stop: &StopSignal,
    ) -> PartialListing {
        let mut listing = PartialListing::default();
        let start = match locate_before(self, before).await {
            Ok(Some(start)) => start,
            Ok(None) => return listing,
            Err(err) => {
                listing.error = Some(err);
                return listing;
            }
        };

        let now = Utc::now();
        for id in (0..=start).rev() {
            if stop.is_raised() || limit.is_some_and(|limit| listing.items.len() >= limit) {
                break;
            }
            match self.story(id).await {
                Ok(Some(item)) if item.is_story() => {
                    let age = now - item.posted_at();
                    listing.items.push(item);
                    log::info!(
                        "got story from {} hours ago ({} stories)",
                        age.num_hours(),
                        listing.items.len()
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    listing.error = Some(err);
                    break;
                }
            }
        }
        listing
    }
}

impl ItemSource for HnClient {
    async fn max_item(&self) -> Result<u64> {
        self.fetch_json("maxitem.json").await
    }

    async fn item(&self, id: u64) -> Result<Item> {
        self.fetch_json(&format!("item/{id}.json")).await
    }
}
