//! Recursive crawl of a remote folder tree into an image table.
//!
//! The walk is depth-first pre-order, driven by an explicit work stack so that
//! arbitrarily deep trees never grow the call stack. A container is always
//! listed completely (every page) before any of its children is visited, and
//! children are visited in the order the listing returned them. Each page is
//! retried on its own; a page that keeps failing aborts the whole crawl.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::contract::{ListingPage, NodeKind, RemoteEntry, RemoteNode, TreeLister};
use crate::error::CrawlError;
use crate::record::{FlatRecord, FlatTable};

pub const NAME_COLUMN: &str = "name";
pub const LINK_COLUMN: &str = "link";
pub const PATH_PREVIEW_COLUMN: &str = "path_preview";

pub fn level_column(index: usize) -> String {
    format!("level_{index}")
}

/// Retry policy for a single listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRetry {
    pub max_attempts: u32,
    pub base: f64,
    /// Scale of the exponential delay; seconds in production.
    pub unit: Duration,
}

impl Default for PageRetry {
    fn default() -> Self {
        PageRetry {
            max_attempts: 5,
            base: 1.5,
            unit: Duration::from_secs(1),
        }
    }
}

impl PageRetry {
    /// Delay after failed attempt `attempt` (1-based): `unit * base^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.base.powi(attempt.min(64) as i32);
        Duration::try_from_secs_f64(self.unit.as_secs_f64() * factor).unwrap_or_default()
    }
}

impl From<&CrawlConfig> for PageRetry {
    fn from(config: &CrawlConfig) -> Self {
        PageRetry {
            max_attempts: config.max_page_attempts.max(1),
            base: config.page_backoff_base,
            ..PageRetry::default()
        }
    }
}

enum Work {
    Visit {
        container_id: String,
        path: Vec<String>,
    },
    Emit(RemoteNode),
}

pub struct Crawler<L: TreeLister> {
    lister: L,
    retry: PageRetry,
}

impl<L: TreeLister> Crawler<L> {
    pub fn new(lister: L, retry: PageRetry) -> Self {
        Crawler { lister, retry }
    }

    /// All image leaves below `root_id`, in depth-first pre-order.
    pub async fn crawl(&self, root_id: &str) -> Result<Vec<RemoteNode>, CrawlError> {
        let root = self
            .lister
            .describe(root_id)
            .await
            .map_err(|source| CrawlError::RootInaccessible {
                root_id: root_id.to_string(),
                source,
            })?;
        if root.kind() != Some(NodeKind::Container) {
            return Err(CrawlError::NotAContainer {
                root_id: root_id.to_string(),
                name: root.name,
            });
        }
        info!(root_id, root_name = %root.name, "Starting crawl");

        let mut stack = vec![Work::Visit {
            container_id: root_id.to_string(),
            path: Vec::new(),
        }];
        let mut expanded: HashSet<String> = HashSet::new();
        let mut leaves = Vec::new();

        while let Some(work) = stack.pop() {
            match work {
                Work::Emit(node) => leaves.push(node),
                Work::Visit { container_id, path } => {
                    if !expanded.insert(container_id.clone()) {
                        debug!(container_id = %container_id, "Container already expanded, skipping");
                        continue;
                    }
                    let entries = self.list_container(&container_id).await?;
                    let children = classify_children(entries, &path);
                    stack.extend(children.into_iter().rev());
                }
            }
        }

        info!(root_id, leaves = leaves.len(), containers = expanded.len(), "Crawl finished");
        Ok(leaves)
    }

    async fn list_container(&self, container_id: &str) -> Result<Vec<RemoteEntry>, CrawlError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page = 0;
        loop {
            page += 1;
            let listing = self.fetch_page(container_id, page, page_token.take()).await?;
            entries.extend(listing.entries);
            match listing.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(entries)
    }

    /// The page token only advances once a page has been fetched successfully.
    async fn fetch_page(
        &self,
        container_id: &str,
        page: usize,
        page_token: Option<String>,
    ) -> Result<ListingPage, CrawlError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.lister.list_page(container_id, page_token.clone()).await {
                Ok(listing) => return Ok(listing),
                Err(source) if attempt >= self.retry.max_attempts => {
                    return Err(CrawlError::PageFailed {
                        container_id: container_id.to_string(),
                        page,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        container_id,
                        page,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "Listing page failed, retrying..."
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn classify_children(entries: Vec<RemoteEntry>, parent_path: &[String]) -> Vec<Work> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let kind = entry.kind()?;
            let mut path = parent_path.to_vec();
            path.push(entry.name.clone());
            Some(match kind {
                NodeKind::Container => Work::Visit {
                    container_id: entry.id,
                    path,
                },
                NodeKind::Leaf => Work::Emit(RemoteNode {
                    id: entry.id,
                    name: entry.name,
                    kind,
                    path,
                }),
            })
        })
        .collect()
}

/// Build the crawl table: `name`, `level_0..level_{D-1}`, `link`, `path_preview`,
/// where `D` is the deepest path. Shorter paths are padded with `""`.
pub fn build_level_table(leaves: &[RemoteNode]) -> FlatTable {
    let depth = leaves.iter().map(|leaf| leaf.path.len()).max().unwrap_or(0);
    let mut columns = vec![NAME_COLUMN.to_string()];
    columns.extend((0..depth).map(level_column));
    columns.push(LINK_COLUMN.to_string());
    columns.push(PATH_PREVIEW_COLUMN.to_string());

    let records = leaves
        .iter()
        .map(|leaf| {
            let mut record = FlatRecord::new();
            record.insert(NAME_COLUMN, Value::String(leaf.name.clone()));
            for index in 0..depth {
                let part = leaf.path.get(index).cloned().unwrap_or_default();
                record.insert(level_column(index), Value::String(part));
            }
            record.insert(LINK_COLUMN, Value::String(leaf.link()));
            record.insert(PATH_PREVIEW_COLUMN, Value::String(leaf.path_preview()));
            record
        })
        .collect();
    FlatTable::with_columns(columns, records)
}

/// The deepest path seen, as a worked example of what each level column means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelsExample {
    pub parts: Vec<String>,
}

impl LevelsExample {
    /// Picks the first of the longest paths; `None` when there are no leaves.
    pub fn pick(leaves: &[RemoteNode]) -> Option<Self> {
        let mut best: Option<&RemoteNode> = None;
        for leaf in leaves {
            if best.map_or(true, |current| leaf.path.len() > current.path.len()) {
                best = Some(leaf);
            }
        }
        best.map(|leaf| LevelsExample {
            parts: leaf.path.clone(),
        })
    }
}

impl fmt::Display for LevelsExample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, part) in self.parts.iter().enumerate() {
            writeln!(f, "Level_{index}: {part}")?;
        }
        write!(f, "The last level corresponds to the image file name.")
    }
}

/// Tracks which scan roots have already shown their levels example, so the
/// example is shown once per root rather than once per run.
#[derive(Debug, Default)]
pub struct ExampleGate {
    shown: HashSet<String>,
}

impl ExampleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time `root_id` is seen.
    pub fn first_sight(&mut self, root_id: &str) -> bool {
        self.shown.insert(root_id.to_string())
    }
}
