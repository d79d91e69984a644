//! Turning CLI inputs into tables and pending files, and writing tables out.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use harvest_core::config::Config;
use harvest_core::contract::{PendingFile, TreeLister};
use harvest_core::crawl::{build_level_table, Crawler, ExampleGate, LevelsExample, PageRetry};
use harvest_core::flatten::flatten_document;
use harvest_core::record::FlatTable;
use harvest_core::shape::shape;
use harvest_core::tabular::{read_csv, write_csv};
use tracing::{debug, info};

/// Crawl every root (duplicates skipped) into one level table, printing each
/// root's levels example to stderr the first time that root is crawled.
pub async fn crawl_roots<L: TreeLister>(
    lister: L,
    config: &Config,
    roots: &[String],
) -> Result<FlatTable> {
    let crawler = Crawler::new(lister, PageRetry::from(&config.crawl));
    let mut gate = ExampleGate::new();
    let mut leaves = Vec::new();
    for root in roots {
        if !gate.first_sight(root) {
            debug!(root_id = %root, "Root given twice, skipping");
            continue;
        }
        let found = crawler
            .crawl(root)
            .await
            .with_context(|| format!("Crawl of root {root} failed"))?;
        info!(root_id = %root, images = found.len(), "Root crawled");
        // stdout carries the table.
        match LevelsExample::pick(&found) {
            Some(example) => eprintln!("Levels example for {root}:\n{example}\n"),
            None => eprintln!("No images found under {root}.\n"),
        }
        leaves.extend(found);
    }
    Ok(build_level_table(&leaves))
}

pub fn flatten_file(input: &Path) -> Result<FlatTable> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    flatten_document(&bytes).with_context(|| format!("Failed to flatten {}", input.display()))
}

pub fn load_table(input: &Path) -> Result<FlatTable> {
    let file = fs::File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    read_csv(file).with_context(|| format!("Failed to read CSV {}", input.display()))
}

/// Apply the configured output mapping, if any.
pub fn apply_output(table: FlatTable, config: &Config) -> FlatTable {
    match &config.output {
        Some(spec) => shape(&table, spec),
        None => table,
    }
}

/// Write `table` as CSV to `out`, or to stdout when no path is given.
pub fn write_table(table: &FlatTable, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_csv(table, file)?;
            info!(path = %path.display(), rows = table.len(), "Table written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            write_csv(table, &mut handle)?;
            handle.flush()?;
        }
    }
    Ok(())
}

pub fn read_pending(path: &Path) -> Result<PendingFile> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;
    Ok(PendingFile::new(filename, bytes))
}

/// `*.csv` files directly inside `dir`, sorted by name.
pub fn csv_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}
