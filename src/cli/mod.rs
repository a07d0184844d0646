use anyhow::Result;
use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{self, EventConfig, OverwritePolicy};
use crate::core::{merge_record, shape_for_event, MergeDecision, VideoRecord};
use crate::fetch::{ListEntry, MetadataSource, YtDlpSource};
use crate::repo::GitRepo;
use crate::store::{Bookkeeping, EventState, DONE_FILE, MINIMAL_DONE_FILE};

#[derive(Parser)]
#[command(name = "confscrape")]
#[command(about = "Scrape conference talk metadata into an archival repository")]
#[command(version)]
pub struct Cli {
    /// Events configuration file
    #[arg(value_name = "EVENTS_FILE", default_value = "events.yml")]
    pub events_file: PathBuf,

    /// Override the repository directory from the events file
    #[arg(short, long)]
    pub repo_dir: Option<PathBuf>,

    /// Re-process events already listed in the done file
    #[arg(long)]
    pub force: bool,

    /// Create a git branch and commit per event
    #[arg(long)]
    pub commit: bool,

    /// Path to the yt-dlp binary
    #[arg(long, default_value = "yt-dlp")]
    pub ytdlp: PathBuf,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        let started = Instant::now();

        // A malformed events file aborts before any fetch or write happens.
        let events_file = config::load_events(&self.events_file)?;
        let repo_dir = self
            .repo_dir
            .clone()
            .unwrap_or_else(|| events_file.repo_dir.clone());

        let source = YtDlpSource::with_binary(self.ytdlp.clone());
        match source.version().await {
            Ok(version) => debug!("yt-dlp version: {version}"),
            Err(err) => warn!("could not determine yt-dlp version: {err}"),
        }

        let book_dir = self
            .events_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let mut done = Bookkeeping::load(&book_dir.join(DONE_FILE))?;
        let mut minimal_done = Bookkeeping::load(&book_dir.join(MINIMAL_DONE_FILE))?;

        let git = self.commit.then(|| GitRepo::new(repo_dir.clone()));

        for event in &events_file.events {
            if skip_done_event(event, &done, self.force) {
                info!("event {} already done, skipping", event.dir);
                continue;
            }

            if let Some(git) = &git {
                if let Err(err) = git.create_branch(&event.dir).await {
                    warn!("event {} skipped: {err}", event.dir);
                    continue;
                }
            }

            let summary = match process_event(event, &repo_dir, &source).await {
                Ok(summary) => summary,
                Err(err) => {
                    warn!("event {} failed: {err}", event.dir);
                    continue;
                }
            };
            info!(
                "event {} done: {} added, {} replaced, {} fields updated, {} new skipped, {} fetch failures",
                event.dir,
                summary.added,
                summary.replaced,
                summary.fields_updated,
                summary.skipped_new,
                summary.failed_fetches,
            );

            if let Some(git) = &git {
                if let Err(err) = git.commit_event(event).await {
                    warn!("event {} not committed: {err}", event.dir);
                    continue;
                }
            }

            let bookkeeping = if event.minimal_download {
                minimal_done.record(event)
            } else {
                done.record(event)
            };
            if let Err(err) = bookkeeping {
                warn!("could not update bookkeeping for {}: {err}", event.dir);
            }
        }

        debug!("run finished in {:?}", started.elapsed());
        Ok(())
    }
}

/// Events already listed in the done file are skipped, unless the run is
/// forced or the event's policy replaces records wholesale anyway.
pub fn skip_done_event(event: &EventConfig, done: &Bookkeeping, force: bool) -> bool {
    done.contains(&event.dir) && !force && event.policy() != OverwritePolicy::All
}

/// Per-event merge totals, reported at the end of each event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventSummary {
    pub added: usize,
    pub replaced: usize,
    pub fields_updated: usize,
    pub skipped_new: usize,
    pub untouched: usize,
    pub failed_fetches: usize,
}

/// Scrape one event: expand its source URLs, fetch each video's metadata,
/// merge into the persisted records, and write the event directory back.
/// A per-video fetch failure is logged and skipped; the existing record for
/// that video, if any, stays untouched.
pub async fn process_event(
    event: &EventConfig,
    repo_dir: &Path,
    source: &dyn MetadataSource,
) -> Result<EventSummary> {
    let event_dir = repo_dir.join(&event.dir);
    let mut state = EventState::load(&event_dir)?;
    let had_prior_records = state.had_prior_records();
    let policy = event.policy();

    // Dedup across the event's source lists, first occurrence wins.
    let mut seen = HashSet::new();
    let mut entries: Vec<ListEntry> = Vec::new();
    for url in event.youtube_list.urls() {
        match source.expand(url).await {
            Ok(expanded) => {
                for entry in expanded {
                    if seen.insert(entry.id.clone()) {
                        entries.push(entry);
                    }
                }
            }
            Err(err) => warn!("could not expand {url}: {err}"),
        }
    }
    info!("event {}: {} videos to fetch", event.dir, entries.len());

    let mut summary = EventSummary::default();
    for entry in &entries {
        let info = match source.fetch(entry).await {
            Ok(info) => info,
            Err(err) => {
                warn!(
                    "fetch failed for {}, existing record left untouched: {err}",
                    entry.id
                );
                summary.failed_fetches += 1;
                continue;
            }
        };

        let mut record = VideoRecord::from_ytdlp(&entry.id, &info);
        if event.minimal_download {
            record.retain_minimal();
        } else {
            shape_for_event(&mut record, event);
        }

        match merge_record(&mut state.records, record, &policy, had_prior_records) {
            MergeDecision::AddedNew => summary.added += 1,
            MergeDecision::Replaced => {
                // a wholesale replacement is renamed after its fresh title
                state.forget_stem(&entry.id);
                summary.replaced += 1;
            }
            MergeDecision::FieldsUpdated(n) => summary.fields_updated += n,
            MergeDecision::SkippedNew => {
                debug!("new video {} skipped by overwrite policy", entry.id);
                summary.skipped_new += 1;
            }
            MergeDecision::Untouched => summary.untouched += 1,
        }
    }

    state.save(&event.title)?;
    Ok(summary)
}
