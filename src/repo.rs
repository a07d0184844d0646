use anyhow::{bail, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::config::EventConfig;

const DEFAULT_BRANCH: &str = "master";

/// Thin wrapper over the git CLI for the archival repository: one branch
/// and one commit per scraped event.
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    async fn git(&self, args: &[&str]) -> Result<()> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    /// Create the event's branch off the default branch. Fails when the
    /// branch already exists, which callers treat as "skip this event".
    pub async fn create_branch(&self, name: &str) -> Result<()> {
        self.git(&["checkout", DEFAULT_BRANCH]).await?;
        self.git(&["checkout", "-b", name]).await?;
        debug!("branch {name} created");
        Ok(())
    }

    /// Commit the event directory on its branch, push minimal-download
    /// branches for review, and return to the default branch.
    pub async fn commit_event(&self, event: &EventConfig) -> Result<()> {
        self.git(&["checkout", &event.dir]).await?;
        self.git(&["add", &event.dir]).await?;
        self.git(&["commit", "-m", &commit_message(event)]).await?;
        if event.minimal_download {
            self.git(&["push", "--set-upstream", "origin", &event.dir])
                .await?;
        }
        self.git(&["checkout", DEFAULT_BRANCH]).await?;
        debug!("event {} committed", event.dir);
        Ok(())
    }
}

pub fn commit_message(event: &EventConfig) -> String {
    match (event.minimal_download, event.issue) {
        (true, Some(issue)) => format!(
            "Scraped {}\n\nminimal download executed for #{issue}",
            event.dir
        ),
        (false, Some(issue)) => format!("Scraped {}\n\nFixes #{issue}", event.dir),
        (_, None) => format!("Scraped {}", event.dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_message_references_issue() {
        let event = EventConfig {
            dir: "pycones-2024".into(),
            issue: Some(321),
            ..Default::default()
        };
        assert_eq!(
            commit_message(&event),
            "Scraped pycones-2024\n\nFixes #321"
        );
    }

    #[test]
    fn commit_message_minimal_variant() {
        let event = EventConfig {
            dir: "pycones-2024".into(),
            issue: Some(321),
            minimal_download: true,
            ..Default::default()
        };
        assert_eq!(
            commit_message(&event),
            "Scraped pycones-2024\n\nminimal download executed for #321"
        );
    }

    #[test]
    fn commit_message_without_issue() {
        let event = EventConfig {
            dir: "pycones-2024".into(),
            ..Default::default()
        };
        assert_eq!(commit_message(&event), "Scraped pycones-2024");
    }
}
