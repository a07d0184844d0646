use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("yt-dlp failed for {url}: {stderr}")]
    Tool { url: String, stderr: String },
    #[error("yt-dlp returned invalid JSON for {url}: {source}")]
    InvalidJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One member of an expanded source list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub id: String,
    pub url: String,
}

/// Seam to the external metadata-extraction tool. The production
/// implementation shells out to yt-dlp; tests substitute an in-memory map.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Expand a configured source URL into its member videos, in the order
    /// the remote returns them. A plain video URL yields a single entry.
    async fn expand(&self, url: &str) -> Result<Vec<ListEntry>, FetchError>;

    /// Fetch the raw metadata record for one video.
    async fn fetch(&self, entry: &ListEntry) -> Result<Value, FetchError>;
}

/// Metadata source backed by the yt-dlp binary. Metadata only: nothing is
/// ever downloaded beyond the info JSON.
pub struct YtDlpSource {
    bin: PathBuf,
}

impl YtDlpSource {
    pub fn new() -> Self {
        Self::with_binary(PathBuf::from("yt-dlp"))
    }

    pub fn with_binary(bin: PathBuf) -> Self {
        Self { bin }
    }

    pub async fn version(&self) -> Result<String, FetchError> {
        let stdout = self.run(&["--version"], "--version").await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str], url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("running {} {}", self.bin.display(), args.join(" "));
        let output = Command::new(&self.bin)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                tool: self.bin.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(FetchError::Tool {
                url: url.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataSource for YtDlpSource {
    async fn expand(&self, url: &str) -> Result<Vec<ListEntry>, FetchError> {
        let stdout = self
            .run(
                &["--flat-playlist", "--dump-json", "--no-warnings", url],
                url,
            )
            .await?;
        let stdout = String::from_utf8_lossy(&stdout);

        let mut entries = Vec::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let json: Value = match serde_json::from_str(line) {
                Ok(json) => json,
                Err(err) => {
                    warn!("skipping unparseable playlist entry from {url}: {err}");
                    continue;
                }
            };
            let id = json
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if id.is_empty() {
                // Private and deleted videos come back as null entries.
                warn!("skipping playlist entry without id from {url}");
                continue;
            }
            let video_url = json
                .get("url")
                .or_else(|| json.get("webpage_url"))
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={id}"));
            entries.push(ListEntry { id, url: video_url });
        }
        debug!("expanded {url} into {} videos", entries.len());
        Ok(entries)
    }

    async fn fetch(&self, entry: &ListEntry) -> Result<Value, FetchError> {
        let stdout = self
            .run(
                &[
                    "--dump-single-json",
                    "--skip-download",
                    "--no-playlist",
                    "--no-warnings",
                    &entry.url,
                ],
                &entry.url,
            )
            .await?;
        serde_json::from_slice(&stdout).map_err(|source| FetchError::InvalidJson {
            url: entry.url.clone(),
            source,
        })
    }
}
