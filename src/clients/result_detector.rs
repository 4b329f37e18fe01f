// Trade result detection collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::config::ResultsConfig;
use crate::core::types::Outcome;
use crate::error::{BotError, BotResult};

/// Polled at a fixed interval by the result monitor
#[async_trait]
pub trait ResultDetector: Send + Sync {
    /// A newly observed outcome, if any
    async fn poll(&self) -> BotResult<Option<Outcome>>;

    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }
}

/// Classify a scraped result label such as `+$1.85`, `$0` or `Loss`
pub fn classify_result_text(text: &str) -> Option<Outcome> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();

    if text.starts_with('+') || lower.contains("win") || lower.contains("profit") {
        return Some(Outcome::Win);
    }
    if text.starts_with('-') || text == "$0" || lower.contains("loss") || lower.contains("lose") {
        return Some(Outcome::Loss);
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    content: String,
}

/// Watches a text file that some other process (a screen scraper, a
/// broker webhook) rewrites with the latest result.
///
/// The first poll only records a baseline so a stale result left over from a
/// previous run is never reported. After that, every change to the file is
/// classified from its last non-empty line.
#[derive(Debug)]
pub struct FileResultDetector {
    path: PathBuf,
    seen: Mutex<Option<Option<Fingerprint>>>, // Outer None: no baseline yet
}

impl FileResultDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn fingerprint(&self) -> BotResult<Option<Fingerprint>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BotError::ResultDetection(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        let modified = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        Ok(Some(Fingerprint { modified, content }))
    }
}

#[async_trait]
impl ResultDetector for FileResultDetector {
    async fn poll(&self) -> BotResult<Option<Outcome>> {
        let current = self.fingerprint().await?;

        let previous = self.seen.lock().replace(current.clone());
        let Some(previous) = previous else {
            debug!("Result file baseline taken: {}", self.path.display());
            return Ok(None);
        };
        if previous == current {
            return Ok(None);
        }

        Ok(current.and_then(|fp| {
            fp.content
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .and_then(classify_result_text)
        }))
    }

    fn name(&self) -> &str {
        "file"
    }

    fn is_available(&self) -> bool {
        self.path.parent().map_or(true, |dir| dir.as_os_str().is_empty() || dir.exists())
    }
}

/// Reports nothing; used when no result source is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

#[async_trait]
impl ResultDetector for NullDetector {
    async fn poll(&self) -> BotResult<Option<Outcome>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }
}

pub fn build_detector(config: &ResultsConfig) -> Box<dyn ResultDetector> {
    match &config.source_file {
        Some(path) => Box::new(FileResultDetector::new(path.clone())),
        None => Box::new(NullDetector),
    }
}
