//! Source directory listing and content fetching.
//!
//! A source directory is an HTTP(S) URL. A JSON response is a structured
//! listing (an array of locator strings); anything else is treated as a
//! hyperlink document and every anchor that does not point at a
//! sub-directory becomes a candidate file.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tempfile::TempPath;
use ureq::Agent;
use url::Url;

use mirror_core::SourceEntry;

use crate::error::{EntryError, SyncError};
use crate::http;

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Where the files to mirror come from.
pub trait Source: Send + Sync {
    /// Human-readable identity, used in logs and summaries.
    fn describe(&self) -> String;

    /// Every entry currently visible in the source directory.
    fn list(&self) -> Result<Vec<SourceEntry>, SyncError>;

    /// Download one entry into a fresh transient file.
    fn fetch(&self, entry: &SourceEntry) -> Result<FetchedFile, EntryError>;
}

/// A downloaded file in a uniquely named transient location.
///
/// The file is deleted when this value is dropped, whatever path the caller
/// leaves by.
#[derive(Debug)]
pub struct FetchedFile {
    path: TempPath,
    size: u64,
}

impl FetchedFile {
    /// Stream `reader` into a new temp file under `temp_dir` (or the OS
    /// temp dir).
    pub fn write_from<R: std::io::Read>(
        mut reader: R,
        temp_dir: Option<&Path>,
    ) -> Result<Self, EntryError> {
        let dir = temp_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let local_io = |source| EntryError::LocalIo {
            path: dir.clone(),
            source,
        };

        let mut file = tempfile::Builder::new()
            .prefix("mirror-")
            .tempfile_in(&dir)
            .map_err(local_io)?;
        let size = std::io::copy(&mut reader, &mut file).map_err(local_io)?;
        file.flush().map_err(local_io)?;

        Ok(Self {
            path: file.into_temp_path(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

// ---------------------------------------------------------------------------
// HTTP source
// ---------------------------------------------------------------------------

/// A published HTTP(S) directory.
#[derive(Debug, Clone)]
pub struct HttpSource {
    agent: Agent,
    url: Url,
    temp_dir: Option<PathBuf>,
}

impl HttpSource {
    /// Returns `SyncError::UnsupportedSource` for any scheme other than
    /// `http` / `https`.
    pub fn new(agent: Agent, url: Url) -> Result<Self, SyncError> {
        if !matches!(url.scheme(), "http" | "https") {
            tracing::error!(url = %url, "unsupported source directory");
            return Err(SyncError::UnsupportedSource {
                url: url.to_string(),
            });
        }
        Ok(Self {
            agent,
            url,
            temp_dir: None,
        })
    }

    /// Place downloads under `dir` instead of the OS temp dir.
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Source for HttpSource {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    fn list(&self) -> Result<Vec<SourceEntry>, SyncError> {
        let unreachable = |reason: String| SyncError::SourceUnreachable {
            url: self.url.to_string(),
            reason,
        };

        let response = self
            .agent
            .get(self.url.as_str())
            .call()
            .map_err(|e| unreachable(http::describe(e)))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_string();
        // Relative links resolve against where redirects landed.
        let base = Url::parse(response.get_url()).unwrap_or_else(|_| self.url.clone());
        let body = response
            .into_string()
            .map_err(|e| unreachable(e.to_string()))?;

        let entries = parse_listing(&content_type, &body, &base)?;
        tracing::info!(source = %self.url, files = entries.len(), "listed source directory");
        Ok(entries)
    }

    fn fetch(&self, entry: &SourceEntry) -> Result<FetchedFile, EntryError> {
        let response = self
            .agent
            .get(entry.locator.as_str())
            .call()
            .map_err(|e| EntryError::Fetch {
                locator: entry.locator.to_string(),
                reason: http::describe(e),
            })?;
        let fetched = FetchedFile::write_from(response.into_reader(), self.temp_dir.as_deref())?;
        tracing::debug!(
            locator = %entry.locator,
            bytes = fetched.size(),
            "fetched source file"
        );
        Ok(fetched)
    }
}

// ---------------------------------------------------------------------------
// Listing parsers
// ---------------------------------------------------------------------------

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("anchor pattern is valid")
});

/// Parse a listing response body into source entries.
///
/// `content_type` selects the parser; `base` is the source directory URL the
/// listing was fetched from.
pub fn parse_listing(
    content_type: &str,
    body: &str,
    base: &Url,
) -> Result<Vec<SourceEntry>, SyncError> {
    let locators = if content_type.to_ascii_lowercase().contains("json") {
        json_locators(body, base)?
    } else {
        html_locators(body, base)?
    };
    Ok(locators
        .into_iter()
        .filter_map(|locator| {
            let entry = SourceEntry::from_locator(locator.clone());
            if entry.is_none() {
                tracing::warn!(locator = %locator, "skipping locator without a file name");
            }
            entry
        })
        .collect())
}

fn json_locators(body: &str, base: &Url) -> Result<Vec<Url>, SyncError> {
    let raw: Vec<String> =
        serde_json::from_str(body).map_err(|e| SyncError::SourceFormat {
            url: base.to_string(),
            reason: format!("expected a JSON array of file URLs: {e}"),
        })?;

    Ok(raw
        .iter()
        .filter_map(|target| match base.join(target) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(locator = %target, error = %e, "skipping unparseable locator");
                None
            }
        })
        .collect())
}

fn html_locators(body: &str, base: &Url) -> Result<Vec<Url>, SyncError> {
    let hrefs: Vec<String> = ANCHOR_HREF
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| unescape_html(m.as_str().trim()))
        .collect();

    if hrefs.is_empty() {
        return Err(SyncError::SourceFormat {
            url: base.to_string(),
            reason: "no hyperlinks found in directory page".to_string(),
        });
    }

    let mut seen = HashSet::new();
    let mut locators = Vec::new();
    for href in hrefs {
        if !is_file_link(&href) {
            continue;
        }
        let resolved = match base.join(&href) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(href = %href, error = %e, "skipping unparseable link");
                continue;
            }
        };
        if seen.insert(resolved.clone()) {
            locators.push(resolved);
        }
    }
    Ok(locators)
}

/// Links ending in `/` denote sub-directories; query and fragment links are
/// index-page sorting and navigation, not files.
fn is_file_link(href: &str) -> bool {
    !(href.is_empty()
        || href.ends_with('/')
        || href.starts_with('?')
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("javascript:"))
}

fn unescape_html(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
