//! Output side: where successful payloads go.
//!
//! The fetcher calls [`PayloadSink::write`] synchronously once a payload has
//! passed validation. Any error from the sink turns the attempt into a
//! retryable failure, so a full disk or a permission problem is retried with a
//! fresh identity instead of being silently dropped.

use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

use crate::url_model::{derive_filename, sanitize_filename};

/// Temporary file suffix used before the file is moved into place.
pub const TEMP_SUFFIX: &str = ".part";

/// Numbered alternatives tried once the plain name is taken (`clip-1.mp4`, `clip-2.mp4`, ...).
const MAX_NAME_SUFFIX: u32 = 9_999;

/// A validated response body ready to be persisted.
#[derive(Debug, Clone)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Preferred output name from resolver metadata.
    pub name_hint: Option<String>,
}

/// Persists payloads. Implementations must be callable from many blocking threads at once.
pub trait PayloadSink: Send + Sync + 'static {
    /// Stores `payload` fetched for `source_url`; returns where it went.
    fn write(&self, source_url: &str, payload: &Payload) -> Result<PathBuf>;
}

/// `clip.mp4` for `n == 0`, else `clip-<n>.mp4`.
pub fn numbered_path(path: &Path, n: u32) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}-{}", stem, n),
    };
    path.with_file_name(name)
}

/// Writes each payload to `<dir>/<name>` via a synced, uniquely named `.part`
/// file. The file is moved into place without replacing an existing one; a
/// taken name gets a numeric suffix, so two items never share an output file
/// and a crash never leaves a truncated file under a final name.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates `dir` (and parents) if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path for a payload: the sanitized name hint, else a name derived from the URL.
    pub fn target_path(&self, source_url: &str, payload: &Payload) -> PathBuf {
        let name = payload
            .name_hint
            .as_deref()
            .map(sanitize_filename)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| derive_filename(source_url, payload.content_type.as_deref()));
        self.dir.join(name)
    }
}

impl PayloadSink for DirectorySink {
    fn write(&self, source_url: &str, payload: &Payload) -> Result<PathBuf> {
        let final_path = self.target_path(source_url, payload);

        // Dropping the temp file on an early return removes it.
        let mut tmp = tempfile::Builder::new()
            .prefix(".pbd-")
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.dir)
            .with_context(|| format!("create temp file in {}", self.dir.display()))?;
        tmp.write_all(&payload.bytes)
            .with_context(|| format!("write {}", tmp.path().display()))?;
        tmp.as_file().sync_all().context("sync payload")?;

        persist_unique(tmp, &final_path)
    }
}

/// Moves `tmp` to the first free name among `path`, `path-1`, `path-2`, ...
fn persist_unique(mut tmp: NamedTempFile, path: &Path) -> Result<PathBuf> {
    for n in 0..=MAX_NAME_SUFFIX {
        let candidate = numbered_path(path, n);
        match tmp.persist_noclobber(&candidate) {
            Ok(_) => {
                if n > 0 {
                    tracing::debug!(
                        wanted = %path.display(),
                        path = %candidate.display(),
                        "name taken; using numbered name"
                    );
                }
                return Ok(candidate);
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => {
                return Err(e.error).with_context(|| {
                    format!("failed to move payload to {}", candidate.display())
                })
            }
        }
    }
    anyhow::bail!("no free name for {} after {} tries", path.display(), MAX_NAME_SUFFIX)
}

/// Record of a payload accepted by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPayload {
    pub source_url: String,
    pub len: usize,
    pub name_hint: Option<String>,
}

/// Keeps only a record of each payload (dry runs and tests); the bytes are dropped.
#[derive(Debug, Default)]
pub struct MemorySink {
    written: Mutex<Vec<WrittenPayload>>,
}

impl MemorySink {
    pub fn written(&self) -> Vec<WrittenPayload> {
        self.written
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.written.lock().map(|w| w.is_empty()).unwrap_or(true)
    }
}

impl PayloadSink for MemorySink {
    fn write(&self, source_url: &str, payload: &Payload) -> Result<PathBuf> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?;
        written.push(WrittenPayload {
            source_url: source_url.to_string(),
            len: payload.bytes.len(),
            name_hint: payload.name_hint.clone(),
        });
        Ok(PathBuf::from(source_url))
    }
}
