//! Shared store of persisted output files

use crate::error::{Result, SandboxError};
use crate::types::{Artifact, FileLink, FileUpload};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Filename marker of the long-lived tier
pub const LONG_LIVED_MARKER: &str = "-long";

/// Path prefix under which the static-file reader serves the store
const SERVED_PREFIX: [&str; 2] = ["jupyter", "files"];

/// Retention tier of a persisted file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Short,
    Long,
}

impl Lifetime {
    /// The tier is a property of the name alone
    pub fn of_filename(name: &str) -> Self {
        if name.contains(LONG_LIVED_MARKER) {
            Lifetime::Long
        } else {
            Lifetime::Short
        }
    }
}

/// How long each tier is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub short: Duration,
    pub long: Duration,
}

impl TtlPolicy {
    pub fn ttl(&self, lifetime: Lifetime) -> Duration {
        match lifetime {
            Lifetime::Short => self.short,
            Lifetime::Long => self.long,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(20 * 60),
            long: Duration::from_secs(2880 * 60),
        }
    }
}

/// Flat directory of write-once files, each name carrying a random id
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    base_url: Url,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: &str) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let base_url = Url::parse(public_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SandboxError::Config(format!(
                "Public URL cannot serve files: {}",
                public_url
            )));
        }
        Ok(Self { dir, base_url })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a captured artifact in the short-lived tier
    pub async fn persist(&self, artifact: &Artifact) -> Result<FileLink> {
        let bytes = artifact.decode()?;
        let name = persisted_name(&artifact.filename, Lifetime::Short);
        let url = self.write(&name, &bytes).await?;
        Ok(FileLink {
            filename: artifact.filename.clone(),
            url,
        })
    }

    /// Store an uploaded file and return the URL it is served from
    pub async fn upload(&self, upload: &FileUpload, lifetime: Lifetime) -> Result<String> {
        let bytes = upload.decoded_content()?;
        let name = persisted_name(&upload.full_filename(), lifetime);
        self.write(&name, &bytes).await
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<String> {
        tokio::fs::write(self.dir.join(name), bytes).await?;
        tracing::debug!(file = %name, size = bytes.len(), "Persisted file");
        Ok(self.url_for(name))
    }

    /// URL of a stored file, with the name percent-encoded
    pub fn url_for(&self, name: &str) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(SERVED_PREFIX).push(name);
        }
        url.to_string()
    }
}

/// `{stem}-{id}.{ext}`, with `-long` before the id for the long tier
pub fn persisted_name(filename: &str, lifetime: Lifetime) -> String {
    let filename = filename.replace(['/', '\\'], "_");
    let id = uuid::Uuid::new_v4().simple().to_string();
    let marker = match lifetime {
        Lifetime::Short => "",
        Lifetime::Long => LONG_LIVED_MARKER,
    };
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{}{}-{}.{}", stem, marker, id, ext),
        None => format!("{}{}-{}", filename, marker, id),
    }
}
