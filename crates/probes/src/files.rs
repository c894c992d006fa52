//! Destination naming and storage for downloads

use crate::common::ProbeError;
use crate::constants::MAX_NAME_SUFFIX;

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWrite;
use tracing::{debug, trace};
use url::Url;

/// Writable destination of a transfer
pub type FileSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Name used when neither the headers nor the URL provide one
pub const FALLBACK_STEM: &str = "index";

/// Storage backend for downloaded files
#[async_trait]
pub trait FileManager: Send + Sync + std::fmt::Debug {
    /// Choose a destination name, or `None` if no safe name can be derived
    async fn resolve_file_name(
        &self,
        url: &Url,
        content_disposition: Option<&str>,
        content_type: Option<&str>,
    ) -> Option<String>;

    /// Create (or truncate) the named file
    async fn create(&self, name: &str) -> Result<FileSink, ProbeError>;

    async fn exists(&self, name: &str) -> bool;

    /// Delete the named file, returning whether it was removed
    async fn delete(&self, name: &str) -> Result<bool, ProbeError>;
}

/// Files in one local directory
#[derive(Debug, Clone)]
pub struct LocalFileManager {
    directory: PathBuf,
}

impl LocalFileManager {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    async fn is_taken(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path_of(name))
            .await
            .unwrap_or(false)
    }
}

#[async_trait]
impl FileManager for LocalFileManager {
    async fn resolve_file_name(
        &self,
        url: &Url,
        content_disposition: Option<&str>,
        content_type: Option<&str>,
    ) -> Option<String> {
        let base = candidate_name(url, content_disposition, content_type)?;
        if !self.is_taken(&base).await {
            return Some(base);
        }

        let (stem, extension) = split_extension(&base);
        for n in 1..=MAX_NAME_SUFFIX {
            let name = match extension {
                Some(ext) => format!("{}_{}.{}", stem, n, ext),
                None => format!("{}_{}", stem, n),
            };
            if !self.is_taken(&name).await {
                trace!("{} exists, using {}", base, name);
                return Some(name);
            }
        }

        debug!("No free name derived from {} in {}", base, self.directory.display());
        None
    }

    async fn create(&self, name: &str) -> Result<FileSink, ProbeError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| ProbeError::FileSystem(format!("{}: {}", self.directory.display(), e)))?;

        let path = self.path_of(name);
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ProbeError::FileSystem(format!("{}: {}", path.display(), e)))?;
        Ok(Box::new(file))
    }

    async fn exists(&self, name: &str) -> bool {
        self.is_taken(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool, ProbeError> {
        let path = self.path_of(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProbeError::FileSystem(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Name from the headers, then the URL path, then a typed fallback
pub fn candidate_name(
    url: &Url,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
) -> Option<String> {
    if let Some(name) = content_disposition.and_then(disposition_file_name) {
        if let Some(name) = sanitize_file_name(&name) {
            return Some(name);
        }
    }

    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        });
    if let Some(name) = segment.as_deref().and_then(sanitize_file_name) {
        return Some(name);
    }

    let extension = content_type.and_then(extension_for);
    Some(match extension {
        Some(ext) => format!("{}.{}", FALLBACK_STEM, ext),
        None => FALLBACK_STEM.to_string(),
    })
}

/// Extract the file name parameter of a `Content-Disposition` value.
///
/// The extended `filename*` form wins over `filename`.
pub fn disposition_file_name(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';') {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();

        if key == "filename*" {
            // charset'language'percent-encoded
            let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
            extended = urlencoding::decode(encoded.trim_matches('"'))
                .ok()
                .map(|decoded| decoded.into_owned());
        } else if key == "filename" {
            plain = Some(raw.trim_matches('"').to_string());
        }
    }

    extended.or(plain).filter(|name| !name.trim().is_empty())
}

/// Reduce `name` to a single safe path component
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    mime_guess::get_mime_extensions_str(&essence).and_then(|extensions| extensions.first().copied())
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
