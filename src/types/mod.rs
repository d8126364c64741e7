use std::fmt;
use std::path::Path;

use bytes::Bytes;

/// Container/codec family of an ingested byte stream.
///
/// `None` means "undetermined or unsupported" and is only ever reported
/// together with a failed start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MediaFileType {
    #[default]
    None,
    Wav,
    Mp3,
    Flac,
}

impl MediaFileType {
    /// Detects the type from a (resolved) URL suffix.
    ///
    /// Query string and fragment are not part of the suffix; the match is
    /// ASCII case-insensitive.
    pub fn from_url(url: &str) -> Self {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        Self::from_suffix(&url[..end])
    }

    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => Self::None,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "wav" => Self::Wav,
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            _ => Self::None,
        }
    }

    fn from_suffix(path: &str) -> Self {
        // Only the last path segment may carry the extension.
        let segment = path.rsplit('/').next().unwrap_or(path);
        match segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => Self::None,
        }
    }

    pub fn is_supported(self) -> bool {
        self != Self::None
    }

    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Wav => Some("wav"),
            Self::Mp3 => Some("mp3"),
            Self::Flac => Some("flac"),
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::None => "application/octet-stream",
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Flac => "audio/flac",
        }
    }
}

impl fmt::Display for MediaFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension().unwrap_or("none"))
    }
}

/// A pre-loaded, immutable audio file held in memory.
///
/// The reader only ever reads from `data`; cloning is cheap (shared `Bytes`).
#[derive(Clone, Debug)]
pub struct MediaFile {
    pub data: Bytes,
    pub file_type: MediaFileType,
}

impl MediaFile {
    pub fn new(data: impl Into<Bytes>, file_type: MediaFileType) -> Self {
        Self {
            data: data.into(),
            file_type,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Outcome of a single reader step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioReaderState {
    Reading,
    Finished,
    Failed,
}

impl AudioReaderState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Reading)
    }
}
