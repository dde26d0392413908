//! Error types for provisioning operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, installing or copying tools.
///
/// Configuration errors ([`Error::UnknownTool`], [`Error::UnsupportedPlatform`],
/// [`Error::UnsupportedContext`], [`Error::Catalog`] and the checksum format
/// errors) point at a catalog or caller bug and should not be retried.
#[derive(Error, Debug)]
pub enum Error {
    /// The tool is not present in the catalog.
    #[error("tool {0} is not defined")]
    UnknownTool(String),

    /// The tool has no source for the requested platform.
    #[error("tool {tool} is not configured for platform {platform}")]
    UnsupportedPlatform {
        /// The tool name.
        tool: String,
        /// The requested platform.
        platform: String,
    },

    /// The tool is not declared for the requested installation context.
    #[error("tool {tool} is not meant to be installed for {context} use")]
    UnsupportedContext {
        /// The tool name.
        tool: String,
        /// `local` or `docker`.
        context: &'static str,
    },

    /// A platform string is not of the form `<os>.<arch>`.
    #[error("invalid platform {0:?}, expected <os>.<arch>")]
    InvalidPlatform(String),

    /// A checksum string is not of the form `<algorithm>:<hex>`.
    #[error("incorrect checksum format: {0}")]
    InvalidChecksum(String),

    /// The checksum names an algorithm we cannot compute.
    #[error("unsupported hashing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The catalog file could not be read, parsed or validated.
    #[error("invalid catalog {path}: {message}")]
    Catalog {
        /// The catalog file.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// The download could not be started or read.
    #[error("failed to fetch {url} for tool {tool}: {source}")]
    Fetch {
        /// The tool name.
        tool: String,
        /// The download URL.
        url: String,
        /// The transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The downloaded payload does not hash to the declared digest.
    #[error("checksum does not match for tool {tool}, expected: {expected}, actual: {actual}, url: {url}")]
    ChecksumMismatch {
        /// The tool name.
        tool: String,
        /// The digest from the catalog.
        expected: String,
        /// The digest of the received bytes.
        actual: String,
        /// The download URL.
        url: String,
    },

    /// The archive is corrupt or uses a feature we do not unpack.
    #[error("failed to unpack {path}: {message}")]
    Archive {
        /// The entry (or archive) being processed.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A published link does not resolve after creation.
    #[error("published binary {destination} does not resolve: {source}")]
    Publish {
        /// The destination link.
        destination: PathBuf,
        /// The resolution error.
        #[source]
        source: std::io::Error,
    },

    /// An installation failed after the download was started. Wraps the
    /// transport, integrity, extraction or publication error.
    #[error("failed to install {tool} {version} for {platform} from {url}: {source}")]
    Install {
        /// The tool name.
        tool: String,
        /// The tool version.
        version: String,
        /// The download URL.
        url: String,
        /// The target platform.
        platform: String,
        /// What went wrong.
        #[source]
        source: Box<Error>,
    },

    /// A requested binary name is not provided by the tool.
    #[error("the binary {binary:?} doesn't exist for the requested tool {tool:?}")]
    UnknownBinary {
        /// The tool name.
        tool: String,
        /// The requested base name.
        binary: String,
    },

    /// Filesystem error with the path it happened on.
    #[error("{path}: {source}")]
    Io {
        /// The path being operated on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// No user cache directory could be determined.
    #[error("could not determine the user cache directory")]
    Home,
}

impl Error {
    /// Create an unsupported platform error.
    #[must_use]
    pub fn unsupported_platform(tool: impl Into<String>, platform: impl ToString) -> Self {
        Self::UnsupportedPlatform {
            tool: tool.into(),
            platform: platform.to_string(),
        }
    }

    /// Create an archive error.
    #[must_use]
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a catalog error.
    #[must_use]
    pub fn catalog(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Catalog {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The underlying error of an [`Error::Install`], or `self`.
    #[must_use]
    pub fn cause(&self) -> &Error {
        match self {
            Self::Install { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Whether the error points at a catalog or caller bug rather than a
    /// transient condition.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool(_)
                | Self::UnsupportedPlatform { .. }
                | Self::UnsupportedContext { .. }
                | Self::InvalidPlatform(_)
                | Self::InvalidChecksum(_)
                | Self::UnsupportedAlgorithm(_)
                | Self::Catalog { .. }
        )
    }
}

/// Attaches the offending path to `std::io::Error`s.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
