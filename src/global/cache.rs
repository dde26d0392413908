use std::path::{Path, PathBuf};
use crate::error::{IoContext, Result};
use crate::global::utils::get_global_cache_dir;
use crate::platform::Platform;

/// Where tools are unpacked and where their binaries are published.
///
/// ```text
/// <cache root>/<os>.<arch>/<tool>-<version>/...   unpacked artifacts
/// <cache root>/docker.<arch>/<destination>        docker links
/// <work dir>/<destination>                        local links
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    cache_root: PathBuf,
    work_dir: PathBuf,
}

impl Layout {
    pub fn new(cache_root: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Global cache root and the current working directory.
    pub fn from_env() -> Result<Self> {
        let work_dir = std::env::current_dir().at(".")?;
        Ok(Self::new(get_global_cache_dir()?, work_dir))
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn platform_dir(&self, platform: &Platform) -> PathBuf {
        self.cache_root.join(platform.to_string())
    }

    /// The version-qualified directory holding one unpacked tool.
    pub fn tool_dir(&self, name: &str, version: &str, platform: &Platform) -> PathBuf {
        self.platform_dir(platform).join(tool_dir_name(name, version))
    }

    /// Where the binary for `destination` is published on `platform`.
    pub fn destination(&self, platform: &Platform, destination: &str) -> PathBuf {
        if platform.is_docker() {
            self.platform_dir(platform).join(destination)
        } else {
            self.work_dir.join(destination)
        }
    }

    /// Path of a locally installed binary, e.g. `path_local("bin/go")`.
    pub fn path_local(&self, destination: &str) -> PathBuf {
        self.destination(&Platform::local(), destination)
    }

    /// Path of a binary installed for docker on the host architecture.
    pub fn path_docker(&self, destination: &str) -> PathBuf {
        self.destination(&Platform::docker(), destination)
    }
}

pub fn tool_dir_name(name: &str, version: &str) -> String {
    format!("{name}-{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new("/cache/tooldock", "/work")
    }

    #[test]
    fn test_tool_dir() {
        let dir = layout().tool_dir("go", "1.20.1", &Platform::new("linux", "amd64"));
        assert_eq!(dir, PathBuf::from("/cache/tooldock/linux.amd64/go-1.20.1"));
    }

    #[test]
    fn test_local_destination_is_under_work_dir() {
        let dst = layout().destination(&Platform::new("darwin", "arm64"), "bin/go");
        assert_eq!(dst, PathBuf::from("/work/bin/go"));
        assert_eq!(layout().path_local("bin/go"), PathBuf::from("/work/bin/go"));
    }

    #[test]
    fn test_docker_destination_is_under_cache() {
        let dst = layout().destination(&Platform::new("docker", "amd64"), "bin/gaiad");
        assert_eq!(dst, PathBuf::from("/cache/tooldock/docker.amd64/bin/gaiad"));
        let docker = layout().path_docker("bin/gaiad");
        assert!(docker.starts_with("/cache/tooldock"));
        assert!(docker.ends_with("bin/gaiad"));
    }
}
