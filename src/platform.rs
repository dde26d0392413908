use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Deserializer};
use crate::error::Error;

/// Operating system name used for docker targets, regardless of the host OS.
/// Docker images are always Linux based.
pub const DOCKER_OS: &str = "docker";

/// An installation target: operating system and architecture.
///
/// Written as `<os>.<arch>`, e.g. `linux.amd64` or `docker.arm64`. The same
/// string names the platform directory inside the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The host platform, for tools installed on the developer machine.
    pub fn local() -> Self {
        Self::new(host_os(), host_arch())
    }

    /// The docker platform matching the host architecture.
    pub fn docker() -> Self {
        Self::new(DOCKER_OS, host_arch())
    }

    pub fn is_docker(&self) -> bool {
        self.os == DOCKER_OS
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('.') => {
                Ok(Self::new(os, arch))
            }
            _ => Err(Error::InvalidPlatform(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Host operating system in the naming the catalog uses (`darwin`, not `macos`).
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Host architecture in the naming the catalog uses (`amd64`, `arm64`).
pub fn host_arch() -> &'static str {
    normalize_arch(std::env::consts::ARCH)
}

fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let p = Platform::new("linux", "amd64");
        assert_eq!(p.to_string(), "linux.amd64");
        assert_eq!("linux.amd64".parse::<Platform>().unwrap(), p);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("linux".parse::<Platform>().is_err());
        assert!(".amd64".parse::<Platform>().is_err());
        assert!("linux.".parse::<Platform>().is_err());
        assert!("a.b.c".parse::<Platform>().is_err());
    }

    #[test]
    fn test_docker_uses_host_arch() {
        let p = Platform::docker();
        assert!(p.is_docker());
        assert_eq!(p.arch, Platform::local().arch);
        assert!(!Platform::local().is_docker());
    }

    #[test]
    fn test_normalize_arch() {
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("riscv64"), "riscv64");
    }

    #[test]
    fn test_platform_equality() {
        assert_eq!(Platform::new("docker", "arm64"), Platform::new("docker", "arm64"));
        assert_ne!(Platform::new("docker", "arm64"), Platform::new("linux", "arm64"));
    }
}
