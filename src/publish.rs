use std::fs;
use std::io;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::info;
use crate::catalog::{BinaryMap, ToolDefinition};
use crate::error::{Error, IoContext, Result};
use crate::global::cache::{tool_dir_name, Layout};
use crate::platform::Platform;

/// Links every binary of an installed tool to its destination.
///
/// Local destinations get an absolute symlink to the artifact. Docker
/// destinations get a relative one (`../` per directory level of the
/// destination, then `<tool>-<version>/<source>`) so the link still resolves
/// when the cache root is mounted elsewhere inside a container.
///
/// Each link is resolved right after creation; a link that does not resolve
/// fails the install.
///
/// # Example
///
/// A docker destination `bin/gaiad` for `gaia` `v7.1.0` becomes
/// `<cache>/docker.amd64/bin/gaiad -> ../gaia-v7.1.0/gaiad-v7.1.0-linux-amd64`.
pub fn publish_binaries(
    layout: &Layout,
    tool: &ToolDefinition,
    platform: &Platform,
    binaries: &BinaryMap,
) -> Result<Vec<PathBuf>> {
    let tool_dir = layout.tool_dir(&tool.name, &tool.version, platform);
    let mut published = Vec::with_capacity(binaries.len());

    for (dst, src) in binaries {
        let artifact = tool_dir.join(src);
        let destination = layout.destination(platform, dst);

        match fs::remove_file(&destination) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).at(&destination),
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        fs::set_permissions(&artifact, fs::Permissions::from_mode(0o700)).at(&artifact)?;

        let target = if platform.is_docker() {
            relative_target(&tool.name, &tool.version, dst, src)
        } else {
            artifact.clone()
        };
        symlink(&target, &destination).at(&destination)?;

        destination.canonicalize().map_err(|source| Error::Publish {
            destination: destination.clone(),
            source,
        })?;
        info!(tool = %tool.name, path = %destination.display(), "Tool installed to path");
        published.push(destination);
    }
    Ok(published)
}

/// Link target for a docker destination, relative to the destination's directory.
fn relative_target(name: &str, version: &str, dst: &str, src: &str) -> PathBuf {
    let mut target = PathBuf::new();
    for _ in 1..Path::new(dst).components().count() {
        target.push("..");
    }
    target.push(tool_dir_name(name, version));
    target.push(Path::new(src));
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::catalog::Source;

    const HASH: &str = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn tool(platform: &Platform) -> ToolDefinition {
        let tool = ToolDefinition::new("gaia", "v7.1.0")
            .with_source(
                platform.clone(),
                Source::new("https://x/gaiad-v7.1.0-linux-amd64", HASH)
                    .unwrap()
                    .with_binary("bin/gaiad", "gaiad-v7.1.0-linux-amd64"),
            );
        if platform.is_docker() { tool.docker() } else { tool.local() }
    }

    fn place_artifact(layout: &Layout, tool: &ToolDefinition, platform: &Platform) -> PathBuf {
        let dir = layout.tool_dir(&tool.name, &tool.version, platform);
        fs::create_dir_all(&dir).unwrap();
        let artifact = dir.join("gaiad-v7.1.0-linux-amd64");
        fs::write(&artifact, "gaiad").unwrap();
        artifact
    }

    #[test]
    fn test_relative_target() {
        assert_eq!(
            relative_target("gaia", "v7.1.0", "bin/gaiad", "gaiad"),
            PathBuf::from("../gaia-v7.1.0/gaiad")
        );
        assert_eq!(
            relative_target("x", "1", "a/b/c", "d/e"),
            PathBuf::from("../../x-1/d/e")
        );
        assert_eq!(relative_target("x", "1", "top", "e"), PathBuf::from("x-1/e"));
    }

    #[test]
    fn test_publish_docker_is_relative() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path().join("cache"), dir.path().join("work"));
        let platform = Platform::new("docker", "amd64");
        let tool = tool(&platform);
        let artifact = place_artifact(&layout, &tool, &platform);

        let binaries = tool.binaries_for(&platform).unwrap();
        let published = publish_binaries(&layout, &tool, &platform, &binaries).unwrap();

        let link = layout.destination(&platform, "bin/gaiad");
        assert_eq!(published, vec![link.clone()]);
        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("../gaia-v7.1.0/gaiad-v7.1.0-linux-amd64")
        );
        assert_eq!(link.canonicalize().unwrap(), artifact.canonicalize().unwrap());
        assert_eq!(fs::metadata(&artifact).unwrap().permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn test_publish_local_is_absolute_and_replaces_old_link() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path().join("cache"), dir.path().join("work"));
        let platform = Platform::new("linux", "amd64");
        let tool = tool(&platform);
        let artifact = place_artifact(&layout, &tool, &platform);

        let link = layout.destination(&platform, "bin/gaiad");
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        fs::write(&link, "stale").unwrap();

        let binaries = tool.binaries_for(&platform).unwrap();
        publish_binaries(&layout, &tool, &platform, &binaries).unwrap();

        let target = fs::read_link(&link).unwrap();
        assert!(target.is_absolute());
        assert_eq!(target, artifact);
    }

    #[test]
    fn test_publish_missing_artifact_fails() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path().join("cache"), dir.path().join("work"));
        let platform = Platform::new("linux", "amd64");
        let tool = tool(&platform);
        fs::create_dir_all(layout.tool_dir(&tool.name, &tool.version, &platform)).unwrap();

        let binaries = tool.binaries_for(&platform).unwrap();
        assert!(publish_binaries(&layout, &tool, &platform, &binaries).is_err());
    }
}
