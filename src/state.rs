use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;
use crate::catalog::ToolDefinition;
use crate::error::Result;
use crate::global::cache::Layout;
use crate::platform::Platform;

/// Decides from the filesystem alone whether `tool` is installed for `platform`.
///
/// Every destination of the effective binary mapping has to resolve to the
/// expected file inside the version-qualified tool directory, and that file
/// must be readable, writable and executable by its owner. Nothing is
/// modified and no network access happens. A tool without binaries counts as
/// installed once its tool directory exists.
///
/// Paths are compared after resolving all symlinks on both sides.
///
/// # Errors
///
/// Only configuration errors: the tool has no source for `platform`.
pub fn is_installed(layout: &Layout, tool: &ToolDefinition, platform: &Platform) -> Result<bool> {
    let binaries = tool.binaries_for(platform)?;
    let tool_dir = layout.tool_dir(&tool.name, &tool.version, platform);
    if !tool_dir.is_dir() {
        debug!(tool = %tool.name, %platform, "Tool directory missing");
        return Ok(false);
    }

    for (dst, src) in &binaries {
        let destination = layout.destination(platform, dst);
        if !points_to(&destination, &tool_dir.join(src)) {
            debug!(tool = %tool.name, %platform, destination = %destination.display(), "Binary not installed");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compares fully resolved paths; the artifact itself may be a link inside
/// the unpacked archive.
fn points_to(destination: &Path, artifact: &Path) -> bool {
    let (Ok(real), Ok(expected)) = (destination.canonicalize(), artifact.canonicalize()) else {
        return false;
    };
    if real != expected {
        return false;
    }
    match std::fs::metadata(&real) {
        Ok(meta) => meta.permissions().mode() & 0o700 == 0o700,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;
    use crate::catalog::Source;

    const HASH: &str = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn setup() -> (tempfile::TempDir, Layout, ToolDefinition, Platform) {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path().join("cache"), dir.path().join("work"));
        let platform = Platform::new("linux", "amd64");
        let tool = ToolDefinition::new("demo", "1.0.0")
            .local()
            .with_binary("bin/demo", "demo")
            .with_source(platform.clone(), Source::new("https://x/demo.tar.gz", HASH).unwrap());
        (dir, layout, tool, platform)
    }

    fn install_file(layout: &Layout, tool: &ToolDefinition, platform: &Platform, mode: u32) {
        let tool_dir = layout.tool_dir(&tool.name, &tool.version, platform);
        fs::create_dir_all(&tool_dir).unwrap();
        let file = tool_dir.join("demo");
        fs::write(&file, "bin").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(mode)).unwrap();
        let dst = layout.destination(platform, "bin/demo");
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        symlink(&file, &dst).unwrap();
    }

    #[test]
    fn test_missing_tool_is_not_installed() {
        let (_dir, layout, tool, platform) = setup();
        assert!(!is_installed(&layout, &tool, &platform).unwrap());
    }

    #[test]
    fn test_linked_tool_is_installed() {
        let (_dir, layout, tool, platform) = setup();
        install_file(&layout, &tool, &platform, 0o755);
        assert!(is_installed(&layout, &tool, &platform).unwrap());
    }

    #[test]
    fn test_missing_permissions_is_not_installed() {
        let (_dir, layout, tool, platform) = setup();
        install_file(&layout, &tool, &platform, 0o644);
        assert!(!is_installed(&layout, &tool, &platform).unwrap());
    }

    #[test]
    fn test_link_to_other_version_is_not_installed() {
        let (_dir, layout, tool, platform) = setup();
        install_file(&layout, &tool, &platform, 0o755);
        let mut newer = tool.clone();
        newer.version = "1.1.0".to_string();
        fs::create_dir_all(layout.tool_dir("demo", "1.1.0", &platform)).unwrap();
        assert!(!is_installed(&layout, &newer, &platform).unwrap());
    }

    #[test]
    fn test_regular_file_at_destination_is_not_installed() {
        let (_dir, layout, tool, platform) = setup();
        fs::create_dir_all(layout.tool_dir("demo", "1.0.0", &platform)).unwrap();
        let dst = layout.destination(&platform, "bin/demo");
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::write(&dst, "impostor").unwrap();
        assert!(!is_installed(&layout, &tool, &platform).unwrap());
    }

    #[test]
    fn test_unsupported_platform_is_an_error() {
        let (_dir, layout, tool, _) = setup();
        assert!(is_installed(&layout, &tool, &Platform::new("docker", "amd64")).is_err());
    }
}
