use std::fs::{self, DirBuilder};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};
use crate::archive::{unpack_tar_gz, unpack_zip, write_raw, ArchiveFormat};
use crate::catalog::{BinaryMap, Catalog, Source, ToolDefinition};
use crate::error::{Error, IoContext, Result};
use crate::fetch::Fetcher;
use crate::global::cache::Layout;
use crate::materialize;
use crate::platform::Platform;
use crate::publish::publish_binaries;
use crate::state;

/// The provisioning engine: checks, downloads, verifies, unpacks and links
/// the tools of a [`Catalog`] into a cache [`Layout`].
///
/// Calls are synchronous and keep no state between them; everything is
/// re-derived from the filesystem. Installing the same tool, version and
/// platform from two callers at once is not safe without an external lock.
/// Different tools, or different platforms, use disjoint directories.
pub struct Provisioner {
    catalog: Catalog,
    layout: Layout,
    fetcher: Box<dyn Fetcher>,
}

impl Provisioner {
    pub fn new(catalog: Catalog, layout: Layout, fetcher: impl Fetcher + 'static) -> Self {
        Self {
            catalog,
            layout,
            fetcher: Box::new(fetcher),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Makes sure the tool is installed for use on this machine.
    pub fn ensure_local(&self, name: &str) -> Result<()> {
        self.ensure(name, &Platform::local())
    }

    /// Makes sure the tool is installed for docker images on the host architecture.
    pub fn ensure_docker(&self, name: &str) -> Result<()> {
        self.ensure(name, &Platform::docker())
    }

    /// Installs the tool for `platform` unless it is already installed.
    ///
    /// # Errors
    ///
    /// Configuration errors when the tool is unknown, not declared for the
    /// platform's context or has no source for it; otherwise whatever
    /// [`Provisioner::install`] returns.
    pub fn ensure(&self, name: &str, platform: &Platform) -> Result<()> {
        let tool = self.catalog.get(name)?;
        if !tool.supports(platform) {
            return Err(Error::UnsupportedContext {
                tool: tool.name.clone(),
                context: if platform.is_docker() { "docker" } else { "local" },
            });
        }
        if state::is_installed(&self.layout, tool, platform)? {
            debug!(tool = %tool.name, version = %tool.version, %platform, "Tool already installed");
            return Ok(());
        }
        self.install_tool(tool, platform)
    }

    /// Whether the tool is installed for `platform`. Filesystem only.
    pub fn is_installed(&self, name: &str, platform: &Platform) -> Result<bool> {
        let tool = self.catalog.get(name)?;
        state::is_installed(&self.layout, tool, platform)
    }

    /// Downloads, verifies, unpacks and publishes the tool, replacing any
    /// previous install of the same version.
    ///
    /// On error the tool directory does not exist afterwards, and the error is
    /// an [`Error::Install`] naming the tool, version, URL and platform.
    ///
    /// # Panics
    ///
    /// When the tool directory cannot be removed or created. The cache root
    /// is then in a state that cannot be reasoned about, and retrying would
    /// not help.
    pub fn install(&self, name: &str, platform: &Platform) -> Result<()> {
        let tool = self.catalog.get(name)?;
        self.install_tool(tool, platform)
    }

    /// Ensures every catalog tool, in name order, for each context it is
    /// declared for. Stops at the first error.
    pub fn install_all(&self) -> Result<()> {
        for tool in self.catalog.iter() {
            if tool.for_local {
                self.ensure(&tool.name, &Platform::local())?;
            }
            if tool.for_docker {
                self.ensure(&tool.name, &Platform::docker())?;
            }
        }
        Ok(())
    }

    /// See [`materialize::copy_tool_binaries`].
    pub fn copy_tool_binaries<S: AsRef<str>>(
        &self,
        name: &str,
        dest_dir: &Path,
        binaries: &[S],
    ) -> Result<Vec<PathBuf>> {
        let tool = self.catalog.get(name)?;
        materialize::copy_tool_binaries(&self.layout, tool, dest_dir, binaries)
    }

    pub fn path_local(&self, destination: &str) -> PathBuf {
        self.layout.path_local(destination)
    }

    pub fn path_docker(&self, destination: &str) -> PathBuf {
        self.layout.path_docker(destination)
    }

    fn install_tool(&self, tool: &ToolDefinition, platform: &Platform) -> Result<()> {
        let source = tool.source(platform)?;
        let binaries = tool.binaries_for(platform)?;
        let span = info_span!(
            "install",
            tool = %tool.name,
            version = %tool.version,
            url = %source.url,
            %platform
        );
        let _guard = span.enter();
        info!("Installing tool");

        let context = |err: Error| Error::Install {
            tool: tool.name.clone(),
            version: tool.version.clone(),
            url: source.url.clone(),
            platform: platform.to_string(),
            source: Box::new(err),
        };

        let body = self
            .fetcher
            .fetch(&source.url)
            .map_err(|e| Error::Fetch {
                tool: tool.name.clone(),
                url: source.url.clone(),
                source: e,
            })
            .map_err(context)?;

        let tool_dir = self.layout.tool_dir(&tool.name, &tool.version, platform);
        reset_tool_dir(&tool_dir);

        let result = self.populate(tool, platform, source, &binaries, body, &tool_dir);
        if let Err(err) = &result {
            warn!(error = %err, "Installation failed, removing tool directory");
            if let Err(e) = fs::remove_dir_all(&tool_dir) {
                panic!("cannot remove tool directory {}: {e}", tool_dir.display());
            }
        }
        result.map_err(context)?;
        info!("Tool installed");
        Ok(())
    }

    fn populate(
        &self,
        tool: &ToolDefinition,
        platform: &Platform,
        source: &Source,
        binaries: &BinaryMap,
        body: Box<dyn Read + Send>,
        tool_dir: &Path,
    ) -> Result<()> {
        let mut reader = source.hash.reader(body);
        let format = source.format();
        debug!(?format, "Unpacking payload");
        match format {
            ArchiveFormat::TarGz => unpack_tar_gz(&mut reader, tool_dir)?,
            ArchiveFormat::Zip => {
                // zip needs to seek, so the hashed stream is spooled to disk first
                let mut spool = tempfile::tempfile().at(tool_dir)?;
                io::copy(&mut reader, &mut spool).at(tool_dir)?;
                spool.seek(SeekFrom::Start(0)).at(tool_dir)?;
                unpack_zip(spool, tool_dir)?;
            }
            ArchiveFormat::Raw => {
                write_raw(&mut reader, tool_dir, &source.url)?;
            }
        }

        let actual = reader.finish().map_err(|e| Error::Fetch {
            tool: tool.name.clone(),
            url: source.url.clone(),
            source: Box::new(e),
        })?;
        if !source.hash.matches(&actual) {
            return Err(Error::ChecksumMismatch {
                tool: tool.name.clone(),
                expected: source.hash.hex.clone(),
                actual,
                url: source.url.clone(),
            });
        }

        publish_binaries(&self.layout, tool, platform, binaries)?;
        Ok(())
    }
}

/// Removes whatever is left of a previous install and recreates the
/// directory, owner-only.
///
/// # Panics
///
/// When either step fails.
fn reset_tool_dir(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => panic!("cannot remove tool directory {}: {e}", path.display()),
    }
    if let Err(e) = DirBuilder::new().recursive(true).mode(0o700).create(path) {
        panic!("cannot create tool directory {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use sha2::{Digest, Sha256};
    use tempfile::tempdir;
    use crate::fetch::FetchError;

    /// Serves one payload, then fails after `cut_after` bytes if set.
    struct OnePayload {
        payload: Vec<u8>,
        cut_after: Option<usize>,
        calls: Arc<AtomicUsize>,
    }

    struct Truncated {
        data: io::Cursor<Vec<u8>>,
        left: usize,
    }

    impl Read for Truncated {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.left == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
            }
            let max = buf.len().min(self.left);
            let n = self.data.read(&mut buf[..max])?;
            self.left -= n;
            Ok(n)
        }
    }

    impl Fetcher for OnePayload {
        fn fetch(&self, _url: &str) -> std::result::Result<Box<dyn Read + Send>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let data = io::Cursor::new(self.payload.clone());
            let reader: Box<dyn Read + Send> = match self.cut_after {
                Some(left) => Box::new(Truncated { data, left }),
                None => Box::new(data),
            };
            Ok(reader)
        }
    }

    struct Offline;

    impl Fetcher for Offline {
        fn fetch(&self, url: &str) -> std::result::Result<Box<dyn Read + Send>, FetchError> {
            Err(format!("no route to {url}").into())
        }
    }

    fn raw_tool(payload: &[u8], hash: Option<&str>) -> ToolDefinition {
        let hash = match hash {
            Some(h) => h.to_string(),
            None => format!("sha256:{}", hex::encode(Sha256::digest(payload))),
        };
        ToolDefinition::new("cored", "v0.1.1")
            .docker()
            .with_source(
                Platform::docker(),
                Source::new("https://example.com/cored-linux", &hash)
                    .unwrap()
                    .with_binary("bin/cored", "cored-linux"),
            )
    }

    fn provisioner(root: &Path, tool: ToolDefinition, fetcher: impl Fetcher + 'static) -> Provisioner {
        let layout = Layout::new(root.join("cache"), root.join("work"));
        Provisioner::new(Catalog::new([tool]).unwrap(), layout, fetcher)
    }

    #[test]
    fn test_raw_install_for_docker() {
        let dir = tempdir().unwrap();
        let payload = b"cored binary".to_vec();
        let calls = Arc::new(AtomicUsize::new(0));
        let p = provisioner(
            dir.path(),
            raw_tool(&payload, None),
            OnePayload { payload: payload.clone(), cut_after: None, calls: calls.clone() },
        );

        p.ensure_docker("cored").unwrap();
        let link = p.path_docker("bin/cored");
        assert_eq!(fs::read(&link).unwrap(), payload);
        assert!(p.is_installed("cored", &Platform::docker()).unwrap());

        p.ensure_docker("cored").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_local_ensure_of_docker_only_tool_fails() {
        let dir = tempdir().unwrap();
        let p = provisioner(dir.path(), raw_tool(b"x", None), Offline);
        let err = p.ensure_local("cored").unwrap_err();
        assert!(matches!(err, Error::UnsupportedContext { context: "local", .. }));
    }

    #[test]
    fn test_transport_error_leaves_nothing() {
        let dir = tempdir().unwrap();
        let p = provisioner(dir.path(), raw_tool(b"x", None), Offline);
        let err = p.ensure_docker("cored").unwrap_err();
        assert!(matches!(err.cause(), Error::Fetch { .. }));
        assert!(!p.layout().tool_dir("cored", "v0.1.1", &Platform::docker()).exists());
    }

    #[test]
    fn test_cut_stream_removes_tool_dir() {
        let dir = tempdir().unwrap();
        let payload = vec![7u8; 4096];
        let calls = Arc::new(AtomicUsize::new(0));
        let p = provisioner(
            dir.path(),
            raw_tool(&payload, None),
            OnePayload { payload, cut_after: Some(100), calls },
        );
        assert!(p.ensure_docker("cored").is_err());
        assert!(!p.layout().tool_dir("cored", "v0.1.1", &Platform::docker()).exists());
    }

    #[test]
    fn test_checksum_mismatch_removes_tool_dir() {
        let dir = tempdir().unwrap();
        let wrong = format!("sha256:{}", "0".repeat(64));
        let calls = Arc::new(AtomicUsize::new(0));
        let p = provisioner(
            dir.path(),
            raw_tool(b"payload", Some(&wrong)),
            OnePayload { payload: b"payload".to_vec(), cut_after: None, calls },
        );
        let err = p.ensure_docker("cored").unwrap_err();
        assert!(matches!(err.cause(), Error::ChecksumMismatch { .. }));
        assert!(!p.layout().tool_dir("cored", "v0.1.1", &Platform::docker()).exists());
        assert!(!p.is_installed("cored", &Platform::docker()).unwrap());
    }

    #[test]
    fn test_install_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let payload = b"fresh".to_vec();
        let calls = Arc::new(AtomicUsize::new(0));
        let p = provisioner(
            dir.path(),
            raw_tool(&payload, None),
            OnePayload { payload, cut_after: None, calls: calls.clone() },
        );
        let tool_dir = p.layout().tool_dir("cored", "v0.1.1", &Platform::docker());
        fs::create_dir_all(&tool_dir).unwrap();
        fs::write(tool_dir.join("leftover"), "junk").unwrap();

        p.install("cored", &Platform::docker()).unwrap();
        assert!(!tool_dir.join("leftover").exists());
        assert_eq!(fs::read(tool_dir.join("cored-linux")).unwrap(), b"fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
