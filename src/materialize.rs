use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::catalog::ToolDefinition;
use crate::error::{Error, IoContext, Result};
use crate::global::cache::Layout;
use crate::platform::Platform;

/// Copies already installed docker binaries of `tool` into `dest_dir` as
/// real files, for places that cannot follow links out of themselves (a
/// docker build context, for example).
///
/// `binaries` are base names (`gaiad`, not `bin/gaiad`) looked up in the
/// tool's binary mapping and in the mapping of its docker source. All names
/// are checked before anything is copied. Copies are world
/// readable/writable/executable. The tool itself is not installed here; call
/// [`Provisioner::ensure_docker`](crate::Provisioner::ensure_docker) first.
pub fn copy_tool_binaries<S: AsRef<str>>(
    layout: &Layout,
    tool: &ToolDefinition,
    dest_dir: &Path,
    binaries: &[S],
) -> Result<Vec<PathBuf>> {
    if binaries.is_empty() {
        return Ok(Vec::new());
    }

    // base name -> destination path
    let mut stored: BTreeMap<String, &str> = BTreeMap::new();
    let docker_binaries = tool
        .sources
        .get(&Platform::docker())
        .map(|source| &source.binaries);
    for dst in tool.binaries.keys().chain(docker_binaries.into_iter().flat_map(|b| b.keys())) {
        if let Some(base) = Path::new(dst).file_name() {
            stored.insert(base.to_string_lossy().into_owned(), dst.as_str());
        }
    }

    let mut selected = Vec::with_capacity(binaries.len());
    for name in binaries {
        let name = name.as_ref();
        let dst = stored.get(name).ok_or_else(|| Error::UnknownBinary {
            tool: tool.name.clone(),
            binary: name.to_string(),
        })?;
        selected.push((name, *dst));
    }

    fs::create_dir_all(dest_dir).at(dest_dir)?;

    let mut copied = Vec::with_capacity(selected.len());
    for (name, dst) in selected {
        let link = layout.path_docker(dst);
        let real = link.canonicalize().at(&link)?;
        let target = dest_dir.join(name);
        let mut reader = fs::File::open(&real).at(&real)?;
        let mut writer = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o777)
            .open(&target)
            .at(&target)?;
        io::copy(&mut reader, &mut writer).at(&target)?;
        // umask strips bits from the open mode
        fs::set_permissions(&target, fs::Permissions::from_mode(0o777)).at(&target)?;
        debug!(tool = %tool.name, from = %real.display(), to = %target.display(), "Copied binary");
        copied.push(target);
    }
    Ok(copied)
}
