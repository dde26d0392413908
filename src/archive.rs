//! Unpacking of downloaded payloads into a tool directory.
//!
//! Tar entries are reproduced by kind (directories, regular files, symlinks
//! and hardlinks) with their permission bits. Zip archives and single raw
//! files are supported as well; see [`ArchiveFormat`].

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Read, Seek};
use std::os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};
use flate2::read::GzDecoder;
use serde::Deserialize;
use tar::{Archive, EntryType};
use tracing::trace;
use zip::ZipArchive;
use crate::error::{Error, IoContext, Result};

/// How a downloaded payload is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball, unpacked as a tree.
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Zip archive, unpacked as a tree.
    #[serde(rename = "zip")]
    Zip,
    /// The payload is the binary itself.
    #[serde(rename = "raw")]
    Raw,
}

impl ArchiveFormat {
    /// Infers the format from the URL: `.tar.gz` is a tarball, anything else
    /// is a single opaque file. Zip has to be requested explicitly.
    pub fn from_url(url: &str) -> Self {
        if url.ends_with(".tar.gz") {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Raw
        }
    }
}

/// Last path segment of a URL, used as the file name for raw payloads.
pub fn file_name_from_url(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Decompresses a gzip stream and unpacks the tar archive inside it under `dest`.
pub fn unpack_tar_gz<R: Read>(reader: R, dest: &Path) -> Result<()> {
    unpack_tar(GzDecoder::new(reader), dest)
}

/// Unpacks an uncompressed tar stream under `dest`.
pub fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| Error::archive(dest, e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::archive(dest, e.to_string()))?;
        let name = entry
            .path()
            .map_err(|e| Error::archive(dest, e.to_string()))?
            .into_owned();
        let path = join_entry(dest, &name)?;
        reject_symlinked_parents(dest, &path)?;
        // Type bits live in the entry type, only permissions are applied.
        let mode = entry
            .header()
            .mode()
            .map_err(|e| Error::archive(&name, e.to_string()))?
            & 0o777;
        let kind = entry.header().entry_type();
        trace!(entry = %name.display(), ?kind, mode = %format!("{mode:o}"), "Unpacking entry");

        match kind {
            EntryType::Directory => {
                DirBuilder::new()
                    .recursive(true)
                    .mode(mode)
                    .create(&path)
                    .at(&path)?;
            }
            EntryType::Regular => {
                ensure_parent(&path)?;
                remove_symlink(&path)?;
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(mode)
                    .open(&path)
                    .at(&path)?;
                io::copy(&mut entry, &mut file).map_err(|e| Error::archive(&name, e.to_string()))?;
            }
            EntryType::Symlink => {
                let target = link_name(&entry, &name)?;
                ensure_parent(&path)?;
                symlink(&target, &path).at(&path)?;
            }
            EntryType::Link => {
                let target = link_name(&entry, &name)?;
                let target_path = join_entry(dest, &target)?;
                reject_symlinked_parents(dest, &target_path)?;
                unpack_hardlink(&target_path, &path, mode)?;
            }
            EntryType::XGlobalHeader => {
                trace!(entry = %name.display(), "Skipping pax global header");
            }
            other => {
                return Err(Error::archive(&name, format!("unsupported file type: {other:?}")));
            }
        }
    }
    Ok(())
}

fn link_name<R: Read>(entry: &tar::Entry<'_, R>, name: &Path) -> Result<PathBuf> {
    entry
        .link_name()
        .map_err(|e| Error::archive(name, e.to_string()))?
        .map(|target| target.into_owned())
        .ok_or_else(|| Error::archive(name, "link entry without a target"))
}

/// Hardlinks may be listed before the file they point to. The target is then
/// created empty so there is an inode to link to; its real content arrives
/// with its own entry and is visible through both names.
fn unpack_hardlink(target: &Path, path: &Path, mode: u32) -> Result<()> {
    if target == path {
        return Err(Error::archive(path, "hardlink points to itself"));
    }
    ensure_parent(path)?;
    ensure_parent(target)?;
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(target)
    {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e).at(target),
    }
    let file_type = fs::symlink_metadata(target).at(target)?.file_type();
    if file_type.is_dir() {
        return Err(Error::archive(path, "hardlink to a directory"));
    }
    if file_type.is_symlink() {
        return Err(Error::archive(path, "hardlink to a symlink"));
    }
    fs::hard_link(target, path).at(path)
}

/// Unpacks a zip archive under `dest`.
pub fn unpack_zip<R: Read + Seek>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(reader).map_err(|e| Error::archive(dest, e.to_string()))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::archive(dest, e.to_string()))?;
        let name = file.name().to_string();
        let relative = file
            .enclosed_name()
            .ok_or_else(|| Error::archive(&name, "entry escapes the destination directory"))?;
        let path = dest.join(relative);
        reject_symlinked_parents(dest, &path)?;

        if file.is_dir() {
            fs::create_dir_all(&path).at(&path)?;
        } else if file.is_symlink() {
            let mut target = String::new();
            file.read_to_string(&mut target)
                .map_err(|e| Error::archive(&name, e.to_string()))?;
            ensure_parent(&path)?;
            symlink(&target, &path).at(&path)?;
        } else {
            let mode = file.unix_mode().map(|m| m & 0o777).unwrap_or(0o644);
            ensure_parent(&path)?;
            remove_symlink(&path)?;
            let mut out = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(mode)
                .open(&path)
                .at(&path)?;
            io::copy(&mut file, &mut out).map_err(|e| Error::archive(&name, e.to_string()))?;
        }
    }
    Ok(())
}

/// Writes a raw payload to `<dest>/<file name of url>` as an owner-only
/// executable and returns the written path.
pub fn write_raw<R: Read>(mut reader: R, dest: &Path, url: &str) -> Result<PathBuf> {
    let file_name = file_name_from_url(url)
        .ok_or_else(|| Error::archive(url, "cannot derive a file name from the url"))?;
    let path = dest.join(file_name);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o700)
        .open(&path)
        .at(&path)?;
    io::copy(&mut reader, &mut file).at(&path)?;
    Ok(path)
}

/// Joins an archive entry name onto `root`, refusing absolute names and `..`.
fn join_entry(root: &Path, name: &Path) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for component in name.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::archive(name, "entry escapes the destination directory"));
            }
        }
    }
    Ok(path)
}

/// Fails when a component between `root` and `path` that was already
/// unpacked is a symlink. Writing through it could land outside `root`.
fn reject_symlinked_parents(root: &Path, path: &Path) -> Result<()> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::archive(path, "entry escapes the destination directory"))?;
    let mut current = root.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(Error::archive(
                    path,
                    format!("parent {} is a symlink", current.display()),
                ));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(e).at(&current),
        }
    }
    Ok(())
}

/// A regular entry replaces a symlink of the same name instead of writing
/// through it.
fn remove_symlink(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(path).at(path),
        _ => Ok(()),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(parent)
            .at(parent),
        None => Ok(()),
    }
}
