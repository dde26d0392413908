use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};
use serde::Deserialize;
use crate::archive::ArchiveFormat;
use crate::digest::Checksum;
use crate::error::{Error, Result};
use crate::platform::Platform;

/// Destination path → path inside the unpacked tool directory.
pub type BinaryMap = BTreeMap<String, String>;

/// The set of tools the engine can provision, keyed by name.
///
/// Built once (from a `tooldock.toml` file or in code) and passed to the
/// [`Provisioner`](crate::Provisioner); never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: BTreeMap<String, ToolDefinition>,
}

/// One tool as declared in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    /// The catalog key. Filled in from the table name when loading.
    #[serde(skip)]
    pub name: String,
    /// Opaque version string; part of the cache path.
    pub version: String,
    /// Whether the tool may be installed on the developer machine.
    #[serde(default, rename = "local")]
    pub for_local: bool,
    /// Whether the tool may be installed for docker images.
    #[serde(default, rename = "docker")]
    pub for_docker: bool,
    /// Download sources per platform. Not every platform needs one.
    #[serde(default)]
    pub sources: HashMap<Platform, Source>,
    /// Default binary mapping, shared by all sources.
    #[serde(default)]
    pub binaries: BinaryMap,
}

/// Where and how a tool is downloaded for one platform.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub url: String,
    pub hash: Checksum,
    /// Overrides entries of the tool's binary mapping.
    #[serde(default)]
    pub binaries: BinaryMap,
    /// Explicit payload format; inferred from `url` when absent.
    #[serde(default)]
    pub format: Option<ArchiveFormat>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tools: BTreeMap<String, ToolDefinition>,
}

impl Catalog {
    /// Builds a catalog from tool definitions, validating each of them.
    pub fn new(tools: impl IntoIterator<Item = ToolDefinition>) -> Result<Self> {
        let mut catalog = Catalog::default();
        for tool in tools {
            tool.validate().map_err(|message| Error::catalog("<memory>", message))?;
            if catalog.tools.contains_key(&tool.name) {
                return Err(Error::catalog("<memory>", format!("tool {} is defined twice", tool.name)));
            }
            catalog.tools.insert(tool.name.clone(), tool);
        }
        Ok(catalog)
    }

    /// Loads a catalog from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::catalog(path, e.to_string()))?;
        Self::from_toml(&content, path)
    }

    /// Parses catalog TOML; `origin` is only used in error messages.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| Error::catalog(origin, e.to_string()))?;
        let mut tools = file.tools;
        for (name, tool) in tools.iter_mut() {
            tool.name = name.clone();
            tool.validate().map_err(|message| Error::catalog(origin, message))?;
        }
        Ok(Catalog { tools })
    }

    pub fn get(&self, name: &str) -> Result<&ToolDefinition> {
        self.tools
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    /// Tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            for_local: false,
            for_docker: false,
            sources: HashMap::new(),
            binaries: BinaryMap::new(),
        }
    }

    pub fn local(mut self) -> Self {
        self.for_local = true;
        self
    }

    pub fn docker(mut self) -> Self {
        self.for_docker = true;
        self
    }

    pub fn with_source(mut self, platform: Platform, source: Source) -> Self {
        self.sources.insert(platform, source);
        self
    }

    pub fn with_binary(mut self, destination: impl Into<String>, source: impl Into<String>) -> Self {
        self.binaries.insert(destination.into(), source.into());
        self
    }

    /// The source for `platform`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedPlatform`] when the tool has no source for it.
    pub fn source(&self, platform: &Platform) -> Result<&Source> {
        self.sources
            .get(platform)
            .ok_or_else(|| Error::unsupported_platform(&self.name, platform))
    }

    /// The tool-level binary mapping merged with the one of the platform's
    /// source. Source entries win on collision.
    pub fn binaries_for(&self, platform: &Platform) -> Result<BinaryMap> {
        let source = self.source(platform)?;
        let mut binaries = self.binaries.clone();
        binaries.extend(source.binaries.iter().map(|(dst, src)| (dst.clone(), src.clone())));
        Ok(binaries)
    }

    /// Whether the tool declares the installation context `platform` belongs to.
    pub fn supports(&self, platform: &Platform) -> bool {
        if platform.is_docker() {
            self.for_docker
        } else {
            self.for_local
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("tool without a name".to_string());
        }
        if self.name.contains('/') || self.name == "." || self.name == ".." {
            return Err(format!("invalid tool name {:?}", self.name));
        }
        if self.version.is_empty() || self.version.contains('/') {
            return Err(format!("tool {} has an invalid version {:?}", self.name, self.version));
        }
        if !self.for_local && !self.for_docker {
            return Err(format!("tool {} is enabled neither for local nor for docker", self.name));
        }
        let source_binaries = self.sources.values().flat_map(|s| s.binaries.iter());
        for (dst, src) in self.binaries.iter().chain(source_binaries) {
            if !is_relative_inside(dst) || !is_relative_inside(src) {
                return Err(format!("tool {} maps {dst:?} to {src:?}, both must be relative paths", self.name));
            }
            if !is_plain_destination(dst) {
                return Err(format!(
                    "tool {} has destination {dst:?}, expected plain segments like \"bin/tool\"",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

impl Source {
    /// # Errors
    ///
    /// Fails when `hash` is not a supported `<algorithm>:<hex>` checksum.
    pub fn new(url: impl Into<String>, hash: &str) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            hash: hash.parse()?,
            binaries: BinaryMap::new(),
            format: None,
        })
    }

    pub fn with_binary(mut self, destination: impl Into<String>, source: impl Into<String>) -> Self {
        self.binaries.insert(destination.into(), source.into());
        self
    }

    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// The explicit format, or the one inferred from the URL.
    pub fn format(&self) -> ArchiveFormat {
        self.format.unwrap_or_else(|| ArchiveFormat::from_url(&self.url))
    }
}

fn is_relative_inside(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Destinations are counted segment by segment when linking, so `.`, empty
/// segments and trailing slashes are refused.
fn is_plain_destination(path: &str) -> bool {
    path.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
