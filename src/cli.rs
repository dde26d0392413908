use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Catalog of tools to provision
    #[clap(long, global = true, default_value = "tooldock.toml")]
    pub(crate) catalog: PathBuf,
    /// Cache root. Defaults to `$TOOLDOCK_CACHE_DIR` or the user cache directory
    #[clap(long, global = true)]
    pub(crate) cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: ToolCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ToolCommand {
    /// Installs a tool unless it is already installed and verified
    Ensure {
        name: String,
        /// Install for docker images instead of this machine
        #[clap(long)]
        docker: bool,
    },
    /// Ensures every tool in the catalog for the contexts it is declared for
    InstallAll,
    /// Copies installed docker binaries of a tool into a directory as real files
    Copy {
        name: String,
        /// Directory to copy into. Created if missing
        dest: PathBuf,
        /// Binary base names, e.g. `gaiad`
        #[clap(required = true)]
        binaries: Vec<String>,
    },
    /// Lists catalog tools and whether they are installed
    List,
    /// Prints where a destination binary is published, e.g. `bin/go`
    Path {
        destination: String,
        #[clap(long)]
        docker: bool,
    },
}
