use std::path::PathBuf;
use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use tooldock::global::utils::get_global_cache_dir;
use tooldock::{Catalog, HttpFetcher, Layout, Platform, Provisioner};
use crate::cli::{ToolCommand, CLI};

pub fn execute(cli: CLI) -> Result<()> {
    let layout = build_layout(cli.cache_dir)?;
    if let ToolCommand::Path { destination, docker } = &cli.command {
        return execute_path(&layout, destination, *docker);
    }

    let catalog = Catalog::load(&cli.catalog)
        .with_context(|| format!("could not load catalog {}", cli.catalog.display()))?;
    let fetcher = HttpFetcher::new().map_err(|e| anyhow!(e))?;
    let provisioner = Provisioner::new(catalog, layout, fetcher);

    match cli.command {
        ToolCommand::Ensure { name, docker } => {
            execute_ensure(&provisioner, &name, docker)
        }
        ToolCommand::InstallAll => {
            provisioner.install_all()?;
            Ok(())
        }
        ToolCommand::Copy { name, dest, binaries } => {
            execute_copy(&provisioner, &name, dest, &binaries)
        }
        ToolCommand::List => {
            execute_list(&provisioner)
        }
        ToolCommand::Path { .. } => Ok(()),
    }
}

fn build_layout(cache_dir: Option<PathBuf>) -> Result<Layout> {
    let cache_root = match cache_dir {
        Some(dir) => std::path::absolute(&dir)
            .with_context(|| format!("invalid cache directory {}", dir.display()))?,
        None => get_global_cache_dir()?,
    };
    let work_dir = std::env::current_dir()?;
    Ok(Layout::new(cache_root, work_dir))
}

pub fn execute_ensure(provisioner: &Provisioner, name: &str, docker: bool) -> Result<()> {
    if docker {
        provisioner.ensure_docker(name)?;
    } else {
        provisioner.ensure_local(name)?;
    }
    Ok(())
}

pub fn execute_copy(
    provisioner: &Provisioner,
    name: &str,
    dest: PathBuf,
    binaries: &[String],
) -> Result<()> {
    let copied = provisioner.copy_tool_binaries(name, &dest, binaries)?;
    for path in copied {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn execute_list(provisioner: &Provisioner) -> Result<()> {
    let catalog = provisioner.catalog();
    if catalog.is_empty() {
        println!("No tools");
        return Ok(());
    }

    for tool in catalog.iter() {
        println!("{}: {}", tool.name.bold(), tool.version);
        let mut platforms = Vec::new();
        if tool.for_local {
            platforms.push(Platform::local());
        }
        if tool.for_docker {
            platforms.push(Platform::docker());
        }
        for platform in platforms {
            let status = match provisioner.is_installed(&tool.name, &platform) {
                Ok(true) => "installed".green(),
                Ok(false) => "not installed".yellow(),
                Err(_) => "unsupported".red(),
            };
            println!("   {platform}: {status}");
        }
    }
    Ok(())
}

pub fn execute_path(layout: &Layout, destination: &str, docker: bool) -> Result<()> {
    let path = if docker {
        layout.path_docker(destination)
    } else {
        layout.path_local(destination)
    };
    println!("{}", path.display());
    Ok(())
}
