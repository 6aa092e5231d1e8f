//! lean - prebuilt C/C++ package sync
//!
//! Reads `*.manifest` files of a project, expands them through the remote
//! `dep_tree` descriptors, installs the matching prebuilt archives into the
//! local cache and applies their placement directives.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.lean/
//! └── config.toml    # remote url, cache dir, toolchain default
//!
//! ~/lean/            # cache (C:\lean on Windows)
//! ├── zlib@1.3@VS2019/
//! ├── download.log   # provenance, one JSON object per line
//! └── import.cmake
//! ```
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cmd;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use lean_core::request::RequestFlags;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "lean")]
#[command(author, version = env!("LEAN_VERSION"), about = "lean - prebuilt C/C++ package sync")]
pub struct Cli {
    /// Suppress progress and informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which manifests a command works on.
#[derive(Debug, Clone, Default, Args)]
pub struct Selection {
    /// Manifest file at the project root
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<String>,

    /// Object name(s); each one selects <name>.manifest
    #[arg(long = "obj-name", num_args = 1.., value_name = "NAME")]
    pub obj_name: Vec<String>,

    /// Add packages (name or name==version) to the manifest, then sync it
    #[arg(long, num_args = 1.., value_name = "PKG")]
    pub spec: Vec<String>,

    /// Target toolchain, e.g. VS2019 or GCC12.3.0
    #[arg(long, value_name = "TAG")]
    pub compiler: Option<String>,

    /// Read only the selected root manifests, skip dependency directories
    #[arg(long)]
    pub root_only: bool,
}

impl Selection {
    pub fn flags(&self) -> RequestFlags {
        RequestFlags {
            manifest: self.manifest.clone(),
            objects: self.obj_name.clone(),
            spec: self.spec.clone(),
            compiler: self.compiler.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install or refresh every package the project needs
    Sync {
        #[command(flatten)]
        selection: Selection,
    },
    /// Install or refresh a single package
    Fetch {
        /// Package, optionally pinned: name or name==version
        package: String,
        /// Manifest whose toolchain tag selects the build
        #[arg(short, long, value_name = "FILE")]
        manifest: Option<String>,
        /// Target toolchain, e.g. VS2019 or GCC12.3.0
        #[arg(long, value_name = "TAG")]
        compiler: Option<String>,
    },
    /// Show what a sync would change, without changing anything
    Status {
        #[command(flatten)]
        selection: Selection,
    },
    /// List packages available on the remote
    Remote {
        /// Only show packages whose name contains this text
        filter: Option<String>,
    },
    /// Read or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one value
    Get {
        /// Dotted key, e.g. remote.url
        key: String,
    },
    /// Set one value in config.toml
    Set {
        /// Dotted key, e.g. remote.url
        key: String,
        /// New value
        value: String,
    },
    /// Print every known key
    List,
}
