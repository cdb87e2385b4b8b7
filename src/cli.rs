//! Command-line interface.
//!
//! - `cms-bundler gen <markup|styles|scripts|all> [--watch]` - regenerate index modules
//! - `cms-bundler build` - build one `@CMS/<key>.html` fragment per manifest key
//! - `cms-bundler rewrite <prefix>` - prefix root-relative asset URLs in `@CMS/*.html`
//! - `cms-bundler serve` - serve `public/` for dev mode
//! - `cms-bundler block add <key>` / `block rename <from> <to>` - scaffolding

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinSet;

use crate::config::{Config, DEFAULT_CDN_PORT, DEFAULT_DEBOUNCE_MS};
use crate::index::generator_for;
use crate::rewrite::{rewrite_output_dir, PathPrefixRewriter};
use crate::watch::{watch_generator, NotifyWatcher};
use crate::{build_cms, scaffold, server, AssetKind, BlockBundler, BundleError, InlineBundler};

#[derive(Debug, Parser)]
#[command(name = "cms-bundler")]
#[command(author, version, about = "CMS block pipeline", long_about = None)]
pub struct Cli {
    /// Project root.
    #[arg(long, env = "CMS_ROOT", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Watch-mode debounce window in milliseconds.
    #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS, global = true)]
    pub debounce_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Effective configuration.
    pub fn config(&self) -> Config {
        let mut config = Config::new(&self.root);
        config.debounce = Duration::from_millis(self.debounce_ms);
        if let Commands::Serve { port } = &self.command {
            config.cdn_port = *port;
        }
        config
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Regenerate index modules.
    Gen {
        #[arg(value_enum)]
        target: GenTarget,
        /// Keep running and regenerate on changes.
        #[arg(long)]
        watch: bool,
    },
    /// Build every block into the output directory.
    Build,
    /// Prefix root-relative asset URLs in the built fragments.
    Rewrite {
        /// Path prefix, e.g. `/some-folder`.
        prefix: String,
    },
    /// Serve the public directory with CORS and caching disabled.
    Serve {
        #[arg(long, env = "CDN_PORT", default_value_t = DEFAULT_CDN_PORT)]
        port: u16,
    },
    /// Block scaffolding.
    #[command(subcommand)]
    Block(BlockCommand),
}

#[derive(Debug, Subcommand)]
pub enum BlockCommand {
    /// Create source files for a new block and append it to the manifest.
    Add { key: String },
    /// Rename a block's source files and its manifest entry.
    Rename { from: String, to: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GenTarget {
    Markup,
    Styles,
    Scripts,
    All,
}

impl GenTarget {
    pub fn kinds(self) -> Vec<AssetKind> {
        match self {
            GenTarget::Markup => vec![AssetKind::Markup],
            GenTarget::Styles => vec![AssetKind::Styles],
            GenTarget::Scripts => vec![AssetKind::Scripts],
            GenTarget::All => AssetKind::ALL.to_vec(),
        }
    }
}

/// Execute a parsed command line.
pub async fn run(cli: Cli) -> Result<(), BundleError> {
    let config = cli.config();
    let layout = config.layout.clone();

    match cli.command {
        Commands::Gen { target, watch } => {
            let generators: Vec<_> = target
                .kinds()
                .into_iter()
                .map(|kind| generator_for(kind, &layout))
                .collect();
            for generator in &generators {
                generator.generate()?;
            }
            if watch {
                watch_all(generators, config.debounce).await?;
            }
        }
        Commands::Build => {
            let service = Arc::new(InlineBundler::new(&layout.root));
            let bundler = BlockBundler::new(layout, service);
            build_cms(&bundler).await?;
        }
        Commands::Rewrite { prefix } => {
            rewrite_output_dir(&layout.root, &layout.out_dir, &PathPrefixRewriter::new(&prefix))?;
        }
        Commands::Serve { .. } => {
            server::serve(&layout.public_dir, config.cdn_port).await?;
        }
        Commands::Block(BlockCommand::Add { key }) => {
            scaffold::add_block(&layout, &key)?;
        }
        Commands::Block(BlockCommand::Rename { from, to }) => {
            scaffold::rename_block(&layout, &from, &to)?;
        }
    }
    Ok(())
}

/// One independent watch loop per generator, each with its own watcher.
async fn watch_all(
    generators: Vec<Box<dyn crate::index::IndexGenerator>>,
    window: Duration,
) -> Result<(), BundleError> {
    let mut tasks = JoinSet::new();
    for generator in generators {
        tasks.spawn(async move {
            let mut watcher = NotifyWatcher::new();
            watch_generator(Arc::from(generator), &mut watcher, window).await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| BundleError::WatchError(format!("watch task failed: {e}")))??;
    }
    Ok(())
}
