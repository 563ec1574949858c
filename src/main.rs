use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wildprompt::catalog::CatalogMode;
use wildprompt::{extract_lora_tags, process, CatalogBuilder, WildcardCatalog, WildcardConfig};

#[derive(Parser)]
#[command(name = "wildprompt")]
#[command(about = "Wildcard template engine for prompt expansion", long_about = None)]
struct Cli {
    /// Primary wildcard directory (overrides config)
    #[arg(long, global = true)]
    wildcards: Option<PathBuf>,

    /// Secondary wildcard directory (overrides config)
    #[arg(long, global = true)]
    custom_wildcards: Option<PathBuf>,

    /// Cache limit in megabytes (overrides config)
    #[arg(long, global = true)]
    cache_limit_mb: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a template into a concrete prompt
    Expand {
        /// Template text, e.g. "a {red|blue} __animal__"
        template: String,
        /// Seed for reproducible expansion
        #[arg(short, long)]
        seed: Option<u64>,
        /// Number of expansions to produce (seed increments per expansion)
        #[arg(short, long, default_value_t = 1)]
        count: u64,
    },
    /// List wildcard keys known to the catalog
    List {
        /// Include discoverable-but-unloaded keys in on-demand mode
        #[arg(long)]
        all: bool,
    },
    /// Extract lora records from an expanded template
    Loras {
        template: String,
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Show catalog mode and key counts
    Info,
    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) | None => {
            println!("wildprompt {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Expand {
            ref template,
            seed,
            count,
        }) => {
            let catalog = build_catalog(&cli)?;
            for i in 0..count {
                let seed = seed.map(|s| s + i);
                println!("{}", process(&catalog, template, seed));
            }
        }
        Some(Commands::List { all }) => {
            let catalog = build_catalog(&cli)?;
            let keys = if all {
                catalog.discoverable_keys()
            } else {
                catalog.keys()
            };
            for key in keys {
                println!("__{}__", key);
            }
        }
        Some(Commands::Loras { ref template, seed }) => {
            let catalog = build_catalog(&cli)?;
            let expanded = process(&catalog, template, seed);
            for record in extract_lora_tags(&expanded) {
                println!(
                    "{}: model={} clip={} lbw={:?} loader={:?}",
                    record.name,
                    record.model_weight,
                    record.clip_weight,
                    record.block_weights,
                    record.loader
                );
            }
        }
        Some(Commands::Info) => {
            let catalog = build_catalog(&cli)?;
            let mode = match catalog.mode() {
                CatalogMode::FullCache => "full-cache",
                CatalogMode::OnDemand => "on-demand",
            };
            println!("mode: {}", mode);
            println!("loaded keys: {}", catalog.loaded_count());
            println!("discoverable keys: {}", catalog.discoverable_count());
        }
    }

    Ok(())
}

fn build_catalog(cli: &Cli) -> anyhow::Result<WildcardCatalog> {
    let mut config = WildcardConfig::load_default()?;
    if let Some(dir) = &cli.wildcards {
        config.wildcard_dir = dir.clone();
    }
    if let Some(dir) = &cli.custom_wildcards {
        config.custom_wildcard_dir = Some(dir.clone());
    }
    if let Some(limit) = cli.cache_limit_mb {
        config.cache_limit_mb = limit;
    }
    Ok(CatalogBuilder::new(config).build())
}
