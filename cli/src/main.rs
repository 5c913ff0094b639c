mod parse_html;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use onebowl_core::{
    normalize, AnalyzedRecipe, CacheStore, Config, Pipeline, DEFAULT_RECENT_LIMIT,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "onebowl")]
#[command(about = "Reorganize recipe ingredients into mise en place bowls", long_about = None)]
struct Cli {
    /// SQLite file holding cached analyses
    #[arg(
        long,
        global = true,
        env = "CACHE_DB_PATH",
        default_value = onebowl_core::config::DEFAULT_DB_PATH
    )]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a recipe page, analyze it into bowls and cache the result
    Analyze {
        url: String,
        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the most recently analyzed recipes
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
        /// Print the recipes as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flag a cached analysis as wrong
    Flag { url: String },
    /// Print the cache key for a URL
    Normalize { url: String },
    /// Extract the raw recipe from a page or a saved HTML file without analyzing it
    Extract {
        /// Page to fetch (or the source URL to record when --file is given)
        url: String,
        /// Read HTML from this file instead of fetching
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Logs go to stderr so stdout stays clean for `--json` output.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { url, json } => analyze(cli.db, url.trim(), json).await?,
        Commands::Recent { limit, json } => recent(&open_cache(&cli.db)?, limit, json)?,
        Commands::Flag { url } => flag(&open_cache(&cli.db)?, url.trim())?,
        Commands::Normalize { url } => println!("{}", normalize(url.trim())),
        Commands::Extract { url, file } => match file {
            Some(file) => parse_html::parse_html(&file, url.trim())?,
            None => parse_html::fetch_and_parse(url.trim()).await?,
        },
    }

    Ok(())
}

fn open_cache(db: &Path) -> Result<CacheStore> {
    CacheStore::open(db).with_context(|| format!("Failed to open cache at {}", db.display()))
}

async fn analyze(db: PathBuf, url: &str, json: bool) -> Result<()> {
    if url.is_empty() {
        bail!("Please enter a URL.");
    }

    let mut config = Config::from_env().context("Invalid configuration")?;
    config.db_path = db;

    let pipeline = Pipeline::from_config(&config)?;
    let recipe = match pipeline.process(url).await {
        Ok(recipe) => recipe,
        Err(e) => {
            tracing::error!(kind = ?e.kind(), error = %e, "analysis failed");
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        print_recipe(&recipe);
    }
    Ok(())
}

fn recent(cache: &CacheStore, limit: usize, json: bool) -> Result<()> {
    let recipes = cache.recent(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    if recipes.is_empty() {
        println!("No recipes analyzed yet.");
    }
    for recipe in &recipes {
        println!("{}  {}", recipe.title, recipe.source_url);
    }
    Ok(())
}

fn flag(cache: &CacheStore, url: &str) -> Result<()> {
    let key = normalize(url);
    if !cache.flag(&key)? {
        bail!("No cached analysis for {}", key);
    }
    println!("Flagged {}", key);
    Ok(())
}

fn print_recipe(recipe: &AnalyzedRecipe) {
    println!("{}", recipe.title);
    if !recipe.source_url.is_empty() {
        println!("{}", recipe.source_url);
    }

    for bowl in &recipe.bowls {
        println!();
        println!("[{}] {}", bowl.label, bowl.explanation);
        for ingredient in &bowl.ingredients {
            let mut line = if ingredient.quantity.is_empty() {
                format!("  - {}", ingredient.name)
            } else {
                format!("  - {} {}", ingredient.quantity, ingredient.name)
            };
            if !ingredient.note.is_empty() {
                line.push_str(&format!(" ({})", ingredient.note));
            }
            println!("{}", line);
        }
    }

    println!();
    println!("Method");
    for (i, step) in recipe.method_steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
}
