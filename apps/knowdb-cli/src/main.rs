use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use knowdb_core::config::Config;
use knowdb_core::types::SearchMode;
use knowdb_hybrid::KnowledgeBase;

mod commands;

/// Local knowledge base: ingest converted documents and search them.
#[derive(Parser, Debug)]
#[command(name = "knowdb", author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides storage.path
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store and seed the sample categories
    Init {
        #[arg(long)]
        no_sample_data: bool,
    },
    /// Delete every document, note, category and topic
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Ingest a markdown/text file or every such file under a directory
    Ingest {
        path: PathBuf,
        #[arg(long)]
        category: String,
        #[arg(long)]
        topic: String,
    },
    /// Keyword, semantic or hybrid search
    Search {
        query: String,
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, requires = "category")]
        topic: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show a document
    Show {
        id: String,
        /// Also print its chunks
        #[arg(long)]
        chunks: bool,
    },
    /// Delete a document
    Delete { id: String },
    /// Move a document to another topic
    Move {
        id: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        topic: String,
    },
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Manage topics
    #[command(subcommand)]
    Topic(TopicCommand),
    /// Manage notes
    #[command(subcommand)]
    Note(NoteCommand),
    /// Print store statistics
    Stats,
    /// Build the ANN index over chunk vectors
    Optimize,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Print the category → topic → document tree
    List {
        #[arg(long)]
        json: bool,
    },
    Rename { category: String, name: String },
    Delete {
        category: String,
        /// Also delete its topics and documents
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TopicCommand {
    Add {
        #[arg(long)]
        category: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List {
        #[arg(long)]
        category: Option<String>,
    },
    Rename {
        #[arg(long)]
        category: String,
        topic: String,
        name: String,
    },
    Delete {
        #[arg(long)]
        category: String,
        topic: String,
        /// Also delete its documents
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum NoteCommand {
    Add {
        content: String,
        /// Link to a document id
        #[arg(long, conflicts_with = "topic")]
        document: Option<String>,
        /// Link to a topic id
        #[arg(long)]
        topic: Option<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Show { id: String },
    Delete { id: String },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let mut settings = config.settings()?;
    if let Some(dir) = args.data_dir {
        settings.storage.path = dir;
    }
    let kb = KnowledgeBase::open(settings).await?;

    match args.command {
        Commands::Init { no_sample_data } => commands::init(&kb, !no_sample_data).await,
        Commands::Reset { yes } => commands::reset(&kb, yes).await,
        Commands::Ingest { path, category, topic } => commands::ingest(&kb, &path, &category, &topic).await,
        Commands::Search { query, mode, top_k, category, topic, json } => {
            let top_k = top_k.unwrap_or(kb.settings().search.default_top_k);
            commands::search(&kb, &query, mode, top_k, category.as_deref(), topic.as_deref(), json).await
        }
        Commands::Show { id, chunks } => commands::show(&kb, &id, chunks).await,
        Commands::Delete { id } => {
            kb.delete_document(&id).await?;
            println!("🗑️  Deleted document {}", id);
            Ok(())
        }
        Commands::Move { id, category, topic } => commands::move_document(&kb, &id, &category, &topic).await,
        Commands::Category(cmd) => commands::category(&kb, cmd).await,
        Commands::Topic(cmd) => commands::topic(&kb, cmd).await,
        Commands::Note(cmd) => commands::note(&kb, cmd).await,
        Commands::Stats => commands::stats(&kb).await,
        Commands::Optimize => commands::optimize(&kb).await,
    }
}
