use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storyloom::cli::{edit, export, generate, project};
use storyloom::config::Config;
use storyloom::llm::CommandModel;
use storyloom::project::Inputs;
use storyloom::store::ProjectStore;
use storyloom::Orchestrator;

#[derive(Parser)]
#[command(name = "storyloom")]
#[command(about = "Chapter-by-chapter fiction generation with a continuity ledger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "storyloom.yaml")]
    config: String,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project
    New(NewArgs),

    /// List recent projects
    List {
        /// Maximum number of projects to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a project, or one chapter of it
    Show {
        /// Project ID prefix or title
        project: String,
        /// Chapter index to print
        #[arg(long)]
        chapter: Option<u32>,
    },

    /// Delete a project
    Delete {
        /// Project ID prefix or title
        project: String,
    },

    /// Generate (or regenerate) the brief and story bible
    Brief {
        /// Project ID prefix or title
        project: String,
    },

    /// Generate (or regenerate) the outline, keeping drafted chapters
    Outline {
        /// Project ID prefix or title
        project: String,
    },

    /// Draft the next undrafted chapter
    Next {
        /// Project ID prefix or title
        project: String,
    },

    /// Rewrite one chapter in place, keeping user edits
    Regenerate {
        /// Project ID prefix or title
        project: String,
        /// Chapter index
        index: u32,
    },

    /// Discard a chapter and everything after it, then draft it fresh
    Redraft {
        /// Project ID prefix or title
        project: String,
        /// Chapter index
        index: u32,
    },

    /// Discard a chapter and everything after it
    Rewind {
        /// Project ID prefix or title
        project: String,
        /// First chapter index to discard
        index: u32,
    },

    /// Store a human edit of a chapter
    Edit {
        /// Project ID prefix or title
        project: String,
        /// Chapter index
        index: u32,
        /// File holding the edited chapter text
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// JSON file holding continuity facts for the chapter
        #[arg(long)]
        continuity: Option<PathBuf>,
    },

    /// Export a project as Markdown
    Export {
        /// Project ID prefix or title
        project: String,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct NewArgs {
    /// Working title
    #[arg(long)]
    title: Option<String>,
    #[arg(long, default_value = "")]
    genre: String,
    #[arg(long, default_value = "")]
    tone: String,
    #[arg(long, default_value = "")]
    voice: String,
    #[arg(long, default_value = "")]
    audience: String,
    #[arg(long, default_value = "")]
    humour: String,
    /// Number of chapters
    #[arg(long)]
    chapters: Option<u32>,
    #[arg(long)]
    target_words: Option<u32>,
    #[arg(long)]
    min_words: Option<u32>,
    #[arg(long)]
    max_words: Option<u32>,
    /// One-line core concept (invented by the model if omitted)
    #[arg(long)]
    concept: Option<String>,
    /// Canon: characters
    #[arg(long, default_value = "")]
    characters: String,
    /// Canon: locations
    #[arg(long, default_value = "")]
    locations: String,
    /// Canon: anything else the story must respect
    #[arg(long, default_value = "")]
    notes: String,
}

impl NewArgs {
    fn into_inputs(self, defaults: Inputs) -> Inputs {
        Inputs {
            title: self.title,
            genre: self.genre,
            tone: self.tone,
            voice: self.voice,
            audience: self.audience,
            humour_level: self.humour,
            total_chapters: self.chapters.unwrap_or(defaults.total_chapters),
            target_words: self.target_words.unwrap_or(defaults.target_words),
            min_words: self.min_words.unwrap_or(defaults.min_words),
            max_words: self.max_words.unwrap_or(defaults.max_words),
            core_concept: self.concept,
            characters: self.characters,
            locations: self.locations,
            notes: self.notes,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "storyloom=debug" } else { "storyloom=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load config
    let config = Config::load(&cli.config).unwrap_or_default();

    // Initialize store and orchestrator
    let store = ProjectStore::open(&config.database_path())?;
    let model = CommandModel::from_config(&config.model);
    let orc = Orchestrator::new(store, model, config.generation.clone());

    match cli.command {
        Commands::New(args) => {
            project::create(orc.store(), args.into_inputs(config.default_inputs()))?;
        }
        Commands::List { limit } => {
            project::list(orc.store(), limit.unwrap_or(config.generation.list_limit))?;
        }
        Commands::Show { project, chapter } => {
            project::show(orc.store(), &project, chapter)?;
        }
        Commands::Delete { project } => {
            project::delete(orc.store(), &project)?;
        }
        Commands::Brief { project } => {
            generate::brief(&orc, &project).await?;
        }
        Commands::Outline { project } => {
            generate::outline(&orc, &project).await?;
        }
        Commands::Next { project } => {
            generate::next(&orc, &project).await?;
        }
        Commands::Regenerate { project, index } => {
            generate::regenerate(&orc, &project, index).await?;
        }
        Commands::Redraft { project, index } => {
            generate::redraft(&orc, &project, index).await?;
        }
        Commands::Rewind { project, index } => {
            generate::rewind(&orc, &project, index)?;
        }
        Commands::Edit {
            project,
            index,
            file,
            continuity,
        } => {
            edit::run(&orc, &project, index, file.as_deref(), continuity.as_deref())?;
        }
        Commands::Export { project, output } => {
            export::run(orc.store(), &project, output.as_deref())?;
        }
    }

    Ok(())
}
