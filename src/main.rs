use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use raven::api::Raven;
use raven::config::Config;

mod cli;

#[derive(Parser)]
#[command(name = "rvn")]
#[command(author, version, about = "Raven - A personal knowledge system")]
struct Cli {
    /// Path to the vault directory
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Named vault from config
    #[arg(long, global = true)]
    vault_name: Option<String>,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit the full response envelope as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new vault
    Init {
        /// Path to create the vault
        path: PathBuf,
    },

    /// Validate the vault (check for errors)
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Reindex changed files
    Reindex {
        /// Rebuild the index from scratch
        #[arg(long)]
        full: bool,
    },

    /// Run an RQL query
    Query {
        /// Query string, e.g. "object:project .status:active"
        query: String,
    },

    /// Run a saved query from raven.yaml
    Run {
        /// Saved query name
        name: String,

        /// Positional arguments interpolated as $1..$n
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Show backlinks to an object
    Backlinks {
        /// Target object (id, alias, short name, or date)
        target: String,
    },

    /// Full-text search over file bodies
    Search {
        /// Search text
        text: String,
    },

    /// Show index statistics
    Stats,

    /// List untyped pages
    Untyped,

    /// Open or create today's daily note
    Daily,

    /// Create a new typed note
    New {
        /// Type of note to create
        #[arg(long, short = 't')]
        r#type: String,

        /// Title of the note
        title: String,

        /// Field values as key=value
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,
    },

    /// Set a field on an object
    Set {
        /// Object id (e.g. people/freya or notes#standup)
        id: String,

        /// Field name
        field: String,

        /// New value
        value: String,
    },

    /// Replace a single exact occurrence of text in a file
    Edit {
        /// Vault-relative file path
        path: String,

        /// Text to replace (must occur exactly once)
        old: String,

        /// Replacement text
        new: String,
    },

    /// Move/rename a file
    Mv {
        /// Source path
        from: String,

        /// Destination path
        to: String,

        /// Rewrite [[refs]] in referring files
        #[arg(long)]
        update_refs: bool,
    },

    /// Delete a file (to trash by default)
    Rm {
        /// Vault-relative file path
        path: String,
    },

    /// Append a text block to a file
    Append {
        /// Vault-relative file path
        path: String,

        /// Text to append
        text: String,

        /// Append under this heading (created if missing)
        #[arg(long)]
        heading: Option<String>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Cli::parse();

    // Init works before any vault exists.
    if let Commands::Init { path } = &args.command {
        return code(cli::commands::init(path));
    }

    let config = match args.config.as_ref().map(Config::load_from).unwrap_or_else(Config::load) {
        Ok(config) => config,
        Err(e) => return code(cli::commands::report_open_error(&e)),
    };

    let vault_path = match config.resolve_vault(args.vault.clone(), args.vault_name.as_deref()) {
        Ok(path) => path,
        Err(e) => return code(cli::commands::report_open_error(&e)),
    };

    let mut raven = match Raven::open(&vault_path) {
        Ok(raven) => raven,
        Err(e) => return code(cli::commands::report_open_error(&e)),
    };

    let json = args.json;
    let status = match args.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Check { strict } => cli::commands::check(&raven, strict, json),
        Commands::Reindex { full } => cli::commands::reindex(&mut raven, full, json),
        Commands::Query { query } => cli::commands::query(&raven, &query, json),
        Commands::Run { name, args } => cli::commands::query_saved(&raven, &name, &args, json),
        Commands::Backlinks { target } => cli::commands::backlinks(&raven, &target, json),
        Commands::Search { text } => cli::commands::search(&raven, &text, json),
        Commands::Stats => cli::commands::stats(&raven, json),
        Commands::Untyped => cli::commands::untyped(&raven, json),
        Commands::Daily => cli::commands::daily(&mut raven, config.editor.as_deref()),
        Commands::New { r#type, title, fields } => {
            cli::commands::new_note(&mut raven, &r#type, &title, &fields, json)
        }
        Commands::Set { id, field, value } => cli::commands::set(&mut raven, &id, &field, &value, json),
        Commands::Edit { path, old, new } => cli::commands::edit(&mut raven, &path, &old, &new, json),
        Commands::Mv { from, to, update_refs } => {
            cli::commands::mv(&mut raven, &from, &to, update_refs, json)
        }
        Commands::Rm { path } => cli::commands::rm(&mut raven, &path, json),
        Commands::Append { path, text, heading } => {
            cli::commands::append(&mut raven, &path, &text, heading.as_deref(), json)
        }
    };

    code(status)
}

fn code(status: i32) -> ExitCode {
    ExitCode::from(status.clamp(0, 255) as u8)
}
