use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "taskwatchctl",
    version,
    about = "Follow background tasks on a task backend"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Task backend URL (overrides config and TASKWATCH_SERVER_URL)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Print records as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging for taskwatch crates (RUST_LOG wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch one task and print it
    Show {
        task_id: String,
    },
    /// Follow a task until it finishes, or all tasks of a type
    Watch(WatchArgs),
    /// Follow the set of entities with unfinished tasks of a type
    Busy {
        #[arg(long = "type", default_value = "download")]
        task_type: String,
    },
    /// Start a library sync and follow it
    Sync {
        /// Only sync recently updated entries
        #[arg(long)]
        recent: bool,
    },
    /// Download one entity and follow it, or queue several as a batch
    Download {
        #[arg(required = true, num_args = 1..)]
        entity_ids: Vec<String>,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct WatchArgs {
    /// Task id to follow until terminal
    #[arg(long)]
    pub task: Option<String>,

    /// Task type whose records to follow
    #[arg(long = "type")]
    pub task_type: Option<String>,
}
