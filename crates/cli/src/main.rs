// xwalk - crosswalk admin CLI
// Curates explicit links and reviews the key registry over the wire protocol.

mod client;
mod exit_codes;
mod render;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crosswalk_protocol::{KeyList, KeyRef};

use client::{Client, ClientError};
use exit_codes::{client_exit_code, EXIT_SUCCESS, EXIT_USAGE};
use render::{known_keys_table, links_table};

#[derive(Parser)]
#[command(name = "xwalk")]
#[command(about = "Crosswalk admin CLI - inspect and curate identifier links")]
#[command(version)]
struct Cli {
    /// Server address (host:port)
    #[arg(long, global = true, default_value = "127.0.0.1:4780")]
    addr: String,

    /// Shared-secret bearer token
    #[arg(long, global = true, env = "CROSSWALK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, authenticate, and show server info
    Status,

    /// List known set names
    Sets,

    /// List observed keys for one or more sets as an index-aligned table
    #[command(after_help = "\
Examples:
  xwalk keys powerschool
  xwalk keys powerschool canvas --last-seen")]
    Keys {
        /// Set names; each renders one column pair
        #[arg(required = true)]
        sets: Vec<String>,

        /// Include last-seen timestamps
        #[arg(long)]
        last_seen: bool,
    },

    /// List explicit links between two sets, oriented left/right
    Links {
        left_set: String,
        right_set: String,
    },

    /// Add one explicit link from two (set, key) pairs
    #[command(after_help = "\
Examples:
  xwalk add-link powerschool ALG-1 canvas algebra-i")]
    AddLink {
        left_set: String,
        left_key: String,
        right_set: String,
        right_key: String,
    },

    /// Remove one explicit link
    RmLink {
        left_set: String,
        left_key: String,
        right_set: String,
        right_key: String,
    },

    /// Remove every observation under the named sets
    RmSets {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Remove specific observed keys from one set
    RmKeys {
        set: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Compute a committed left→right mapping between two key lists
    #[command(after_help = "\
Examples:
  xwalk link powerschool canvas --left ALG-1,BIO-2 --right algebra-i,biology-ii
  xwalk link powerschool canvas --left ALG-1 --right algebra-i --json")]
    Link {
        left_set: String,
        right_set: String,

        /// Left keys (comma-separated; repeatable)
        #[arg(long = "left", value_delimiter = ',', required = true)]
        left_keys: Vec<String>,

        /// Right keys (comma-separated; repeatable)
        #[arg(long = "right", value_delimiter = ',', required = true)]
        right_keys: Vec<String>,

        /// Print the mapping as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show every pairing candidate with its score, for review
    Suggest {
        left_set: String,
        right_set: String,

        /// Left keys (comma-separated; repeatable)
        #[arg(long = "left", value_delimiter = ',', required = true)]
        left_keys: Vec<String>,

        /// Right keys (comma-separated; repeatable)
        #[arg(long = "right", value_delimiter = ',', required = true)]
        right_keys: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(token) = cli.token.clone() else {
        eprintln!("xwalk: no token given; pass --token or export CROSSWALK_TOKEN");
        return ExitCode::from(EXIT_USAGE);
    };

    match run(cli, &token) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("xwalk: {e}");
            ExitCode::from(client_exit_code(&e))
        }
    }
}

fn run(cli: Cli, token: &str) -> Result<(), ClientError> {
    let mut client = Client::connect(&cli.addr, token)?;

    match cli.command {
        Commands::Status => {
            client.ping()?;
            println!("server:           {}", cli.addr);
            println!("protocol version: {}", client.protocol_version());
            println!("capabilities:     {}", client.capabilities().join(", "));
        }

        Commands::Sets => {
            for set in client.known_sets()? {
                println!("{set}");
            }
        }

        Commands::Keys { sets, last_seen } => {
            let mut columns = Vec::with_capacity(sets.len());
            for set in sets {
                let entries = client.known_keys(&set)?;
                columns.push((set, entries));
            }
            print!("{}", known_keys_table(&columns, last_seen));
        }

        Commands::Links { left_set, right_set } => {
            let (left_keys, right_keys) = client.explicit_links(&left_set, &right_set)?;
            print!("{}", links_table(&left_set, &right_set, &left_keys, &right_keys));
        }

        Commands::AddLink { left_set, left_key, right_set, right_key } => {
            client.add_explicit_link(
                KeyRef { set: left_set.clone(), key: left_key.clone() },
                KeyRef { set: right_set.clone(), key: right_key.clone() },
            )?;
            eprintln!("linked {left_set}/{left_key} <-> {right_set}/{right_key}");
        }

        Commands::RmLink { left_set, left_key, right_set, right_key } => {
            client.delete_explicit_link(
                KeyRef { set: left_set.clone(), key: left_key.clone() },
                KeyRef { set: right_set.clone(), key: right_key.clone() },
            )?;
            eprintln!("unlinked {left_set}/{left_key} <-> {right_set}/{right_key}");
        }

        Commands::RmSets { names } => {
            let count = names.len();
            client.delete_known_sets(names)?;
            eprintln!("removed observations for {count} set(s)");
        }

        Commands::RmKeys { set, keys } => {
            let count = keys.len();
            client.delete_known_keys(&set, keys)?;
            eprintln!("removed {count} key(s) from {set}");
        }

        Commands::Link { left_set, right_set, left_keys, right_keys, json } => {
            let mapping = client.link(
                KeyList { name: left_set, keys: left_keys },
                KeyList { name: right_set, keys: right_keys },
            )?;
            if json {
                let rendered = serde_json::to_string_pretty(&mapping)
                    .map_err(|e| ClientError::Protocol(e.to_string()))?;
                println!("{rendered}");
            } else {
                for (left, right) in &mapping {
                    println!("{left} -> {right}");
                }
            }
        }

        Commands::Suggest { left_set, right_set, left_keys, right_keys } => {
            let candidates = client.suggest_links(
                KeyList { name: left_set, keys: left_keys },
                KeyList { name: right_set, keys: right_keys },
            )?;
            for candidate in candidates {
                println!(
                    "{:.3}  {} -> {}",
                    candidate.correlation, candidate.left, candidate.right
                );
            }
        }
    }

    Ok(())
}
