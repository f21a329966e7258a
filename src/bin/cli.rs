//! lsmkv CLI
//!
//! Opens a store directory in-process and runs a single command against it.

use std::process;

use clap::{Parser, Subcommand};
use lsmkv::{Config, KvError, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// lsmkv CLI
#[derive(Parser, Debug)]
#[command(name = "lsmkv-cli")]
#[command(about = "Command-line access to an lsmkv store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./lsmkv_data")]
    data_dir: String,

    /// MemTable size limit in KB before rotation
    #[arg(short = 'm', long, default_value = "4096")]
    memtable_kb: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Flush in-memory data to SSTables
    Flush,

    /// Merge all levels down to the last one
    Compact,

    /// Print table counts per level
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,lsmkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_size_limit(args.memtable_kb * 1024)
        .build();

    let store = match Store::open(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            process::exit(1);
        }
    };

    let outcome = run(&store, args.command);
    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        process::exit(1);
    }

    match outcome {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            eprintln!("(not found)");
            process::exit(2);
        }
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(1);
        }
    }
}

/// Execute one command
fn run(store: &Store, command: Commands) -> lsmkv::Result<()> {
    match command {
        Commands::Get { key } => {
            let value = store.get(key.as_bytes())?.ok_or(KvError::KeyNotFound)?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Put { key, value } => {
            store.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            store.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Flush => {
            store.flush()?;
            println!("OK ({} sstables)", store.sstable_count());
        }
        Commands::Compact => {
            for stats in store.compact()? {
                println!(
                    "L{} -> L{}: {} tables, {} -> {} entries, {} tombstones purged",
                    stats.source_level,
                    stats.target_level,
                    stats.input_tables,
                    stats.input_entries,
                    stats.output_entries,
                    stats.tombstones_purged
                );
            }
        }
        Commands::Stats => {
            println!("lsmkv v{}", lsmkv::VERSION);
            println!("wal sequence: {}", store.wal_seq());
            for (level, count) in store.level_counts().iter().enumerate() {
                println!("L{}: {} sstables", level, count);
            }
        }
    }
    Ok(())
}
