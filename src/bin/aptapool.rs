//! aptapool CLI
//!
//! Command-line front end for registering and querying an aptamer pool.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use aptapool::config::DEFAULT_MAX_SHARD_CAPACITY;
use aptapool::{Alphabet, AptaError, AptamerPool, Identifier, PoolConfig, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

/// Reads buffered between the file reader and the workers
const CHANNEL_DEPTH: usize = 4096;

/// aptapool
#[derive(Parser, Debug)]
#[command(name = "aptapool")]
#[command(about = "Deduplicating sequence-to-identifier store for HT-SELEX pools")]
#[command(version)]
struct Args {
    /// Project directory (pool data lives in <project-dir>/pooldata)
    #[arg(short, long, default_value = ".")]
    project_dir: PathBuf,

    /// Maximum entries per shard file
    #[arg(short, long, default_value_t = DEFAULT_MAX_SHARD_CAPACITY)]
    capacity: u64,

    /// Permitted sequence symbols
    #[arg(short, long, value_enum, default_value_t = AlphabetArg::Dna)]
    alphabet: AlphabetArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlphabetArg {
    Dna,
    Rna,
    Iupac,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register sequences and print their identifiers
    Register {
        /// Sequences to register
        #[arg(required = true)]
        sequences: Vec<String>,
    },

    /// Register every sequence of a file (one per line)
    Import {
        /// Input file
        file: PathBuf,

        /// Worker threads
        #[arg(short, long, default_value = "4")]
        threads: usize,
    },

    /// Print the identifier of a sequence
    Lookup {
        /// The sequence to look up
        sequence: String,
    },

    /// Print the sequence registered under an identifier
    Sequence {
        /// The identifier to resolve
        id: Identifier,
    },

    /// Print pool statistics
    Stats,

    /// Print every (identifier, sequence) pair
    Dump {
        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,aptapool=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("aptapool v{}", aptapool::VERSION);
    tracing::info!("Project directory: {}", args.project_dir.display());

    let alphabet = match args.alphabet {
        AlphabetArg::Dna => Alphabet::dna(),
        AlphabetArg::Rna => Alphabet::rna(),
        AlphabetArg::Iupac => Alphabet::iupac(),
    };

    let config = PoolConfig::builder()
        .project_dir(&args.project_dir)
        .max_shard_capacity(args.capacity)
        .alphabet(alphabet)
        .build();

    let pool = match AptamerPool::open(config) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to open pool: {}", e);
            std::process::exit(1);
        }
    };

    // The pool is closed on every path, including a failed command
    let outcome = run(&pool, args.command);
    let closed = pool.close();

    if let Err(e) = outcome.and(closed) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(pool: &AptamerPool, command: Commands) -> Result<()> {
    match command {
        Commands::Register { sequences } => {
            for sequence in sequences {
                let id = pool.register_aptamer(sequence.as_bytes())?;
                println!("{}\t{}", id, sequence);
            }
        }
        Commands::Import { file, threads } => import(pool, &file, threads.max(1))?,
        Commands::Lookup { sequence } => match pool.get_identifier(sequence.as_bytes())? {
            Some(id) => println!("{}", id),
            None => println!("not registered"),
        },
        Commands::Sequence { id } => match pool.get_aptamer(id)? {
            Some(sequence) => println!("{}", String::from_utf8_lossy(&sequence)),
            None => println!("unknown identifier"),
        },
        Commands::Stats => print!("{}", pool.stats()?),
        Commands::Dump { limit } => {
            let limit = limit.unwrap_or(usize::MAX);
            let mut printed = 0usize;
            pool.pool().for_each(|sequence, id| {
                if printed < limit {
                    println!("{}\t{}", id, String::from_utf8_lossy(sequence));
                    printed += 1;
                }
            })?;
        }
    }
    Ok(())
}

// =============================================================================
// Import
// =============================================================================

/// Shared between the reader and the workers
#[derive(Default)]
struct Progress {
    registered: AtomicU64,
    skipped: AtomicU64,
    failure: Mutex<Option<AptaError>>,
}

/// Register every line of `path` using `threads` workers
///
/// Reads with invalid symbols are skipped and counted. The first storage
/// error stops the import and is returned.
fn import(pool: &AptamerPool, path: &Path, threads: usize) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    let progress = Progress::default();

    let read_result = std::thread::scope(|scope| {
        let (tx, rx) = channel::bounded::<String>(CHANNEL_DEPTH);
        for _ in 0..threads {
            let rx = rx.clone();
            let progress = &progress;
            scope.spawn(move || register_worker(pool, rx, progress));
        }
        drop(rx);

        feed_lines(reader, tx, &progress)
    });

    if let Some(e) = progress.failure.lock().take() {
        return Err(e);
    }
    read_result?;

    tracing::info!(
        "Imported {}: {} reads registered, {} skipped, pool size {}",
        path.display(),
        progress.registered.load(Ordering::Relaxed),
        progress.skipped.load(Ordering::Relaxed),
        pool.size()?
    );
    Ok(())
}

fn feed_lines(reader: impl BufRead, tx: Sender<String>, progress: &Progress) -> Result<()> {
    for line in reader.lines() {
        let line = line?;
        let read = line.trim();
        if read.is_empty() {
            continue;
        }
        // Every worker has stopped
        if tx.send(read.to_string()).is_err() {
            break;
        }
        if progress.failure.lock().is_some() {
            break;
        }
    }
    Ok(())
}

fn register_worker(pool: &AptamerPool, rx: Receiver<String>, progress: &Progress) {
    for read in rx.iter() {
        match pool.register_aptamer(read.as_bytes()) {
            Ok(_) => {
                progress.registered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_recoverable() => {
                tracing::debug!("Skipping read {:?}: {}", read, e);
                progress.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                progress.failure.lock().get_or_insert(e);
                return;
            }
        }
    }
}
