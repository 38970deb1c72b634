//! Aggen CLI
//!
//! - `generate`: load a network model and exploit catalog, enumerate the
//!   attack graph, store it, and optionally reduce and render it
//! - `reduce`: remove back edges from a stored graph
//! - `dot`: render a stored graph as Graphviz

use aggen_core::{
    remove_back_edges, DedupIndex, Generator, MemoryDedup, SearchConfig, SearchInstance, SearchResult, SharedDedup,
};
use aggen_storage::GraphStore;
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

mod config;
mod viz;

use config::{AggenConfig, DedupKind, Overrides};

#[derive(Parser)]
#[command(name = "aggen")]
#[command(author, version, about = "Aggen: attack graph generation")]
struct Cli {
    /// More log output (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an attack graph from a network model and exploit catalog.
    Generate(GenerateArgs),

    /// Remove back edges from a stored attack graph.
    Reduce {
        /// Stored graph snapshot
        #[arg(long)]
        store: PathBuf,
        /// Write Graphviz output after reduction
        #[arg(short = 'g', long)]
        graph: Option<PathBuf>,
    },

    /// Render a stored attack graph as Graphviz.
    Dot {
        /// Stored graph snapshot
        #[arg(long)]
        store: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Network model (JSON)
    #[arg(short = 'n', long)]
    network: PathBuf,
    /// Exploit catalog (JSON)
    #[arg(short = 'x', long)]
    exploits: PathBuf,
    /// Configuration file (JSON)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
    /// Checkpoint to the store every N new states
    #[arg(short = 'b', long)]
    batch_size: Option<usize>,
    /// Write Graphviz output
    #[arg(short = 'g', long)]
    graph: Option<PathBuf>,
    /// Remove back edges before storing
    #[arg(short = 'd', long)]
    no_cycles: bool,
    /// Upper bound on match-phase workers
    #[arg(long)]
    threads: Option<usize>,
    /// Initial frontier capacity
    #[arg(long)]
    queue_capacity: Option<usize>,
    /// Use the concurrent dedup index
    #[arg(long)]
    shared_dedup: bool,
    /// Snapshot file for the stored graph
    #[arg(long)]
    store: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Generate(args) => cmd_generate(&args),
        Commands::Reduce { store, graph } => cmd_reduce(&store, graph.as_deref()),
        Commands::Dot { store, out } => cmd_dot(&store, &out),
    };

    if let Err(err) = result {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// generate
// ============================================================================

fn cmd_generate(args: &GenerateArgs) -> Result<()> {
    let mut config = AggenConfig::resolve(args.config.as_deref())?;
    config.apply(&Overrides {
        batch_size: args.batch_size,
        threads: args.threads,
        queue_capacity: args.queue_capacity,
        shared_dedup: args.shared_dedup,
        store: args.store.clone(),
    });

    println!("{} {}", "Loading".green().bold(), args.network.display());
    let instance = aggen_model::load_instance(&args.network, &args.exploits)
        .with_context(|| format!("loading {} and {}", args.network.display(), args.exploits.display()))?;
    let exploit_names: Vec<String> = instance.exploits.iter().map(|x| x.name().to_string()).collect();

    println!("  Assets: {}", instance.assets.len());
    println!("  Exploits: {}", instance.exploits.len());
    println!(
        "  Facts: {}",
        instance.initial_qualities.len() + instance.initial_topologies.len()
    );

    let mut store = GraphStore::new(config.store.clone())?;
    store.record_interner(&instance.interner)?;

    println!("{}", "Generating attack graph".green().bold());
    let result = match config.search.dedup {
        DedupKind::Memory => run_search(instance, config.search.engine.clone(), MemoryDedup::new(), &mut store)?,
        DedupKind::Shared => run_search(instance, config.search.engine.clone(), SharedDedup::new(), &mut store)?,
    };

    println!("  Total time: {:.3} seconds", result.elapsed.as_secs_f64());
    println!("  Total states: {}", result.states.len());
    println!("  Total edges: {}", result.edges.len());

    store.save_search_result(&result)?;
    if args.no_cycles {
        let removed = reduce_store(&store)?;
        println!("  Back edges removed: {}", removed);
    }
    store.save()?;
    println!("  {} {}", "→".cyan(), config.store.path.display());

    if let Some(graph) = &args.graph {
        write_dot(&store, graph, &exploit_names)?;
    }

    println!("{}", "ok".green().bold());
    Ok(())
}

fn run_search<D: DedupIndex>(
    instance: SearchInstance,
    search: SearchConfig,
    dedup: D,
    store: &mut GraphStore,
) -> Result<SearchResult> {
    let checkpoints = search.batch_size.is_some();
    let generator = Generator::with_dedup(instance, search, dedup)?;
    let result = if checkpoints {
        generator.run_with_checkpoints(store)?
    } else {
        generator.run()?
    };
    Ok(result)
}

// ============================================================================
// reduce / dot
// ============================================================================

fn open_existing(path: &Path) -> Result<GraphStore> {
    anyhow::ensure!(path.exists(), "store {} does not exist", path.display());
    aggen_storage::open_store(path)
}

fn reduce_store(store: &GraphStore) -> Result<usize> {
    let info = store.fetch_graph_info()?;
    let mut edges = info.edges;
    let back = remove_back_edges(&info.vertices, &mut edges);
    Ok(store.delete_edges(&back))
}

fn cmd_reduce(path: &Path, graph: Option<&Path>) -> Result<()> {
    println!("{} {}", "Reducing".green().bold(), path.display());
    let store = open_existing(path)?;
    let removed = reduce_store(&store)?;
    store.save()?;

    println!("  Back edges removed: {}", removed);
    println!("  Remaining edges: {}", store.edge_count());
    if let Some(graph) = graph {
        write_dot(&store, graph, &[])?;
    }
    println!("{}", "ok".green().bold());
    Ok(())
}

fn cmd_dot(path: &Path, out: &Path) -> Result<()> {
    let store = open_existing(path)?;
    write_dot(&store, out, &[])?;
    Ok(())
}

fn write_dot(store: &GraphStore, out: &Path, exploit_names: &[String]) -> Result<()> {
    let info = store.fetch_graph_info()?;
    let dot = viz::render_dot(&info, exploit_names);
    fs::write(out, dot).with_context(|| format!("writing {}", out.display()))?;
    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    Ok(())
}
