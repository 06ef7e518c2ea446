//! Command-line lattice utility.
//!
//! Loads a `.LAT` file and applies the requested transformations: filler
//! removal, equivalent-node minimization, posterior computation. The result
//! can be written back as `.LAT` or exported for visualization.

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lattice_decoder::lattice::{Lattice, LatticeOptimizer};

struct Options {
    input: PathBuf,
    remove_fillers: bool,
    optimize: bool,
    posteriors: bool,
    lm_weight: f32,
    output: Option<PathBuf>,
    dot: Option<PathBuf>,
    aisee: Option<PathBuf>,
}

fn usage() -> ! {
    eprintln!(
        "usage: lattice-tool <input.lat> [--remove-fillers] [--optimize] \
         [--posteriors] [--lm-weight <w>] [--out <file.lat>] [--dot <file>] [--aisee <file>]"
    );
    process::exit(2);
}

fn parse_args() -> Result<Options> {
    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else { usage() };
    if input == "--help" || input == "-h" {
        usage();
    }
    let mut options = Options {
        input: PathBuf::from(input),
        remove_fillers: false,
        optimize: false,
        posteriors: false,
        lm_weight: 1.0,
        output: None,
        dot: None,
        aisee: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--remove-fillers" => options.remove_fillers = true,
            "--optimize" => options.optimize = true,
            "--posteriors" => options.posteriors = true,
            "--lm-weight" => {
                let value = args.next().context("--lm-weight needs a value")?;
                options.lm_weight = value
                    .parse()
                    .with_context(|| format!("bad --lm-weight value '{}'", value))?;
            }
            "--out" => options.output = Some(args.next().context("--out needs a path")?.into()),
            "--dot" => options.dot = Some(args.next().context("--dot needs a path")?.into()),
            "--aisee" => options.aisee = Some(args.next().context("--aisee needs a path")?.into()),
            other => bail!("unknown argument '{}'", other),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let options = parse_args()?;

    let mut lattice = Lattice::load(&options.input)
        .with_context(|| format!("loading {}", options.input.display()))?;
    info!(
        nodes = lattice.num_nodes(),
        edges = lattice.num_edges(),
        "loaded lattice"
    );

    if options.remove_fillers {
        lattice.remove_fillers();
        info!(nodes = lattice.num_nodes(), "removed fillers");
    }
    if options.optimize {
        let mut optimizer = LatticeOptimizer::new(&mut lattice);
        optimizer.optimize();
        optimizer.remove_hanging_nodes();
        info!(
            nodes = lattice.num_nodes(),
            edges = lattice.num_edges(),
            "optimized lattice"
        );
    }
    if options.posteriors {
        lattice.compute_node_posteriors(options.lm_weight, false);
        let path = lattice.viterbi_path();
        let words: Vec<&str> = path
            .iter()
            .filter_map(|id| lattice.get_node(id))
            .map(|node| node.word().spelling())
            .collect();
        println!("best path: {}", words.join(" "));
        for id in lattice.sort_nodes() {
            if let Some(node) = lattice.get_node(&id) {
                println!(
                    "{}\t{}\t[{},{}]\tp:{}",
                    id,
                    node.word().spelling(),
                    lattice.node_begin_time(&id),
                    node.end_time(),
                    node.posterior()
                );
            }
        }
    }

    if let Some(path) = &options.output {
        lattice
            .dump_to_file(path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &options.dot {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        lattice.dump_dot(&mut out, "lattice")?;
    }
    if let Some(path) = &options.aisee {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        lattice.dump_aisee(&mut out, "lattice")?;
    }
    Ok(())
}
