use clap::{Args, Parser, Subcommand, ValueEnum};
use rf_tree_distance::distances::{build_bitset_snapshots, distance_matrix, Metric};
use rf_tree_distance::io::{read_newick_trees, read_nexus_trees, write_matrix_tsv};
use rf_tree_distance::{calculate_rf_distance, normalized_copy, parse_newick, LeafIndex, RfError, RfOptions, TreeSnapshot};
use std::path::PathBuf;
use std::process::exit;
use std::time::Instant;

/// Robinson–Foulds distances between phylogenetic trees in Newick format.
#[derive(Parser, Debug)]
#[command(name = "rf-tree-distance", version, about = "Robinson-Foulds distances between Newick trees")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Distance between two Newick strings
    Pair {
        /// First tree, e.g. "((A,B),(C,D));"
        tree_a: String,
        /// Second tree
        tree_b: String,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Pairwise distance matrix (TSV) for all trees of a file
    Matrix(MatrixArgs),
    /// Print the non-trivial bipartitions of a tree
    Splits {
        tree: String,
        /// Print clusters below the root instead of unrooted splits
        #[arg(long = "rooted", default_value_t = false)]
        rooted: bool,
    },
}

#[derive(Args, Debug)]
struct OptionArgs {
    /// Compare rooted trees (clusters) instead of unrooted splits
    #[arg(long = "rooted", default_value_t = false)]
    rooted: bool,

    /// Scale the distance into [0, 1]
    #[arg(long = "normalized", default_value_t = false)]
    normalized: bool,

    /// Use branch lengths (weighted RF)
    #[arg(long = "weighted", default_value_t = false)]
    weighted: bool,
}

#[derive(Args, Debug)]
struct MatrixArgs {
    /// Path to a Newick or NEXUS tree file (may be gzip-compressed)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output path for TSV distance matrix (gzip if it ends with .gz)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Input format
    #[arg(long = "format", value_enum, default_value_t = FormatArg::Newick)]
    format: FormatArg,

    /// Burn-in by number of trees (drop first N trees, NEXUS only)
    #[arg(short = 't', long = "burnin", default_value_t = 0)]
    burnin: usize,

    /// Keep NEXUS TRANSLATE ids instead of mapping them to labels
    #[arg(long = "no-translate", default_value_t = false)]
    no_translate: bool,

    /// Distance metric to compute: rf | normalized | weighted | kf
    #[arg(long = "metric", value_enum, default_value_t = MetricArg::Rf)]
    metric: MetricArg,

    /// Compare rooted trees (clusters) instead of unrooted splits
    #[arg(long = "rooted", default_value_t = false)]
    rooted: bool,

    /// Quiet mode: suppresses progress messages on stdout
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    Newick,
    Nexus,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MetricArg {
    Rf,
    Normalized,
    Weighted,
    Kf,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Rf => Metric::Rf,
            MetricArg::Normalized => Metric::NormalizedRf,
            MetricArg::Weighted => Metric::WeightedRf,
            MetricArg::Kf => Metric::Kf,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Pair { tree_a, tree_b, options } => run_pair(&tree_a, &tree_b, &options),
        Command::Matrix(args) => run_matrix(&args),
        Command::Splits { tree, rooted } => run_splits(&tree, rooted),
    }
}

/// Exit code for a failed comparison: 2 when one input is broken on its own,
/// 3 when the inputs are fine but cannot be compared.
fn exit_code(e: &RfError) -> i32 {
    match e {
        RfError::Io(_) => 2,
        e if e.is_input_error() => 2,
        _ => 3,
    }
}

fn run_pair(tree_a: &str, tree_b: &str, args: &OptionArgs) {
    // Parse separately first so the message can say which input is broken
    for (label, newick) in [("first", tree_a), ("second", tree_b)] {
        if let Err(e) = parse_newick(newick) {
            eprintln!("Failed to read {label} tree: {e}");
            exit(2);
        }
    }

    let options = RfOptions::default()
        .with_rooted(args.rooted)
        .with_normalized(args.normalized)
        .with_weighted(args.weighted);
    match calculate_rf_distance(tree_a, tree_b, &options) {
        Ok(distance) => println!("{distance}"),
        Err(e) => {
            eprintln!("Failed to compare trees: {e}");
            exit(exit_code(&e));
        }
    }
}

fn run_splits(newick: &str, rooted: bool) {
    let result = parse_newick(newick).and_then(|tree| {
        let index = LeafIndex::from_tree(&tree)?;
        let normalized = normalized_copy(&tree, rooted)?;
        let snapshot = TreeSnapshot::from_tree(&normalized, &index, rooted)?;
        Ok(snapshot.bipartitions(&index))
    });
    match result {
        Ok(parts) => {
            for part in parts {
                println!("{part}");
            }
        }
        Err(e) => {
            eprintln!("Failed to read tree: {e}");
            exit(exit_code(&e));
        }
    }
}

fn run_matrix(args: &MatrixArgs) {
    // Read trees with names
    let t0 = Instant::now();
    let read = match args.format {
        FormatArg::Newick => read_newick_trees(&args.input),
        FormatArg::Nexus => read_nexus_trees(&args.input, args.burnin, !args.no_translate),
    };
    let named_trees = match read {
        Ok(trees) if !trees.is_empty() => trees,
        Ok(_) => {
            eprintln!("No trees parsed from {:?}.", args.input);
            exit(2);
        }
        Err(e) => {
            eprintln!("Failed to read {:?}: {e}", args.input);
            exit(2);
        }
    };
    let read_s = t0.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Reading in trees {read_s:.3}s"));
    let (names, trees): (Vec<String>, Vec<_>) = named_trees.into_iter().unzip();

    // Build bitset snapshots once and compute distances in parallel
    let t1 = Instant::now();
    let (leaf_index, snaps) = match build_bitset_snapshots(&trees, args.rooted) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to build snapshots: {e}");
            exit(3);
        }
    };
    let snap_s = t1.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Read in {} taxa for {} trees", leaf_index.len(), names.len()));
    log_if(!args.quiet, format!("Creating tree bit snapshots {snap_s:.3}s"));

    let t2 = Instant::now();
    let metric = Metric::from(args.metric);
    let metric_label = metric.label();
    log_if(!args.quiet, format!("Determining distances using {metric_label} for {} combinations", names.len() * (names.len() - 1) / 2));

    let mat = distance_matrix(&snaps, metric);
    let comp_s = t2.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Determining distances using {metric_label} {comp_s:.3}s"));

    let t3 = Instant::now();
    let written = if metric == Metric::Rf {
        // Whole counts print without a decimal point
        let counts: Vec<Vec<usize>> = mat
            .iter()
            .map(|row| row.iter().map(|&d| d as usize).collect())
            .collect();
        write_matrix_tsv(&args.output, &names, &counts)
    } else {
        write_matrix_tsv(&args.output, &names, &mat)
    };
    if let Err(e) = written {
        eprintln!("Failed to write output {:?}: {e}", args.output);
        exit(4);
    }
    let write_s = t3.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Wrote matrix to {:?} in {write_s:.3}s", args.output));
}

fn log_if(show: bool, msg: String) {
    if show {
        println!("{}", msg);
    }
}
