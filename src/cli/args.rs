use crate::core::ExecutionMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "extractor_gate")]
#[command(about = "Stress-test a shared, non-reentrant feature extractor from many threads")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run T worker threads x R gated extractions and verify the results
    Stress {
        /// Number of worker threads [default: 4]
        #[arg(short, long)]
        threads: Option<usize>,

        /// Extractions per worker [default: 10000]
        #[arg(short = 'r', long)]
        iterations: Option<usize>,

        /// Feature blob to extract [default: fc7]
        #[arg(short, long)]
        layer: Option<String>,

        /// Execution mode [default: gpu]
        #[arg(short, long, value_enum)]
        mode: Option<ExecutionMode>,

        /// Model description (JSON); the built-in reference network when omitted
        #[arg(long)]
        model: Option<PathBuf>,

        /// Image directory; synthetic images when omitted
        #[arg(long)]
        images: Option<PathBuf>,

        /// Number of distinct images in the pool [default: 10]
        #[arg(long)]
        distinct_images: Option<usize>,

        /// Do not alias the first half of the assignments
        #[arg(long)]
        no_alias: bool,

        /// Keep a worker running after a failed extraction
        #[arg(long)]
        continue_on_error: bool,

        /// Allowed L-infinity distance between repeated extractions (0 = bit-identical)
        #[arg(long)]
        tolerance: Option<f64>,

        /// Configuration preset (default, quick, saturate)
        #[arg(short = 'p', long)]
        config_preset: Option<String>,

        /// Run configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the run summary to this JSON file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Extract features for every image in a file or directory
    Extract {
        /// Image file or directory
        input: PathBuf,

        /// Output file; one file per layer named <stem>_<layer>.txt
        #[arg(short, long, default_value = "features.txt")]
        output: PathBuf,

        /// Comma-separated list of feature blobs
        #[arg(short, long, default_value = "fc7")]
        layer: String,

        /// Execution mode
        #[arg(short, long, value_enum, default_value = "gpu")]
        mode: ExecutionMode,

        /// Model description (JSON)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Log progress every N images [default: 100 in GPU mode, 10 in CPU mode]
        #[arg(long)]
        log_every_nth: Option<usize>,

        /// Write one maximum per channel instead of every value
        #[arg(long)]
        kernel_max_pooling: bool,
    },

    /// Score extracted features by mean average precision against class annotations
    Evaluate {
        /// Feature file written by `extract` (<label>:<v1>;<v2>;...;)
        features: PathBuf,

        /// Annotation CSV, one line per feature: <image id>;<class id>;<is query>;<class count>
        annotations: PathBuf,

        /// Distance function (l2, l2sqr, l1, linfinity, cosine, hamming, maxdim)
        #[arg(short, long, default_value = "l2sqr")]
        distance: String,

        /// Evaluate only the top K results of each query (0 = all)
        #[arg(short = 'k', long, default_value_t = 0)]
        top_k: usize,

        /// Exclude the query image from its own results
        #[arg(short, long)]
        exclude_query_from_results: bool,

        /// Write per-query results to this JSON file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the feature blobs of a model
    Layers {
        /// Model description (JSON)
        #[arg(long)]
        model: Option<PathBuf>,
    },
}
