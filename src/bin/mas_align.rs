use std::fs::File;
use std::path::{Path, PathBuf};

use clap::Parser;
use ndarray::{Array3, Axis};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::Serialize;
use vits2_synth::alignment::{maximum_path, maximum_path_from_mask};

#[derive(Debug, Parser)]
#[command(name = "mas_align")]
#[command(about = "Run monotonic alignment search over a [batch, frame, token] score tensor")]
struct Args {
    /// `.npy` file holding f32 scores shaped [batch, frames, tokens].
    #[arg(long, env = "MAS_ALIGN_SCORES")]
    scores: PathBuf,
    /// `.npy` f32 mask of the same shape; overrides the explicit lengths.
    #[arg(long, env = "MAS_ALIGN_MASK")]
    mask: Option<PathBuf>,
    #[arg(long, value_delimiter = ',')]
    frame_lengths: Vec<i32>,
    #[arg(long, value_delimiter = ',')]
    token_lengths: Vec<i32>,
    /// Where to write the i32 path tensor.
    #[arg(long, env = "MAS_ALIGN_OUT", default_value = "path.npy")]
    out: PathBuf,
}

#[derive(Debug, Serialize)]
struct Summary {
    batch: usize,
    frames: usize,
    tokens: usize,
    /// Frames assigned to each token, per batch element.
    durations: Vec<Vec<i32>>,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        tracing::error!(error = %err, "mas_align failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Fails only when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<(), String> {
    let args = Args::parse();

    let mut scores = read_tensor(&args.scores)?;
    tracing::info!(shape = ?scores.dim(), path = %args.scores.display(), "scores loaded");

    let path = match &args.mask {
        Some(mask_path) => {
            let mask = read_tensor(mask_path)?;
            maximum_path_from_mask(&scores, &mask).map_err(|e| e.to_string())?
        }
        None => {
            if args.frame_lengths.is_empty() || args.token_lengths.is_empty() {
                return Err("either --mask or both --frame-lengths and --token-lengths are required"
                    .to_string());
            }
            maximum_path(&mut scores, &args.frame_lengths, &args.token_lengths)
                .map_err(|e| e.to_string())?
        }
    };

    let out = File::create(&args.out)
        .map_err(|e| format!("create {}: {e}", args.out.display()))?;
    path.write_npy(out)
        .map_err(|e| format!("write {}: {e}", args.out.display()))?;

    let (batch, frames, tokens) = path.dim();
    let durations = path
        .sum_axis(Axis(1))
        .outer_iter()
        .map(|row| row.to_vec())
        .collect();
    let summary = Summary {
        batch,
        frames,
        tokens,
        durations,
    };
    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{json}");
    tracing::info!(out = %args.out.display(), "path written");
    Ok(())
}

fn read_tensor(path: &Path) -> Result<Array3<f32>, String> {
    let file = File::open(path).map_err(|e| format!("open {}: {e}", path.display()))?;
    Array3::<f32>::read_npy(file).map_err(|e| format!("read {}: {e}", path.display()))
}
