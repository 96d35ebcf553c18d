//! Region Classifier CLI
//!
//! Fine-tunes the classifier on an image-folder dataset, classifies local
//! images with a trained checkpoint and prints dataset statistics.

use std::path::{Path, PathBuf};

use anyhow::Result;
use burn::config::Config;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use region_classifier::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use region_classifier::dataset::{ImageFolder, IMAGE_EXTENSIONS};
use region_classifier::inference::{Predictor, Preprocessor};
use region_classifier::model::{Architecture, ClassifierConfig};
use region_classifier::training::{
    run_training, TrainingConfig, TrainingOutputs, DEFAULT_DATA_ROOT,
};
use region_classifier::utils::format_duration;
use region_classifier::utils::logging::{init_logging, LogConfig};
use region_classifier::{ClassifierError, DEFAULT_LABELS_PATH, DEFAULT_MODEL_PATH};

/// Image region classification with Burn
#[derive(Parser, Debug)]
#[command(name = "region_classifier")]
#[command(version)]
#[command(about = "Train and run an image region classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune the classifier on <data_dir>/train
    Train {
        /// Dataset root containing a train/ directory of class folders
        #[arg(short, long, default_value = DEFAULT_DATA_ROOT)]
        data_dir: PathBuf,

        /// JSON training config; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Initial learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Square training image size
        #[arg(long)]
        image_size: Option<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Network architecture (densenet121 or compact)
        #[arg(short, long)]
        architecture: Option<Architecture>,

        /// ImageNet-pretrained DenseNet-121 (torchvision .pth or .mpk) to fine-tune from
        #[arg(long)]
        pretrained: Option<String>,

        /// Where to write the trained weights
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model_out: PathBuf,

        /// Where to write the class names
        #[arg(long, default_value = DEFAULT_LABELS_PATH)]
        labels_out: PathBuf,
    },

    /// Classify an image or every image in a directory
    Infer {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Path to trained weights
        #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,

        /// Path to the class names file
        #[arg(long, default_value = DEFAULT_LABELS_PATH)]
        labels: PathBuf,

        /// Architecture the weights were trained with
        #[arg(short, long, default_value = "densenet121")]
        architecture: Architecture,

        /// Number of ranked classes to show per image
        #[arg(short = 'k', long, default_value = "3")]
        top_k: usize,
    },

    /// Show dataset statistics and class weights
    Stats {
        /// Dataset root containing a train/ directory of class folders
        #[arg(short, long, default_value = DEFAULT_DATA_ROOT)]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = init_logging(&LogConfig::from_verbosity(cli.verbose));

    print_banner();

    match cli.command {
        Commands::Train {
            data_dir,
            config,
            epochs,
            batch_size,
            learning_rate,
            image_size,
            seed,
            architecture,
            pretrained,
            model_out,
            labels_out,
        } => {
            let mut training_config = match config {
                Some(path) => TrainingConfig::load(&path).map_err(|e| {
                    anyhow::anyhow!("Failed to load training config {:?}: {}", path, e)
                })?,
                None => TrainingConfig::new(),
            };
            if let Some(epochs) = epochs {
                training_config.num_epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                training_config.batch_size = batch_size;
            }
            if let Some(lr) = learning_rate {
                training_config.learning_rate = lr;
            }
            if let Some(size) = image_size {
                training_config.image_size = size;
            }
            if let Some(seed) = seed {
                training_config.seed = seed;
            }
            if let Some(arch) = architecture {
                training_config.architecture = arch;
            }
            if pretrained.is_some() {
                training_config.pretrained = pretrained;
            }

            let outputs = TrainingOutputs {
                model_path: model_out,
                labels_path: labels_out,
            };
            cmd_train(&data_dir, &training_config, &outputs)?;
        }

        Commands::Infer {
            input,
            model,
            labels,
            architecture,
            top_k,
        } => {
            cmd_infer(&input, &model, &labels, architecture, top_k)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════╗
 ║   Region Classifier                              ║
 ║   Image Classification with Burn + Rust          ║
 ╚══════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(data_dir: &Path, config: &TrainingConfig, outputs: &TrainingOutputs) -> Result<()> {
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Dataset:       {}", data_dir.display());
    println!("  Architecture:  {}", config.architecture);
    println!("  Epochs:        {}", config.num_epochs);
    println!("  Batch size:    {}", config.batch_size);
    println!("  Learning rate: {:e}", config.learning_rate);
    println!("  LR decay:      x{} every {} epochs", config.gamma, config.step_size);
    println!("  Image size:    {}", config.image_size);
    println!("  Seed:          {}", config.seed);
    println!("  Backend:       {}", backend_name());
    println!();

    let summary =
        match run_training::<TrainingBackend>(data_dir, config, outputs, default_device()) {
            Ok(summary) => summary,
            Err(ClassifierError::DatasetMissing(path)) => {
                println!(
                    "{} Training directory not found: {}",
                    "Error:".red(),
                    path.display()
                );
                println!();
                println!("{}", "Expected structure:".yellow());
                println!("  {}/", data_dir.display());
                println!("  └── train/");
                println!("      ├── <class_a>/");
                println!("      └── <class_b>/");
                println!();
                println!("Split your dataset into that layout or pass --data-dir.");
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        };

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Classes:  {}", summary.classes.join(", "));
    println!("  Samples:  {}", summary.num_samples);
    if let Some(loss) = summary.epoch_losses.last() {
        println!("  Final loss: {:.4}", loss);
    }
    println!("  Duration: {}", format_duration(std::time::Duration::from_secs_f64(summary.duration_secs)));
    println!("  Weights:  {}", summary.model_path.display());
    println!("  Labels:   {}", summary.labels_path.display());

    Ok(())
}

fn cmd_infer(
    input: &Path,
    model: &Path,
    labels: &Path,
    architecture: Architecture,
    top_k: usize,
) -> Result<()> {
    info!("Running inference on {:?}", input);

    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  Input:   {}", input.display());
    println!("  Model:   {}", model.display());
    println!("  Labels:  {}", labels.display());
    println!("  Backend: {}", backend_name());
    println!();

    if !input.exists() {
        println!("{} Input path not found: {}", "Error:".red(), input.display());
        return Ok(());
    }

    println!("{}", "Loading model...".cyan());
    let model_config = ClassifierConfig::new(0).with_architecture(architecture);
    let predictor = Predictor::<DefaultBackend>::load(
        model,
        labels,
        &model_config,
        Preprocessor::default(),
        default_device(),
    )?;

    let files: Vec<PathBuf> = if input.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    } else {
        vec![input.to_path_buf()]
    };

    for path in &files {
        let bytes = std::fs::read(path)?;
        match predictor.predict_bytes(&bytes) {
            Ok(prediction) => {
                println!(
                    "{} {} ({:.1}%, {:.1} ms)",
                    path.display().to_string().bold(),
                    prediction.label.green(),
                    prediction.probability * 100.0,
                    prediction.inference_time_ms
                );
                for (idx, name, prob) in prediction.top_k(predictor.labels(), top_k) {
                    println!("    {:3}. {:30} {:.4}", idx, name, prob);
                }
            }
            Err(e) => {
                println!("{} {}: {}", "Error:".red(), path.display(), e);
            }
        }
    }

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    let train_dir = data_dir.join("train");
    info!("Computing dataset statistics for {:?}", train_dir);

    if !train_dir.is_dir() {
        println!(
            "{} Training directory not found: {}",
            "Error:".red(),
            train_dir.display()
        );
        return Ok(());
    }

    let folder = ImageFolder::new(&train_dir)?;
    folder.get_stats().print();

    println!("\n  Class weights:");
    match folder.class_weights() {
        Ok(weights) => {
            for (name, weight) in folder.classes.iter().zip(weights.as_slice()) {
                println!("    {:30} {:.4}", name, weight);
            }
        }
        Err(e) => println!("    {} {}", "Warning:".yellow(), e),
    }

    Ok(())
}
