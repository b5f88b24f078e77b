//! Autoencoder Training CLI Tool
//!
//! Trains the plankton autoencoder (or classifier backbone) described by a
//! YAML/TOML configuration on the images listed in `sampled_images.csv`.

use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use colored::Colorize;
use plankton_core::{load_config, resolve_device, setup_cli_logging, Device, TrainingConfig};
use plankton_training::{prepare_run, run_training, RunContext, TrainingSummary};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[cfg(feature = "cuda")]
use burn_cuda::{Cuda, CudaDevice};

/// Plankton Autoencoder Training Tool
#[derive(Parser, Debug)]
#[command(
    name = "train-autoencoder",
    about = "Train a plankton autoencoder or classifier backbone",
    long_about = "Train a plankton autoencoder or classifier backbone on a sampled image \
                  manifest, saving periodic checkpoints and a loss curve."
)]
struct Args {
    /// Path to training configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Directory containing sampled_images.csv
    #[arg(short, long, value_name = "DIR")]
    input: PathBuf,

    /// Directory under which the run directory is created
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Override number of epochs
    #[arg(short, long, value_name = "N")]
    epochs: Option<usize>,

    /// Override batch size
    #[arg(short, long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Override learning rate
    #[arg(short, long, value_name = "LR")]
    lr: Option<f64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Validate config and manifest without training
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_cli_logging(args.verbose)?;

    if let Err(e) = run(args) {
        error!("Training failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    info!("Plankton Autoencoder - Training Tool");
    info!("====================================");

    let mut config: TrainingConfig =
        load_config(&args.config).context("Failed to load configuration file")?;
    apply_overrides(&mut config, &args);

    let device = resolve_device(&config.device, cfg!(feature = "cuda"));
    info!("Using device: {}", device);
    print_config_summary(&config, &args);

    if args.dry_run {
        let prepared = prepare_run(&config, &args.input).context("Validation failed")?;
        let missing = prepared.missing_images();
        if !missing.is_empty() {
            warn!("{} manifest images are missing, first: {}", missing.len(), missing[0].display());
        }
        info!(
            "Configuration validated successfully (dry run): {} samples, class counts {:?}",
            prepared.statistics.num_samples, prepared.statistics.class_distribution
        );
        return Ok(());
    }

    let summary = train(config, &args, device)?;
    print_summary(&summary);
    Ok(())
}

fn apply_overrides(config: &mut TrainingConfig, args: &Args) {
    if let Some(epochs) = args.epochs {
        config.autoencoder.num_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.autoencoder.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        config.autoencoder.learning_rate = lr;
    }
}

fn context<B: burn::tensor::backend::Backend>(
    config: TrainingConfig,
    args: &Args,
    device: B::Device,
    compute_device: Device,
) -> RunContext<B> {
    RunContext {
        config,
        input_dir: args.input.clone(),
        output_root: args.output.clone(),
        device,
        compute_device,
        show_progress: true,
    }
}

fn train(config: TrainingConfig, args: &Args, device: Device) -> Result<TrainingSummary> {
    let summary = match device {
        #[cfg(feature = "cuda")]
        Device::Gpu(index) => run_training::<Autodiff<Cuda>>(context(
            config,
            args,
            CudaDevice::new(index),
            device,
        ))?,
        _ => run_training::<Autodiff<NdArray>>(context(config, args, NdArrayDevice::Cpu, Device::Cpu))?,
    };
    Ok(summary)
}

fn print_config_summary(config: &TrainingConfig, args: &Args) {
    let ae = &config.autoencoder;
    info!("");
    info!("Configuration Summary:");
    info!("  Architecture: {}", ae.architecture);
    info!("  Loss: {}", ae.loss);
    info!("  Image size: {}", config.sampling.target_size);
    info!("  Channels: {}", config.channels());
    info!("  Classes: {}", config.sampling.num_classes);
    info!("  Latent dim: {}", ae.latent_dim);
    info!("  Epochs: {}", ae.num_epochs);
    info!("  Batch size: {}", ae.batch_size);
    info!("  Learning rate: {}", ae.learning_rate);
    info!("  Save every: {} epochs", ae.save_every_n_epochs);
    info!("  Augmentation: {}", config.augmentation.enabled);
    info!("  Input dir: {}", args.input.display());
    info!("  Output dir: {}", args.output.display());
    info!("");
}

fn print_summary(summary: &TrainingSummary) {
    println!();
    println!("{}", "Training Complete!".green().bold());
    if let Some(last) = summary.loss_history.last() {
        println!("  Final loss:    {:.4}", last);
    }
    if let Some(best) = summary.loss_history.iter().copied().reduce(f64::min) {
        println!("  Best loss:     {:.4}", best);
    }
    println!("  Checkpoints:   {}", summary.checkpoints.len());
    println!(
        "  Final weights: {}",
        summary.final_weights.display().to_string().cyan()
    );
    println!(
        "  Loss plot:     {}",
        summary.loss_plot.display().to_string().cyan()
    );
}
