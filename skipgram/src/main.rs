use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use skipgram::persist;
use skipgram::{InitMode, OptimizerKind, TrainConfig, Trainer, Vocabulary};

#[derive(Parser)]
#[command(about = "Train skip-gram word vectors with negative sampling", long_about = None)]
struct Options {
    /// Use text data from FILE to train the model, one sentence per line
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Save the embedding matrix after each epoch. The filename is modified by
    /// adding `-1`, `-2`, etc.
    #[arg(long = "output", value_name = "FILE")]
    output_file: PathBuf,

    /// Also export the final vectors in word2vec format to FILE
    #[arg(long = "export", value_name = "FILE")]
    export_file: Option<PathBuf>,

    /// Write the word2vec export in binary mode
    #[arg(long, requires = "export_file")]
    binary: bool,

    /// Set size of word vectors
    #[arg(long = "size", default_value_t = 100)]
    embed_size: usize,

    /// Set max skip length between words
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Pick a random window radius up to --window at each position
    #[arg(long)]
    dynamic_window: bool,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; default
    /// is 1e-3, useful range is (0, 1e-5); 0 disables subsampling
    #[arg(long, default_value_t = 1e-3)]
    sample: f32,

    /// Number of negative examples; common values are 3 - 10
    #[arg(long, default_value_t = 5)]
    negative: usize,

    /// Number of training epochs
    #[arg(long, default_value_t = 5)]
    iter: usize,

    /// Discard words that appear less than N times
    #[arg(long = "min-count", value_name = "N", default_value_t = 5)]
    min_count: u64,

    /// Optimizer: `gd` or `adam`
    #[arg(long, default_value = "gd")]
    optimizer: String,

    /// Set the learning rate; default is 0.025 for gd and 0.001 for adam
    #[arg(long)]
    alpha: Option<f32>,

    /// Adam only: divide the step size by 1 + DECAY * (t - 1)
    #[arg(long, value_name = "DECAY")]
    adam_decay: Option<f32>,

    /// Context-weight initialization: `zero` or `xavier`
    #[arg(long, default_value = "zero")]
    init: String,

    /// Learn a bias for each output word
    #[arg(long)]
    biases: bool,

    /// Seed for all random draws
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// The vocabulary will be saved to FILE as `word count` lines
    #[arg(long = "save-vocab", value_name = "FILE")]
    save_vocab_file: Option<PathBuf>,

    /// The vocabulary will be read from FILE, not constructed from the training data
    #[arg(long = "read-vocab", value_name = "FILE")]
    read_vocab_file: Option<PathBuf>,

    /// Save the vocabulary maps to FILE in bincode format
    #[arg(long = "vocab-output", value_name = "FILE")]
    vocab_output_file: Option<PathBuf>,

    /// Don't show a progress bar
    #[arg(long)]
    quiet: bool,
}

impl Options {
    /// Unknown optimizer or init names fail here, before any training work.
    fn train_config(&self) -> Result<TrainConfig> {
        let optimizer: OptimizerKind = self.optimizer.parse()?;
        let init: InitMode = self.init.parse()?;
        let learning_rate = self.alpha.unwrap_or(match optimizer {
            OptimizerKind::GradientDescent => 0.025,
            OptimizerKind::Adam => 0.001,
        });
        let config = TrainConfig {
            embed_size: self.embed_size,
            window: self.window,
            dynamic_window: self.dynamic_window,
            use_biases: self.biases,
            optimizer,
            learning_rate,
            adam_decay: self.adam_decay,
            subsample_rate: self.sample,
            negative_samples: self.negative,
            n_epochs: self.iter,
            init,
            seed: self.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

fn progress_bar(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {wide_bar} {percent:>3}% {msg}",
        )
        .context("invalid progress bar template")?,
    );
    Ok(bar)
}

fn run(options: Options) -> Result<()> {
    let config = options.train_config()?;

    let vocab = match &options.read_vocab_file {
        Some(f) => Vocabulary::load_counts(f, options.min_count)?,
        None => Vocabulary::from_corpus(&options.train_file, options.min_count)?,
    };
    info!(vocab_size = vocab.len(), "vocabulary ready");
    if let Some(f) = &options.save_vocab_file {
        vocab.save_counts(f)?;
    }
    if let Some(f) = &options.vocab_output_file {
        persist::save_vocab(f, &vocab)?;
    }

    let mut trainer = Trainer::new(config, &vocab)?.with_progress(progress_bar(options.quiet)?);
    trainer.train_file(&options.train_file, |stats, params| {
        let path = persist::epoch_output_path(&options.output_file, stats.epoch + 1);
        persist::save_embeddings(&path, params.embeddings())?;
        info!(
            epoch = stats.epoch + 1,
            mean_loss = stats.mean_loss().unwrap_or(0.0),
            "saved embeddings to {}",
            path.display()
        );
        Ok(())
    })?;

    if let Some(f) = &options.export_file {
        persist::export_word2vec(f, &vocab, trainer.params().embeddings(), options.binary)?;
        info!("exported word2vec vectors to {}", f.display());
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = Options::parse();
    if let Err(err) = run(options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
