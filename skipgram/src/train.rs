//! The training loop: epochs, sentences, skip-gram windows.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, info_span, warn};

use crate::config::TrainConfig;
use crate::error::{Result, TrainError};
use crate::model;
use crate::optimizer::{self, Optimizer};
use crate::params::ParameterStore;
use crate::sampling::{negative_sample, NoiseTable, Subsampler, TrainingExample};
use crate::vocab::Vocabulary;

/// Loss bookkeeping for one epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochStats {
    /// Zero-based epoch number.
    pub epoch: usize,
    pub sentences: u64,
    /// In-vocabulary tokens seen, before subsampling.
    pub tokens_read: u64,
    /// Tokens that survived subsampling.
    pub tokens_kept: u64,
    /// Number of (input, context) pairs trained on.
    pub examples: u64,
    /// Projections that came out of the optimizer non-finite and were
    /// discarded instead of written back.
    pub rejected_updates: u64,
    pub total_loss: f64,
    /// Loss of the first example of the epoch, before its update.
    pub first_loss: Option<f32>,
}

impl EpochStats {
    fn new(epoch: usize) -> Self {
        EpochStats {
            epoch,
            ..EpochStats::default()
        }
    }

    fn record(&mut self, loss: f32) {
        self.examples += 1;
        self.total_loss += loss as f64;
        self.first_loss.get_or_insert(loss);
    }

    /// Average loss per example, or `None` if nothing was trained.
    pub fn mean_loss(&self) -> Option<f64> {
        (self.examples > 0).then(|| self.total_loss / self.examples as f64)
    }
}

/// Everything one training run needs: the vocabulary, the sampling tables, the
/// parameters and the optimizer state, and the random number generator.
///
/// Training is strictly sequential. Each example is sampled, projected,
/// updated and written back before the next one starts.
pub struct Trainer<'v> {
    config: TrainConfig,
    vocab: &'v Vocabulary,
    noise: NoiseTable,
    subsampler: Subsampler,
    params: ParameterStore,
    optimizer: Box<dyn Optimizer>,
    rng: StdRng,
    progress: ProgressBar,
}

impl<'v> Trainer<'v> {
    /// Validate `config` and set up a run over `vocab`.
    pub fn new(config: TrainConfig, vocab: &'v Vocabulary) -> Result<Self> {
        config.validate()?;
        if vocab.is_empty() {
            return Err(TrainError::InvalidConfig("vocabulary is empty".into()));
        }
        let noise = NoiseTable::new(vocab.counts());
        if noise.is_empty() {
            return Err(TrainError::InvalidConfig(
                "noise distribution is empty; every word count is zero".into(),
            ));
        }
        let subsampler = Subsampler::new(vocab.counts(), config.subsample_rate);

        let mut rng = StdRng::seed_from_u64(config.seed);
        let params = ParameterStore::new(
            vocab.len(),
            config.embed_size,
            config.use_biases,
            config.init,
            &mut rng,
        );
        let optimizer = optimizer::build(&config, &params);

        info!(
            vocab_size = vocab.len(),
            embed_size = config.embed_size,
            window = config.window,
            negative = config.negative_samples,
            optimizer = %config.optimizer,
            learning_rate = config.learning_rate,
            noise_table_len = noise.len(),
            "initialized trainer"
        );

        Ok(Trainer {
            config,
            vocab,
            noise,
            subsampler,
            params,
            optimizer,
            rng,
            progress: ProgressBar::hidden(),
        })
    }

    /// Report progress on `bar` while training from a file.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn into_params(self) -> ParameterStore {
        self.params
    }

    /// Loss of one example under the current parameters. Changes nothing.
    pub fn example_loss(&self, example: &TrainingExample) -> f32 {
        let projection = self
            .params
            .project(&[example.input_id], &example.target_ids);
        let preds = model::forward(&projection);
        model::loss(preds.view(), &example.labels)
    }

    /// Run forward, backward and one optimizer step on a single example.
    /// Returns the loss before the update, and whether the update was kept.
    /// A step that would make any parameter non-finite is dropped, and the
    /// store and optimizer state stay as they were.
    pub fn train_example(&mut self, example: &TrainingExample) -> (f32, bool) {
        let inputs = [example.input_id];
        let targets = &example.target_ids;

        let mut projection = self.params.project(&inputs, targets);
        let preds = model::forward(&projection);
        let loss = model::loss(preds.view(), &example.labels);
        let grads = model::backward(&projection, preds.view(), &example.labels);
        if self.optimizer.update(&mut projection, &grads, &inputs, targets) {
            self.params.unproject(&projection, &inputs, targets);
            (loss, true)
        } else {
            warn!(
                input = example.input_id,
                ?targets,
                "discarding non-finite parameter update"
            );
            (loss, false)
        }
    }

    /// Subsample one tokenized sentence and train on every skip-gram pair in
    /// it. `None` tokens are out-of-vocabulary and are skipped.
    pub fn train_sentence(
        &mut self,
        sentence: &[Option<usize>],
        stats: &mut EpochStats,
    ) -> Result<()> {
        let surviving: Vec<usize> = self
            .subsampler
            .filter(sentence, &mut self.rng)
            .collect();
        stats.sentences += 1;
        stats.tokens_read += sentence.iter().flatten().count() as u64;
        stats.tokens_kept += surviving.len() as u64;

        let window = self.config.window;
        if window == 0 || surviving.len() < 2 {
            return Ok(());
        }
        let excluded: HashSet<usize> = surviving.iter().copied().collect();

        for position in 0..surviving.len() {
            let radius = if self.config.dynamic_window {
                window - self.rng.gen_range(0..window)
            } else {
                window
            };
            let start = position.saturating_sub(radius);
            let stop = (position + radius + 1).min(surviving.len());
            for c in start..stop {
                if c == position {
                    continue;
                }
                let example = negative_sample(
                    surviving[position],
                    surviving[c],
                    &excluded,
                    self.config.negative_samples,
                    &self.noise,
                    &mut self.rng,
                )?;
                let (loss, kept) = self.train_example(&example);
                stats.record(loss);
                if !kept {
                    stats.rejected_updates += 1;
                }
            }
        }
        Ok(())
    }

    /// Train one epoch over sentences given as lines of text.
    pub fn train_epoch<I, S>(&mut self, epoch: usize, sentences: I) -> Result<EpochStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run_epoch(epoch, sentences.into_iter().map(Ok))
    }

    fn run_epoch<I, S>(&mut self, epoch: usize, lines: I) -> Result<EpochStats>
    where
        I: Iterator<Item = Result<S>>,
        S: AsRef<str>,
    {
        let _span = info_span!("epoch", epoch = epoch + 1).entered();
        let mut stats = EpochStats::new(epoch);
        for line in lines {
            let line = line?;
            let line = line.as_ref();
            self.progress.inc(line.len() as u64 + 1);
            let sentence = self.vocab.encode(line);
            self.train_sentence(&sentence, &mut stats)?;
        }

        if let Some(mean) = stats.mean_loss() {
            self.progress
                .set_message(format!("epoch {} loss={mean:.4}", epoch + 1));
        }
        info!(
            sentences = stats.sentences,
            tokens_read = stats.tokens_read,
            tokens_kept = stats.tokens_kept,
            examples = stats.examples,
            mean_loss = stats.mean_loss().unwrap_or(0.0),
            "finished epoch"
        );
        if stats.rejected_updates > 0 {
            warn!(
                rejected = stats.rejected_updates,
                "some parameter updates were non-finite and were discarded"
            );
        }
        Ok(stats)
    }

    /// Train for `config.n_epochs` epochs, re-reading `corpus` line by line
    /// each time. After every epoch `on_epoch_end` receives the statistics and
    /// the current parameters, typically to persist the embeddings.
    pub fn train_file<F>(&mut self, corpus: &Path, mut on_epoch_end: F) -> Result<Vec<EpochStats>>
    where
        F: FnMut(&EpochStats, &ParameterStore) -> Result<()>,
    {
        let file_size = std::fs::metadata(corpus)
            .map_err(|err| TrainError::io(corpus, err))?
            .len();
        self.progress
            .set_length(file_size * self.config.n_epochs as u64);
        info!("starting training using file {}", corpus.display());

        let mut all_stats = Vec::with_capacity(self.config.n_epochs);
        for epoch in 0..self.config.n_epochs {
            let file = File::open(corpus).map_err(|err| TrainError::io(corpus, err))?;
            let lines = BufReader::new(file)
                .lines()
                .map(|line| line.map_err(|err| TrainError::io(corpus, err)));
            let stats = self.run_epoch(epoch, lines)?;
            on_epoch_end(&stats, &self.params)?;
            debug!(epoch = epoch + 1, "epoch output written");
            all_stats.push(stats);
        }
        self.progress.finish();
        Ok(all_stats)
    }
}
