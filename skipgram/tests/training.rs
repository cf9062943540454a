//! End-to-end training runs.

use std::fs;

use skipgram::persist;
use skipgram::{
    InitMode, OptimizerKind, TrainConfig, TrainError, Trainer, TrainingExample, Vocabulary,
};

fn toy_vocab() -> Vocabulary {
    Vocabulary::from_counts([("a", 10), ("b", 5), ("c", 5)], 1)
}

fn toy_config() -> TrainConfig {
    TrainConfig {
        embed_size: 4,
        window: 1,
        negative_samples: 2,
        n_epochs: 1,
        optimizer: OptimizerKind::GradientDescent,
        learning_rate: 0.1,
        subsample_rate: 0.0,
        init: InitMode::Zero,
        ..TrainConfig::default()
    }
}

/// The (input, context) pairs of "a b c" with window 1. With three words and
/// two negatives, the negatives are always the two other ids.
fn toy_examples() -> Vec<TrainingExample> {
    [(0, 1), (1, 0), (1, 2), (2, 1)]
        .into_iter()
        .map(|(input, context)| {
            let negatives: Vec<usize> = (0..3).filter(|&id| id != context).collect();
            TrainingExample::new(input, context, &negatives)
        })
        .collect()
}

fn mean_loss(trainer: &Trainer<'_>, examples: &[TrainingExample]) -> f32 {
    examples
        .iter()
        .map(|example| trainer.example_loss(example))
        .sum::<f32>()
        / examples.len() as f32
}

#[test]
fn toy_corpus_one_epoch() {
    let vocab = toy_vocab();
    let mut trainer = Trainer::new(toy_config(), &vocab).unwrap();
    let stats = trainer.train_epoch(0, ["a b c"]).unwrap();

    assert_eq!(stats.examples, 4);
    assert_eq!(stats.rejected_updates, 0);
    let first_loss = stats.first_loss.unwrap();
    assert!((first_loss - 3.0 * 2.0f32.ln()).abs() < 1e-5);

    let embeddings = trainer.params().embeddings();
    assert_eq!(embeddings.dim(), (4, 3));
    assert!(embeddings.iter().all(|x| x.is_finite()));
    assert!(trainer.params().weights().iter().all(|x| x.is_finite()));

    let mean_after = mean_loss(&trainer, &toy_examples());
    assert!(
        mean_after < first_loss,
        "loss after training {mean_after} should be below the first-step loss {first_loss}"
    );
}

#[test]
fn loss_falls_over_many_epochs() {
    let vocab = toy_vocab();
    let config = TrainConfig {
        learning_rate: 0.5,
        ..toy_config()
    };
    let mut trainer = Trainer::new(config, &vocab).unwrap();
    let examples = toy_examples();

    let initial = mean_loss(&trainer, &examples);
    for epoch in 0..20 {
        trainer.train_epoch(epoch, ["a b c", "c b a"]).unwrap();
        assert!(mean_loss(&trainer, &examples).is_finite());
    }
    let trained = mean_loss(&trainer, &examples);
    assert!(trained < initial - 0.1, "{trained} vs {initial}");
}

#[test]
fn adam_with_biases_trains() {
    let vocab = toy_vocab();
    let config = TrainConfig {
        optimizer: OptimizerKind::Adam,
        learning_rate: 0.05,
        use_biases: true,
        init: InitMode::Xavier,
        ..toy_config()
    };
    let mut trainer = Trainer::new(config, &vocab).unwrap();
    for epoch in 0..5 {
        let stats = trainer.train_epoch(epoch, ["a b c", "b a c"]).unwrap();
        assert_eq!(stats.rejected_updates, 0);
        assert!(stats.mean_loss().unwrap().is_finite());
    }
    let params = trainer.params();
    assert!(params.embeddings().iter().all(|x| x.is_finite()));
    assert!(params.biases().unwrap().iter().all(|x| x.is_finite()));
    assert!(params.biases().unwrap().iter().any(|&x| x != 0.0));
}

#[test]
fn overflowing_updates_are_discarded() {
    let vocab = toy_vocab();
    let config = TrainConfig {
        learning_rate: f32::MAX,
        ..toy_config()
    };
    let mut trainer = Trainer::new(config, &vocab).unwrap();
    let stats = trainer.train_epoch(0, ["a b c"]).unwrap();

    // The first step only moves the zero-initialized weights. After that the
    // embedding steps overflow.
    assert_eq!(stats.examples, 4);
    assert!(stats.rejected_updates > 0);
    let params = trainer.params();
    assert!(params.embeddings().iter().all(|x| x.is_finite()));
    assert!(params.weights().iter().all(|x| x.is_finite()));
}

#[test]
fn too_many_negatives_for_vocabulary_fails_cleanly() {
    let vocab = toy_vocab();
    let config = TrainConfig {
        negative_samples: 3,
        ..toy_config()
    };
    let mut trainer = Trainer::new(config, &vocab).unwrap();
    let err = trainer.train_epoch(0, ["a b c"]).unwrap_err();
    assert!(matches!(
        err,
        TrainError::NegativeSamplingExhausted { needed: 3, .. }
    ));
}

#[test]
fn train_file_persists_each_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("corpus.txt");
    fs::write(
        &corpus,
        "the quick brown fox jumps over the lazy dog\n\
         the dog sleeps\n\
         a quick brown dog jumps\n\
         the fox sleeps over the dog\n",
    )
    .unwrap();

    let vocab = Vocabulary::from_corpus(&corpus, 1).unwrap();
    let config = TrainConfig {
        embed_size: 8,
        window: 2,
        negative_samples: 3,
        n_epochs: 3,
        subsample_rate: 0.0,
        ..TrainConfig::default()
    };
    let output = dir.path().join("vectors.bin");
    let mut trainer = Trainer::new(config, &vocab).unwrap();
    let mut saved = vec![];
    let all_stats = trainer
        .train_file(&corpus, |stats, params| {
            let path = persist::epoch_output_path(&output, stats.epoch + 1);
            persist::save_embeddings(&path, params.embeddings())?;
            saved.push((path, params.embeddings().to_owned()));
            Ok(())
        })
        .unwrap();

    assert_eq!(all_stats.len(), 3);
    for (epoch, stats) in all_stats.iter().enumerate() {
        assert_eq!(stats.epoch, epoch);
        assert_eq!(stats.sentences, 4);
        assert_eq!(stats.tokens_read, 23);
        assert!(stats.examples > 0);
    }

    assert_eq!(saved.len(), 3);
    for (path, expected) in &saved {
        let loaded = persist::load_embeddings(path).unwrap();
        assert_eq!(&loaded, expected);
    }
    assert_eq!(saved[2].1, trainer.params().embeddings());
    assert!(dir.path().join("vectors-1.bin").exists());
    assert!(dir.path().join("vectors-3.bin").exists());
}

#[test]
fn missing_corpus_is_reported_with_path() {
    let vocab = toy_vocab();
    let mut trainer = Trainer::new(toy_config(), &vocab).unwrap();
    let missing = std::path::Path::new("/definitely/not/here.txt");
    match trainer.train_file(missing, |_, _| Ok(())) {
        Err(TrainError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn unknown_optimizer_is_a_config_error() {
    assert!(matches!(
        "momentum".parse::<OptimizerKind>(),
        Err(TrainError::UnknownOptimizer(_))
    ));
}
