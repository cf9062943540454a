//! The vocabulary: dense word ids ordered by descending frequency.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TrainError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    word_to_id: HashMap<String, usize>,
    id_to_word: Vec<String>,
    /// `counts[id]` is the corpus frequency of word `id`.
    counts: Vec<u64>,
}

impl Vocabulary {
    /// Build a vocabulary from `(word, count)` pairs, discarding words that
    /// occur fewer than `min_count` times.
    ///
    /// Ids are assigned by descending count. Ties keep the order in which the
    /// words were supplied. A word supplied twice has its counts summed.
    pub fn from_counts<I, S>(counts: I, min_count: u64) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut entries: Vec<(String, u64)> = vec![];
        for (word, count) in counts {
            let word = word.into();
            match index.get(&word) {
                Some(&i) => entries[i].1 += count,
                None => {
                    index.insert(word.clone(), entries.len());
                    entries.push((word, count));
                }
            }
        }

        // Stable sort, so equally frequent words stay in first-seen order.
        entries.sort_by_key(|&(_, count)| Reverse(count));
        entries.retain(|&(_, count)| count >= min_count && count > 0);

        let mut vocab = Vocabulary {
            word_to_id: HashMap::with_capacity(entries.len()),
            id_to_word: Vec::with_capacity(entries.len()),
            counts: Vec::with_capacity(entries.len()),
        };
        for (id, (word, count)) in entries.into_iter().enumerate() {
            vocab.word_to_id.insert(word.clone(), id);
            vocab.id_to_word.push(word);
            vocab.counts.push(count);
        }
        vocab
    }

    /// Count every whitespace-separated token in a corpus file.
    pub fn from_corpus(path: &Path, min_count: u64) -> Result<Self> {
        let file = File::open(path).map_err(|err| TrainError::io(path, err))?;

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut counts: Vec<(String, u64)> = vec![];
        let mut train_words: u64 = 0;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| TrainError::io(path, err))?;
            for word in line.split_whitespace() {
                train_words += 1;
                if let Some(&i) = index.get(word) {
                    counts[i].1 += 1;
                } else {
                    index.insert(word.to_string(), counts.len());
                    counts.push((word.to_string(), 1));
                }
            }
        }

        let vocab = Self::from_counts(counts, min_count);
        info!(
            vocab_size = vocab.len(),
            train_words,
            min_count,
            "learned vocabulary from {}",
            path.display()
        );
        Ok(vocab)
    }

    pub fn len(&self) -> usize {
        self.id_to_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_word.is_empty()
    }

    /// Returns the id of a word, or `None` if it is not in the vocabulary.
    pub fn id(&self, word: &str) -> Option<usize> {
        self.word_to_id.get(word).copied()
    }

    /// Get the word for an id. Panics if `id` is out of range.
    pub fn word(&self, id: usize) -> &str {
        &self.id_to_word[id]
    }

    pub fn words(&self) -> &[String] {
        &self.id_to_word
    }

    pub fn count(&self, id: usize) -> u64 {
        self.counts[id]
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Sum of all counts, `N`.
    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Map each whitespace-separated token of a sentence to its id.
    /// Out-of-vocabulary tokens become `None`.
    pub fn encode(&self, sentence: &str) -> Vec<Option<usize>> {
        sentence.split_whitespace().map(|word| self.id(word)).collect()
    }

    /// Save in the word2vec text format: one `word count` line per word, in id
    /// order.
    pub fn save_counts(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|err| TrainError::io(path, err))?;
        let mut out = BufWriter::new(file);
        for (word, count) in self.id_to_word.iter().zip(&self.counts) {
            writeln!(out, "{word} {count}").map_err(|err| TrainError::io(path, err))?;
        }
        out.flush().map_err(|err| TrainError::io(path, err))
    }

    /// Read a file written by `save_counts`. Words are re-sorted and filtered
    /// by `min_count`, so ids may differ from the file order.
    pub fn load_counts(path: &Path, min_count: u64) -> Result<Self> {
        let file = File::open(path).map_err(|err| TrainError::io(path, err))?;
        let mut counts = vec![];
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|err| TrainError::io(path, err))?;
            let fields = line.split_whitespace().collect::<Vec<&str>>();
            if fields.is_empty() {
                continue;
            }
            let syntax_error = || TrainError::VocabSyntax {
                path: path.to_path_buf(),
                line: line_num + 1,
            };
            if fields.len() != 2 {
                return Err(syntax_error());
            }
            let count = fields[1].parse::<u64>().map_err(|_| syntax_error())?;
            counts.push((fields[0].to_string(), count));
        }
        Ok(Self::from_counts(counts, min_count))
    }
}
