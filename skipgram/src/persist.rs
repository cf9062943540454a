//! Reading and writing embeddings and vocabularies.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::prelude::*;

use crate::error::{Result, TrainError};
use crate::vocab::Vocabulary;

/// Save an embedding matrix (shape `(embed_size, V)`) in bincode format.
pub fn save_embeddings(path: &Path, embeddings: ArrayView2<'_, f32>) -> Result<()> {
    let file = File::create(path).map_err(|err| TrainError::io(path, err))?;
    let mut out = BufWriter::new(file);
    bincode::serialize_into(&mut out, &embeddings)
        .map_err(|err| TrainError::serialization(path, err))?;
    out.flush().map_err(|err| TrainError::io(path, err))
}

pub fn load_embeddings(path: &Path) -> Result<Array2<f32>> {
    let file = File::open(path).map_err(|err| TrainError::io(path, err))?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|err| TrainError::serialization(path, err))
}

/// Save the word-to-id map, the id-to-word list and the counts in bincode
/// format. The result loads independently of any training run.
pub fn save_vocab(path: &Path, vocab: &Vocabulary) -> Result<()> {
    let file = File::create(path).map_err(|err| TrainError::io(path, err))?;
    let mut out = BufWriter::new(file);
    bincode::serialize_into(&mut out, vocab).map_err(|err| TrainError::serialization(path, err))?;
    out.flush().map_err(|err| TrainError::io(path, err))
}

pub fn load_vocab(path: &Path) -> Result<Vocabulary> {
    let file = File::open(path).map_err(|err| TrainError::io(path, err))?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|err| TrainError::serialization(path, err))
}

/// The per-epoch variant of an output path: `vectors.bin` becomes
/// `vectors-3.bin` for epoch 3.
pub fn epoch_output_path(output: &Path, epoch: usize) -> PathBuf {
    let ext = output.extension();

    let mut path = output.to_path_buf();
    path.set_extension("");
    path.as_mut_os_string().push(format!("-{epoch}"));

    if let Some(ext) = ext {
        path.set_extension(ext);
    }
    path
}

/// Write vectors in the classic word2vec format: a `V size` header line, then
/// one line per word with the word, a space, and its vector, either as text or
/// as raw native-endian `f32`s.
pub fn export_word2vec(
    path: &Path,
    vocab: &Vocabulary,
    embeddings: ArrayView2<'_, f32>,
    binary: bool,
) -> Result<()> {
    let (size, vocab_size) = embeddings.dim();
    assert_eq!(vocab_size, vocab.len(), "one embedding column per word");

    let file = File::create(path).map_err(|err| TrainError::io(path, err))?;
    let mut out = BufWriter::new(file);
    let io_err = |err| TrainError::io(path, err);

    writeln!(out, "{vocab_size} {size}").map_err(io_err)?;
    for (word, column) in vocab.words().iter().zip(embeddings.columns()) {
        write!(out, "{word} ").map_err(io_err)?;
        if binary {
            let vector = column.to_vec();
            out.write_all(bytemuck::cast_slice::<f32, u8>(&vector))
                .map_err(io_err)?;
        } else {
            for x in column {
                write!(out, "{x} ").map_err(io_err)?;
            }
        }
        writeln!(out).map_err(io_err)?;
    }
    out.flush().map_err(io_err)
}
