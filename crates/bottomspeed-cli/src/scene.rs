//! A scene backed by G-code files on disk, one plate per file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bottomspeed::{PlateId, PlateOutput, Scene};

use crate::chunks::{join_chunks, split_chunks};

/// Plates loaded from files; plate id is the file's position.
pub struct FileScene {
    sources: Vec<PathBuf>,
    output: PlateOutput,
}

impl FileScene {
    /// Read and segment every input file.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut output = PlateOutput::new();
        for (plate, path) in paths.iter().enumerate() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let chunks = split_chunks(&text);
            log::debug!(
                "plate {plate}: {} chunks from {}",
                chunks.len(),
                path.display()
            );
            output.insert(plate as PlateId, chunks);
        }
        Ok(Self {
            sources: paths.to_vec(),
            output,
        })
    }

    /// Source file and current text of every plate, in plate order.
    pub fn plates(&self) -> impl Iterator<Item = (&Path, String)> + '_ {
        self.sources
            .iter()
            .zip(self.output.values())
            .map(|(path, chunks)| (path.as_path(), join_chunks(chunks)))
    }
}

impl Scene for FileScene {
    fn plate_output(&self) -> Option<PlateOutput> {
        Some(self.output.clone())
    }

    fn set_plate_output(&mut self, output: PlateOutput) {
        self.output = output;
    }
}
