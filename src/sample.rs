// src/sample.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::waveform::SourceKey;

/// File extensions tried, in order, when resolving a sample by name.
pub const AUDIO_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// An instrument sample the user can put on a track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    /// `None` when the file could not be found; tracks built from it are no-ops.
    pub source: Option<SourceKey>,
}

impl Sample {
    pub fn new(name: impl Into<String>, source: Option<SourceKey>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// A recording or imported file at a known location.
    pub fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self::new(name, Some(SourceKey::resolve(path)))
    }
}

/// Directory of bundled instrument samples.
pub struct SampleLibrary {
    root: PathBuf,
}

impl SampleLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Finds `<root>/<stem>.<ext>` for the first extension that exists.
    pub fn resolve(&self, stem: &str) -> Option<SourceKey> {
        AUDIO_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{stem}.{ext}")))
            .find(|path| path.is_file())
            .map(SourceKey::resolve)
    }

    pub fn sample(&self, stem: &str, name: impl Into<String>) -> Sample {
        let source = self.resolve(stem);
        if source.is_none() {
            log::warn!("[Samples] no audio file for '{}' in {}", stem, self.root.display());
        }
        Sample::new(name, source)
    }

    /// Every audio file directly under the root, named by file stem, sorted.
    pub fn scan(&self) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || !is_audio(&path) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            samples.push(Sample::from_path(stem, &path));
        }
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(samples)
    }
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
