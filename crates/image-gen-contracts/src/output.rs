use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::ImageGenResult;
use crate::inputs::IMAGE_EXTENSIONS;

const DEFAULT_STEM: &str = "generated";

/// File extension (with leading dot) for a result format tag.
pub fn extension_for_format(format: &str) -> String {
    let normalized = format.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "" => ".png".to_string(),
        "jpeg" => ".jpg".to_string(),
        other => format!(".{other}"),
    }
}

/// Hands out `<stem>_<n><ext>` paths next to an output base.
///
/// The index `n` is reserved across every known image extension, so
/// `out_2.jpg` blocks `out_2.png` too.
#[derive(Debug, Clone)]
pub struct OutputNamer {
    dir: PathBuf,
    stem: String,
    next_index: u32,
}

impl OutputNamer {
    pub fn new(base: &Path) -> Self {
        let dir = base
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let stem = base
            .file_stem()
            .map(|value| value.to_string_lossy().into_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_STEM.to_string());
        Self {
            dir,
            stem,
            next_index: 1,
        }
    }

    pub fn next_path(&mut self, format: &str) -> PathBuf {
        while self.index_taken(self.next_index) {
            self.next_index += 1;
        }
        let path = self.path_for(self.next_index, &extension_for_format(format));
        self.next_index += 1;
        path
    }

    fn index_taken(&self, index: u32) -> bool {
        IMAGE_EXTENSIONS
            .iter()
            .any(|ext| self.path_for(index, &format!(".{ext}")).exists())
    }

    fn path_for(&self, index: u32, ext: &str) -> PathBuf {
        self.dir.join(format!("{}_{}{}", self.stem, index, ext))
    }
}

/// Writes each result to its own collision-free path, in order.
pub fn write_results(base: &Path, results: &[ImageGenResult]) -> anyhow::Result<Vec<PathBuf>> {
    let mut namer = OutputNamer::new(base);
    let mut written = Vec::with_capacity(results.len());
    for result in results {
        let path = namer.next_path(result.format());
        fs::write(&path, result.image_data())
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = result.image_data().len(), "wrote image");
        written.push(path);
    }
    Ok(written)
}
