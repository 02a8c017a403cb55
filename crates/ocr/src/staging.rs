use image::ImageFormat;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// An uploaded image parked in a temporary file.
///
/// The file is removed when the guard is dropped, whether processing succeeded,
/// failed, or unwound.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    len: u64,
}

impl StagedUpload {
    /// Copy `upload` into a new temp file under `dir`. The suffix follows the
    /// declared media type (`.bin` when unknown).
    pub fn stage<R: Read>(mut upload: R, media_type: Option<&str>, dir: &Path) -> io::Result<Self> {
        let suffix = suffix_for(media_type);
        let mut file = tempfile::Builder::new()
            .prefix("zooscan-upload-")
            .suffix(&suffix)
            .tempfile_in(dir)?;
        let len = io::copy(&mut upload, &mut file)?;
        file.flush()?;
        tracing::debug!(path = %file.path().display(), bytes = len, "staged upload");
        Ok(Self { file, len })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(self.file.path())
    }

    /// Delete the file now and report any error, instead of on drop.
    pub fn release(self) -> io::Result<()> {
        self.file.close()
    }
}

fn suffix_for(media_type: Option<&str>) -> String {
    media_type
        .and_then(ImageFormat::from_mime_type)
        .and_then(|f| f.extensions_str().first().copied())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| ".bin".to_string())
}
