//! Writes generated images to the output directory.
//!
//! Files are named `<prompt hash>-<timestamp>.png`. The hash is the first 16 hex
//! digits of SHA-256 over the prompt, the timestamp is local time down to the
//! microsecond. Stamps handed out by one store only ever move forward, and files
//! are created with create-new semantics, so a name is never reused.

use std::{
    fs::{self, OpenOptions},
    io::{self, Cursor, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Duration, Local};
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::GenerateError;

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";
const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    /// Where the PNG lives on disk.
    pub file: PathBuf,
    /// `file` as returned to callers: forward slashes, rooted at `/`.
    pub public_path: String,
}

#[derive(Debug)]
pub struct ImageStore {
    output_dir: PathBuf,
    last_stamp: Mutex<Option<DateTime<Local>>>,
}

impl ImageStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            last_stamp: Mutex::new(None),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The URL path prefix under which saved images are published.
    pub fn public_dir(&self) -> String {
        public_path(&self.output_dir)
    }

    pub fn save(&self, prompt: &str, image: &DynamicImage) -> Result<SavedImage, GenerateError> {
        fs::create_dir_all(&self.output_dir)?;

        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

        let hash = prompt_hash(prompt);
        for _ in 0..MAX_NAME_ATTEMPTS {
            let file_name = format!("{hash}-{}.png", self.next_stamp().format(STAMP_FORMAT));
            let file = self.output_dir.join(file_name);
            match OpenOptions::new().write(true).create_new(true).open(&file) {
                Ok(out) => {
                    write_or_remove(out, &file, &bytes)?;
                    return Ok(SavedImage {
                        public_path: public_path(&file),
                        file,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(file = %file.display(), "name already taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name after {MAX_NAME_ATTEMPTS} attempts"),
        )
        .into())
    }

    fn next_stamp(&self) -> DateTime<Local> {
        let mut last = self
            .last_stamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stamp = next_after(*last, Local::now());
        *last = Some(stamp);
        stamp
    }

    #[cfg(test)]
    fn set_last_stamp(&self, stamp: DateTime<Local>) {
        *self.last_stamp.lock().unwrap() = Some(stamp);
    }
}

/// Writes `bytes` to the freshly created `file`, deleting it again if the write
/// fails so no truncated image is left behind.
fn write_or_remove<W: Write>(mut out: W, file: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Err(e) = out.write_all(bytes).and_then(|()| out.flush()) {
        drop(out);
        if let Err(remove_err) = fs::remove_file(file) {
            warn!(file = %file.display(), "failed to remove partial image: {remove_err}");
        }
        return Err(e);
    }
    Ok(())
}

fn next_after(last: Option<DateTime<Local>>, now: DateTime<Local>) -> DateTime<Local> {
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}

pub fn prompt_hash(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..8])
}

/// Turns a filesystem path into the slash-separated form handed to callers.
pub fn public_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let segments: Vec<&str> = raw
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    format!("/{}", segments.join("/"))
}
