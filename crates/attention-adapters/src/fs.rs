//! Filesystem adapters: persisted record dumps, JSON Lines samples, and the
//! frame archive shared by serving and export.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use attention_core::domain::{DiagnosticResult, RawEvent, SessionRef, WindowedSample};
use attention_core::ports::{FrameArchive, FrameLoader, RecordSource, SampleOutput};
use image::DynamicImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};

/// Backend dump layout: completed results and their per-frame events.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecordDump {
    /// Completed diagnostic results.
    #[serde(default)]
    pub results: Vec<DiagnosticResult>,
    /// Stored per-frame events.
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// Record source over a JSON dump of the backend tables.
pub struct FsRecordSource {
    dump: RecordDump,
}

impl FsRecordSource {
    /// Reads the dump at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid dump.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open records: {}", path.display()))?;
        let dump: RecordDump = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid record dump: {}", path.display()))?;
        info!(
            results = dump.results.len(),
            events = dump.events.len(),
            "Loaded records from {}",
            path.display()
        );
        Ok(Self { dump })
    }

    /// Source over an in-memory dump.
    #[must_use]
    pub const fn from_dump(dump: RecordDump) -> Self {
        Self { dump }
    }
}

impl RecordSource for FsRecordSource {
    fn results(&self) -> Result<Vec<DiagnosticResult>> {
        Ok(self.dump.results.clone())
    }

    fn phase_events(&self, session_id: i64, phase: i64) -> Result<Vec<RawEvent>> {
        let mut events: Vec<RawEvent> = self
            .dump
            .events
            .iter()
            .filter(|e| e.session_id == session_id && e.phase() == Some(phase))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

/// JSON Lines sample writer, one sample per line.
pub struct JsonlSampleOutput {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonlSampleOutput {
    /// Creates (or truncates) the file at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create dataset: {}", path.display()))?;
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }

    /// Writer over standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Writer over any sink.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl SampleOutput for JsonlSampleOutput {
    fn write(&self, sample: &WindowedSample) -> Result<()> {
        let json = serde_json::to_string(sample)?;
        writeln!(self.writer.lock(), "{json}")?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

/// Reads a JSON Lines dataset written by [`JsonlSampleOutput`].
///
/// Blank lines are ignored.
///
/// # Errors
///
/// Returns an error naming the line if the file cannot be read or a line is
/// not a valid sample.
pub fn read_samples(path: &Path) -> Result<Vec<WindowedSample>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;
    let mut samples = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid sample", path.display(), i + 1))?;
        samples.push(sample);
    }
    debug!("Read {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Frame loader over the filesystem.
///
/// Relative references resolve against `root` when one is set, otherwise
/// against the working directory.
pub struct FsFrameLoader {
    root: Option<PathBuf>,
}

impl FsFrameLoader {
    /// Loader resolving relative references against `root`.
    #[must_use]
    pub const fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl FrameLoader for FsFrameLoader {
    fn resolve(&self, reference: &str) -> Option<String> {
        if reference.trim().is_empty() {
            return None;
        }
        let path = Path::new(reference);
        let candidate = match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        };
        candidate
            .is_file()
            .then(|| candidate.to_string_lossy().into_owned())
    }

    fn load(&self, path: &str) -> Result<DynamicImage> {
        image::open(path).with_context(|| format!("Failed to open frame: {path}"))
    }
}

/// Archive writing face crops as JPEG files under one directory per session.
pub struct FsFrameArchive {
    dir: PathBuf,
}

impl FsFrameArchive {
    /// Archive rooted at `dir`; created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameArchive for FsFrameArchive {
    fn store(&self, session: SessionRef, crop: &DynamicImage) -> Result<String> {
        let dir = self.dir.join(session.to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let mut path = dir.join(format!("{stamp}.jpg"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{stamp}-{n}.jpg"));
            n += 1;
        }

        DynamicImage::ImageRgb8(crop.to_rgb8())
            .save(&path)
            .with_context(|| format!("Failed to save frame: {}", path.display()))?;
        debug!(%session, "Captured frame {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();

        let loader = FsFrameLoader::new(Some(dir.path().to_path_buf()));
        assert!(loader.resolve("a.jpg").is_some());
        assert!(loader.resolve("b.jpg").is_none());
        assert!(loader.resolve("").is_none());

        let absolute = dir.path().join("a.jpg");
        let loader = FsFrameLoader::new(None);
        assert!(loader.resolve(&absolute.to_string_lossy()).is_some());
    }

    #[test]
    fn test_concurrent_writes_keep_whole_lines() {
        use attention_core::domain::SamplePayload;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/samples.jsonl");
        let output = JsonlSampleOutput::create(&path).unwrap();

        std::thread::scope(|s| {
            for user_id in 0..4 {
                let output = &output;
                s.spawn(move || {
                    for phase in 0..25 {
                        let sample = WindowedSample {
                            session_id: 1,
                            user_id,
                            phase,
                            y: 0.5,
                            payload: SamplePayload::Features {
                                x: vec![vec![0.25; 10]; 4],
                            },
                            mask: vec![1; 4],
                        };
                        output.write(&sample).unwrap();
                    }
                });
            }
        });
        output.flush().unwrap();

        let samples = read_samples(&path).unwrap();
        assert_eq!(samples.len(), 100);
        for user_id in 0..4 {
            assert_eq!(samples.iter().filter(|s| s.user_id == user_id).count(), 25);
        }
    }

    #[test]
    fn test_archive_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsFrameArchive::new(dir.path());
        let crop = DynamicImage::new_rgb8(8, 8);

        let first = archive.store(SessionRef::Diagnostic(4), &crop).unwrap();
        let second = archive.store(SessionRef::Diagnostic(4), &crop).unwrap();
        assert_ne!(first, second);
        for path in [&first, &second] {
            let path = Path::new(path);
            assert!(path.is_file());
            assert_eq!(path.parent().unwrap(), dir.path().join("diagnostic-4"));
            assert_eq!(path.extension().unwrap(), "jpg");
        }
    }
}
