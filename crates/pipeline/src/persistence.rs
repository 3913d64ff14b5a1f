//! Per-session artifact persistence
//!
//! Layout under the storage root:
//!
//! ```text
//! {base_dir}/{session_id}/{seq}_in.wav    caller audio for one turn
//! {base_dir}/{session_id}/{seq}_out.pcm   synthesized reply, raw PCM16 LE
//! ```
//!
//! Every file is created with create-new semantics, so an artifact is never
//! overwritten.

use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::telemetry;
use duplex_voice_core::{encode_wav, Error, Result};

/// Working directory of one session
#[derive(Debug, Clone)]
pub struct SessionArtifacts {
    dir: PathBuf,
}

impl SessionArtifacts {
    /// Create `{base_dir}/{session_id}`, failing with [`Error::Storage`]
    pub async fn create(base_dir: impl AsRef<Path>, session_id: &str) -> Result<Self> {
        let dir = base_dir.as_ref().join(session_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Storage(format!("cannot create session directory {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}_in.wav", seq))
    }

    pub fn output_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}_out.pcm", seq))
    }

    /// Encode the caller's PCM for turn `seq` as WAV and write it
    pub async fn write_input(&self, seq: u64, pcm: &[u8]) -> Result<PathBuf> {
        let wav = encode_wav(pcm)?;
        let path = self.input_path(seq);

        let mut file = create_new(&path).await?;
        file.write_all(&wav)
            .await
            .map_err(|e| persistence_error(&path, e))?;
        file.flush().await.map_err(|e| persistence_error(&path, e))?;

        Ok(path)
    }

    pub async fn open_output(&self, seq: u64) -> Result<OutputArtifact> {
        OutputArtifact::create(self.output_path(seq)).await
    }

    /// Lazy, failure-tolerant writer for the reply audio of turn `seq`
    pub fn recorder(&self, seq: u64) -> TurnRecorder {
        TurnRecorder {
            seq,
            path: self.output_path(seq),
            state: RecorderState::Pending,
        }
    }
}

async fn create_new(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| persistence_error(path, e))
}

fn persistence_error(path: &Path, err: std::io::Error) -> Error {
    Error::Persistence(format!("{}: {}", path.display(), err))
}

/// Open output file for one turn
///
/// Chunks are appended in arrival order and handed to the file as they come,
/// so a turn cut short by a disconnect keeps what was already sent.
/// [`OutputArtifact::finish`] consumes the artifact, so it is closed at most
/// once.
#[derive(Debug)]
pub struct OutputArtifact {
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl OutputArtifact {
    pub async fn create(path: PathBuf) -> Result<Self> {
        let file = create_new(&path).await?;
        Ok(Self {
            path,
            file,
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn append(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| persistence_error(&self.path, e))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and close, returning the total bytes written
    pub async fn finish(mut self) -> Result<u64> {
        self.file
            .flush()
            .await
            .map_err(|e| persistence_error(&self.path, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| persistence_error(&self.path, e))?;
        Ok(self.bytes_written)
    }
}

enum RecorderState {
    /// No chunk seen yet; nothing on disk
    Pending,
    Open(OutputArtifact),
    /// A write failed; remaining chunks are not persisted
    Disabled,
}

/// Reply-audio writer used by the outbound loop
///
/// The file is created on the first chunk, so a turn that produced no audio
/// leaves no artifact. Persistence failures are logged and disable the
/// recorder for the rest of the turn; they never reach the caller.
pub struct TurnRecorder {
    seq: u64,
    path: PathBuf,
    state: RecorderState,
}

impl TurnRecorder {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.state, RecorderState::Disabled)
    }

    pub async fn record(&mut self, chunk: &[u8]) {
        if matches!(self.state, RecorderState::Pending) {
            match OutputArtifact::create(self.path.clone()).await {
                Ok(artifact) => self.state = RecorderState::Open(artifact),
                Err(e) => {
                    self.disable(&e);
                    return;
                }
            }
        }

        let failure = match &mut self.state {
            RecorderState::Open(artifact) => artifact.append(chunk).await.err(),
            _ => None,
        };
        if let Some(e) = failure {
            self.disable(&e);
        }
    }

    /// Close the output file. Returns the bytes persisted, or `None` when
    /// nothing was written or the write failed.
    pub async fn finish(self) -> Option<u64> {
        let RecorderState::Open(artifact) = self.state else {
            return None;
        };

        match artifact.finish().await {
            Ok(bytes) => {
                tracing::debug!(
                    seq = self.seq,
                    path = %self.path.display(),
                    bytes,
                    "Reply audio persisted"
                );
                Some(bytes)
            }
            Err(e) => {
                tracing::warn!(seq = self.seq, error = %e, "Failed to close reply audio");
                telemetry::record_persistence_failure("out");
                None
            }
        }
    }

    fn disable(&mut self, err: &Error) {
        tracing::warn!(
            seq = self.seq,
            error = %err,
            "Reply audio persistence disabled for this turn"
        );
        telemetry::record_persistence_failure("out");
        self.state = RecorderState::Disabled;
    }
}
