use crate::config::ConvertConfig;
use crate::services::error::{ConvertError, ConvertResult};
use crate::services::job::{ConversionKind, JobState};
use crate::utils::validation::{extension_of, sanitize_filename, validate_file_size};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Owns the staging root. Every request gets its own workspace under it.
#[derive(Debug)]
pub struct Staging {
    root: PathBuf,
    max_file_size: usize,
}

impl Staging {
    pub fn new(config: &ConvertConfig) -> ConvertResult<Self> {
        let root = config.staging_dir();
        std::fs::create_dir_all(&root).map_err(|e| ConvertError::io(&root, e))?;
        info!("📂 Staging root: {}", root.display());
        Ok(Self {
            root,
            max_file_size: config.max_file_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh workspace for one request. The workspace and everything
    /// staged or produced in it is removed when the returned `Job` is dropped.
    pub fn begin_job(&self, kind: ConversionKind) -> ConvertResult<Job> {
        let id = Uuid::new_v4();
        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}-", id.simple()))
            .rand_bytes(6)
            .tempdir_in(&self.root)
            .map_err(|e| ConvertError::io(&self.root, e))?;

        debug!("Job {} ({}) workspace {}", id, kind, workspace.path().display());
        Ok(Job {
            id,
            kind,
            state: JobState::Received,
            workspace,
            max_file_size: self.max_file_size,
        })
    }
}

/// An uploaded file persisted under a generated identifier.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub id: Uuid,
    pub path: PathBuf,
    /// Sanitized client filename
    pub original_name: String,
    pub size: u64,
}

impl StagedFile {
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.original_name)
    }
}

/// One request's unit of work: its workspace plus lifecycle state.
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    kind: ConversionKind,
    state: JobState,
    workspace: TempDir,
    max_file_size: usize,
}

impl Job {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ConversionKind {
        self.kind
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    pub fn advance(&mut self, next: JobState) -> ConvertResult<()> {
        self.state = self.state.transition(next)?;
        debug!("Job {} ({}) -> {:?}", self.id, self.kind, self.state);
        Ok(())
    }

    /// Marks the job failed. Calling this on a terminal job is a no-op.
    pub fn fail(&mut self, error: &ConvertError) {
        if self.state.is_terminal() {
            return;
        }
        warn!(
            "Job {} ({}) failed in {:?}: {}",
            self.id, self.kind, self.state, error
        );
        self.state = JobState::Failed;
    }

    pub async fn stage(&self, bytes: &[u8], original_name: &str) -> ConvertResult<StagedFile> {
        self.stage_reader(bytes, original_name).await
    }

    /// Streams an upload to `<workspace>/<uuid>_<name>`, enforcing the size limit.
    pub async fn stage_reader<R>(&self, reader: R, original_name: &str) -> ConvertResult<StagedFile>
    where
        R: AsyncRead + Unpin,
    {
        let name = sanitize_filename(original_name)?;
        let id = Uuid::new_v4();
        let path = self.workspace().join(format!("{}_{}", id.simple(), name));

        let mut file = File::create(&path)
            .await
            .map_err(|e| ConvertError::io(&path, e))?;

        // One extra byte tells us the limit was exceeded without reading the whole body
        let mut limited = reader.take(self.max_file_size as u64 + 1);
        let size = tokio::io::copy(&mut limited, &mut file)
            .await
            .map_err(|e| ConvertError::Upload(format!("Failed to write '{}': {}", name, e)))?;
        file.flush()
            .await
            .map_err(|e| ConvertError::Upload(format!("Failed to flush '{}': {}", name, e)))?;

        if let Err(e) = validate_file_size(&name, size, self.max_file_size) {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        if size == 0 {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(ConvertError::Upload(format!("'{}' is empty", name)));
        }

        debug!("Staged {} ({} bytes) for job {}", path.display(), size, self.id);
        Ok(StagedFile {
            id,
            path,
            original_name: name,
            size,
        })
    }

    /// A unique, not yet existing output file path inside the workspace.
    pub fn output_path(&self, extension: &str) -> PathBuf {
        let extension = extension.trim_start_matches('.');
        self.workspace()
            .join(format!("out-{}.{}", Uuid::new_v4().simple(), extension))
    }

    /// Creates a unique output directory inside the workspace.
    pub async fn output_dir(&self, label: &str) -> ConvertResult<PathBuf> {
        let dir = self
            .workspace()
            .join(format!("{}-{}", label, Uuid::new_v4().simple()));
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| ConvertError::io(&dir, e))?;
        Ok(dir)
    }
}
