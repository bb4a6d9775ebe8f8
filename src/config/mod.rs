use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Retention never drops below this many seconds in production.
const MIN_STAGING_RETENTION_SECS: u64 = 300;

/// Allowance on top of the tool timeout for uploading and packaging.
const STAGING_GRACE_SECS: u64 = 300;

/// Runtime configuration for the conversion service.
///
/// Built once at startup and handed to every component that touches the
/// filesystem or spawns an external tool.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Root directory for staged uploads and outputs (default: "./data")
    pub base_dir: PathBuf,

    /// Maximum size of a single uploaded file in bytes (default: 256 MB)
    pub max_file_size: usize,

    /// Upper bound for any external tool invocation in seconds (default: 120)
    pub process_timeout_secs: u64,

    /// Staging entries older than this are removed by the sweeper (default: 3600)
    pub staging_retention_secs: u64,

    /// Interval between sweeper runs in seconds (default: 600)
    pub cleanup_interval_secs: u64,

    /// LibreOffice executable (default: "libreoffice")
    pub libreoffice_bin: String,

    /// Ghostscript executable (default: "gs")
    pub ghostscript_bin: String,

    /// Poppler rasterizer executable (default: "pdftoppm")
    pub pdftoppm_bin: String,

    /// Rasterization resolution for PDF to image conversion (default: 150)
    pub raster_dpi: u32,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data"),
            max_file_size: 256 * 1024 * 1024, // 256 MB
            process_timeout_secs: 120,
            staging_retention_secs: 3600,
            cleanup_interval_secs: 600,
            libreoffice_bin: "libreoffice".to_string(),
            ghostscript_bin: "gs".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
            raster_dpi: 150,
        }
    }
}

impl ConvertConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            base_dir: env::var("CONVERT_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.base_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            process_timeout_secs: env::var("PROCESS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(default.process_timeout_secs),

            staging_retention_secs: env::var("STAGING_RETENTION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.staging_retention_secs),

            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(default.cleanup_interval_secs),

            libreoffice_bin: env::var("LIBREOFFICE_BIN").unwrap_or(default.libreoffice_bin),

            ghostscript_bin: env::var("GHOSTSCRIPT_BIN").unwrap_or(default.ghostscript_bin),

            pdftoppm_bin: env::var("PDFTOPPM_BIN").unwrap_or(default.pdftoppm_bin),

            raster_dpi: env::var("RASTER_DPI")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| (36..=600).contains(v))
                .unwrap_or(default.raster_dpi),
        }
    }

    /// Create config for development (short timeouts, aggressive cleanup)
    pub fn development() -> Self {
        Self {
            base_dir: env::temp_dir().join("file-convert-backend"),
            process_timeout_secs: 60,
            staging_retention_secs: 600,
            cleanup_interval_secs: 60,
            ..Self::default()
        }
    }

    /// Create config for production (env driven, conservative cleanup)
    pub fn production() -> Self {
        Self::from_env().with_retention_floor()
    }

    /// Raises retention so the sweeper cannot remove a workspace whose job is
    /// still uploading or waiting on a tool. The sweeper judges age by the
    /// workspace mtime, which neither of those updates.
    pub fn with_retention_floor(self) -> Self {
        let floor = self
            .process_timeout_secs
            .saturating_add(STAGING_GRACE_SECS)
            .max(MIN_STAGING_RETENTION_SECS);
        Self {
            staging_retention_secs: self.staging_retention_secs.max(floor),
            ..self
        }
    }

    /// Same as `development()`, rooted at an explicit directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::development()
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("staging")
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn staging_retention(&self) -> Duration {
        Duration::from_secs(self.staging_retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
