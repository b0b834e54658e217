use std::path::PathBuf;

use anyhow::Context;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, LogSpecification, Logger, LoggerHandle, Naming};

use crate::config;

/// Where the host logs and how much.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub spec: String,
    pub dir: PathBuf,
}

impl LogSettings {
    /// `SENTENCE_EMBED_LOG` / `SENTENCE_EMBED_LOG_DIR`, defaulting to debug under the home directory.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::resolve(non_empty_var(config::env::LOG), non_empty_var(config::env::LOG_DIR), home_dir())
    }

    fn resolve(spec: Option<String>, dir: Option<String>, home: Option<PathBuf>) -> anyhow::Result<Self> {
        let spec = spec.unwrap_or_else(|| config::logging::DEFAULT_SPEC.to_string());
        LogSpecification::parse(&spec).with_context(|| format!("invalid {}: {spec:?}", config::env::LOG))?;

        let dir = match dir {
            Some(dir) => PathBuf::from(dir),
            None => home
                .context("cannot determine home directory for logs")?
                .join(config::logging::LOG_DIR_REL),
        };
        Ok(Self { spec, dir })
    }
}

/// Start file logging for the host binary.
///
/// Stdout carries protocol frames, so nothing may log there: the file sink gets
/// everything the log level allows and stderr only sees warnings and errors.
/// The returned handle must be kept alive for the lifetime of the process.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<LoggerHandle> {
    std::fs::create_dir_all(&settings.dir)
        .with_context(|| format!("failed creating log dir {}", settings.dir.display()))?;

    let handle = Logger::try_with_str(&settings.spec)?
        .log_to_file(
            FileSpec::default()
                .directory(&settings.dir)
                .basename(config::logging::LOG_FILE_NAME),
        )
        .rotate(
            Criterion::Size(config::logging::LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config::logging::LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .format(flexi_logger::detailed_format)
        .start()
        .context("failed to start logger")?;

    log::info!("{}", "=".repeat(60));
    log::info!("Sentence embedding host starting");
    log::info!("Version: {}", config::HOST_VERSION);
    log::info!("Model: {}", config::embedding::MODEL_NAME);
    log::info!("Platform: {}", std::env::consts::OS);
    log::info!("Log level: {}", settings.spec);
    log::info!("{}", "=".repeat(60));

    Ok(handle)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// $HOME, falling back to %USERPROFILE% on Windows.
pub fn home_dir() -> Option<PathBuf> {
    non_empty_var("HOME")
        .or_else(|| non_empty_var("USERPROFILE"))
        .map(PathBuf::from)
}
