//! Conversion of staged payloads into archived artifacts.
//!
//! The converter (grib2json by default) is an opaque external program. The
//! orchestrator owns everything around it:
//!
//! 1. Point the converter at a hidden temporary name inside the archive
//!    directory.
//! 2. Check the output exists, is non-empty and, optionally, parses as JSON.
//! 3. Publish it under `<stamp>.json` in one atomic, non-clobbering step.
//! 4. Delete the staged payload of *this* stamp only.
//!
//! A failed conversion is logged and reported as
//! [`ConversionOutcome::Failed`]. It is never retried and leaves nothing
//! readable behind.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use wind_harvest_core::models::{ConversionOutcome, StagedSnapshot};

use crate::config::ConverterConfig;
use crate::fs_archive::{remove_if_exists, FsArchive, Publish};

const STDERR_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("converter I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("converter exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("converter timed out after {0:?}")]
    Timeout(Duration),
    #[error("converter output invalid: {0}")]
    InvalidOutput(String),
}

/// Turns one raw payload file into one structured artifact file.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// Runs an external program, e.g.
/// `java -jar grib2json.jar --data --output {output} --names --compact {input}`.
pub struct ProcessConverter {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessConverter {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

#[async_trait]
impl Converter for ProcessConverter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let args = self.render_args(input, output);
        debug!(op = "convert.exec", command = %self.command, args = ?args);

        let child = tokio::process::Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // On timeout the child is dropped, and with it killed.
        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ConvertError::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&result.stdout);
        let stderr = String::from_utf8_lossy(&result.stderr);
        debug!(op = "convert.output", stdout = %stdout.trim(), stderr = %stderr.trim());

        if !result.status.success() {
            return Err(ConvertError::Exit {
                status: result.status.to_string(),
                stderr: stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect(),
            });
        }
        Ok(())
    }
}

/// Converts staged snapshots and publishes them into the archive.
pub struct ConversionOrchestrator {
    converter: Arc<dyn Converter>,
    archive: FsArchive,
    validate_json: bool,
}

impl ConversionOrchestrator {
    pub fn new(converter: Arc<dyn Converter>, archive: FsArchive, validate_json: bool) -> Self {
        Self {
            converter,
            archive,
            validate_json,
        }
    }

    pub async fn convert(&self, staged: &StagedSnapshot) -> Result<ConversionOutcome> {
        let stamp = staged.stamp;
        self.archive.ensure_archive_dir().await?;
        let temp = self.archive.temp_artifact_path(&stamp);

        info!(op = "convert.start", stamp = %stamp, input = %staged.path.display());

        let converted = match self.converter.convert(&staged.path, &temp).await {
            Ok(()) => self.check_output(&temp).await,
            Err(err) => Err(err),
        };

        if let Err(err) = converted {
            error!(op = "convert.failed", stamp = %stamp, error = %err);
            remove_if_exists(&temp).await;
            self.archive.remove_staged(&stamp).await;
            return Ok(ConversionOutcome::Failed {
                stamp,
                reason: err.to_string(),
            });
        }

        let published = self.archive.publish(&temp, &stamp).await;
        self.archive.remove_staged(&stamp).await;

        match published? {
            Publish::Published => {
                let path: PathBuf = self.archive.artifact_path(&stamp);
                info!(op = "convert.published", stamp = %stamp, path = %path.display());
                Ok(ConversionOutcome::Converted { stamp, path })
            }
            Publish::AlreadyPresent => {
                info!(op = "convert.already_archived", stamp = %stamp);
                Ok(ConversionOutcome::AlreadyArchived { stamp })
            }
        }
    }

    async fn check_output(&self, temp: &Path) -> Result<(), ConvertError> {
        let bytes = tokio::fs::read(temp).await.map_err(|err| {
            ConvertError::InvalidOutput(format!("cannot read {}: {}", temp.display(), err))
        })?;
        if bytes.is_empty() {
            return Err(ConvertError::InvalidOutput("output file is empty".to_string()));
        }
        if self.validate_json {
            serde_json::from_slice::<serde::de::IgnoredAny>(&bytes)
                .map_err(|err| ConvertError::InvalidOutput(format!("not valid JSON: {}", err)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use wind_harvest_core::archive::Archive;
    use wind_harvest_core::stamp::Stamp;

    fn stamp(s: &str) -> Stamp {
        s.parse().unwrap()
    }

    fn setup() -> (TempDir, FsArchive) {
        let tmp = TempDir::new().unwrap();
        let archive = FsArchive::new(tmp.path().join("json-data"), tmp.path().join("grib-data"));
        (tmp, archive)
    }

    async fn stage(archive: &FsArchive, s: &str, body: &[u8]) -> StagedSnapshot {
        archive.ensure_staging_dir().await.unwrap();
        let stamp = stamp(s);
        let path = archive.staged_path(&stamp);
        tokio::fs::write(&path, body).await.unwrap();
        StagedSnapshot {
            stamp,
            target: stamp.start(),
            path,
        }
    }

    fn archive_entries(archive: &FsArchive) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(archive.archive_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// Writes half an artifact, then reports failure.
    struct PartialThenFail;

    #[async_trait]
    impl Converter for PartialThenFail {
        async fn convert(&self, _input: &Path, output: &Path) -> Result<(), ConvertError> {
            tokio::fs::write(output, b"{\"data\":[1,2,").await?;
            Err(ConvertError::Exit {
                status: "exit status: 1".to_string(),
                stderr: "out of memory".to_string(),
            })
        }
    }

    #[cfg(unix)]
    fn cp() -> Arc<dyn Converter> {
        Arc::new(ProcessConverter::new(
            "cp",
            vec!["{input}".to_string(), "{output}".to_string()],
            Duration::from_secs(10),
        ))
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let converter = ProcessConverter::from_config(&ConverterConfig::default());
        let args = converter.render_args(Path::new("grib/2024112500.f000"), Path::new("json/out.tmp"));
        assert_eq!(
            args,
            vec![
                "-Xmx512M",
                "-jar",
                "./converter/lib/grib2json-0.8.0-SNAPSHOT.jar",
                "--data",
                "--output",
                "json/out.tmp",
                "--names",
                "--compact",
                "grib/2024112500.f000",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_conversion_publishes_and_cleans_only_its_stamp() {
        let (_tmp, archive) = setup();
        let staged = stage(&archive, "2024112506", b"[{\"header\":{}}]").await;
        let other = stage(&archive, "2024112500", b"other chain").await;

        let orchestrator = ConversionOrchestrator::new(cp(), archive.clone(), true);
        let outcome = orchestrator.convert(&staged).await.unwrap();

        assert_eq!(
            outcome,
            ConversionOutcome::Converted {
                stamp: staged.stamp,
                path: archive.artifact_path(&staged.stamp),
            }
        );
        assert_eq!(
            archive.read(&staged.stamp).await.unwrap().unwrap(),
            b"[{\"header\":{}}]"
        );
        assert!(!staged.path.exists());
        assert!(other.path.exists());
        assert_eq!(archive_entries(&archive), vec!["2024112506.json"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_failure_leaves_no_artifact() {
        let (_tmp, archive) = setup();
        let staged = stage(&archive, "2024112506", b"{}").await;

        let failing = Arc::new(ProcessConverter::new(
            "false",
            vec!["{input}".to_string(), "{output}".to_string()],
            Duration::from_secs(10),
        ));
        let orchestrator = ConversionOrchestrator::new(failing, archive.clone(), true);
        let outcome = orchestrator.convert(&staged).await.unwrap();

        assert!(matches!(outcome, ConversionOutcome::Failed { .. }));
        assert!(!archive.contains(&staged.stamp).await.unwrap());
        assert!(!staged.path.exists());
        assert!(archive_entries(&archive).is_empty());
    }

    #[tokio::test]
    async fn test_partial_output_is_never_published() {
        let (_tmp, archive) = setup();
        let staged = stage(&archive, "2024112506", b"grib").await;

        let orchestrator = ConversionOrchestrator::new(Arc::new(PartialThenFail), archive.clone(), true);
        let outcome = orchestrator.convert(&staged).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { stamp, reason } => {
                assert_eq!(stamp, staged.stamp);
                assert!(reason.contains("out of memory"), "{}", reason);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(archive_entries(&archive).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let (_tmp, archive) = setup();
        let staged = stage(&archive, "2024112506", b"GRIB\x00\x01binary").await;

        let orchestrator = ConversionOrchestrator::new(cp(), archive.clone(), true);
        let outcome = orchestrator.convert(&staged).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { reason, .. } => assert!(reason.contains("not valid JSON")),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(!archive.contains(&staged.stamp).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_artifact_is_not_overwritten() {
        let (_tmp, archive) = setup();
        archive.ensure_archive_dir().await.unwrap();
        let s = stamp("2024112506");
        std::fs::write(archive.artifact_path(&s), b"{\"first\":true}").unwrap();
        let staged = stage(&archive, "2024112506", b"{\"replacement\":true}").await;

        let orchestrator = ConversionOrchestrator::new(cp(), archive.clone(), true);
        let outcome = orchestrator.convert(&staged).await.unwrap();

        assert_eq!(outcome, ConversionOutcome::AlreadyArchived { stamp: s });
        assert_eq!(archive.read(&s).await.unwrap().unwrap(), b"{\"first\":true}");
        assert_eq!(archive_entries(&archive), vec!["2024112506.json"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_converter() {
        let (_tmp, archive) = setup();
        let staged = stage(&archive, "2024112506", b"{}").await;

        let slow = Arc::new(ProcessConverter::new(
            "sh",
            vec![
                "-c".to_string(),
                "sleep 5".to_string(),
                "{input}".to_string(),
                "{output}".to_string(),
            ],
            Duration::from_millis(200),
        ));
        let orchestrator = ConversionOrchestrator::new(slow, archive.clone(), true);

        let started = Utc::now();
        let outcome = orchestrator.convert(&staged).await.unwrap();

        assert!((Utc::now() - started).num_seconds() < 4);
        match outcome {
            ConversionOutcome::Failed { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failed_outcome() {
        let (_tmp, archive) = setup();
        let staged = stage(&archive, "2024112506", b"{}").await;

        let missing = Arc::new(ProcessConverter::new(
            "windh-no-such-converter",
            vec!["{input}".to_string(), "{output}".to_string()],
            Duration::from_secs(1),
        ));
        let orchestrator = ConversionOrchestrator::new(missing, archive.clone(), true);
        let outcome = orchestrator.convert(&staged).await.unwrap();

        match outcome {
            ConversionOutcome::Failed { reason, .. } => assert!(reason.contains("failed to spawn")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
