use std::{
    future::Future,
    path::{Path, PathBuf},
    process::ExitStatus,
};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

// Kernel interface reporting the state of the switchable GPUs
pub const SWITCHEROO_PATH: &str = "/sys/kernel/debug/vgaswitcheroo/switch";

type Result<T> = std::result::Result<T, ReadError>;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Switcheroo status command is empty")]
    EmptyCommand,
    #[error("Failed to spawn switcheroo status command \"{program}\"")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Switcheroo status command \"{program}\" failed ({status}): {stderr}")]
    ExitStatus {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Failed to read switcheroo status from {path:?}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// Source of the raw vgaswitcheroo status text
pub trait StatusReader {
    // Return the raw switch file content.
    // Failures are reported for the current poll only, there is no retry
    fn read(&self) -> impl Future<Output = Result<String>> + Send;
}

// Read the switch file through a privilege escalating command,
// by default "pkexec cat /sys/kernel/debug/vgaswitcheroo/switch".
// The first run in a session may prompt for authorization
#[derive(Debug, Clone)]
pub struct CommandStatusReader {
    command: Vec<String>,
}

impl CommandStatusReader {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl Default for CommandStatusReader {
    fn default() -> Self {
        Self::new(vec![
            "pkexec".to_string(),
            "cat".to_string(),
            SWITCHEROO_PATH.to_string(),
        ])
    }
}

impl StatusReader for CommandStatusReader {
    async fn read(&self) -> Result<String> {
        let (program, args) =
            self.command.split_first().ok_or(ReadError::EmptyCommand)?;

        debug!("Running switcheroo status command: {:?}", self.command);

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| ReadError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ReadError::ExitStatus {
                program: program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let raw = String::from_utf8_lossy(&output.stdout).into_owned();
        trace!("Switcheroo status: {:?}", raw);

        Ok(raw)
    }
}

// Read the switch file directly, for processes that already
// have access to debugfs
#[derive(Debug, Clone)]
pub struct FileStatusReader {
    path: PathBuf,
}

impl FileStatusReader {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl StatusReader for FileStatusReader {
    async fn read(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ReadError::File {
                path: self.path.clone(),
                source,
            })
    }
}

// Reader selected from the configuration at start-up
#[derive(Debug, Clone)]
pub enum SwitcherooReader {
    Command(CommandStatusReader),
    File(FileStatusReader),
}

impl StatusReader for SwitcherooReader {
    async fn read(&self) -> Result<String> {
        match self {
            SwitcherooReader::Command(reader) => reader.read().await,
            SwitcherooReader::File(reader) => reader.read().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn shell(script: &str) -> CommandStatusReader {
        CommandStatusReader::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ])
    }

    #[test]
    fn default_command_reads_switcheroo_through_pkexec() {
        let reader = CommandStatusReader::default();

        assert_eq!(
            reader.command(),
            ["pkexec", "cat", "/sys/kernel/debug/vgaswitcheroo/switch"]
        );
    }

    #[tokio::test]
    async fn command_output_is_returned() {
        let raw = shell("printf '0:IGD:+:Pwr:0000:00:02.0\\n'")
            .read()
            .await
            .unwrap();

        assert_eq!(raw, "0:IGD:+:Pwr:0000:00:02.0\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_read_failure() {
        let err = shell("echo denied >&2; exit 126").read().await.unwrap_err();

        match err {
            ReadError::ExitStatus { stderr, status, .. } => {
                assert_eq!(stderr, "denied");
                assert_eq!(status.code(), Some(126));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let reader = CommandStatusReader::new(vec![
            "switcheroo-status-no-such-program".to_string(),
        ]);

        let err = reader.read().await.unwrap_err();
        assert!(matches!(err, ReadError::Spawn { .. }));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let err = CommandStatusReader::new(Vec::new()).read().await.unwrap_err();
        assert!(matches!(err, ReadError::EmptyCommand));
    }

    #[tokio::test]
    async fn file_reader_reads_and_reports_missing_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1:DIS: :Off:0000:01:00.0").unwrap();

        let reader = SwitcherooReader::File(FileStatusReader::new(file.path()));
        assert_eq!(reader.read().await.unwrap(), "1:DIS: :Off:0000:01:00.0\n");

        let dir = tempfile::tempdir().unwrap();
        let missing = FileStatusReader::new(&dir.path().join("switch"));
        assert!(matches!(
            missing.read().await.unwrap_err(),
            ReadError::File { .. }
        ));
    }
}
