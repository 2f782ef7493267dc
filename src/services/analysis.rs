use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Counts faces (or any other feature) in the photo at `resource_path`.
///
/// The worker treats this as opaque and possibly slow. Implementations that
/// block must do so off the async runtime.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, resource_path: &str) -> Result<u32, AnalysisError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Failed to start analyzer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Analyzer exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("Analyzer timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analyzer output is not a count: {0:?}")]
    Parse(String),
}

/// Runs an external detection program once per photo.
///
/// The photo path is passed as the last argument. The program must print the
/// detected count as a decimal integer on stdout and exit 0.
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from a whitespace-separated command line such as
    /// `python3 /opt/detect_faces.py`.
    pub fn from_command_line(command_line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(&self, resource_path: &str) -> Result<u32, AnalysisError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(resource_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AnalysisError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(AnalysisError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_count(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the last non-empty stdout line as a non-negative count.
fn parse_count(stdout: &str) -> Result<u32, AnalysisError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .ok_or_else(|| AnalysisError::Parse(String::new()))?;
    line.parse::<u32>()
        .map_err(|_| AnalysisError::Parse(line.to_string()))
}
