//! Round-trip latency through the platform `ping` command, and a small
//! external process runner.

use crate::error::{Result, TestkitError};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Platforms with a known `ping` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Map an OS name as reported by `std::env::consts::OS`.
    pub fn from_os_name(os: &str) -> Result<Self> {
        match os.to_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "macos" | "mac os x" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            other => Err(TestkitError::UnsupportedEnvironment(format!(
                "unknown platform '{other}'"
            ))),
        }
    }

    /// The platform this binary runs on.
    pub fn detect() -> Result<Self> {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Flag selecting a single echo request.
    fn count_flag(&self) -> &'static str {
        match self {
            Platform::Linux | Platform::MacOs => "-c",
            Platform::Windows => "-n",
        }
    }
}

/// Command line sending one echo request to `host`.
pub fn ping_command(platform: Platform, host: &str) -> String {
    format!("ping {} 1 {}", platform.count_flag(), host)
}

/// Run `command` to completion.
///
/// The line is split on whitespace; no shell is involved. The exit status is
/// logged, not checked.
pub fn run_command(command: &str) -> Result<()> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| TestkitError::Process("empty command line".to_string()))?;

    let status = Command::new(program)
        .args(parts)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| TestkitError::Process(format!("failed to run '{program}': {e}")))?;

    if status.success() {
        debug!(command, "Command finished");
    } else {
        warn!(command, status = %status, "Command exited unsuccessfully");
    }

    Ok(())
}

/// Time one `ping` to `host` on the current platform.
///
/// Includes process start-up, so treat it as an upper bound on the RTT.
pub fn ping(host: &str) -> Result<Duration> {
    ping_on(Platform::detect()?, host)
}

/// Time one `ping` to `host` using `platform`'s command syntax.
pub fn ping_on(platform: Platform, host: &str) -> Result<Duration> {
    let command = ping_command(platform, host);
    let started = Instant::now();
    run_command(&command)?;
    let elapsed = started.elapsed();
    debug!(host, elapsed = ?elapsed, "Ping finished");
    Ok(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_os_name() {
        assert_eq!(Platform::from_os_name("linux").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_os_name("macos").unwrap(), Platform::MacOs);
        assert_eq!(Platform::from_os_name("Mac OS X").unwrap(), Platform::MacOs);
        assert_eq!(Platform::from_os_name("windows").unwrap(), Platform::Windows);
    }

    #[test]
    fn test_unknown_platform_fails_fast() {
        let err = Platform::from_os_name("plan9").unwrap_err();
        assert!(matches!(err, TestkitError::UnsupportedEnvironment(_)));
        assert!(err.to_string().contains("plan9"));
    }

    #[test]
    fn test_ping_command() {
        assert_eq!(ping_command(Platform::Linux, "localhost"), "ping -c 1 localhost");
        assert_eq!(ping_command(Platform::MacOs, "10.0.0.1"), "ping -c 1 10.0.0.1");
        assert_eq!(ping_command(Platform::Windows, "localhost"), "ping -n 1 localhost");
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(run_command("   "), Err(TestkitError::Process(_))));
    }

    #[test]
    fn test_missing_program() {
        let err = run_command("definitely-not-a-real-binary-7f3a --flag").unwrap_err();
        assert!(matches!(err, TestkitError::Process(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        run_command("false").unwrap();
        run_command("true").unwrap();
    }
}
