//! Process discovery and output forwarding helpers.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Search for a running process whose command line matches `pattern`.
///
/// Runs `pgrep -f <pattern>` and returns the first reported pid. Any
/// failure to run `pgrep` (missing binary, unreadable output) is reported
/// as "no match" rather than an error.
pub async fn find_running(pattern: &str) -> Option<u32> {
    let output = match Command::new("pgrep").args(["-f", pattern]).output().await {
        Ok(output) => output,
        Err(err) => {
            debug!(pattern, %err, "pgrep unavailable, skipping discovery");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    let own_pid = std::process::id();
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .find(|pid| *pid != own_pid)
}

/// Forward every line read from `pipe` to `tracing` at `debug` level.
///
/// The task ends at EOF or on the first read error. Draining keeps the
/// child from blocking on a full pipe buffer.
pub fn forward_output<R>(stream: &'static str, pid: Option<u32>, pipe: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(target: "simbridge::process::output", stream, pid, "{line}");
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(stream, pid, %err, "failed to read simulator output");
                    break;
                }
            }
        }
    })
}
