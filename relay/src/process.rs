// Simulation bridge child process: spawn, watch, and kill on shutdown.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::RelayError;

/// Splits a command line with POSIX shell quoting rules; the first word is the program.
/// No shell is involved, so expansions and redirects are passed through literally.
pub fn build_command(command_line: &str) -> Result<Command, RelayError> {
    let words = shell_words::split(command_line)?;
    let (program, args) = words.split_first().ok_or(RelayError::EmptyCommand)?;
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    Ok(command)
}

pub fn spawn_sim_bridge(command_line: &str) -> Result<Child, RelayError> {
    let child = build_command(command_line)?.spawn()?;
    info!(pid = ?child.id(), command = %command_line, "simulation bridge started");
    Ok(child)
}

/// Waits for the child to exit or for shutdown, whichever comes first.
pub async fn supervise(mut child: Child, mut shutdown: watch::Receiver<bool>) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => warn!(%status, "simulation bridge exited"),
            Err(err) => warn!(?err, "simulation bridge wait failed"),
        },
        _ = shutdown.changed() => {
            if let Err(err) = child.kill().await {
                warn!(?err, "simulation bridge kill failed");
            } else {
                info!("simulation bridge stopped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(build_command("   "), Err(RelayError::EmptyCommand)));
    }

    #[test]
    fn quoted_program_path_keeps_its_spaces() {
        let command = build_command(r#""/opt/Sim Bridge/run" --port 9999 --name 'pit box'"#).unwrap();
        let std_command = command.as_std();
        assert_eq!(std_command.get_program(), "/opt/Sim Bridge/run");
        let args: Vec<_> = std_command.get_args().collect();
        assert_eq!(args, ["--port", "9999", "--name", "pit box"]);
    }

    #[test]
    fn unbalanced_quote_is_rejected() {
        assert!(matches!(
            build_command("\"/opt/Sim Bridge/run --port 9999"),
            Err(RelayError::CommandLine(_))
        ));
    }

    #[tokio::test]
    async fn missing_executable_reports_io_error() {
        let err = spawn_sim_bridge("/nonexistent/pitbox-sim-bridge --port 9999").unwrap_err();
        assert!(matches!(err, RelayError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_kills_the_child() {
        let child = spawn_sim_bridge("sleep 30").unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = tokio::spawn(supervise(child, shutdown_rx));
        shutdown_tx.send_replace(true);
        tokio::time::timeout(std::time::Duration::from_secs(5), supervisor)
            .await
            .unwrap()
            .unwrap();
    }
}
