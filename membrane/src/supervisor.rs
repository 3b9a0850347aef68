use {
    std::{process::Stdio, time::Duration},
    tracing::{info, warn, debug},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, BufReader},
        net::TcpStream,
        process::{Child, Command},
        sync::watch,
        time::{Instant, sleep, timeout},
    },
    crate::{config::ChildLogs, error::StartupError},
};

pub const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(15);
const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const CHILD_LOG_TARGET: &str = "child";

/// Runs the user's application as a child process and waits for it to accept tcp connections.
pub struct ProcessSupervisor {
    command: String,
    child_address: String,
    timeout: Duration,
    child_logs: ChildLogs,
    stop_tx: watch::Sender<bool>,
    exit_tx: watch::Sender<Option<String>>,
}

impl ProcessSupervisor {
    pub fn new(command: impl Into<String>, child_address: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child_address: child_address.into(),
            timeout: Duration::from_secs(5),
            child_logs: ChildLogs::Inherit,
            stop_tx: watch::channel(false).0,
            exit_tx: watch::channel(None).0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_child_logs(mut self, child_logs: ChildLogs) -> Self {
        self.child_logs = child_logs;
        self
    }

    /// Spawns the child and returns once `child_address` accepts a connection.
    /// A spawn failure is returned right away, without polling.
    pub async fn start(&self) -> Result<(), StartupError> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or(StartupError::EmptyCommand)?;

        let mut command = Command::new(program);
        command.args(parts).kill_on_drop(true);
        match self.child_logs {
            ChildLogs::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            },
            ChildLogs::Capture => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            },
        }

        let mut child = command.spawn()
            .map_err(|source| StartupError::SpawnFailed { command: self.command.clone(), source })?;

        info!(command = %self.command, pid = ?child.id(), "started child process");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_child_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_child_output(stderr, "stderr"));
        }

        tokio::spawn(watch_child(child, self.stop_tx.subscribe(), self.exit_tx.clone()));

        if let Err(err) = self.wait_until_reachable().await {
            self.stop().await;
            return Err(err);
        }

        info!(address = %self.child_address, "child process is reachable");
        Ok(())
    }

    async fn wait_until_reachable(&self) -> Result<(), StartupError> {
        let deadline = Instant::now() + self.timeout;
        let exit_rx = self.exit_tx.subscribe();

        loop {
            let exited = exit_rx.borrow().clone();
            if let Some(status) = exited {
                return Err(StartupError::ChildExited { status });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Ok(Ok(_)) = timeout(remaining, TcpStream::connect(&self.child_address)).await {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(StartupError::ChildUnreachable { address: self.child_address.clone() });
            }
            sleep(CHILD_POLL_INTERVAL).await;
        }
    }

    /// Resolves when the child process exits. Pending forever if it was never started.
    pub async fn wait_exit(&self) -> StartupError {
        let mut exit_rx = self.exit_tx.subscribe();
        let status = exit_rx.wait_for(|v| v.is_some()).await
            .map(|v| v.clone())
            .ok()
            .flatten()
            .unwrap_or_else(|| "unknown".to_owned());
        StartupError::ChildExited { status }
    }

    pub fn has_exited(&self) -> bool {
        self.exit_tx.borrow().is_some()
    }

    /// Kills the child if it is still running and waits for it to exit. Idempotent.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        // no watcher left: never started or already exited
        if self.stop_tx.receiver_count() == 0 {
            return;
        }

        let mut exit_rx = self.exit_tx.subscribe();
        if timeout(CHILD_STOP_TIMEOUT, exit_rx.wait_for(|v| v.is_some())).await.is_err() {
            warn!(command = %self.command, "timeout waiting for child process to exit");
        }
    }
}

async fn watch_child(mut child: Child, mut stop_rx: watch::Receiver<bool>, exit_tx: watch::Sender<Option<String>>) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = stop_rx.wait_for(|v| *v) => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            debug!(pid = ?child.id(), "killing child process");
            if let Err(err) = child.kill().await {
                warn!("failed to kill child process: {err}");
            }
            child.wait().await
        },
    };

    let status = match status {
        Ok(v) => v.to_string(),
        Err(err) => format!("failed to wait for child process: {err}"),
    };
    info!(status = %status, "child process exited");
    exit_tx.send_replace(Some(status));
}

async fn forward_child_output(output: impl AsyncRead + Unpin, stream: &'static str) {
    let mut lines = BufReader::new(output).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: CHILD_LOG_TARGET, stream, "{line}"),
            Ok(None) => break,
            Err(err) => {
                warn!(target: CHILD_LOG_TARGET, stream, "failed to read child output: {err}");
                break;
            },
        }
    }
}
