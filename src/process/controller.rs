//! Simulator process controller.
//!
//! Launches the simulator executable with flags and environment derived
//! from [`GlobalConfig`], or adopts an instance that is already running.
//! Launched children are spawned with `kill_on_drop(true)` so dropping the
//! controller never leaks the process.
//!
//! No operation here returns an error to the caller: launch failures turn
//! into `false` plus an `error!` line, probe failures count as "not
//! running".

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::process::probe;
use crate::{AppError, Result};

/// Point-in-time view of the controller, safe to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    /// Whether the controller considers the simulator running.
    pub is_running: bool,
    /// Pid of the launched or adopted process.
    pub pid: Option<u32>,
    /// Exit code of the last launched process, once it has exited.
    pub exit_code: Option<i32>,
    /// The running instance was discovered, not launched by us.
    pub adopted: bool,
    /// Headless launch flag.
    pub headless: bool,
    /// Stream/display mode.
    pub livestream: String,
    /// Streaming port the process is launched with.
    pub webrtc_port: u16,
    /// Control port the process is launched with.
    pub rest_port: u16,
    /// Executable path.
    pub binary: PathBuf,
}

/// Launch settings resolved once from the global configuration.
#[derive(Debug, Clone)]
struct LaunchConfig {
    binary: PathBuf,
    extra_args: Vec<String>,
    headless: bool,
    livestream: String,
    webrtc_port: u16,
    rest_port: u16,
    env: Vec<(String, String)>,
    discovery_pattern: Option<String>,
    settle: Duration,
    restart_pause: Duration,
    stop_grace: Duration,
}

impl LaunchConfig {
    fn from_global(config: &GlobalConfig) -> Self {
        let sim = &config.simulation;
        let webrtc_port = config.launch_webrtc_port();
        let rest_port = config.launch_rest_port();

        let mut env = vec![
            ("HEADLESS".to_owned(), if sim.headless { "1" } else { "0" }.to_owned()),
            ("OMNI_LIVESTREAM".to_owned(), sim.livestream.clone()),
            ("OMNI_WEBRTC_PORT_HTTP".to_owned(), webrtc_port.to_string()),
            ("OMNI_WEBRTC_PORT_UDP".to_owned(), sim.udp_port.to_string()),
            ("OMNI_KIT_ALLOW_ROOT".to_owned(), "1".to_owned()),
            ("ACCEPT_EULA".to_owned(), "Y".to_owned()),
            ("PRIVACY_CONSENT".to_owned(), "Y".to_owned()),
            (
                "ISAAC_SIM_PATH".to_owned(),
                sim.install_root.display().to_string(),
            ),
            (
                "ISAAC_LAB_PATH".to_owned(),
                sim.lab_root.display().to_string(),
            ),
        ];
        // Explicit entries win over the generated ones.
        env.retain(|(key, _)| !sim.env.contains_key(key));
        env.extend(sim.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            binary: sim.binary.clone(),
            extra_args: sim.extra_args.clone(),
            headless: sim.headless,
            livestream: sim.livestream.clone(),
            webrtc_port,
            rest_port,
            env,
            discovery_pattern: sim
                .discovery_pattern
                .clone()
                .filter(|pattern| !pattern.trim().is_empty()),
            settle: sim.settle_interval(),
            restart_pause: sim.restart_pause(),
            stop_grace: sim.stop_grace(),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(7 + self.extra_args.len());
        if self.headless {
            args.push("--headless".to_owned());
        }
        args.push("--livestream".to_owned());
        args.push(self.livestream.clone());
        args.push("--webrtc-port".to_owned());
        args.push(self.webrtc_port.to_string());
        args.push("--rest-port".to_owned());
        args.push(self.rest_port.to_string());
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Owner of the simulator process handle.
#[derive(Debug)]
pub struct ProcessController {
    launch: LaunchConfig,
    child: Option<Child>,
    pid: Option<u32>,
    exit_code: Option<i32>,
    running: bool,
    adopted: bool,
    output_tasks: Vec<JoinHandle<()>>,
}

impl ProcessController {
    /// Create a controller; nothing is launched until [`start`](Self::start).
    #[must_use]
    pub fn new(config: &GlobalConfig) -> Self {
        Self {
            launch: LaunchConfig::from_global(config),
            child: None,
            pid: None,
            exit_code: None,
            running: false,
            adopted: false,
            output_tasks: Vec::new(),
        }
    }

    /// Whether the simulator is considered running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Full argument vector the simulator is launched with.
    #[must_use]
    pub fn launch_args(&self) -> Vec<String> {
        self.launch.args()
    }

    /// Start the simulator, or adopt an instance that is already running.
    ///
    /// Returns `true` when the simulator is running afterwards. A launched
    /// process that has already exited after the settle interval makes
    /// this return `false`; there is no automatic retry.
    pub async fn start(&mut self) -> bool {
        let span = info_span!("process_start", binary = %self.launch.binary.display());

        async {
            if self.running {
                warn!("simulator already running");
                return true;
            }

            if let Some(pattern) = self.launch.discovery_pattern.clone() {
                if let Some(pid) = probe::find_running(&pattern).await {
                    info!(pid, pattern = %pattern, "adopting running simulator instance");
                    self.running = true;
                    self.adopted = true;
                    self.pid = Some(pid);
                    self.exit_code = None;
                    return true;
                }
            }

            match self.launch_child().await {
                Ok(running) => running,
                Err(err) => {
                    error!(%err, "error starting simulator");
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn launch_child(&mut self) -> Result<bool> {
        let args = self.launch.args();
        info!(args = %args.join(" "), "launching simulator");

        let mut cmd = Command::new(&self.launch.binary);
        cmd.args(&args)
            .envs(self.launch.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Process(format!("failed to spawn simulator: {err}")))?;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            self.output_tasks
                .push(probe::forward_output("stdout", pid, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            self.output_tasks
                .push(probe::forward_output("stderr", pid, stderr));
        }

        tokio::time::sleep(self.launch.settle).await;

        match child.try_wait() {
            Ok(None) => {
                info!(pid, "simulator started");
                self.child = Some(child);
                self.pid = pid;
                self.exit_code = None;
                self.adopted = false;
                self.running = true;
                Ok(true)
            }
            Ok(Some(status)) => {
                error!(pid, %status, "simulator exited during startup");
                self.pid = pid;
                self.exit_code = status.code();
                self.running = false;
                Ok(false)
            }
            Err(err) => {
                // An unprobeable process is treated as not running.
                warn!(pid, %err, "failed to probe simulator after launch");
                child.start_kill().ok();
                self.running = false;
                Ok(false)
            }
        }
    }

    /// Stop the simulator.
    ///
    /// Launched processes get a graceful termination request and are
    /// force-killed once the grace period expires. Adopted instances are
    /// only released. No-op when nothing is running.
    pub async fn stop(&mut self) {
        let span = info_span!("process_stop", pid = self.pid);

        async {
            if let Some(mut child) = self.child.take() {
                request_termination(&mut child);

                match tokio::time::timeout(self.launch.stop_grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        info!(%status, "simulator exited");
                        self.exit_code = status.code();
                    }
                    Ok(Err(err)) => {
                        warn!(%err, "error waiting for simulator exit");
                    }
                    Err(_) => {
                        warn!(
                            grace = ?self.launch.stop_grace,
                            "simulator did not exit within grace period, forcing kill"
                        );
                        if let Err(err) = child.kill().await {
                            warn!(%err, "failed to force-kill simulator");
                        }
                    }
                }
            } else if self.adopted {
                debug!("releasing adopted simulator instance");
            }

            for task in self.output_tasks.drain(..) {
                task.abort();
            }
            self.running = false;
            self.adopted = false;
            self.pid = None;
            self.exit_code = None;
            info!("simulator stopped");
        }
        .instrument(span)
        .await;
    }

    /// Stop, pause briefly, and start again.
    pub async fn restart(&mut self) -> bool {
        self.stop().await;
        tokio::time::sleep(self.launch.restart_pause).await;
        self.start().await
    }

    /// Current status snapshot. Never blocks on the process.
    ///
    /// A launched child found to have exited is released, so the next
    /// [`start`](Self::start) launches a fresh one.
    pub fn status(&mut self) -> ProcessStatus {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    warn!(pid = self.pid, %status, "simulator exited unexpectedly");
                    self.exit_code = status.code();
                    self.running = false;
                    self.child = None;
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(%err, "failed to poll simulator status");
                }
            }
        }

        ProcessStatus {
            is_running: self.running,
            pid: self.pid,
            exit_code: self.exit_code,
            adopted: self.adopted,
            headless: self.launch.headless,
            livestream: self.launch.livestream.clone(),
            webrtc_port: self.launch.webrtc_port,
            rest_port: self.launch.rest_port,
            binary: self.launch.binary.clone(),
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(raw) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        warn!(pid = raw, %err, "failed to send SIGTERM to simulator");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        warn!(%err, "failed to terminate simulator");
    }
}
