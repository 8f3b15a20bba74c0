//! Simulation environment orchestrator.
//!
//! [`SimEnvironment`] owns one [`ProcessController`], one
//! [`StreamingSession`] and one [`ControlSession`] and sequences them:
//!
//! - `initialize`: process start (mandatory), streaming connect
//!   (best-effort), control connect.
//! - `cleanup`: streaming disconnect, control disconnect, process stop.
//!   Every step runs even when an earlier one panics.
//!
//! [`SimEnvironment::scoped`] couples the two around a caller-supplied
//! body so cleanup runs on every exit path.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::errors::panic_message;
use crate::control::{ControlReply, ControlSession};
use crate::orchestrator::EnvironmentStatus;
use crate::process::ProcessController;
use crate::streaming::{StreamConnector, StreamingSession};

/// One simulator instance with its control and streaming channels.
#[derive(Debug)]
pub struct SimEnvironment {
    config: GlobalConfig,
    process: ProcessController,
    control: ControlSession,
    streaming: StreamingSession,
    is_initialized: bool,
}

impl SimEnvironment {
    /// Build all three subsystems from `config`. Nothing is started.
    #[must_use]
    pub fn new(config: GlobalConfig) -> Self {
        let streaming = StreamingSession::new(&config);
        Self::assemble(config, streaming)
    }

    /// Like [`new`](Self::new), opening streaming connections through
    /// `connector`.
    #[must_use]
    pub fn with_connector(config: GlobalConfig, connector: Arc<dyn StreamConnector>) -> Self {
        let streaming = StreamingSession::with_connector(&config, connector);
        Self::assemble(config, streaming)
    }

    fn assemble(config: GlobalConfig, streaming: StreamingSession) -> Self {
        let process = ProcessController::new(&config);
        let control = ControlSession::new(&config);
        info!(host = config.host, "simulation environment created");
        Self {
            config,
            process,
            control,
            streaming,
            is_initialized: false,
        }
    }

    /// Configuration the environment was built from.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Whether `initialize` completed and `cleanup` has not run since.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Direct access to the process controller.
    pub fn process(&mut self) -> &mut ProcessController {
        &mut self.process
    }

    /// Direct access to the control session.
    pub fn control(&mut self) -> &mut ControlSession {
        &mut self.control
    }

    /// Direct access to the streaming session.
    pub fn streaming(&mut self) -> &mut StreamingSession {
        &mut self.streaming
    }

    /// Bring the environment up.
    ///
    /// Returns `false` when the process cannot be started; no connection
    /// is attempted in that case. A streaming connection failure is only
    /// a warning. A panic inside the sequence is logged and reported as
    /// `false`.
    pub async fn initialize(&mut self) -> bool {
        let span = info_span!("initialize", host = self.config.host);
        let outcome = AssertUnwindSafe(self.bring_up())
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(ready) => ready,
            Err(panic) => {
                error!(reason = panic_message(&*panic), "environment initialization panicked");
                false
            }
        }
    }

    async fn bring_up(&mut self) -> bool {
        info!("initializing simulation environment");

        if !self.process.start().await {
            error!("failed to start simulator process");
            return false;
        }

        if !self.streaming.connect().await {
            warn!("streaming connection failed; continuing without streaming");
        }

        self.control.connect();

        self.is_initialized = true;
        info!("simulation environment initialized");
        true
    }

    /// Tear the environment down. Safe to call any number of times,
    /// including before `initialize`.
    pub async fn cleanup(&mut self) {
        let span = info_span!("cleanup", host = self.config.host);
        async {
            info!("cleaning up simulation environment");

            if let Err(panic) = AssertUnwindSafe(self.streaming.disconnect())
                .catch_unwind()
                .await
            {
                error!(reason = panic_message(&*panic), "streaming disconnect panicked");
            }

            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| self.control.disconnect())) {
                error!(reason = panic_message(&*panic), "control disconnect panicked");
            }

            if let Err(panic) = AssertUnwindSafe(self.process.stop()).catch_unwind().await {
                error!(reason = panic_message(&*panic), "process stop panicked");
            }

            self.is_initialized = false;
            info!("simulation environment cleaned up");
        }
        .instrument(span)
        .await;
    }

    /// Initialize, run `body`, then clean up on every exit path.
    ///
    /// `body` runs even when initialization fails; it can check
    /// [`is_initialized`](Self::is_initialized). A panic in `body` is
    /// re-raised after cleanup.
    pub async fn scoped<F, T>(&mut self, body: F) -> T
    where
        F: for<'a> FnOnce(&'a mut SimEnvironment) -> BoxFuture<'a, T>,
    {
        if !self.initialize().await {
            warn!("running scoped body on an environment that failed to initialize");
        }

        let outcome = AssertUnwindSafe(body(&mut *self)).catch_unwind().await;
        self.cleanup().await;

        match outcome {
            Ok(value) => value,
            Err(panic) => panic::resume_unwind(panic),
        }
    }

    /// Start the simulation, initializing first if needed.
    pub async fn start_simulation(&mut self, config: Option<&Value>) -> bool {
        if !self.is_initialized && !self.initialize().await {
            return false;
        }
        let reply = self.control.start_simulation(config).await;
        succeeded("start_simulation", &reply)
    }

    /// Stop the simulation.
    pub async fn stop_simulation(&mut self) -> bool {
        let reply = self.control.stop_simulation().await;
        succeeded("stop_simulation", &reply)
    }

    /// Pause the simulation.
    pub async fn pause_simulation(&mut self) -> bool {
        let reply = self.control.pause_simulation().await;
        succeeded("pause_simulation", &reply)
    }

    /// Resume a paused simulation.
    pub async fn resume_simulation(&mut self) -> bool {
        let reply = self.control.resume_simulation().await;
        succeeded("resume_simulation", &reply)
    }

    /// Remote simulation status, error-shaped on failure.
    pub async fn simulation_status(&mut self) -> Value {
        self.control.simulation_status().await.into_value()
    }

    /// Load a scene by path.
    pub async fn load_scene(&mut self, scene_path: &str) -> bool {
        let reply = self.control.load_scene(scene_path).await;
        succeeded("load_scene", &reply)
    }

    /// Information about the loaded scene.
    pub async fn scene_info(&mut self) -> Value {
        self.control.scene_info().await.into_value()
    }

    /// Entities in the scene.
    pub async fn entities(&mut self) -> Value {
        self.control.entities().await.into_value()
    }

    /// Create an entity from its JSON description.
    pub async fn create_entity(&mut self, entity: &Value) -> bool {
        let reply = self.control.create_entity(entity).await;
        succeeded("create_entity", &reply)
    }

    /// Delete an entity by id.
    pub async fn delete_entity(&mut self, entity_id: &str) -> bool {
        let reply = self.control.delete_entity(entity_id).await;
        succeeded("delete_entity", &reply)
    }

    /// See [`StreamingSession::start_streaming`].
    pub async fn start_streaming(&mut self) -> bool {
        self.streaming.start_streaming().await
    }

    /// See [`StreamingSession::stop_streaming`].
    pub async fn stop_streaming(&mut self) {
        self.streaming.stop_streaming().await;
    }

    /// Replace the frame consumer.
    pub fn set_frame_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.streaming.set_frame_callback(callback);
    }

    /// Replace the audio consumer.
    pub fn set_audio_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.streaming.set_audio_callback(callback);
    }

    /// Composite status. The remote simulation status is queried only
    /// when initialized.
    pub async fn status(&mut self) -> EnvironmentStatus {
        let simulation_status = if self.is_initialized {
            Some(self.control.simulation_status().await.into_value())
        } else {
            None
        };

        EnvironmentStatus {
            is_initialized: self.is_initialized,
            process: self.process.status(),
            streaming: self.streaming.status(),
            control: self.control.status(),
            simulation_status,
        }
    }
}

fn succeeded(operation: &'static str, reply: &ControlReply) -> bool {
    match reply.error_reason() {
        Some(reason) => {
            warn!(operation, reason, "control call failed");
            false
        }
        None => true,
    }
}
