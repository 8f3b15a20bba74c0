//! Typed control-plane endpoints.
//!
//! Each call maps to exactly one `(METHOD, path, body)` triple over
//! [`ControlSession::request`] and adds no behavior of its own.

use reqwest::Method;
use serde_json::{json, Value};

use crate::control::{ControlReply, ControlSession};

impl ControlSession {
    /// `GET /version`
    pub async fn version(&mut self) -> ControlReply {
        self.request(Method::GET, "/version", None).await
    }

    /// `GET /health`
    pub async fn health(&mut self) -> ControlReply {
        self.request(Method::GET, "/health", None).await
    }

    /// `GET /status`
    pub async fn server_status(&mut self) -> ControlReply {
        self.request(Method::GET, "/status", None).await
    }

    /// `POST /simulation/start` with the given configuration (`{}` when absent).
    pub async fn start_simulation(&mut self, config: Option<&Value>) -> ControlReply {
        let body = config.cloned().unwrap_or_else(|| json!({}));
        self.request(Method::POST, "/simulation/start", Some(&body))
            .await
    }

    /// `POST /simulation/stop`
    pub async fn stop_simulation(&mut self) -> ControlReply {
        self.request(Method::POST, "/simulation/stop", None).await
    }

    /// `POST /simulation/pause`
    pub async fn pause_simulation(&mut self) -> ControlReply {
        self.request(Method::POST, "/simulation/pause", None).await
    }

    /// `POST /simulation/resume`
    pub async fn resume_simulation(&mut self) -> ControlReply {
        self.request(Method::POST, "/simulation/resume", None).await
    }

    /// `GET /simulation/status`
    pub async fn simulation_status(&mut self) -> ControlReply {
        self.request(Method::GET, "/simulation/status", None).await
    }

    /// `POST /scene/load` with `{"path": scene_path}`.
    pub async fn load_scene(&mut self, scene_path: &str) -> ControlReply {
        let body = json!({ "path": scene_path });
        self.request(Method::POST, "/scene/load", Some(&body)).await
    }

    /// `GET /scene/info`
    pub async fn scene_info(&mut self) -> ControlReply {
        self.request(Method::GET, "/scene/info", None).await
    }

    /// `POST /camera/set`
    pub async fn set_camera(&mut self, camera: &Value) -> ControlReply {
        self.request(Method::POST, "/camera/set", Some(camera)).await
    }

    /// `GET /camera/info`
    pub async fn camera_info(&mut self) -> ControlReply {
        self.request(Method::GET, "/camera/info", None).await
    }

    /// `POST /lighting/set`
    pub async fn set_lighting(&mut self, lighting: &Value) -> ControlReply {
        self.request(Method::POST, "/lighting/set", Some(lighting))
            .await
    }

    /// `GET /lighting/info`
    pub async fn lighting_info(&mut self) -> ControlReply {
        self.request(Method::GET, "/lighting/info", None).await
    }

    /// `GET /physics/info`
    pub async fn physics_info(&mut self) -> ControlReply {
        self.request(Method::GET, "/physics/info", None).await
    }

    /// `POST /physics/config`
    pub async fn set_physics_config(&mut self, physics: &Value) -> ControlReply {
        self.request(Method::POST, "/physics/config", Some(physics))
            .await
    }

    /// `GET /entities`
    pub async fn entities(&mut self) -> ControlReply {
        self.request(Method::GET, "/entities", None).await
    }

    /// `POST /entities/create`
    pub async fn create_entity(&mut self, entity: &Value) -> ControlReply {
        self.request(Method::POST, "/entities/create", Some(entity))
            .await
    }

    /// `DELETE /entities/{entity_id}`, with `entity_id` percent-encoded.
    pub async fn delete_entity(&mut self, entity_id: &str) -> ControlReply {
        self.request_encoded(Method::DELETE, &["entities", entity_id], &[], None)
            .await
    }

    /// `GET /logs?level={level}&limit={limit}`
    pub async fn logs(&mut self, level: &str, limit: u32) -> ControlReply {
        let limit = limit.to_string();
        self.request_encoded(
            Method::GET,
            &["logs"],
            &[("level", level), ("limit", &limit)],
            None,
        )
        .await
    }
}
