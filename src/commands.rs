//! Command dispatcher: operator intents out to the station
//!
//! When the channel is up, a command becomes one or more channel frames:
//! plain text for the two hardware commands (`tare:<id>`, `calibrate:<id>`,
//! matching the station firmware) and typed JSON for the rest. When the
//! channel is down, the commands that have an HTTP equivalent fall back to
//! it and report the outcome on the status channel. Sends are
//! fire-and-forget either way; nothing is retried.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::connection::ConnectionHandle;
use crate::session::types::StatusEvent;

/// Operator-chosen display preferences for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayPref {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// An operator intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Zero one node's baseline reading
    Tare { target: String },
    /// Zero every node in the id range
    TareAll { ids: RangeInclusive<u32> },
    /// Run a node's calibration routine
    Calibrate { target: String },
    RenameSeries { target: String, name: String },
    Recolor { target: String, color: String },
    /// Change the shared trailing window (display-local effect)
    SetWindow { duration_ms: i64 },
    /// Change the spec minimum used for grading (display-local effect)
    SetSpecThreshold { value: f64 },
    /// Push the operator's name/color map to the station settings store
    PersistDisplayPrefs { prefs: HashMap<String, DisplayPref> },
    /// Drop a series from this display (never leaves the kiosk)
    RemoveSeries { target: String },
}

impl Command {
    /// Channel frames for this command. Empty for display-local intents.
    pub fn channel_frames(&self) -> Vec<String> {
        match self {
            Command::Tare { target } => vec![format!("tare:{}", target)],
            Command::TareAll { ids } => {
                ids.clone().map(|id| format!("tare:{}", id)).collect()
            }
            Command::Calibrate { target } => vec![format!("calibrate:{}", target)],
            Command::RenameSeries { target, name } => {
                vec![json!({"type": "renameSeries", "target": target, "name": name}).to_string()]
            }
            Command::Recolor { target, color } => {
                vec![json!({"type": "recolor", "target": target, "color": color}).to_string()]
            }
            Command::SetWindow { duration_ms } => {
                vec![json!({"type": "setWindow", "durationMs": duration_ms}).to_string()]
            }
            Command::SetSpecThreshold { value } => {
                vec![json!({"type": "setSpecThreshold", "value": value}).to_string()]
            }
            Command::PersistDisplayPrefs { prefs } => {
                vec![json!({"type": "persistDisplayPrefs", "prefs": prefs_body(prefs)}).to_string()]
            }
            Command::RemoveSeries { .. } => Vec::new(),
        }
    }

    /// Short status-line summary, in the wording the kiosk shows.
    pub fn summary(&self) -> String {
        match self {
            Command::Tare { target } => format!("Tare {} sent", target),
            Command::TareAll { .. } => "Tare all sent".to_string(),
            Command::Calibrate { .. } => "Calibrate sent".to_string(),
            Command::RenameSeries { target, .. } => format!("Renamed {}", target),
            Command::Recolor { target, .. } => format!("Recolored {}", target),
            Command::SetWindow { duration_ms } => {
                if *duration_ms >= 60_000 {
                    format!("Window: {}m", duration_ms / 60_000)
                } else {
                    format!("Window: {}s", duration_ms / 1_000)
                }
            }
            Command::SetSpecThreshold { value } => format!("Spec set: {} g", value),
            Command::PersistDisplayPrefs { .. } => "Settings saved".to_string(),
            Command::RemoveSeries { target } => format!("Removed {}", target),
        }
    }

    /// HTTP fallback for when the channel is down. None when the command
    /// has no HTTP equivalent (or needs none).
    fn fallback(&self) -> Option<FallbackRequest> {
        match self {
            Command::Tare { target } => Some(FallbackRequest {
                path: format!("/tare?scale={}", target),
                body: None,
            }),
            Command::TareAll { .. } => Some(FallbackRequest {
                path: "/tare".to_string(),
                body: None,
            }),
            Command::RenameSeries { target, name } => Some(FallbackRequest {
                path: "/settings".to_string(),
                body: Some(prefs_body(&HashMap::from([(
                    target.clone(),
                    DisplayPref {
                        name: Some(name.clone()),
                        color: None,
                    },
                )]))),
            }),
            Command::Recolor { target, color } => Some(FallbackRequest {
                path: "/settings".to_string(),
                body: Some(prefs_body(&HashMap::from([(
                    target.clone(),
                    DisplayPref {
                        name: None,
                        color: Some(color.clone()),
                    },
                )]))),
            }),
            Command::PersistDisplayPrefs { prefs } => Some(FallbackRequest {
                path: "/settings".to_string(),
                body: Some(prefs_body(prefs)),
            }),
            // Calibration needs the live channel; window/spec/remove are
            // display-local and already applied by the runtime
            Command::Calibrate { .. }
            | Command::SetWindow { .. }
            | Command::SetSpecThreshold { .. }
            | Command::RemoveSeries { .. } => None,
        }
    }

    fn is_display_local(&self) -> bool {
        matches!(
            self,
            Command::SetWindow { .. }
                | Command::SetSpecThreshold { .. }
                | Command::RemoveSeries { .. }
        )
    }
}

/// Settings body keyed the way the station firmware expects
/// (`name1`/`color1`, `name2`/`color2`, ...).
fn prefs_body(prefs: &HashMap<String, DisplayPref>) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    for (id, pref) in prefs {
        if let Some(name) = &pref.name {
            body.insert(format!("name{}", id), json!(name));
        }
        if let Some(color) = &pref.color {
            body.insert(format!("color{}", id), json!(color));
        }
    }
    serde_json::Value::Object(body)
}

struct FallbackRequest {
    path: String,
    body: Option<serde_json::Value>,
}

pub struct CommandDispatcher {
    handle: ConnectionHandle,
    http: reqwest::Client,
    base_url: String,
    status_tx: mpsc::UnboundedSender<StatusEvent>,
}

impl CommandDispatcher {
    pub fn new(
        handle: ConnectionHandle,
        base_url: String,
        status_tx: mpsc::UnboundedSender<StatusEvent>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            handle,
            http,
            base_url,
            status_tx,
        })
    }

    /// Fire-and-forget dispatch. The channel path completes synchronously;
    /// the HTTP fallback runs on a spawned task and reports back through
    /// the status channel.
    pub fn dispatch(&self, cmd: &Command) {
        if self.handle.is_connected() {
            for frame in cmd.channel_frames() {
                self.handle.send(frame);
            }
            self.note_sent(cmd);
            return;
        }

        if cmd.is_display_local() {
            // Nothing to deliver remotely; the local effect already landed
            self.note_sent(cmd);
            return;
        }

        match cmd.fallback() {
            Some(request) => self.spawn_fallback(cmd.summary(), request),
            None => {
                let _ = self.status_tx.send(StatusEvent::CommandFailed {
                    summary: cmd.summary(),
                    detail: "channel unavailable".to_string(),
                });
            }
        }
    }

    /// GET /settings: the station's persisted name/color map, used by a
    /// presentation adapter to seed its display preferences.
    pub async fn fetch_display_prefs(&self) -> Result<serde_json::Value, reqwest::Error> {
        self.http
            .get(format!("{}/settings", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// POST /settings/reset: restore the station's default names/colors.
    pub async fn reset_display_prefs(&self) -> Result<serde_json::Value, reqwest::Error> {
        self.http
            .post(format!("{}/settings/reset", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    fn spawn_fallback(&self, summary: String, request: FallbackRequest) {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.post(&url);
        if let Some(body) = request.body {
            builder = builder.json(&body);
        }
        let status_tx = self.status_tx.clone();
        tokio::spawn(async move {
            let outcome = match builder.send().await {
                Ok(response) => response.error_for_status().map(|_| ()),
                Err(e) => Err(e),
            };
            let event = match outcome {
                Ok(()) => StatusEvent::CommandSent { summary },
                Err(e) => {
                    log::warn!("fallback request to {} failed: {}", url, e);
                    StatusEvent::CommandFailed {
                        summary,
                        detail: e.to_string(),
                    }
                }
            };
            let _ = status_tx.send(event);
        });
    }

    fn note_sent(&self, cmd: &Command) {
        let _ = self.status_tx.send(StatusEvent::CommandSent {
            summary: cmd.summary(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::ConnectionState;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_hardware_commands_encode_as_plain_text() {
        let tare = Command::Tare {
            target: "3".to_string(),
        };
        assert_eq!(tare.channel_frames(), vec!["tare:3"]);

        let all = Command::TareAll { ids: 1..=10 };
        let frames = all.channel_frames();
        assert_eq!(frames.len(), 10);
        assert_eq!(frames[0], "tare:1");
        assert_eq!(frames[9], "tare:10");

        let cal = Command::Calibrate {
            target: "2".to_string(),
        };
        assert_eq!(cal.channel_frames(), vec!["calibrate:2"]);
    }

    #[test]
    fn test_structured_commands_encode_as_typed_json() {
        let cmd = Command::RenameSeries {
            target: "2".to_string(),
            name: "Rear".to_string(),
        };
        let frames = cmd.channel_frames();
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["type"], "renameSeries");
        assert_eq!(value["target"], "2");
        assert_eq!(value["name"], "Rear");

        let cmd = Command::SetWindow { duration_ms: 60_000 };
        let value: serde_json::Value =
            serde_json::from_str(&cmd.channel_frames()[0]).unwrap();
        assert_eq!(value["type"], "setWindow");
        assert_eq!(value["durationMs"], 60_000);
    }

    #[test]
    fn test_prefs_body_uses_firmware_field_names() {
        let mut prefs = HashMap::new();
        prefs.insert(
            "1".to_string(),
            DisplayPref {
                name: Some("Front".to_string()),
                color: Some("#0077cc".to_string()),
            },
        );
        prefs.insert(
            "2".to_string(),
            DisplayPref {
                name: None,
                color: Some("#cc5500".to_string()),
            },
        );

        let body = prefs_body(&prefs);
        assert_eq!(body["name1"], "Front");
        assert_eq!(body["color1"], "#0077cc");
        assert_eq!(body["color2"], "#cc5500");
        assert!(body.get("name2").is_none());
    }

    fn offline_dispatcher() -> (CommandDispatcher, mpsc::UnboundedReceiver<StatusEvent>) {
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let handle = ConnectionHandle::new(
            outbound_tx,
            Arc::new(Mutex::new(ConnectionState::Disconnected)),
        );
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let dispatcher =
            CommandDispatcher::new(handle, "http://127.0.0.1:0".to_string(), status_tx).unwrap();
        (dispatcher, status_rx)
    }

    #[tokio::test]
    async fn test_calibrate_offline_reports_failure() {
        // Calibration has no HTTP equivalent: offline it fails immediately
        let (dispatcher, mut status_rx) = offline_dispatcher();

        dispatcher.dispatch(&Command::Calibrate {
            target: "1".to_string(),
        });

        match status_rx.recv().await.unwrap() {
            StatusEvent::CommandFailed { summary, detail } => {
                assert_eq!(summary, "Calibrate sent");
                assert_eq!(detail, "channel unavailable");
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_display_local_commands_succeed_offline() {
        let (dispatcher, mut status_rx) = offline_dispatcher();

        dispatcher.dispatch(&Command::SetWindow { duration_ms: 30_000 });

        match status_rx.recv().await.unwrap() {
            StatusEvent::CommandSent { summary } => assert_eq!(summary, "Window: 30s"),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connected_dispatch_goes_over_the_channel() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let handle = ConnectionHandle::new(
            outbound_tx,
            Arc::new(Mutex::new(ConnectionState::Connected)),
        );
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let dispatcher =
            CommandDispatcher::new(handle, "http://127.0.0.1:0".to_string(), status_tx).unwrap();

        dispatcher.dispatch(&Command::Tare {
            target: "4".to_string(),
        });

        assert_eq!(outbound_rx.recv().await.unwrap(), "tare:4");
        assert!(matches!(
            status_rx.recv().await.unwrap(),
            StatusEvent::CommandSent { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_fallback_surfaces_failure_without_retry() {
        // Port 0 is never reachable; the failure arrives asynchronously
        let (dispatcher, mut status_rx) = offline_dispatcher();

        dispatcher.dispatch(&Command::Tare {
            target: "1".to_string(),
        });

        match status_rx.recv().await.unwrap() {
            StatusEvent::CommandFailed { summary, .. } => {
                assert_eq!(summary, "Tare 1 sent");
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }
}
