//! # Session Control
//!
//! Boolean command surface for the external command layer.
//!
//! The command layer only needs to know whether an operation succeeded, so
//! every error is logged here and reduced to `false`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::session::{Recorder, SessionStatus};

/// Shared handle over a [`Recorder`]
#[derive(Clone)]
pub struct SessionControl {
    recorder: Arc<Mutex<Recorder>>,
}

impl SessionControl {
    pub fn new(recorder: Arc<Mutex<Recorder>>) -> Self {
        Self { recorder }
    }

    /// Start or resume recording.
    pub async fn start(&self) -> bool {
        match self.recorder.lock().await.start() {
            Ok(()) => true,
            Err(e) => {
                error!("start failed: {}", e);
                false
            }
        }
    }

    /// Pause recording, keeping the session resumable.
    pub async fn pause(&self) -> bool {
        match self.recorder.lock().await.pause() {
            Ok(()) => true,
            Err(e) => {
                error!("pause failed: {}", e);
                false
            }
        }
    }

    /// End the session and export its track.
    pub async fn end(&self) -> bool {
        match self.recorder.lock().await.end() {
            Ok(summary) => {
                if let Some(track) = summary.track_path {
                    info!("Track available at {}", track.display());
                }
                true
            }
            Err(e) => {
                error!("end failed: {}", e);
                false
            }
        }
    }

    pub async fn is_active(&self) -> bool {
        self.status().await.active
    }

    pub async fn status(&self) -> SessionStatus {
        self.recorder.lock().await.status()
    }

    /// Status as a JSON object
    ///
    /// # Examples
    ///
    /// ```text
    /// {"active":true,"state":"recording","log_path":"./rides/11142213",
    ///  "buffered":12,"distance_m":5021.4,"alt_gain_m":87}
    /// ```
    pub async fn status_json(&self) -> String {
        let status = self.status().await;
        serde_json::to_string(&status).unwrap_or_else(|e| {
            warn!("Cannot serialize status: {}", e);
            String::from("{}")
        })
    }
}
