use image::RgbImage;
use presence_core::{Landmarks, LivenessConfig, LivenessEngine, LivenessVerdict};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from the async front end to the engine thread.
enum EngineRequest {
    Check {
        face: RgbImage,
        landmarks: Option<Landmarks>,
        previous: Option<RgbImage>,
        reply: oneshot::Sender<LivenessVerdict>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Score one face crop, optionally with landmarks and the previous crop.
    pub async fn check(
        &self,
        face: RgbImage,
        landmarks: Option<Landmarks>,
        previous: Option<RgbImage>,
    ) -> Result<LivenessVerdict, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Check {
                face,
                landmarks,
                previous,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Clear per-subject state (blink history) before a new session.
    pub async fn reset(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Reset { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the liveness engine on a dedicated OS thread.
///
/// Requests are served one at a time in arrival order, so the engine's blink
/// history sees frames in the order they were submitted. The thread exits
/// once every handle has been dropped.
pub fn spawn_engine(config: LivenessConfig) -> Result<EngineHandle, EngineError> {
    let mut engine = LivenessEngine::new(config);
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("presence-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Check {
                        face,
                        landmarks,
                        previous,
                        reply,
                    } => {
                        let verdict =
                            engine.check_liveness(&face, landmarks.as_ref(), previous.as_ref());
                        let _ = reply.send(verdict);
                    }
                    EngineRequest::Reset { reply } => {
                        engine.reset();
                        tracing::debug!("engine state reset");
                        let _ = reply.send(());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
