use crate::messages::{InferenceRequest, InferenceResult};
use crate::predictor::Predictor;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, mpsc},
    thread::JoinHandle,
    time::Instant,
};
use tokio::sync::oneshot;

/// Represents the current state of the inference engine.
#[derive(Clone, Debug, PartialEq)]
pub enum InfernumEngineState {
    /// The engine is idle and ready to accept new inference requests.
    Idle,
    /// The engine is currently processing an inference request.
    Processing,
}

impl InfernumEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfernumEngineState::Idle => "idle",
            InfernumEngineState::Processing => "processing",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("inference engine is stopped")]
    Stopped,
}

/// Internal request wrapper used by the engine to track inference requests.
struct InfernumEngineRequest {
    id: u64,
    request: InferenceRequest,
    reply: oneshot::Sender<InferenceResult>,
}

/// Hosts a [`Predictor`] on a dedicated thread.
///
/// Requests are queued and handled one at a time in arrival order; each
/// caller awaits its own result. The predictor, and the model inside it, is
/// moved to the worker thread and never shared.
pub struct InfernumEngine {
    state: Arc<Mutex<InfernumEngineState>>,
    req_tx: Option<mpsc::Sender<InfernumEngineRequest>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: Mutex<u64>,
}

impl InfernumEngine {
    /// Creates a new engine and spawns its worker thread.
    pub fn new<P: Predictor + Send + 'static>(mut predictor: P) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<InfernumEngineRequest>();
        let state = Arc::new(Mutex::new(InfernumEngineState::Idle));

        let inference_handle = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Scheduling inference {}", req.id);

                    *state.lock().unwrap() = InfernumEngineState::Processing;
                    let start_time = Instant::now();

                    // a panic in the model is answered like any other failure
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        predictor.predict(&req.request)
                    }))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        log::error!("Inference {} panicked: {}", req.id, message);
                        InferenceResult::Error {
                            error: format!("Processing failed: {message}"),
                        }
                    });

                    log::debug!(
                        "Inference {} completed in {:?}",
                        req.id,
                        start_time.elapsed()
                    );

                    // idle before replying, a caller that got its result never sees Processing
                    *state.lock().unwrap() = InfernumEngineState::Idle;

                    // the caller may have gone away, the result is dropped then
                    let _ = req.reply.send(result);
                }
            }
        });

        Self {
            state,
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: Mutex::new(0),
        }
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> InfernumEngineState {
        self.state.lock().unwrap().clone()
    }

    /// Queues `request` and waits for its result.
    pub async fn predict(&self, request: InferenceRequest) -> Result<InferenceResult, EngineError> {
        self.schedule(request)?.await.map_err(|_| EngineError::Stopped)
    }

    /// Blocking variant of [`InfernumEngine::predict`], for use outside an
    /// async runtime.
    pub fn predict_blocking(&self, request: InferenceRequest) -> Result<InferenceResult, EngineError> {
        self.schedule(request)?
            .blocking_recv()
            .map_err(|_| EngineError::Stopped)
    }

    fn schedule(
        &self,
        request: InferenceRequest,
    ) -> Result<oneshot::Receiver<InferenceResult>, EngineError> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Stopped)?;

        let id = {
            let mut counter = self.id_counter.lock().unwrap();
            *counter += 1;
            *counter
        };

        let (reply, rx) = oneshot::channel();
        tx.send(InfernumEngineRequest { id, request, reply })
            .map_err(|_| EngineError::Stopped)?;

        Ok(rx)
    }

    /// Stops the engine, letting the worker finish the requests already queued.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            let _ = handle.join();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "model panicked".to_string()
    }
}

impl Drop for InfernumEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::InferenceMode;

    struct EchoPredictor;

    impl Predictor for EchoPredictor {
        fn predict(&mut self, request: &InferenceRequest) -> InferenceResult {
            match &request.video_url {
                Some(url) => InferenceResult::Summary {
                    description: format!("{}: {}", url, request.prompt),
                },
                None => InferenceResult::Error {
                    error: "video_url is required".into(),
                },
            }
        }
    }

    #[tokio::test]
    async fn requests_get_their_own_result() {
        let engine = InfernumEngine::new(EchoPredictor);

        let first = engine
            .predict(InferenceRequest::new("a.mp4", "one", InferenceMode::Summary))
            .await
            .unwrap();
        let second = engine
            .predict(InferenceRequest::new("b.mp4", "two", InferenceMode::Summary))
            .await
            .unwrap();

        assert_eq!(
            first,
            InferenceResult::Summary {
                description: "a.mp4: one".into()
            }
        );
        assert_eq!(
            second,
            InferenceResult::Summary {
                description: "b.mp4: two".into()
            }
        );
        assert_eq!(engine.state(), InfernumEngineState::Idle);
    }

    struct PanickyPredictor;

    impl Predictor for PanickyPredictor {
        fn predict(&mut self, request: &InferenceRequest) -> InferenceResult {
            if request.prompt == "boom" {
                panic!("shape mismatch in attention");
            }
            InferenceResult::Summary {
                description: request.prompt.clone(),
            }
        }
    }

    #[tokio::test]
    async fn panicking_predictor_becomes_an_error_result() {
        let engine = InfernumEngine::new(PanickyPredictor);

        let first = engine
            .predict(InferenceRequest::new("a.mp4", "boom", InferenceMode::Summary))
            .await
            .unwrap();
        assert_eq!(
            first.error(),
            Some("Processing failed: shape mismatch in attention")
        );
        assert_eq!(engine.state(), InfernumEngineState::Idle);

        // the worker survives and keeps serving
        let second = engine
            .predict(InferenceRequest::new("a.mp4", "fine", InferenceMode::Summary))
            .await
            .unwrap();
        assert_eq!(
            second,
            InferenceResult::Summary {
                description: "fine".into()
            }
        );
    }

    #[tokio::test]
    async fn engine_is_idle_once_a_result_arrives() {
        let engine = InfernumEngine::new(EchoPredictor);
        for i in 0..2000 {
            engine
                .predict(InferenceRequest::new("a.mp4", i.to_string(), InferenceMode::Summary))
                .await
                .unwrap();
            assert_eq!(engine.state(), InfernumEngineState::Idle, "request {i}");
        }
    }

    #[test]
    fn stopped_engine_rejects_requests() {
        let mut engine = InfernumEngine::new(EchoPredictor);
        let result = engine
            .predict_blocking(InferenceRequest::new("a.mp4", "p", InferenceMode::Timestamped))
            .unwrap();
        assert!(!result.is_error());

        engine.stop();
        assert!(matches!(
            engine.predict_blocking(InferenceRequest::new("a.mp4", "p", InferenceMode::Timestamped)),
            Err(EngineError::Stopped)
        ));
    }
}
