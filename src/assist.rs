//! User-triggered AI operations: auto-enhance and background removal.
//!
//! Both entry points are gated by the shared [`QuotaCircuitBreaker`] and never
//! return an error; every failure becomes an [`AssistStatus`] the front end
//! can show as-is.

use std::sync::Arc;

use crate::ai::VisionClient;
use crate::error::AiError;
use crate::model::ImageId;
use crate::resilience::{QuotaCircuitBreaker, ResilientInvoker};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistOutcome {
    Applied,
    /// The model answered but had nothing usable.
    NoSuggestion,
    /// No backend is configured.
    Unavailable,
    /// The breaker was open; nothing was sent.
    CoolingDown,
    /// The quota ran out during this call; the breaker is now open.
    QuotaExceeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistStatus {
    pub outcome: AssistOutcome,
    pub message: String,
}

impl AssistStatus {
    fn new(outcome: AssistOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        self.outcome == AssistOutcome::Applied
    }
}

impl std::fmt::Display for AssistStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Auto-enhance and background removal against one vision backend.
#[derive(Clone)]
pub struct AiAssistant {
    client: Option<Arc<dyn VisionClient>>,
    invoker: ResilientInvoker,
    breaker: Arc<QuotaCircuitBreaker>,
}

impl AiAssistant {
    pub fn new(
        client: Option<Arc<dyn VisionClient>>,
        invoker: ResilientInvoker,
        breaker: Arc<QuotaCircuitBreaker>,
    ) -> Self {
        Self {
            client,
            invoker,
            breaker,
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    /// Ask the model for tone values and apply them to the image.
    pub async fn auto_enhance(&self, workspace: &Workspace, id: ImageId) -> AssistStatus {
        let (client, bytes, mime, name) = match self.prepare(workspace, id).await {
            Ok(ready) => ready,
            Err(status) => return status,
        };

        let result = self
            .invoker
            .invoke(|| client.suggest_enhancement(&bytes, mime))
            .await;

        match result {
            Ok(suggestion) if suggestion.is_empty() => {
                AssistStatus::new(AssistOutcome::NoSuggestion, "No enhancement suggestion available")
            }
            Ok(suggestion) => {
                if !workspace.update_adjustments(id, |adj| suggestion.apply_to(adj)) {
                    return removed(&name);
                }
                log::info!("Auto-enhance applied to {name}: {suggestion:?}");
                AssistStatus::new(AssistOutcome::Applied, format!("Enhanced {name}"))
            }
            Err(AiError::MalformedResponse(detail)) => {
                log::debug!("Unusable enhancement response for {name}: {detail}");
                AssistStatus::new(AssistOutcome::NoSuggestion, "No enhancement suggestion available")
            }
            Err(err) => self.failure(&name, "Auto-enhance", err),
        }
    }

    /// Replace the image's source with a background-free PNG.
    pub async fn remove_background(&self, workspace: &Workspace, id: ImageId) -> AssistStatus {
        let (client, bytes, mime, name) = match self.prepare(workspace, id).await {
            Ok(ready) => ready,
            Err(status) => return status,
        };

        let result = self
            .invoker
            .invoke(|| client.remove_background(&bytes, mime))
            .await;

        match result {
            Ok(png) => {
                if !workspace.replace_source_png(id, png) {
                    return removed(&name);
                }
                log::info!("Background removed from {name}");
                AssistStatus::new(AssistOutcome::Applied, format!("Removed background from {name}"))
            }
            Err(err) => self.failure(&name, "Background removal", err),
        }
    }

    /// Everything a call needs, or the status explaining why it cannot start.
    async fn prepare(
        &self,
        workspace: &Workspace,
        id: ImageId,
    ) -> Result<(Arc<dyn VisionClient>, Arc<[u8]>, &'static str, String), AssistStatus> {
        let Some(client) = &self.client else {
            return Err(AssistStatus::new(
                AssistOutcome::Unavailable,
                "AI features are not configured",
            ));
        };
        if self.breaker.is_open() {
            return Err(AssistStatus::new(
                AssistOutcome::CoolingDown,
                self.breaker.wait_message(),
            ));
        }
        let Some(entry) = workspace.get(id) else {
            return Err(AssistStatus::new(
                AssistOutcome::Failed,
                format!("Image {id} no longer exists"),
            ));
        };
        let bytes = entry.source.load().await.map_err(|e| {
            AssistStatus::new(
                AssistOutcome::Failed,
                format!("Cannot read {}: {e}", entry.name),
            )
        })?;
        Ok((Arc::clone(client), bytes, entry.mime_type(), entry.name))
    }

    fn failure(&self, name: &str, operation: &str, err: AiError) -> AssistStatus {
        if err.is_quota_exceeded() {
            self.breaker.trip_default();
            log::warn!("{operation} hit the AI quota on {name}");
            return AssistStatus::new(AssistOutcome::QuotaExceeded, self.breaker.wait_message());
        }
        log::warn!("{operation} failed for {name}: {err}");
        AssistStatus::new(AssistOutcome::Failed, format!("{operation} failed: {err}"))
    }
}

fn removed(name: &str) -> AssistStatus {
    AssistStatus::new(
        AssistOutcome::Failed,
        format!("{name} was removed before the result arrived"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::EnhanceSuggestion;
    use crate::model::DetectionRegion;
    use crate::resilience::RetryPolicy;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct MockClient {
        enhance: Mutex<Option<Result<EnhanceSuggestion, AiError>>>,
        background: Mutex<Option<Result<Vec<u8>, AiError>>>,
        calls: Mutex<usize>,
    }

    impl MockClient {
        fn new() -> Self {
            Self {
                enhance: Mutex::new(None),
                background: Mutex::new(None),
                calls: Mutex::new(0),
            }
        }

        fn enhancing(result: Result<EnhanceSuggestion, AiError>) -> Arc<Self> {
            let client = Self::new();
            *client.enhance.lock() = Some(result);
            Arc::new(client)
        }

        fn removing(result: Result<Vec<u8>, AiError>) -> Arc<Self> {
            let client = Self::new();
            *client.background.lock() = Some(result);
            Arc::new(client)
        }
    }

    #[async_trait::async_trait]
    impl VisionClient for MockClient {
        fn name(&self) -> &str {
            "Mock"
        }

        async fn suggest_enhancement(&self, _: &[u8], _: &str) -> Result<EnhanceSuggestion, AiError> {
            *self.calls.lock() += 1;
            self.enhance
                .lock()
                .clone()
                .unwrap_or_else(|| Ok(EnhanceSuggestion::default()))
        }

        async fn remove_background(&self, _: &[u8], _: &str) -> Result<Vec<u8>, AiError> {
            *self.calls.lock() += 1;
            self.background
                .lock()
                .clone()
                .unwrap_or_else(|| Err(AiError::Unavailable("unscripted".into())))
        }

        async fn detect_privacy_regions(&self, _: &[u8], _: &str) -> Result<Vec<DetectionRegion>, AiError> {
            unreachable!()
        }
    }

    fn assistant(client: Option<Arc<MockClient>>) -> (AiAssistant, Arc<QuotaCircuitBreaker>) {
        let breaker = Arc::new(QuotaCircuitBreaker::default());
        let invoker = ResilientInvoker::new(RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(10),
        });
        let client = client.map(|c| c as Arc<dyn VisionClient>);
        (AiAssistant::new(client, invoker, Arc::clone(&breaker)), breaker)
    }

    fn workspace() -> (Workspace, ImageId) {
        let ws = Workspace::new();
        let id = ws.add_bytes("photo.jpg", vec![1, 2, 3]);
        (ws, id)
    }

    // ── auto-enhance ─────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn suggestion_is_applied() {
        let (ws, id) = workspace();
        ws.update_adjustments(id, |a| a.with_sepia(40.0).with_brightness(50.0));
        let client = MockClient::enhancing(Ok(EnhanceSuggestion {
            brightness: Some(115.0),
            contrast: Some(105.0),
            saturation: None,
            warmth: Some(10.0),
        }));
        let (assistant, _) = assistant(Some(client));

        let status = assistant.auto_enhance(&ws, id).await;
        assert!(status.is_applied(), "{status}");

        let adj = ws.get(id).unwrap().adjustments;
        assert_eq!(adj.brightness, 115.0);
        assert_eq!(adj.contrast, 105.0);
        assert_eq!(adj.saturation, 100.0);
        assert_eq!(adj.warmth, 10.0);
        assert_eq!(adj.sepia, 40.0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_response_means_no_suggestion() {
        let (ws, id) = workspace();
        let client = MockClient::enhancing(Err(AiError::MalformedResponse("prose".into())));
        let (assistant, breaker) = assistant(Some(client));

        let status = assistant.auto_enhance(&ws, id).await;
        assert_eq!(status.outcome, AssistOutcome::NoSuggestion);
        assert_eq!(status.message, "No enhancement suggestion available");
        assert_eq!(ws.get(id).unwrap().adjustments, Default::default());
        assert!(!breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn quota_trips_breaker_once() {
        let (ws, id) = workspace();
        let client = MockClient::enhancing(Err(AiError::Remote {
            status: Some(429),
            code: None,
            message: "quota".into(),
        }));
        let (assistant, breaker) = assistant(Some(Arc::clone(&client)));

        let status = assistant.auto_enhance(&ws, id).await;
        assert_eq!(status.outcome, AssistOutcome::QuotaExceeded);
        assert!(breaker.is_open());

        // the second call never reaches the backend
        let status = assistant.auto_enhance(&ws, id).await;
        assert_eq!(status.outcome, AssistOutcome::CoolingDown);
        assert!(status.message.contains("60s"));
        assert_eq!(*client.calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_client_is_unavailable() {
        let (ws, id) = workspace();
        let (assistant, _) = assistant(None);
        assert!(!assistant.is_available());
        let status = assistant.auto_enhance(&ws, id).await;
        assert_eq!(status.outcome, AssistOutcome::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_image_fails() {
        let (ws, id) = workspace();
        ws.remove_image(id);
        let (assistant, _) = assistant(Some(MockClient::enhancing(Ok(Default::default()))));
        let status = assistant.auto_enhance(&ws, id).await;
        assert_eq!(status.outcome, AssistOutcome::Failed);
    }

    // ── background removal ───────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn background_removal_replaces_source() {
        let (ws, id) = workspace();
        let client = MockClient::removing(Ok(vec![0x89, b'P', b'N', b'G']));
        let (assistant, _) = assistant(Some(client));

        let status = assistant.remove_background(&ws, id).await;
        assert!(status.is_applied(), "{status}");

        let entry = ws.get(id).unwrap();
        assert_eq!(entry.name, "photo.png");
        assert_eq!(&*entry.source.load().await.unwrap(), &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test(start_paused = true)]
    async fn background_failure_keeps_source() {
        let (ws, id) = workspace();
        let client = MockClient::removing(Err(AiError::MalformedResponse("no image".into())));
        let (assistant, breaker) = assistant(Some(client));

        let status = assistant.remove_background(&ws, id).await;
        assert_eq!(status.outcome, AssistOutcome::Failed);
        assert!(status.message.starts_with("Background removal failed"));
        assert_eq!(ws.get(id).unwrap().name, "photo.jpg");
        assert!(!breaker.is_open());
    }
}
