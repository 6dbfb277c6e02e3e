//! Command orchestration: preconditions, capture, resolve, dispatch.
//!
//! Every failure surfaces as a human-readable spoken notice; raw errors
//! never reach the UI. One "last action" value is kept for repeat-last,
//! and a monotonically increasing command sequence makes overlapping
//! commands safe: a stale in-flight result is dropped before it can drive
//! page effects.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::bridge::{InboundMessage, OutboundMessage, ReasoningFeedback, Status};
use crate::config::Settings;
use crate::errors::NavError;
use crate::intent::{Action, NavAction};
use crate::resolver::{ActionResolver, VisionResolver};
use crate::{Command, Screenshot};

/// URL prefixes the assistant refuses to operate on.
const RESTRICTED_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "edge://",
    "moz-extension://",
];

/// The active browser tab as seen at command time.
#[derive(Debug, Clone, Default)]
pub struct TabInfo {
    pub url: Option<String>,
    pub title: Option<String>,
}

/// Access to the active tab and its screenshot. The browser side of this
/// seam lives outside the core.
#[async_trait]
pub trait TabProvider: Send + Sync {
    async fn active_tab(&self) -> Option<TabInfo>;
    async fn capture(&self) -> Result<Screenshot, NavError>;
}

/// Outbound side of the message boundary. Implemented by
/// [`crate::bridge::PageBridge`] in production and by recorders in tests.
pub trait TabSink: Send + Sync {
    fn send(&self, message: OutboundMessage);
}

pub struct Orchestrator<T: TabProvider, S: TabSink> {
    tabs: T,
    sink: S,
    resolver: Mutex<Option<Arc<dyn ActionResolver>>>,
    last_action: Mutex<Option<NavAction>>,
    last_transcript: Mutex<String>,
    listening: AtomicBool,
    sequence: AtomicU64,
}

impl<T: TabProvider, S: TabSink> Orchestrator<T, S> {
    /// Build an orchestrator. With no API credential in the settings the
    /// resolver stays unconfigured and commands fail their precondition.
    pub fn new(settings: &Settings, tabs: T, sink: S) -> Self {
        let resolver: Option<Arc<dyn ActionResolver>> = match VisionResolver::new(settings) {
            Ok(r) => Some(Arc::new(r)),
            Err(_) => {
                warn!("model API key not configured; commands will be rejected");
                None
            }
        };
        Self {
            tabs,
            sink,
            resolver: Mutex::new(resolver),
            last_action: Mutex::new(None),
            last_transcript: Mutex::new(String::new()),
            listening: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        }
    }

    /// Swap the resolver in or out (tests, alternative backends).
    pub fn set_resolver(&self, resolver: Option<Arc<dyn ActionResolver>>) {
        *self.resolver.lock().expect("resolver lock") = resolver;
    }

    /// Process one user command end to end. Side effects only; every
    /// outcome is reported through the sink.
    #[instrument(level = "info", skip(self, command), fields(text = %command.text))]
    pub async fn handle(&self, command: Command) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_transcript.lock().expect("transcript lock") = command.text.clone();

        if command.text.trim().is_empty() {
            self.speak_error("No command received. Please speak clearly and try again.");
            return;
        }

        let resolver = match self.resolver.lock().expect("resolver lock").clone() {
            Some(r) => r,
            None => {
                self.speak_error(
                    "Please configure your API key in settings to use intelligent commands.",
                );
                return;
            }
        };

        let tab = match self.tabs.active_tab().await {
            Some(tab) => tab,
            None => {
                warn!("no active tab; dropping command");
                return;
            }
        };
        let url = match tab.url {
            Some(url) => url,
            None => {
                self.speak_error(
                    "Cannot access page information. Please reload the extension and try again.",
                );
                return;
            }
        };
        if is_restricted(&url) {
            let head: String = url.chars().take(30).collect();
            self.speak_error(&format!(
                "Cannot work on special pages. Current URL: {head}..."
            ));
            return;
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            let scheme = url.split(':').next().unwrap_or("unknown");
            self.speak_error(&format!(
                "Only works on http/https websites. Current URL scheme: {scheme}"
            ));
            return;
        }

        let outcome = async {
            let screenshot = self.tabs.capture().await?;
            resolver.resolve(&command, &screenshot, &url).await
        }
        .await;

        match outcome {
            Ok(intent) => {
                if self.sequence.load(Ordering::SeqCst) != sequence {
                    debug!("a newer command superseded this one; dropping stale result");
                    return;
                }
                self.sink.send(OutboundMessage::Feedback(ReasoningFeedback {
                    reasoning: intent.reasoning.clone(),
                    action: intent.action_name().to_string(),
                    selector: intent.selector().unwrap_or_default().to_string(),
                }));
                if matches!(intent.action, Action::NotFound) {
                    // Expected branch: the page is judged irrelevant to the
                    // goal. Speak the message, nothing else.
                    info!(reasoning = %intent.reasoning, "page not relevant to the user goal");
                    self.speak_error(&intent.speak);
                    return;
                }
                if let Some(payload) = intent.into_payload() {
                    *self.last_action.lock().expect("last action lock") = Some(payload.clone());
                    self.sink.send(OutboundMessage::NavAction { payload });
                }
            }
            Err(e) => {
                error!(error = %e, "error processing command");
                self.sink.send(OutboundMessage::Feedback(ReasoningFeedback {
                    reasoning: format!("Error: {e}"),
                    action: "error".to_string(),
                    selector: String::new(),
                }));
                self.speak_error(
                    "Sorry, I encountered an error processing your command. Check the logs for details.",
                );
            }
        }
    }

    /// Re-dispatch the most recent successfully resolved action without a
    /// new model round-trip.
    pub fn repeat_last(&self) {
        let last = self.last_action.lock().expect("last action lock").clone();
        if let Some(payload) = last {
            info!(kind = ?payload.kind, "repeating last action");
            self.sink.send(OutboundMessage::NavAction { payload });
        }
    }

    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::Relaxed);
    }

    pub fn status(&self) -> Status {
        Status {
            listening: self.listening.load(Ordering::Relaxed),
            last_transcript: self.last_transcript.lock().expect("transcript lock").clone(),
        }
    }

    /// Re-read persisted settings and rebuild the resolver, then tell the
    /// collaborators to do the same.
    pub fn reload_config(&self) {
        let settings = Settings::from_env();
        let resolver: Option<Arc<dyn ActionResolver>> = match VisionResolver::new(&settings) {
            Ok(r) => Some(Arc::new(r)),
            Err(_) => None,
        };
        info!(
            configured = resolver.is_some(),
            "configuration reloaded"
        );
        *self.resolver.lock().expect("resolver lock") = resolver;
        self.sink.send(OutboundMessage::ReloadConfig);
    }

    fn speak_error(&self, message: &str) {
        self.sink.send(OutboundMessage::SpeakError {
            message: message.to_string(),
        });
    }
}

fn is_restricted(url: &str) -> bool {
    url == "about:blank" || RESTRICTED_PREFIXES.iter().any(|p| url.starts_with(p))
}

/// Route inbound bridge messages to the orchestrator. Commands are
/// spawned so a slow model round-trip never blocks the message loop;
/// overlapping commands are resolved by the sequence token.
pub async fn route_messages<T, S>(
    orchestrator: Arc<Orchestrator<T, S>>,
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
) where
    T: TabProvider + 'static,
    S: TabSink + 'static,
{
    while let Some(message) = inbound.recv().await {
        match message {
            InboundMessage::VoiceCommand { text } => {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator.handle(Command::voice(&text)).await;
                });
            }
            InboundMessage::RepeatLast => orchestrator.repeat_last(),
            InboundMessage::UpdateListening { listening } => {
                orchestrator.set_listening(listening)
            }
            InboundMessage::GetStatus => {
                let status = orchestrator.status();
                orchestrator.sink.send(OutboundMessage::StatusUpdate(status));
            }
            InboundMessage::FindAndGuide { keyword } => {
                orchestrator
                    .sink
                    .send(OutboundMessage::FindAndGuide { keyword });
            }
            InboundMessage::ReloadConfig => orchestrator.reload_config(),
            InboundMessage::SnapshotResponse { .. } => {
                // Correlated inside the bridge; nothing to do here.
            }
        }
    }
}
