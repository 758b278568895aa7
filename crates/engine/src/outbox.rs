//! Outbound email/SMS queue.
//!
//! A bounded channel drained by a pool of worker tasks. Producers never wait:
//! when the queue is full (or already shut down) the message is dropped with a
//! warning. Nothing on the request path depends on delivery.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Semaphore, mpsc, watch},
    task::JoinHandle,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum OutboundMessage {
    Email {
        to: String,
        subject: String,
        body: String,
    },
    /// Accepted by every transport, but no engine operation sends one:
    /// accounts carry no phone number. Embedders with their own phone
    /// directory enqueue these through [`Outbox::enqueue`].
    Sms {
        to: String,
        body: String,
    },
}

impl OutboundMessage {
    pub fn email(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Email {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    fn recipient(&self) -> &str {
        match self {
            Self::Email { to, .. } | Self::Sms { to, .. } => to,
        }
    }
}

/// Delivery collaborator (SMTP relay, SMS provider, ...).
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), String>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MessageTransport for LogTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), String> {
        match message {
            OutboundMessage::Email { to, subject, .. } => {
                tracing::info!(%to, %subject, "email delivered to log transport");
            }
            OutboundMessage::Sms { to, .. } => {
                tracing::info!(%to, "sms delivered to log transport");
            }
        }
        Ok(())
    }
}

/// Producer side of the queue. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    sender: Option<mpsc::Sender<OutboundMessage>>,
}

/// Owns the dispatcher task. Dropping it detaches the pool; call
/// [`OutboxHandle::shutdown`] to drain and join it.
#[derive(Debug)]
pub struct OutboxHandle {
    stop: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
}

impl Outbox {
    /// An outbox that drops everything. Used by tools that never send mail.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Start a dispatcher delivering a queue of `capacity` messages with at
    /// most `workers` deliveries in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        transport: Arc<dyn MessageTransport>,
        capacity: usize,
        workers: usize,
    ) -> (Self, OutboxHandle) {
        let (outbox, receiver) = Self::channel(capacity);
        let (stop, stop_rx) = watch::channel(false);
        let workers = workers.max(1);

        let dispatcher = tokio::spawn(dispatch(receiver, transport, workers, stop_rx));

        (outbox, OutboxHandle { stop, dispatcher })
    }

    fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Queue a message without waiting. Returns `false` if it was dropped.
    pub fn enqueue(&self, message: OutboundMessage) -> bool {
        let Some(sender) = &self.sender else {
            tracing::debug!(to = message.recipient(), "outbox disabled, dropping message");
            return false;
        };
        match sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(to = message.recipient(), "outbox full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                tracing::warn!(to = message.recipient(), "outbox closed, dropping message");
                false
            }
        }
    }
}

impl OutboxHandle {
    /// Stop accepting messages, deliver what is already queued, then join
    /// the pool.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.dispatcher.await {
            tracing::error!("outbox dispatcher panicked: {err}");
        }
        tracing::info!("outbox drained");
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<OutboundMessage>,
    transport: Arc<dyn MessageTransport>,
    workers: usize,
    mut stop: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut closing = false;

    loop {
        tokio::select! {
            next = receiver.recv() => {
                let Some(message) = next else {
                    break;
                };
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let transport = Arc::clone(&transport);
                tokio::spawn(async move {
                    if let Err(err) = transport.send(&message).await {
                        tracing::warn!(to = message.recipient(), "message delivery failed: {err}");
                    }
                    drop(permit);
                });
            }
            _ = stop.changed(), if !closing => {
                closing = true;
                receiver.close();
            }
        }
    }

    // Wait for in-flight deliveries.
    let _ = permits.acquire_many(workers as u32).await;
    tracing::debug!("outbox dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessageTransport for Recorder {
        async fn send(&self, message: &OutboundMessage) -> Result<(), String> {
            self.sent
                .lock()
                .map_err(|_| "poisoned".to_string())?
                .push(message.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl MessageTransport for Failing {
        async fn send(&self, _message: &OutboundMessage) -> Result<(), String> {
            Err("smtp down".to_string())
        }
    }

    #[tokio::test]
    async fn shutdown_drains_queued_messages() {
        let recorder = Arc::new(Recorder::default());
        let (outbox, handle) = Outbox::start(recorder.clone(), 8, 2);

        for i in 0..5 {
            assert!(outbox.enqueue(OutboundMessage::email(
                format!("user{i}@example.com"),
                "hello",
                "body"
            )));
        }
        handle.shutdown().await;

        assert_eq!(recorder.sent.lock().unwrap().len(), 5);
        assert!(!outbox.enqueue(OutboundMessage::email("late@example.com", "s", "b")));
    }

    #[tokio::test]
    async fn sms_messages_reach_the_transport() {
        let recorder = Arc::new(Recorder::default());
        let (outbox, handle) = Outbox::start(recorder.clone(), 4, 1);
        let sms = OutboundMessage::Sms {
            to: "+2348000000000".to_string(),
            body: "Your wallet has been credited".to_string(),
        };

        assert!(outbox.enqueue(sms.clone()));
        handle.shutdown().await;

        assert_eq!(*recorder.sent.lock().unwrap(), vec![sms]);
    }

    #[test]
    fn full_queue_rejects_instead_of_blocking() {
        let (outbox, _receiver) = Outbox::channel(1);

        assert!(outbox.enqueue(OutboundMessage::email("a@b.com", "s", "b")));
        assert!(!outbox.enqueue(OutboundMessage::email("a@b.com", "s", "b")));
    }

    #[test]
    fn disabled_outbox_drops_everything() {
        assert!(!Outbox::disabled().enqueue(OutboundMessage::Sms {
            to: "+2348000000000".to_string(),
            body: "hi".to_string(),
        }));
    }

    #[tokio::test]
    async fn delivery_failures_do_not_stop_workers() {
        let (outbox, handle) = Outbox::start(Arc::new(Failing), 4, 1);

        assert!(outbox.enqueue(OutboundMessage::email("a@b.com", "s", "b")));
        assert!(outbox.enqueue(OutboundMessage::email("c@d.com", "s", "b")));
        handle.shutdown().await;
    }
}
