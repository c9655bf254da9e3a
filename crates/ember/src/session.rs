use std::sync::Arc;

use ember_core::store::MemoryStore;
use ember_core::{
    Controller, ModelClient, Notification, Renderer, RetryPolicy, Store,
    UiRequest,
};
use ember_model::ModelProvider;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type IdleFn = Box<dyn Fn() + Send + Sync>;

enum Command {
    Request(UiRequest),
    Notify(Notification),
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    model_client: ModelClient,
    store: Arc<dyn Store>,
    renderer: Box<dyn Renderer>,
    on_idle: Option<IdleFn>,
    restore_history: bool,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    ///
    /// Unless a store is set, the conversation only lives in memory.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            store: Arc::new(MemoryStore::default()),
            renderer: Box::new(CallbackRenderer(|_: Notification| {})),
            on_idle: None,
            restore_history: false,
        }
    }

    /// Sets how failed connections to the model are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: Option<RetryPolicy>) -> Self {
        self.model_client = self.model_client.with_retry_policy(retry_policy);
        self
    }

    /// Sets the store the conversation is loaded from and saved to.
    #[inline]
    pub fn with_store<S: Store + 'static>(mut self, store: S) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Sets the renderer that receives the notifications.
    #[inline]
    pub fn with_renderer<R: Renderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Attaches a callback to be invoked for every notification, replacing
    /// the renderer.
    #[inline]
    pub fn on_notification(
        self,
        on_notification: impl Fn(Notification) + Send + Sync + 'static,
    ) -> Self {
        self.with_renderer(CallbackRenderer(on_notification))
    }

    /// Attaches a callback to be invoked whenever the session has nothing
    /// left to do, including once after it started.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Replays the stored history to the renderer when the session starts.
    #[inline]
    pub fn restore_history(mut self, restore_history: bool) -> Self {
        self.restore_history = restore_history;
        self
    }

    /// Loads the conversation and starts the session.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn build(self) -> Result<Session, ember_core::Error> {
        let Self {
            model_client,
            store,
            renderer,
            on_idle,
            restore_history,
        } = self;

        let controller = Controller::load(store, renderer, model_client).await?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(
            controller,
            cmd_rx,
            on_idle,
            restore_history,
        ));
        Ok(Session { cmd_tx, driver })
    }
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// Requests are handled one at a time in the order they were sent. Sending
/// while a reply is still streaming queues the request behind it.
pub struct Session {
    cmd_tx: mpsc::UnboundedSender<Command>,
    driver: JoinHandle<()>,
}

impl Session {
    /// Sends a message to the session.
    #[inline]
    pub fn send_message(&self, message: &str) {
        self.send_request(UiRequest::Chat {
            text: message.to_owned(),
        });
    }

    /// Clears the conversation.
    #[inline]
    pub fn clear_history(&self) {
        self.send_request(UiRequest::ClearHistory);
    }

    /// Queues a request as if it came from the renderer.
    pub fn send_request(&self, req: UiRequest) {
        self.send_command(Command::Request(req));
    }

    /// Sends a notification to the renderer once every request queued
    /// before it has been handled.
    pub fn notify(&self, notification: Notification) {
        self.send_command(Command::Notify(notification));
    }

    fn send_command(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            // Only happens if the driver panicked.
            error!("session has stopped, command dropped");
        }
    }

    /// Waits until every queued request has been handled, then stops the
    /// session.
    pub async fn close(self) {
        let Self { cmd_tx, driver } = self;
        drop(cmd_tx);
        if let Err(err) = driver.await {
            error!("session task failed: {err}");
        }
    }
}

async fn drive(
    mut controller: Controller<Arc<dyn Store>, Box<dyn Renderer>>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    on_idle: Option<IdleFn>,
    restore_history: bool,
) {
    let notify_idle = || {
        if let Some(on_idle) = &on_idle {
            on_idle();
        }
    };

    if restore_history {
        controller.restore();
    }
    notify_idle();

    while let Some(cmd) = cmd_rx.recv().await {
        let req = match cmd {
            Command::Request(req) => req,
            Command::Notify(notification) => {
                controller.renderer_mut().notify(notification);
                continue;
            }
        };
        trace!("handling request: {req:?}");
        if let Err(err) = controller.handle(req).await {
            // The conversation is still usable, only the stored copy is
            // behind.
            error!("failed to save conversation: {err}");
            controller.renderer_mut().notify(Notification::Error {
                text: format!("Failed to save the conversation: {err}"),
            });
        }
        if cmd_rx.is_empty() {
            notify_idle();
        }
    }
    debug!("session closed");
}

struct CallbackRenderer<F>(F);

impl<F: Fn(Notification) + Send> Renderer for CallbackRenderer<F> {
    #[inline]
    fn notify(&mut self, notification: Notification) {
        (self.0)(notification)
    }
}
