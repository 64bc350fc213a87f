// ── Live client ──
//
// Async facade over the hub. One spawned task owns the hub and is the
// only thing that ever touches live state; callers talk to it through a
// command channel and observe it through watch channels.

use std::future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ticketwire_api::{
    AgentStatus, LinkEvent, LinkState, RestClient, StateSnapshot, WebSocketLink,
};

use crate::command::{Command, CommandEnvelope, CommandResult, Delivery};
use crate::config::ClientConfig;
use crate::connection::ConnectionState;
use crate::dispatch::HandlerMap;
use crate::error::CoreError;
use crate::hub::{Hub, LiveState, LiveView, SendRoute};
use crate::model::{EntityId, PresenceStatus};
use crate::notifications::NotificationDraft;
use crate::optimistic::Settled;
use crate::registry::SubscriptionHandle;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::timers::Moment;
use crate::transport::{NullTransport, Transport};

const COMMAND_CHANNEL_SIZE: usize = 64;

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<LiveClientInner>`. The background task stops
/// when [`shutdown`](Self::shutdown) is called or the last clone drops.
#[derive(Clone)]
pub struct LiveClient {
    inner: Arc<LiveClientInner>,
}

struct LiveClientInner {
    commands: mpsc::Sender<CommandEnvelope>,
    view: watch::Receiver<Arc<LiveView>>,
    connection: watch::Receiver<ConnectionState>,
    rest: RestClient,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    link: Option<WebSocketLink>,
}

impl Drop for LiveClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(link) = &self.link {
            link.shutdown();
        }
    }
}

impl LiveClient {
    /// Start a client for `config`.
    ///
    /// Spawns the WebSocket link (when `ws_url` is set) and the hub task,
    /// then returns immediately. Must be called from within a Tokio runtime.
    pub fn connect(config: &ClientConfig) -> Result<Self, CoreError> {
        let rest = RestClient::new(config.api_url.clone(), &config.transport())?;
        let store: Arc<dyn KeyValueStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileStore::new(dir.clone())),
            None => Arc::new(MemoryStore::new()),
        };

        let Some(ws_url) = config.ws_url.clone() else {
            info!("no realtime endpoint configured, running on REST only");
            return Ok(Self::spawn(NullTransport, None, None, rest, config, store));
        };

        let cancel = CancellationToken::new();
        let link = WebSocketLink::connect(ws_url, config.reconnect.clone(), cancel.child_token());
        let events = link.subscribe();
        let transport = link.handle();
        info!(url = %config.api_url, "live client starting");
        Ok(Self::spawn_with_cancel(
            transport,
            Some(events),
            Some(link),
            rest,
            config,
            store,
            cancel,
        ))
    }

    /// Start a client over an existing transport and event source.
    ///
    /// `events = None` means the transport never reports lifecycle
    /// changes; the client then treats realtime updates as unavailable.
    pub fn with_parts<T>(
        transport: T,
        events: Option<broadcast::Receiver<LinkEvent>>,
        rest: RestClient,
        config: &ClientConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        Self::spawn(transport, events, None, rest, config, store)
    }

    fn spawn<T>(
        transport: T,
        events: Option<broadcast::Receiver<LinkEvent>>,
        link: Option<WebSocketLink>,
        rest: RestClient,
        config: &ClientConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        Self::spawn_with_cancel(
            transport,
            events,
            link,
            rest,
            config,
            store,
            CancellationToken::new(),
        )
    }

    fn spawn_with_cancel<T>(
        transport: T,
        events: Option<broadcast::Receiver<LinkEvent>>,
        link: Option<WebSocketLink>,
        rest: RestClient,
        config: &ClientConfig,
        store: Arc<dyn KeyValueStore>,
        cancel: CancellationToken,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let now = Moment::now();
        let mut hub = Hub::new(transport, config, store, now);
        if events.is_none() {
            hub.handle_link_event(
                &LinkEvent::StateChange {
                    previous: LinkState::Connecting,
                    current: LinkState::Unavailable,
                },
                now,
            );
        }
        hub.follow(&config.channels);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (view_tx, view_rx) = watch::channel(Arc::new(hub.view()));
        let (connection_tx, connection_rx) = watch::channel(hub.connection_state());

        let task = HubTask {
            hub,
            events,
            commands: command_rx,
            rest: rest.clone(),
            view: view_tx,
            connection: connection_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        Self {
            inner: Arc::new(LiveClientInner {
                commands: command_tx,
                view: view_rx,
                connection: connection_rx,
                rest,
                cancel,
                task: Mutex::new(Some(handle)),
                link,
            }),
        }
    }

    // ── State observation ────────────────────────────────────────

    /// The latest published snapshot.
    pub fn view(&self) -> Arc<LiveView> {
        Arc::clone(&self.inner.view.borrow())
    }

    /// Subscribe to snapshot updates.
    pub fn views(&self) -> watch::Receiver<Arc<LiveView>> {
        self.inner.view.clone()
    }

    /// Snapshot updates as a `Stream`, starting with the current one.
    pub fn view_stream(&self) -> WatchStream<Arc<LiveView>> {
        WatchStream::new(self.inner.view.clone())
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.clone()
    }

    // ── Command execution ────────────────────────────────────────

    /// Send a command to the hub task and await its result.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .commands
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::ClientClosed)?;
        rx.await.map_err(|_| CoreError::ClientClosed)?
    }

    pub async fn subscribe(
        &self,
        channel: impl Into<String>,
        handlers: HandlerMap<LiveState>,
    ) -> Result<SubscriptionHandle, CoreError> {
        let result = self
            .execute(Command::Subscribe {
                channel: channel.into(),
                handlers,
            })
            .await?;
        expect_handle(result)
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<bool, CoreError> {
        match self.execute(Command::Unsubscribe(handle)).await? {
            CommandResult::Removed(removed) => Ok(removed),
            other => Err(unexpected_result(&other)),
        }
    }

    pub async fn join_presence(&self, channel: impl Into<String>) -> Result<SubscriptionHandle, CoreError> {
        let result = self
            .execute(Command::JoinPresence {
                channel: channel.into(),
            })
            .await?;
        expect_handle(result)
    }

    pub async fn track_ticket(&self, ticket_id: impl Into<EntityId>) -> Result<SubscriptionHandle, CoreError> {
        let result = self.execute(Command::TrackTicket(ticket_id.into())).await?;
        expect_handle(result)
    }

    /// Send a client event. Whispers on `channel` when the link is up,
    /// otherwise posts it to the REST API.
    pub async fn send(
        &self,
        channel: Option<&str>,
        event: impl Into<String>,
        data: Value,
    ) -> Result<Delivery, CoreError> {
        let result = self
            .execute(Command::Send {
                channel: channel.map(str::to_owned),
                event: event.into(),
                data,
            })
            .await?;
        expect_delivery(result)
    }

    pub async fn set_page(&self, page: impl Into<String>, title: Option<String>) -> Result<Delivery, CoreError> {
        let result = self
            .execute(Command::SetPage {
                page: page.into(),
                title,
            })
            .await?;
        expect_delivery(result)
    }

    /// Change the user's own status. The view shows it immediately; it is
    /// reverted if the server cannot be told.
    pub async fn set_status(&self, status: PresenceStatus) -> Result<Settled, CoreError> {
        match self.execute(Command::SetStatus(status)).await? {
            CommandResult::Status(settled) => Ok(settled),
            other => Err(unexpected_result(&other)),
        }
    }

    pub async fn notify(&self, draft: NotificationDraft) -> Result<u64, CoreError> {
        match self.execute(Command::Notify(draft)).await? {
            CommandResult::Notified(id) => Ok(id),
            other => Err(unexpected_result(&other)),
        }
    }

    pub async fn dismiss_notification(&self, id: u64) -> Result<bool, CoreError> {
        match self.execute(Command::DismissNotification(id)).await? {
            CommandResult::Removed(removed) => Ok(removed),
            other => Err(unexpected_result(&other)),
        }
    }

    pub async fn open_chat(&self) -> Result<Vec<Delivery>, CoreError> {
        match self.execute(Command::OpenChat).await? {
            CommandResult::DeliveredAll(deliveries) => Ok(deliveries),
            other => Err(unexpected_result(&other)),
        }
    }

    /// Reopen a session from the chat history.
    pub async fn resume_chat(&self, session_id: impl Into<String>) -> Result<Vec<Delivery>, CoreError> {
        match self.execute(Command::ResumeChat(session_id.into())).await? {
            CommandResult::DeliveredAll(deliveries) => Ok(deliveries),
            other => Err(unexpected_result(&other)),
        }
    }

    pub async fn minimize_chat(&self) -> Result<(), CoreError> {
        self.execute(Command::MinimizeChat).await.map(|_| ())
    }

    pub async fn close_chat(&self) -> Result<(), CoreError> {
        self.execute(Command::CloseChat).await.map(|_| ())
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<Delivery, CoreError> {
        let result = self.execute(Command::SendChat(text.into())).await?;
        expect_delivery(result)
    }

    /// Ask the API how many agents are online and update the chat state.
    pub async fn refresh_agent_status(&self) -> Result<u32, CoreError> {
        match self.execute(Command::RefreshAgentStatus).await? {
            CommandResult::AgentsOnline(n) => Ok(n),
            other => Err(unexpected_result(&other)),
        }
    }

    // ── REST passthrough ─────────────────────────────────────────

    /// Fetch the aggregated state snapshot for `period` (e.g. `"24h"`).
    pub async fn fetch_state(&self, period: &str) -> Result<StateSnapshot, CoreError> {
        Ok(self.inner.rest.fetch_state(period).await?)
    }

    pub async fn agent_status(&self) -> Result<AgentStatus, CoreError> {
        Ok(self.inner.rest.agent_status().await?)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Stop the hub task and the link, and wait for the task to finish.
    /// Every pending timer is cancelled; no state changes afterwards.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(link) = &self.inner.link {
            link.shutdown();
        }
        if let Some(handle) = self.inner.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "hub task ended abnormally");
            }
        }
        debug!("live client shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

fn expect_handle(result: CommandResult) -> Result<SubscriptionHandle, CoreError> {
    match result {
        CommandResult::Subscribed(handle) => Ok(handle),
        other => Err(unexpected_result(&other)),
    }
}

fn expect_delivery(result: CommandResult) -> Result<Delivery, CoreError> {
    match result {
        CommandResult::Delivered(delivery) => Ok(delivery),
        other => Err(unexpected_result(&other)),
    }
}

fn unexpected_result(result: &CommandResult) -> CoreError {
    CoreError::Internal(format!("unexpected command result: {result:?}"))
}

// ── Hub task ─────────────────────────────────────────────────────────

struct HubTask<T> {
    hub: Hub<T>,
    events: Option<broadcast::Receiver<LinkEvent>>,
    commands: mpsc::Receiver<CommandEnvelope>,
    rest: RestClient,
    view: watch::Sender<Arc<LiveView>>,
    connection: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl<T: Transport> HubTask<T> {
    async fn run(mut self) {
        loop {
            let deadline = self.hub.next_deadline();
            let changed = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = next_link_event(&mut self.events) => match result {
                    Ok(event) => self.hub.handle_link_event(&event, Moment::now()),
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "hub lagged behind the link");
                        false
                    }
                    Err(RecvError::Closed) => {
                        debug!("link event stream closed");
                        self.events = None;
                        false
                    }
                },
                envelope = self.commands.recv() => {
                    let Some(envelope) = envelope else { break };
                    let result = self.route_command(envelope.command).await;
                    // Publish before replying so the caller sees its own change.
                    self.publish();
                    let _ = envelope.response_tx.send(result);
                    false
                }
                () = sleep_until(deadline) => self.hub.advance(Moment::now()),
            };

            self.post_fallbacks().await;
            if changed {
                self.publish();
            }
        }

        self.hub.dispose();
        self.publish();
        debug!("hub task stopped");
    }

    fn publish(&self) {
        self.view.send_replace(Arc::new(self.hub.view()));
        let state = self.hub.connection_state();
        self.connection.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Post whatever handlers queued that the link could not carry.
    async fn post_fallbacks(&mut self) {
        for outbound in self.hub.take_fallbacks() {
            if let Err(e) = self.rest.post_event(&outbound.event, &outbound.data).await {
                warn!(event = %outbound.event, error = %e, "fallback send failed");
            }
        }
    }

    async fn deliver(&mut self, route: SendRoute) -> Result<Delivery, CoreError> {
        match route {
            SendRoute::Whispered => Ok(Delivery::Whispered),
            SendRoute::Fallback(outbound) => {
                self.rest.post_event(&outbound.event, &outbound.data).await?;
                Ok(Delivery::Posted)
            }
        }
    }

    async fn route_command(&mut self, command: Command) -> Result<CommandResult, CoreError> {
        let now = Moment::now();
        match command {
            // ── Subscriptions ────────────────────────────────────
            Command::Subscribe { channel, handlers } => {
                Ok(CommandResult::Subscribed(self.hub.subscribe(&channel, handlers)))
            }
            Command::Unsubscribe(handle) => Ok(CommandResult::Removed(self.hub.unsubscribe(&handle))),
            Command::JoinPresence { channel } => {
                Ok(CommandResult::Subscribed(self.hub.join_presence(&channel)))
            }
            Command::TrackTicket(ticket_id) => {
                Ok(CommandResult::Subscribed(self.hub.track_ticket(&ticket_id)))
            }

            // ── Outbound ─────────────────────────────────────────
            Command::Send {
                channel,
                event,
                data,
            } => {
                let route = self.hub.send(channel.as_deref(), &event, data);
                self.deliver(route).await.map(CommandResult::Delivered)
            }
            Command::SetPage { page, title } => match self.hub.set_page(&page, title.as_deref()) {
                Some(route) => self.deliver(route).await.map(CommandResult::Delivered),
                None => Ok(CommandResult::Delivered(Delivery::Local)),
            },
            Command::SetStatus(status) => {
                let (pending, route) = self.hub.begin_own_status(status);
                let confirmed = match route {
                    Some(route) => match self.deliver(route).await {
                        Ok(_) => true,
                        Err(e) => {
                            warn!(%status, error = %e, "status change not delivered");
                            false
                        }
                    },
                    None => true,
                };
                Ok(CommandResult::Status(self.hub.settle_own_status(pending, confirmed)))
            }

            // ── Local state ──────────────────────────────────────
            Command::Notify(draft) => Ok(CommandResult::Notified(self.hub.notify(draft, now))),
            Command::DismissNotification(id) => {
                Ok(CommandResult::Removed(self.hub.dismiss_notification(id, now)))
            }

            // ── Support chat ─────────────────────────────────────
            Command::OpenChat => {
                let mut deliveries = Vec::new();
                for route in self.hub.open_chat(now) {
                    deliveries.push(self.deliver(route).await?);
                }
                Ok(CommandResult::DeliveredAll(deliveries))
            }
            Command::ResumeChat(session_id) => {
                let Some(routes) = self.hub.resume_chat(&session_id, now) else {
                    return Err(CoreError::UnknownChatSession { id: session_id });
                };
                let mut deliveries = Vec::new();
                for route in routes {
                    deliveries.push(self.deliver(route).await?);
                }
                Ok(CommandResult::DeliveredAll(deliveries))
            }
            Command::MinimizeChat => {
                self.hub.minimize_chat();
                Ok(CommandResult::Ok)
            }
            Command::CloseChat => {
                self.hub.close_chat(now);
                Ok(CommandResult::Ok)
            }
            Command::SendChat(text) => match self.hub.send_chat(&text, now) {
                Some(route) => self.deliver(route).await.map(CommandResult::Delivered),
                None => Ok(CommandResult::Delivered(Delivery::Local)),
            },
            Command::RefreshAgentStatus => {
                let status = self.rest.agent_status().await?;
                self.hub.set_agents_online(status.agents_online);
                Ok(CommandResult::AgentsOnline(status.agents_online))
            }
        }
    }
}

async fn next_link_event(
    events: &mut Option<broadcast::Receiver<LinkEvent>>,
) -> Result<LinkEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
