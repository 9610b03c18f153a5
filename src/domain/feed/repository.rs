use super::contracts::{CacheReader, LikeAction, RefreshPolicy, RemoteFetcher};
use super::error::{Communication, FeedRepositoryError};
use super::event::Event;
use super::model::{
    ActivationState, FeedItem, FeedKey, FeedState, LikeOutcome, RefreshMode, RefreshOutcome,
    StateOrigin,
};
use super::notifier::{ListenerId, OutcomeBus};
use super::pending::PendingRequests;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinSet;

const DEFAULT_MAILBOX_CAPACITY: usize = 64;
const COMMUNICATION_BUFFER: usize = 32;

/// Collaborators shared by every repository built from the same factory.
///
/// `fetcher` should be the same `FetchCoordinator` the background refresher
/// uses, so fetches of one feed never overlap.
#[derive(Clone)]
pub struct FeedRepositoryDeps {
    pub cache: Arc<dyn CacheReader>,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub policy: Arc<dyn RefreshPolicy>,
    pub like_action: Arc<dyn LikeAction>,
    pub outcomes: Arc<OutcomeBus>,
    pub mailbox_capacity: usize,
}

impl FeedRepositoryDeps {
    pub fn new(
        cache: Arc<dyn CacheReader>,
        fetcher: Arc<dyn RemoteFetcher>,
        policy: Arc<dyn RefreshPolicy>,
        like_action: Arc<dyn LikeAction>,
        outcomes: Arc<OutcomeBus>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            policy,
            like_action,
            outcomes,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }
}

/// Builds repositories that share one set of collaborators.
#[derive(Clone)]
pub struct FeedRepositoryFactory {
    deps: FeedRepositoryDeps,
}

impl FeedRepositoryFactory {
    pub fn new(deps: FeedRepositoryDeps) -> Self {
        Self { deps }
    }

    /// Creates a repository for `key`, or for the discover feed when `None`.
    pub fn create(&self, key: Option<FeedKey>) -> FeedRepository {
        FeedRepository::new(key.unwrap_or(FeedKey::Discover), self.deps.clone())
    }
}

/// Signals that never wait on the mailbox, so they can be sent from `Drop`.
#[derive(Debug)]
enum Lifecycle {
    Start,
    Stop,
    Attach,
    Detach,
}

enum Command {
    Refresh(oneshot::Sender<RefreshOutcome>),
    Like {
        item: FeedItem,
        wants_like: bool,
        actor_id: i64,
        reply: oneshot::Sender<LikeOutcome>,
    },
    Flush(oneshot::Sender<()>),
}

/// Results of background work, funneled back to the owning actor.
enum Internal {
    CacheLoaded {
        ticket: u64,
        state: FeedState,
        completion: Option<Completion>,
    },
    Fetched {
        outcome: RefreshOutcome,
        mode: RefreshMode,
    },
    Liked {
        outcome: LikeOutcome,
        reply: oneshot::Sender<LikeOutcome>,
    },
    LoadFinished,
}

/// Reply owed to a caller once the state it caused has been published.
enum Completion {
    Refresh(RefreshOutcome),
    Like(oneshot::Sender<LikeOutcome>, LikeOutcome),
}

/// Handle to the single authoritative in-memory view of one feed.
///
/// All state lives in a dedicated task; handles are cheap to clone and only
/// ever see immutable snapshots.
#[derive(Clone)]
pub struct FeedRepository {
    key: FeedKey,
    lifecycle: mpsc::UnboundedSender<Lifecycle>,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<Arc<FeedState>>,
    activation: watch::Receiver<ActivationState>,
    communications: broadcast::Sender<Arc<Event<Communication>>>,
}

impl FeedRepository {
    /// Spawns the repository task. Must be called inside a tokio runtime.
    pub fn new(key: FeedKey, deps: FeedRepositoryDeps) -> Self {
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(deps.mailbox_capacity.max(1));
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Arc::new(FeedState::empty(key.clone())));
        let (activation_tx, activation_rx) = watch::channel(ActivationState::Inactive);
        let (communications, _) = broadcast::channel(COMMUNICATION_BUFFER);

        let actor = FeedActor {
            key: key.clone(),
            deps,
            state_tx,
            activation_tx,
            communications: communications.clone(),
            internal_tx,
            tasks: JoinSet::new(),
            listener_id: None,
            outcome_rx: None,
            started: false,
            observers: 0,
            load_in_flight: false,
            load_queued: false,
            needs_reload: false,
            forced_refresh: PendingRequests::new(),
            next_ticket: 0,
            published_ticket: 0,
        };
        tokio::spawn(actor.run(lifecycle_rx, commands_rx, internal_rx));

        Self {
            key,
            lifecycle: lifecycle_tx,
            commands: commands_tx,
            state: state_rx,
            activation: activation_rx,
            communications,
        }
    }

    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    /// Registers for outcome notifications of this feed. Idempotent.
    pub fn start(&self) {
        let _ = self.lifecycle.send(Lifecycle::Start);
    }

    /// Cancels all in-flight work and shuts the repository down. Idempotent.
    pub fn stop(&self) {
        let _ = self.lifecycle.send(Lifecycle::Stop);
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    /// Resolves once the repository task has exited.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }

    /// Attaches an observer. The first attached observer activates the feed
    /// and triggers a load; dropping the observer detaches it.
    pub fn observe(&self) -> FeedObserver {
        let _ = self.lifecycle.send(Lifecycle::Attach);
        FeedObserver {
            state: self.state.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }

    pub fn snapshot(&self) -> Arc<FeedState> {
        self.state.borrow().clone()
    }

    pub fn activation(&self) -> ActivationState {
        *self.activation.borrow()
    }

    pub fn subscribe_communications(&self) -> broadcast::Receiver<Arc<Event<Communication>>> {
        self.communications.subscribe()
    }

    /// Fetches regardless of the refresh policy. Calls made while a forced
    /// refresh is in flight join it and receive the same outcome.
    pub async fn refresh_posts(&self) -> Result<RefreshOutcome, FeedRepositoryError> {
        self.request(Command::Refresh).await
    }

    pub async fn perform_like_action(
        &self,
        item: FeedItem,
        wants_like: bool,
        actor_id: i64,
    ) -> Result<LikeOutcome, FeedRepositoryError> {
        self.request(|reply| Command::Like {
            item,
            wants_like,
            actor_id,
            reply,
        })
        .await
    }

    /// Waits until every message queued before this call has been handled.
    pub async fn flush(&self) -> Result<(), FeedRepositoryError> {
        self.request(Command::Flush).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, FeedRepositoryError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| self.stopped_error())?;
        response.await.map_err(|_| self.stopped_error())
    }

    fn stopped_error(&self) -> FeedRepositoryError {
        FeedRepositoryError::Stopped(self.key.to_string())
    }
}

/// An attached observer of one feed's state.
pub struct FeedObserver {
    state: watch::Receiver<Arc<FeedState>>,
    lifecycle: mpsc::UnboundedSender<Lifecycle>,
}

impl FeedObserver {
    pub fn current(&self) -> Arc<FeedState> {
        self.state.borrow().clone()
    }

    pub fn has_changed(&self) -> bool {
        self.state.has_changed().unwrap_or(false)
    }

    /// Next published state, or `None` once the repository is gone.
    pub async fn changed(&mut self) -> Option<Arc<FeedState>> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Waits for a state matching `predicate`, checking the current one first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&FeedState) -> bool,
    ) -> Option<Arc<FeedState>> {
        loop {
            let current = self.state.borrow_and_update().clone();
            if predicate(current.as_ref()) {
                return Some(current);
            }
            self.state.changed().await.ok()?;
        }
    }

    /// Turns this observer into a partial-state source: `None` until the feed
    /// has published something, then the latest items.
    pub fn into_partial_state(mut self) -> watch::Receiver<Option<Vec<FeedItem>>> {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            loop {
                let current = self.state.borrow_and_update().clone();
                if current.origin != StateOrigin::Empty {
                    tx.send_replace(Some(current.items().to_vec()));
                }
                tokio::select! {
                    _ = tx.closed() => break,
                    changed = self.state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }
}

impl Drop for FeedObserver {
    fn drop(&mut self) {
        let _ = self.lifecycle.send(Lifecycle::Detach);
    }
}

/// Sends one final message to the actor when dropped, whether the task
/// finished, panicked or was aborted.
struct ReportOnDrop {
    internal: mpsc::UnboundedSender<Internal>,
    message: Option<Internal>,
}

impl ReportOnDrop {
    fn new(internal: mpsc::UnboundedSender<Internal>, message: Internal) -> Self {
        Self {
            internal,
            message: Some(message),
        }
    }

    fn replace(&mut self, message: Internal) {
        self.message = Some(message);
    }
}

impl Drop for ReportOnDrop {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            let _ = self.internal.send(message);
        }
    }
}

struct FeedActor {
    key: FeedKey,
    deps: FeedRepositoryDeps,
    state_tx: watch::Sender<Arc<FeedState>>,
    activation_tx: watch::Sender<ActivationState>,
    communications: broadcast::Sender<Arc<Event<Communication>>>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    tasks: JoinSet<()>,
    listener_id: Option<ListenerId>,
    outcome_rx: Option<mpsc::UnboundedReceiver<RefreshOutcome>>,
    started: bool,
    observers: usize,
    load_in_flight: bool,
    // Activation seen while a load was running; coalesced into one follow-up load.
    load_queued: bool,
    // Set when an outcome arrived while inactive; the next load must read the cache.
    needs_reload: bool,
    forced_refresh: PendingRequests<RefreshMode, RefreshOutcome>,
    next_ticket: u64,
    published_ticket: u64,
}

async fn next_outcome(rx: &mut Option<mpsc::UnboundedReceiver<RefreshOutcome>>) -> Option<RefreshOutcome> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl FeedActor {
    async fn run(
        mut self,
        mut lifecycle: mpsc::UnboundedReceiver<Lifecycle>,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        tracing::debug!(feed = %self.key, "Feed repository task started");
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;

                signal = lifecycle.recv() => match signal {
                    Some(Lifecycle::Stop) | None => break,
                    Some(signal) => self.on_lifecycle(signal),
                },
                Some(message) = internal.recv() => self.on_internal(message),
                Some(outcome) = next_outcome(&mut self.outcome_rx) => {
                    tracing::debug!(feed = %self.key, outcome = ?outcome, "Outcome notification received");
                    self.on_outcome(outcome, None);
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => commands_open = false,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(feed = %self.key, error = %e, "Feed background task panicked");
                        }
                    }
                }
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.tasks.abort_all();
        self.forced_refresh.cancel_all();
        if let Some(id) = self.listener_id.take() {
            self.deps.outcomes.unregister(&self.key, id);
        }
        self.outcome_rx = None;
        self.activation_tx.send_replace(ActivationState::Inactive);
        tracing::info!(feed = %self.key, "Feed repository stopped");
    }

    fn on_lifecycle(&mut self, signal: Lifecycle) {
        match signal {
            Lifecycle::Start => {
                if self.started {
                    return;
                }
                let (id, rx) = self.deps.outcomes.register(&self.key);
                self.listener_id = Some(id);
                self.outcome_rx = Some(rx);
                self.started = true;
                tracing::info!(feed = %self.key, "Feed repository started");
            }
            Lifecycle::Attach => {
                self.observers += 1;
                if self.observers == 1 {
                    self.activation_tx.send_replace(ActivationState::Active);
                    tracing::debug!(feed = %self.key, "Feed activated");
                    self.load_posts();
                }
            }
            Lifecycle::Detach => {
                self.observers = self.observers.saturating_sub(1);
                if self.observers == 0 {
                    self.activation_tx.send_replace(ActivationState::Inactive);
                    tracing::debug!(feed = %self.key, "Feed deactivated");
                }
            }
            Lifecycle::Stop => {}
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Refresh(reply) => {
                if !self.forced_refresh.register(RefreshMode::ForcedUserRefresh, reply) {
                    tracing::debug!(feed = %self.key, "Joining in-flight forced refresh");
                    return;
                }
                self.spawn_forced_refresh();
            }
            Command::Like {
                item,
                wants_like,
                actor_id,
                reply,
            } => {
                let like_action = self.deps.like_action.clone();
                let internal = self.internal_tx.clone();
                self.tasks.spawn(async move {
                    let outcome = like_action.perform(&item, wants_like, actor_id).await;
                    let _ = internal.send(Internal::Liked { outcome, reply });
                });
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn on_internal(&mut self, message: Internal) {
        match message {
            Internal::CacheLoaded {
                ticket,
                state,
                completion,
            } => {
                self.publish(ticket, state);
                if let Some(completion) = completion {
                    self.complete(completion);
                }
            }
            Internal::Fetched { outcome, mode } => {
                let completion = match mode {
                    RefreshMode::ForcedUserRefresh => Some(Completion::Refresh(outcome.clone())),
                    RefreshMode::Background => None,
                };
                self.on_outcome(outcome, completion);
            }
            Internal::Liked { outcome, reply } => match &outcome {
                LikeOutcome::Success => {
                    self.reload(StateOrigin::Cache, Some(Completion::Like(reply, outcome)));
                }
                LikeOutcome::Failure(reason) => {
                    self.emit(Communication::LikeActionFailure(reason.clone()));
                    self.reload(StateOrigin::Cache, Some(Completion::Like(reply, outcome)));
                }
                LikeOutcome::Unchanged => {
                    let _ = reply.send(outcome);
                }
            },
            Internal::LoadFinished => {
                self.load_in_flight = false;
                if std::mem::take(&mut self.load_queued) && self.is_active() {
                    self.load_posts();
                }
            }
        }
    }

    fn on_outcome(&mut self, outcome: RefreshOutcome, completion: Option<Completion>) {
        match &outcome {
            RefreshOutcome::NewItems(_) | RefreshOutcome::ChangedItems(_) => {
                self.reload(StateOrigin::Remote, completion);
            }
            RefreshOutcome::Unchanged => {
                if let Some(completion) = completion {
                    self.complete(completion);
                }
            }
            RefreshOutcome::Failed(reason) => {
                self.emit(Communication::RemoteRequestFailure(reason.clone()));
                if let Some(completion) = completion {
                    self.complete(completion);
                }
            }
        }
    }

    fn is_active(&self) -> bool {
        self.observers > 0
    }

    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Publishes the cache unless the state is already populated, then asks
    /// the policy whether a background fetch should follow. A feed deactivated
    /// before that point does not fetch.
    fn load_posts(&mut self) {
        if self.load_in_flight {
            tracing::debug!(feed = %self.key, "Load already in flight, queueing");
            self.load_queued = true;
            return;
        }
        self.load_in_flight = true;

        let has_items = !self.state_tx.borrow().is_empty();
        let read_ticket = if has_items && !self.needs_reload {
            None
        } else {
            Some(self.take_ticket())
        };

        let key = self.key.clone();
        let cache = self.deps.cache.clone();
        let policy = self.deps.policy.clone();
        let fetcher = self.deps.fetcher.clone();
        let internal = self.internal_tx.clone();
        let activation = self.activation_tx.subscribe();

        self.spawn(async move {
            let _finished = ReportOnDrop::new(internal.clone(), Internal::LoadFinished);

            if let Some(ticket) = read_ticket {
                let state = cache.read(&key).await;
                let _ = internal.send(Internal::CacheLoaded {
                    ticket,
                    state,
                    completion: None,
                });
            }

            if *activation.borrow() != ActivationState::Active {
                tracing::debug!(feed = %key, "Deactivated during load, skipping policy fetch");
                return;
            }
            if policy.should_refresh(&key).await {
                tracing::debug!(feed = %key, "Refresh policy requested a background fetch");
                let outcome = fetcher.fetch(&key, RefreshMode::Background).await;
                let _ = internal.send(Internal::Fetched {
                    outcome,
                    mode: RefreshMode::Background,
                });
            }
        });
    }

    fn spawn_forced_refresh(&mut self) {
        let key = self.key.clone();
        let fetcher = self.deps.fetcher.clone();
        let internal = self.internal_tx.clone();

        self.spawn(async move {
            let mut report = ReportOnDrop::new(
                internal,
                Internal::Fetched {
                    outcome: RefreshOutcome::Failed("refresh interrupted".to_string()),
                    mode: RefreshMode::ForcedUserRefresh,
                },
            );
            let outcome = fetcher.fetch(&key, RefreshMode::ForcedUserRefresh).await;
            report.replace(Internal::Fetched {
                outcome,
                mode: RefreshMode::ForcedUserRefresh,
            });
        });
    }

    fn reload(&mut self, origin: StateOrigin, completion: Option<Completion>) {
        if !self.is_active() {
            tracing::debug!(feed = %self.key, "Inactive, deferring reload to next activation");
            self.needs_reload = true;
            if let Some(completion) = completion {
                self.complete(completion);
            }
            return;
        }

        let ticket = self.take_ticket();
        let key = self.key.clone();
        let cache = self.deps.cache.clone();
        let internal = self.internal_tx.clone();

        self.spawn(async move {
            let state = cache.read(&key).await.with_origin(origin);
            let _ = internal.send(Internal::CacheLoaded {
                ticket,
                state,
                completion,
            });
        });
    }

    fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks.spawn(task);
    }

    fn publish(&mut self, ticket: u64, state: FeedState) {
        if ticket <= self.published_ticket {
            tracing::debug!(feed = %self.key, ticket, "Discarding superseded cache read");
            return;
        }
        self.published_ticket = ticket;
        self.needs_reload = false;

        tracing::debug!(
            feed = %self.key,
            items = state.len(),
            origin = ?state.origin,
            "Publishing feed state"
        );
        self.state_tx.send_replace(Arc::new(state));
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Refresh(outcome) => {
                self.forced_refresh
                    .complete(&RefreshMode::ForcedUserRefresh, outcome);
            }
            Completion::Like(reply, outcome) => {
                let _ = reply.send(outcome);
            }
        }
    }

    fn emit(&self, communication: Communication) {
        tracing::warn!(feed = %self.key, error = %communication, "Feed operation failed");
        let _ = self.communications.send(Arc::new(Event::new(communication)));
    }
}
