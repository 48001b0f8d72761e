//! The sync coordinator - anchor protocol and serialized mutation context
//!
//! The [`SyncCoordinator`] owns the monotonic anchor, the pending change
//! batch, the active-container rotation and the in-commit guard set. Every
//! mutation of that state funnels through one `tokio::sync::Mutex`, so
//! anchor increments, batch merges and commits can never interleave
//! inconsistently. Remote fetches run outside the lock with bounded
//! parallelism; only their *results* are applied inside it.
//!
//! ## Change flow
//!
//! The flow for changes is divided in two parts: *prepare* and *commit*.
//! A poll tick prepares a provisional diff per active container without
//! touching the store, merges it into the pending batch (advancing the
//! anchor on the empty -> non-empty transition) and signals the host. The
//! host's next `changes_since` call at the previous anchor is the commit:
//! the batch is written through `apply_change_set`, returned, and cleared.
//! Until that moment the durable store still describes what the host last
//! saw, which is what makes crash recovery and anchor expiry sound.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use remdrive_core::config::Config;
use remdrive_core::domain::anchor::Anchor;
use remdrive_core::domain::changes::{ChangeBatch, ChangeSet};
use remdrive_core::domain::entry::{CachedEntry, RemoteEntry};
use remdrive_core::domain::errors::DomainError;
use remdrive_core::domain::identity::{renamed_name, ItemId};
use remdrive_core::domain::path::RemotePath;
use remdrive_core::ports::{IChangeNotifier, IMetadataStore, IRemoteLister};

use crate::fetcher::{is_reserved_name, ContainerFetcher, ContainerRef};
use crate::poll::PollCoordinator;
use crate::SyncError;

/// Consecutive overlapped ticks tolerated before a stale poll cycle is
/// force-cancelled.
const STALE_CYCLE_TICKS: u32 = 3;

/// Bound on rename proposals before falling back to a generated suffix.
const MAX_RENAME_ATTEMPTS: u32 = 99;

/// State owned exclusively by the serialized mutation context
struct CoordinatorState {
    /// Current anchor iteration; advances on the pending batch's
    /// empty -> non-empty transition and never anywhere else
    anchor_iteration: i64,
    /// Accumulated, not-yet-durable changes awaiting the host
    pending: ChangeSet,
    /// Bounded rotation of containers under background polling
    poll: PollCoordinator,
    /// Consecutive ticks that found the previous cycle still running
    overlap_ticks: u32,
    /// The in-flight poll cycle, if any: (sequence, cancellation handle)
    cycle: Option<(u64, CancellationToken)>,
    /// Monotonic cycle sequence, used to tell our cycle from a successor
    cycle_seq: u64,
    /// Full paths with a targeted commit in flight; polling skips any
    /// active container whose subtree touches one of these
    in_commit: HashSet<RemotePath>,
    /// Handle of the recurring poll timer task
    poll_task: Option<JoinHandle<()>>,
}

/// The cloneable slice of the coordinator that poll cycles run on
///
/// Cycle tasks outlive the call that spawned them, so they capture this
/// bundle instead of borrowing the coordinator.
#[derive(Clone)]
struct PollContext {
    fetcher: ContainerFetcher,
    notifier: Arc<dyn IChangeNotifier>,
    state: Arc<Mutex<CoordinatorState>>,
    max_concurrent_fetches: usize,
}

/// Coordinates the metadata store, the remote lister and the sync host
///
/// Owns its collaborators for its whole lifetime; there is no global state.
/// Construct with [`SyncCoordinator::new`] and hand the public methods to
/// the host as its sync API.
pub struct SyncCoordinator {
    store: Arc<dyn IMetadataStore>,
    fetcher: ContainerFetcher,
    notifier: Arc<dyn IChangeNotifier>,
    /// Store generation; anchors from another generation are expired
    anchor_version: String,
    max_concurrent_fetches: usize,
    state: Arc<Mutex<CoordinatorState>>,
}

impl SyncCoordinator {
    /// Creates a coordinator over the given ports
    ///
    /// Reads the anchor bootstrap state from the store: the iteration
    /// resumes from the highest value found (0 on a fresh store), and the
    /// version string is whatever the store's current generation is.
    pub async fn new(
        store: Arc<dyn IMetadataStore>,
        lister: Arc<dyn IRemoteLister>,
        notifier: Arc<dyn IChangeNotifier>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let anchor_iteration = store.highest_anchor_iteration().await?;
        let anchor_version = store.anchor_version().await?;

        info!(
            iteration = anchor_iteration,
            version = %anchor_version,
            "sync coordinator initialized"
        );

        Ok(Self {
            fetcher: ContainerFetcher::new(Arc::clone(&store), lister),
            store,
            notifier,
            anchor_version,
            max_concurrent_fetches: config.sync.max_concurrent_fetches.max(1),
            state: Arc::new(Mutex::new(CoordinatorState {
                anchor_iteration,
                pending: ChangeSet::new(),
                poll: PollCoordinator::new(),
                overlap_ticks: 0,
                cycle: None,
                cycle_seq: 0,
                in_commit: HashSet::new(),
                poll_task: None,
            })),
        })
    }

    fn anchor_at(&self, iteration: i64) -> Anchor {
        Anchor::new(self.anchor_version.clone(), iteration)
    }

    fn poll_context(&self) -> PollContext {
        PollContext {
            fetcher: self.fetcher.clone(),
            notifier: Arc::clone(&self.notifier),
            state: Arc::clone(&self.state),
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }

    /// The coordinator's current anchor; never touches the network
    pub async fn current_anchor(&self) -> Anchor {
        let state = self.state.lock().await;
        self.anchor_at(state.anchor_iteration)
    }

    // ========================================================================
    // Anchor protocol
    // ========================================================================

    /// Returns the changes accumulated since `anchor` and commits them
    ///
    /// - Same anchor: empty result, unchanged anchor. Idempotent.
    /// - One iteration behind: the pending batch is committed to the store,
    ///   returned (deletions as identities, cascades included), and
    ///   cleared.
    /// - Anything else, including a version mismatch:
    ///   [`SyncError::AnchorExpired`] - the host must discard its state and
    ///   re-enumerate from the root.
    pub async fn changes_since(&self, anchor: &Anchor) -> Result<ChangeBatch, SyncError> {
        let mut state = self.state.lock().await;
        let current = self.anchor_at(state.anchor_iteration);

        if anchor.version != self.anchor_version {
            warn!(requested = %anchor, current = %current, "anchor from another store generation");
            return Err(SyncError::AnchorExpired {
                requested: anchor.clone(),
                current,
            });
        }

        if anchor.iteration == current.iteration {
            debug!(anchor = %current, "changes_since at current anchor, nothing to report");
            return Ok(ChangeBatch::empty(current));
        }

        if anchor.iteration + 1 != current.iteration {
            warn!(requested = %anchor, current = %current, "anchor expired");
            return Err(SyncError::AnchorExpired {
                requested: anchor.clone(),
                current,
            });
        }

        // Commit step: stamp the batch at the current iteration and make it
        // durable. On failure the batch is restored untouched - the anchor
        // does not move and the host can simply retry.
        let pending = std::mem::take(&mut state.pending);
        let creates: Vec<CachedEntry> = pending
            .creates
            .iter()
            .map(|e| e.at_anchor(current.iteration))
            .collect();
        let updates: Vec<CachedEntry> = pending
            .updates
            .iter()
            .map(|e| e.at_anchor(current.iteration))
            .collect();

        let deleted = match self
            .store
            .apply_change_set(&creates, &updates, &pending.deletions)
            .await
        {
            Ok(deleted) => deleted,
            Err(error) => {
                state.pending = pending;
                return Err(SyncError::Store(error));
            }
        };

        let mut seen = HashSet::new();
        let deletions: Vec<ItemId> = deleted
            .into_iter()
            .filter(|entry| seen.insert(entry.id.clone()))
            .map(|entry| entry.id)
            .collect();

        info!(
            creates = creates.len(),
            updates = updates.len(),
            deletions = deletions.len(),
            anchor = %current,
            "committed change batch"
        );

        Ok(ChangeBatch {
            creates,
            updates,
            deletions,
            anchor: current,
        })
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Enumerates a container against the live remote
    ///
    /// Fetches the fresh listing, resolves identities, replaces the
    /// container's cached rows and returns the live entry set. Rows that
    /// disappeared are folded into the pending batch as deletions so the
    /// host learns about them through the change feed.
    pub async fn enumerate(&self, container_id: &ItemId) -> Result<Vec<CachedEntry>, SyncError> {
        let container = self.resolve_container(container_id).await?;
        let iteration = self.state.lock().await.anchor_iteration;

        let (_, fresh) = self
            .fetcher
            .fetch_resolved(&container, iteration)
            .await
            .map_err(SyncError::Fetch)?;

        let deleted = self
            .store
            .replace_container(&container.id, &container.path, &fresh)
            .await
            .map_err(SyncError::Store)?;

        info!(
            container = %container.path,
            live = fresh.len(),
            deleted = deleted.len(),
            "enumerated container"
        );

        self.enqueue_deletions(deleted).await;
        Ok(fresh)
    }

    // ========================================================================
    // Targeted commits
    // ========================================================================

    /// Commits a single observed entry into the working set
    ///
    /// Used after a direct remote operation (create, upload, attribute
    /// change) completes: the resulting stat is written through the store's
    /// upsert path under the current anchor iteration. Rows evicted by a
    /// name collision are folded into the pending batch as deletions.
    pub async fn commit_entry(
        &self,
        container_id: &ItemId,
        observed: &RemoteEntry,
    ) -> Result<CachedEntry, SyncError> {
        if is_reserved_name(&observed.name) {
            return Err(SyncError::Domain(DomainError::InvalidPath(format!(
                "reserved name: {}",
                observed.name
            ))));
        }

        let container = self.resolve_container(container_id).await?;
        // Validates the name as a single path component.
        let path = container.path.join(&observed.name)?;

        let id = match self
            .store
            .item_by_name(&observed.name, &container.id)
            .await
            .map_err(SyncError::Store)?
        {
            Some(row) => row.id,
            None => ItemId::generate(observed.kind.is_symlink()),
        };

        let iteration = {
            let mut state = self.state.lock().await;
            state.in_commit.insert(path.clone());
            state.anchor_iteration
        };

        let entry = CachedEntry {
            id,
            name: observed.name.clone(),
            container_id: container.id.clone(),
            container_path: container.path.clone(),
            version: observed.version(),
            is_container: observed.is_container(),
            anchor: iteration,
        };

        let result = self.store.upsert(&entry).await;
        self.state.lock().await.in_commit.remove(&path);

        let deleted = result.map_err(SyncError::Store)?;
        debug!(path = %path, evicted = deleted.len(), "committed item");
        self.enqueue_deletions(deleted).await;
        Ok(entry)
    }

    /// Commits a rename/move of a tracked item
    ///
    /// When the destination `(name, container)` is held by a *different*
    /// live item - a concurrent move landed first - the deterministic
    /// rename policy proposes `name 2`, `name 3`, ... until a free slot is
    /// found, rather than overwriting. The moved row keeps its identity and
    /// version; if it is a container, the store rewrites every descendant's
    /// path prefix in the same transaction.
    pub async fn commit_move(
        &self,
        id: &ItemId,
        new_name: &str,
        new_container_id: &ItemId,
    ) -> Result<CachedEntry, SyncError> {
        let item = self
            .store
            .item(id)
            .await
            .map_err(SyncError::Store)?
            .ok_or_else(|| SyncError::UnknownItem(id.clone()))?;

        let dest = self.resolve_container(new_container_id).await?;

        let mut name = new_name.to_string();
        if is_reserved_name(&name) {
            return Err(SyncError::Domain(DomainError::InvalidPath(format!(
                "reserved name: {name}"
            ))));
        }
        dest.path.join(&name)?;

        let mut attempts = 0;
        loop {
            match self
                .store
                .item_by_name(&name, &dest.id)
                .await
                .map_err(SyncError::Store)?
            {
                Some(occupant) if occupant.id != *id => {
                    attempts += 1;
                    if attempts > MAX_RENAME_ATTEMPTS {
                        // A pathological store full of numbered names;
                        // fall back to a generated suffix that cannot
                        // collide.
                        name = format!("{} {}", new_name, ItemId::generate(false));
                        break;
                    }
                    name = renamed_name(&name);
                }
                _ => break,
            }
        }

        let old_path = item.full_path();
        let new_path = dest.path.join(&name)?;

        let iteration = {
            let mut state = self.state.lock().await;
            state.in_commit.insert(old_path.clone());
            state.in_commit.insert(new_path.clone());
            state.anchor_iteration
        };

        let entry = CachedEntry {
            id: id.clone(),
            name,
            container_id: dest.id.clone(),
            container_path: dest.path.clone(),
            version: item.version.clone(),
            is_container: item.is_container,
            anchor: iteration,
        };

        let result = self.store.upsert(&entry).await;
        {
            let mut state = self.state.lock().await;
            state.in_commit.remove(&old_path);
            state.in_commit.remove(&new_path);
        }

        let deleted = result.map_err(SyncError::Store)?;
        info!(from = %old_path, to = %entry.full_path(), "moved item");
        self.enqueue_deletions(deleted).await;
        Ok(entry)
    }

    /// Folds synchronously detected deletions into the pending batch
    ///
    /// Advances the anchor iteration if the batch was previously empty, and
    /// signals the host. Empty input is a no-op.
    pub async fn enqueue_deletions(&self, rows: Vec<CachedEntry>) {
        if rows.is_empty() {
            return;
        }

        {
            let mut state = self.state.lock().await;
            if state.pending.is_empty() {
                state.anchor_iteration += 1;
            }
            debug!(
                count = rows.len(),
                iteration = state.anchor_iteration,
                "scheduling deletions"
            );
            state.pending.prepend_deletions(rows);
        }

        self.signal_changes().await;
    }

    // ========================================================================
    // Active-container registration
    // ========================================================================

    /// Registers a container for background polling
    ///
    /// Only containers whose contents are already tracked in the store are
    /// accepted; for anything else this returns `Ok(false)` and the caller
    /// retries after a first full enumeration. Registration is idempotent.
    pub async fn register_active(&self, container_id: &ItemId) -> Result<bool, SyncError> {
        let container = if container_id.is_root() {
            ContainerRef::root()
        } else {
            match self.store.item(container_id).await.map_err(SyncError::Store)? {
                Some(row) if row.is_container => ContainerRef {
                    id: container_id.clone(),
                    path: row.full_path(),
                },
                _ => return Ok(false),
            }
        };

        if !self
            .store
            .has_contents(&container.id)
            .await
            .map_err(SyncError::Store)?
        {
            debug!(container = %container.path, "not part of the working set yet");
            return Ok(false);
        }

        let mut state = self.state.lock().await;
        state.poll.register(container);
        Ok(true)
    }

    /// Removes a container from the polling rotation; safe for unknown ids
    pub async fn unregister(&self, container_id: &ItemId) {
        let mut state = self.state.lock().await;
        state.poll.unregister(container_id);
    }

    /// Number of containers currently under background polling
    pub async fn active_containers(&self) -> usize {
        self.state.lock().await.poll.len()
    }

    // ========================================================================
    // Background polling
    // ========================================================================

    /// Starts (or restarts) the recurring poll timer
    ///
    /// The first tick fires immediately, then every `interval`. Each tick
    /// runs [`poll_tick`](SyncCoordinator::poll_tick).
    pub async fn schedule_poll(&self, interval: Duration) {
        let context = self.poll_context();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                context.tick().await;
            }
        });

        let mut state = self.state.lock().await;
        if let Some(previous) = state.poll_task.replace(handle) {
            previous.abort();
        }
    }

    /// Runs one poll tick
    ///
    /// If the previous cycle is still outstanding the tick backs off,
    /// force-cancelling the stale cycle after three consecutive overlaps.
    /// Otherwise the current active set is snapshotted and a cycle is
    /// spawned: bounded-parallel fetches, provisional diffs, one serialized
    /// merge.
    pub async fn poll_tick(&self) {
        self.poll_context().tick().await;
    }

    /// Stops the poll timer and cancels any in-flight cycle
    ///
    /// Increment and merge happen inside one serialized step, so shutdown
    /// can never leave an anchor increment without its batch.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.poll_task.take() {
            task.abort();
        }
        if let Some((_, token)) = state.cycle.take() {
            token.cancel();
        }
        info!("sync coordinator stopped");
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn resolve_container(&self, container_id: &ItemId) -> Result<ContainerRef, SyncError> {
        if container_id.is_root() {
            return Ok(ContainerRef::root());
        }

        match self.store.item(container_id).await.map_err(SyncError::Store)? {
            Some(row) if row.is_container => Ok(ContainerRef {
                id: container_id.clone(),
                path: row.full_path(),
            }),
            _ => Err(SyncError::NoSuchContainer(container_id.clone())),
        }
    }

    async fn signal_changes(&self) {
        if let Err(error) = self.notifier.changes_available().await {
            warn!(error = %error, "change signal failed");
        }
    }
}

impl PollContext {
    /// One poll tick: overlap control, snapshot, cycle spawn
    async fn tick(&self) {
        let (containers, token, seq, iteration) = {
            let mut state = self.state.lock().await;

            if state.cycle.is_some() {
                state.overlap_ticks += 1;
                if state.overlap_ticks >= STALE_CYCLE_TICKS {
                    warn!(
                        overlaps = state.overlap_ticks,
                        "poll cycle still outstanding, cancelling it"
                    );
                    if let Some((_, stale)) = state.cycle.take() {
                        stale.cancel();
                    }
                    state.overlap_ticks = 0;
                } else {
                    debug!(
                        overlaps = state.overlap_ticks,
                        "poll cycle outstanding, backing off"
                    );
                }
                return;
            }

            let in_commit = state.in_commit.clone();
            let containers: Vec<ContainerRef> = state
                .poll
                .snapshot()
                .into_iter()
                .filter(|container| {
                    let busy = in_commit
                        .iter()
                        .any(|path| container.path.contains(path) || container.path == *path);
                    if busy {
                        debug!(container = %container.path, "commit in flight, skipping this tick");
                    }
                    !busy
                })
                .collect();

            if containers.is_empty() {
                return;
            }

            state.cycle_seq += 1;
            let seq = state.cycle_seq;
            let token = CancellationToken::new();
            state.cycle = Some((seq, token.clone()));
            (containers, token, seq, state.anchor_iteration)
        };

        debug!(containers = containers.len(), seq, "starting poll cycle");
        let context = self.clone();
        tokio::spawn(async move {
            context.run_cycle(containers, token, seq, iteration).await;
        });
    }

    /// Fetches and diffs the given containers, then merges the results
    async fn run_cycle(
        &self,
        containers: Vec<ContainerRef>,
        token: CancellationToken,
        seq: u64,
        iteration: i64,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let mut tasks = JoinSet::new();

        for container in containers {
            let fetcher = self.fetcher.clone();
            let semaphore = Arc::clone(&semaphore);
            let token = token.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return None,
                };

                let diff = tokio::select! {
                    _ = token.cancelled() => return None,
                    result = fetcher.fetch_diff(&container, iteration) => result,
                };

                match diff {
                    Ok(changes) => Some((container, changes)),
                    Err(error) => {
                        // Isolated: this container is skipped, the others
                        // still merge; the next tick retries.
                        warn!(container = %container.path, error = %error, "poll fetch failed");
                        None
                    }
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(error) => warn!(error = %error, "poll fetch task failed"),
            }
        }

        let detected = {
            let mut state = self.state.lock().await;

            let ours = matches!(&state.cycle, Some((s, _)) if *s == seq);
            if !ours || token.is_cancelled() {
                debug!(seq, "poll cycle cancelled, discarding results");
                if ours {
                    state.cycle = None;
                }
                return;
            }
            state.cycle = None;
            state.overlap_ticks = 0;

            let mut merged = ChangeSet::new();
            for (container, changes) in results {
                if !state.poll.contains(&container.id) {
                    debug!(container = %container.path, "unregistered mid-flight, discarding");
                    continue;
                }
                merged.merge(changes);
            }

            if merged.is_empty() {
                debug!(seq, "poll cycle found no changes");
                false
            } else {
                let was_empty = state.pending.is_empty();
                state.pending.merge(merged);
                if was_empty {
                    state.anchor_iteration += 1;
                }
                info!(
                    iteration = state.anchor_iteration,
                    pending = state.pending.len(),
                    "poll cycle detected changes"
                );
                true
            }
        };

        if detected {
            if let Err(error) = self.notifier.changes_available().await {
                warn!(error = %error, "change signal failed");
            }
        }
    }
}
