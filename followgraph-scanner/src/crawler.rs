use crate::client::{InstagramClient, Page};
use crate::depth::DepthLimiter;
use crate::error::{CrawlError, Result};
use crate::event::{Added, CrawlEvent, Progress};
use crate::graph::{User, UserGraph};
use crate::images::{HttpImageSource, ImageDownloads, ImageSource};
use crate::limits::Limits;
use crate::rate::{self, RateLimiter, RatePhase};
use crate::task::{Direction, Task, TaskQueue};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_EVENT_BUFFER: usize = 64;

/// Breadth-first follower graph crawler.
pub struct Crawler {
    client: InstagramClient,
    limits: Limits,
    image_source: Option<Arc<dyn ImageSource>>,
    event_buffer: usize,
}

impl Crawler {
    pub fn new(client: InstagramClient) -> Self {
        let image_source: Arc<dyn ImageSource> = Arc::new(HttpImageSource::new(client.http().clone()));
        Self {
            client,
            limits: Limits::default(),
            image_source: Some(image_source),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_image_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.image_source = Some(source);
        self
    }

    pub fn without_images(mut self) -> Self {
        self.image_source = None;
        self
    }

    /// Events buffered before the crawl waits for the consumer.
    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size.max(1);
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn client(&self) -> &InstagramClient {
        &self.client
    }

    pub async fn fetch_user(&self, username: &str) -> Result<User> {
        self.client.fetch_user(username).await
    }

    /// Start crawling outward from `root`. Must be called inside a tokio
    /// runtime; the crawl runs on its own task.
    pub fn crawl(&self, root: User) -> Crawl {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let cancel = CancellationToken::new();
        let workers = self.limits.worker_count();

        let context = Arc::new(CrawlContext {
            client: self.client.clone(),
            limits: self.limits.clone(),
            depth: DepthLimiter::new(&self.limits.depth),
            rate: RateLimiter::new(&self.limits.rate, workers),
            workers,
            state: Mutex::new(CrawlState::new(ImageDownloads::new(
                self.image_source.clone(),
                self.limits.rate.delay.images,
            ))),
            events: tx,
            cancel: cancel.clone(),
            failed: AtomicBool::new(false),
        });

        let handle = tokio::spawn(run(context, root));

        Crawl {
            events: rx,
            cancel,
            handle,
        }
    }
}

/// A running crawl: its event stream, a way to stop it, and its result.
pub struct Crawl {
    events: mpsc::Receiver<Result<CrawlEvent>>,
    cancel: CancellationToken,
    handle: JoinHandle<CrawlOutcome>,
}

impl Crawl {
    /// Next event, or `None` once the crawl has ended. A page fetch that
    /// fails on the network arrives as an `Err` item and the crawl goes on;
    /// a fatal error is delivered as the last item.
    pub async fn next_event(&mut self) -> Option<Result<CrawlEvent>> {
        self.events.recv().await
    }

    /// Ask the crawl to stop. Fetches already in flight complete; no new
    /// ones are issued.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drain remaining events and wait for the crawl to end.
    pub async fn finish(mut self) -> Result<CrawlOutcome> {
        while self.events.recv().await.is_some() {}
        Ok(self.handle.await?)
    }
}

pub struct CrawlOutcome {
    pub graph: UserGraph,
    /// Ids whose harvesting completed.
    pub done: HashSet<u64>,
    /// Ids whose harvest lost a page to a network error. Never expanded
    /// again and never counted as done.
    pub incomplete: HashSet<u64>,
    /// Profile pictures still downloading; settle them separately.
    pub images: ImageDownloads,
    /// Generations that ran to completion.
    pub generations: u32,
    pub cancelled: bool,
    pub failed: bool,
}

struct CrawlState {
    graph: UserGraph,
    done: HashSet<u64>,
    incomplete: HashSet<u64>,
    /// Unfinished tasks per user in the current generation.
    pending: HashMap<u64, usize>,
    phase: RatePhase,
    images: ImageDownloads,
    /// Last snapshot handed out, reused until the graph changes.
    snapshot: Option<Arc<UserGraph>>,
}

/// Result of merging one page.
struct PageStep {
    added: Added,
    snapshot: Arc<UserGraph>,
    depth_limit: Option<usize>,
    grew: bool,
}

impl CrawlState {
    fn new(images: ImageDownloads) -> Self {
        Self {
            graph: UserGraph::new(),
            done: HashSet::new(),
            incomplete: HashSet::new(),
            pending: HashMap::new(),
            phase: RatePhase::default(),
            images,
            snapshot: None,
        }
    }

    fn snapshot(&mut self) -> Arc<UserGraph> {
        self.snapshot
            .get_or_insert_with(|| Arc::new(self.graph.clone()))
            .clone()
    }

    fn progress(&self) -> Progress {
        Progress {
            done: self.done.len(),
        }
    }

    fn finish_task(&mut self, user: u64) {
        if let Some(remaining) = self.pending.get_mut(&user) {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.pending.remove(&user);
                if !self.incomplete.contains(&user) {
                    self.done.insert(user);
                }
            }
        }
    }

    /// A task of `user` lost a page. The user keeps what was merged but is
    /// not retried.
    fn abandon_task(&mut self, user: u64) {
        self.incomplete.insert(user);
        self.finish_task(user);
    }

    /// Merge a page and apply the depth cap. Runs entirely under the state
    /// lock so no other worker sees a half-merged user.
    fn apply_page(&mut self, task: &Task, page: &Page, depth: &DepthLimiter) -> PageStep {
        let size_before = self.graph.len();
        let fresh = self.graph.fresh_neighbors(&page.profiles, task.user, task.direction);
        let collected = self.graph.collected(task.user, task.direction);
        let (kept, excess) = depth.split(collected, &fresh);

        let mut delta = match task.direction {
            Direction::Follower => self.graph.merge_followers(kept, task.user),
            Direction::Following => self.graph.merge_following(kept, task.user, depth.cap()),
        };
        delta.extend(self.graph.insert_leaves(excess));
        if !delta.is_empty() {
            self.snapshot = None;
        }

        self.done.extend(delta.terminal.iter().copied());
        for user in &delta.users {
            self.images.schedule(user);
        }

        let total = self.graph.collected(task.user, task.direction);
        let depth_limit = depth.reached(total).then_some(total);

        PageStep {
            added: Added {
                followers: delta.followers,
                users: delta.users,
                progress: self.progress(),
            },
            snapshot: self.snapshot(),
            depth_limit,
            grew: self.graph.len() > size_before,
        }
    }
}

struct CrawlContext {
    client: InstagramClient,
    limits: Limits,
    depth: DepthLimiter,
    rate: RateLimiter,
    workers: usize,
    state: Mutex<CrawlState>,
    events: mpsc::Sender<Result<CrawlEvent>>,
    cancel: CancellationToken,
    failed: AtomicBool,
}

impl CrawlContext {
    async fn send(&self, item: Result<CrawlEvent>) {
        if self.events.send(item).await.is_err() && !self.cancel.is_cancelled() {
            debug!("Event receiver dropped, cancelling crawl");
            self.cancel.cancel();
        }
    }

    async fn emit(&self, event: CrawlEvent) {
        self.send(Ok(event)).await;
    }

    /// Stop the crawl on a fatal error. Only the first one is reported on
    /// the stream.
    async fn fail(&self, error: CrawlError) {
        error!("Crawl stopped: {}", error);
        self.cancel.cancel();
        if !self.failed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(Err(error)).await;
        }
    }
}

async fn run(context: Arc<CrawlContext>, root: User) -> CrawlOutcome {
    let root_id = root.id;
    let root_private = root.private;
    info!(
        "Starting crawl of {} ({}) with {} workers",
        root.profile.username, root_id, context.workers
    );

    let root_event = {
        let mut state = context.state.lock().await;
        state.images.schedule(&root);
        state.graph.insert(root.clone());
        state.snapshot = None;
        if root_private {
            state.done.insert(root_id);
        }
        CrawlEvent::Update {
            user: root_id,
            graph: state.snapshot(),
            added: Added {
                followers: Vec::new(),
                users: vec![root],
                progress: state.progress(),
            },
        }
    };
    context.emit(root_event).await;

    let mut completed = 0;
    if root_private {
        info!("Root account {} is private, nothing to crawl", root_id);
    } else {
        let mut generation = 0;
        while context.depth.allows_generation(generation) {
            if context.cancel.is_cancelled() {
                info!("Crawl cancelled before generation {}", generation);
                break;
            }

            let tasks = open_tasks(&context).await;
            if tasks.is_empty() {
                info!("Generation {} has no open users", generation);
                break;
            }

            info!("Generation {}: {} tasks", generation, tasks.len());
            run_generation(&context, tasks).await;

            if context.cancel.is_cancelled() {
                break;
            }
            completed += 1;
            generation += 1;
        }
    }

    // Workers are gone; the context is ours again.
    let failed = context.failed.load(Ordering::SeqCst);
    let cancelled = context.cancel.is_cancelled() && !failed;
    let state = {
        let mut state = context.state.lock().await;
        std::mem::replace(&mut *state, CrawlState::new(ImageDownloads::disabled()))
    };

    info!(
        "Crawl finished: {} users, {} done, {} incomplete, {} generations{}",
        state.graph.len(),
        state.done.len(),
        state.incomplete.len(),
        completed,
        if cancelled { " (cancelled)" } else { "" }
    );

    CrawlOutcome {
        graph: state.graph,
        done: state.done,
        incomplete: state.incomplete,
        images: state.images,
        generations: completed,
        cancelled,
        failed,
    }
}

/// Tasks for every user that is in the graph, not yet done and not
/// abandoned.
async fn open_tasks(context: &CrawlContext) -> Vec<Task> {
    let mut state = context.state.lock().await;
    let open: Vec<(u64, bool)> = state
        .graph
        .users()
        .filter(|user| !state.done.contains(&user.id) && !state.incomplete.contains(&user.id))
        .map(|user| (user.id, user.private))
        .collect();

    let mut tasks = Vec::new();
    state.pending.clear();
    for (id, private) in open {
        if private {
            state.done.insert(id);
            continue;
        }

        tasks.push(Task::new(id, Direction::Follower));
        if context.limits.include_following {
            tasks.push(Task::new(id, Direction::Following));
        }
        let per_user = if context.limits.include_following { 2 } else { 1 };
        state.pending.insert(id, per_user);
    }
    tasks
}

async fn run_generation(context: &Arc<CrawlContext>, tasks: Vec<Task>) {
    let queue = Arc::new(TaskQueue::new(tasks));

    let mut handles = Vec::new();
    for worker_id in 0..context.workers {
        let context = context.clone();
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            debug!("Worker {} started", worker_id);
            run_worker(&context, &queue).await;
            debug!("Worker {} finished", worker_id);
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            context.fail(CrawlError::Join(e)).await;
        }
    }
}

async fn run_worker(context: &CrawlContext, queue: &TaskQueue) {
    while let Some(task) = queue.next(&context.cancel).await {
        let page = match context
            .client
            .fetch_page(task.user, task.direction, task.cursor.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) if e.is_fatal() => {
                queue.finish().await;
                context.fail(e).await;
                return;
            }
            Err(e) => {
                warn!("Fetching {} of {} failed: {}", task.direction, task.user, e);
                context.state.lock().await.abandon_task(task.user);
                queue.finish().await;
                context.send(Err(e)).await;
                continue;
            }
        };

        if context.cancel.is_cancelled() {
            queue.finish().await;
            return;
        }

        let step = {
            let mut state = context.state.lock().await;
            state.apply_page(&task, &page, &context.depth)
        };
        debug!(
            "Merged {} {} of {} ({} new users)",
            step.added.followers.len(),
            task.direction,
            task.user,
            step.added.users.len()
        );

        let snapshot = step.snapshot.clone();
        context
            .emit(CrawlEvent::Update {
                user: task.user,
                graph: step.snapshot,
                added: step.added,
            })
            .await;

        if let Some(amount) = step.depth_limit {
            debug!("{} reached the {} cap at {}", task.user, task.direction, amount);
            context
                .emit(CrawlEvent::depth_limit(task.user, snapshot, task.direction, amount))
                .await;
        }

        if !throttle(context, task.user, step.grew).await {
            queue.finish().await;
            return;
        }

        match page.next_cursor {
            Some(cursor) if step.depth_limit.is_none() => {
                queue.requeue(task.continue_at(cursor)).await;
            }
            _ => {
                context.state.lock().await.finish_task(task.user);
                queue.finish().await;
            }
        }
    }
}

/// Page pause, then a batch or daily pause if the graph grew into a new
/// phase. Returns `false` if cancelled while waiting.
async fn throttle(context: &CrawlContext, user: u64, grew: bool) -> bool {
    if !rate::pause(context.rate.page_delay(), &context.cancel).await {
        return false;
    }

    if !grew {
        return true;
    }

    let limit = {
        let mut state = context.state.lock().await;
        let (next, limit) = context.rate.assess(state.phase, state.graph.len());
        state.phase = next;
        limit.map(|limit| (limit, state.snapshot()))
    };

    let Some((limit, snapshot)) = limit else {
        return true;
    };

    info!(
        "Rate limit reached at {} users, pausing for {:?}",
        snapshot.len(),
        limit.delay()
    );
    context.emit(CrawlEvent::rate_limit(user, snapshot, limit)).await;
    context.rate.apply(limit, &context.cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchedProfile;
    use crate::limits::DepthLimits;

    fn profile(id: u64) -> FetchedProfile {
        FetchedProfile {
            id,
            name: String::new(),
            username: format!("user{}", id),
            image: None,
            is_private: false,
            private: false,
        }
    }

    fn state_with_root() -> CrawlState {
        let mut state = CrawlState::new(ImageDownloads::disabled());
        state.graph.insert(User::from_profile(&profile(1)));
        state.pending.insert(1, 1);
        state
    }

    fn page(ids: impl IntoIterator<Item = u64>) -> Page {
        Page {
            profiles: ids.into_iter().map(profile).collect(),
            next_cursor: None,
        }
    }

    #[test]
    fn test_apply_page_caps_followers_and_keeps_excess_as_leaves() {
        let depth = DepthLimiter::new(&DepthLimits {
            generations: 1,
            followers: 3,
        });
        let mut state = state_with_root();
        let task = Task::new(1, Direction::Follower);

        let step = state.apply_page(&task, &page(2..=6), &depth);

        assert_eq!(state.graph.get(1).unwrap().follower_ids, vec![2, 3, 4]);
        assert_eq!(step.depth_limit, Some(3));
        assert_eq!(step.added.followers, vec![2, 3, 4]);
        assert_eq!(step.added.users.len(), 5);
        assert!(state.graph.contains(5) && state.graph.contains(6));
        assert!(state.done.contains(&5) && state.done.contains(&6));
        assert!(!state.done.contains(&2));
        assert_eq!(step.added.progress.done, 2);
    }

    #[test]
    fn test_apply_page_twice_does_not_consume_cap() {
        let depth = DepthLimiter::new(&DepthLimits {
            generations: 1,
            followers: 10,
        });
        let mut state = state_with_root();
        let task = Task::new(1, Direction::Follower);

        state.apply_page(&task, &page(2..=4), &depth);
        let again = state.apply_page(&task, &page(2..=4), &depth);

        assert!(!again.grew);
        assert!(again.added.followers.is_empty());
        assert_eq!(again.depth_limit, None);
        assert_eq!(state.graph.get(1).unwrap().follower_ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_apply_page_following_counts_toward_cap() {
        let depth = DepthLimiter::new(&DepthLimits {
            generations: 1,
            followers: 2,
        });
        let mut state = state_with_root();
        let task = Task::new(1, Direction::Following);

        let step = state.apply_page(&task, &page([2, 3, 4]), &depth);

        assert_eq!(step.depth_limit, Some(2));
        assert_eq!(state.graph.get(1).unwrap().following_count, 2);
        assert_eq!(state.graph.get(2).unwrap().follower_ids, vec![1]);
        assert!(state.graph.get(4).unwrap().follower_ids.is_empty());
        assert!(state.done.contains(&4));
    }

    #[test]
    fn test_apply_page_following_never_pushes_follower_past_cap() {
        let depth = DepthLimiter::new(&DepthLimits {
            generations: 1,
            followers: 2,
        });
        let mut state = state_with_root();
        state.apply_page(&Task::new(1, Direction::Follower), &page([2, 3]), &depth);
        state.apply_page(&Task::new(1, Direction::Following), &page([5]), &depth);

        // 5 follows 1 and 6, but 1 already holds its two followers
        let step = state.apply_page(&Task::new(5, Direction::Following), &page([1, 6]), &depth);

        assert_eq!(state.graph.get(1).unwrap().follower_ids, vec![2, 3]);
        assert_eq!(state.graph.get(5).unwrap().following_count, 1);
        assert_eq!(step.added.followers, vec![6]);
        assert_eq!(state.graph.get(6).unwrap().follower_ids, vec![5]);
    }

    #[test]
    fn test_snapshot_reused_until_graph_changes() {
        let depth = DepthLimiter::new(&DepthLimits {
            generations: 1,
            followers: 10,
        });
        let mut state = state_with_root();
        let task = Task::new(1, Direction::Follower);

        let first = state.apply_page(&task, &page([2, 3]), &depth).snapshot;
        let repeat = state.apply_page(&task, &page([2, 3]), &depth).snapshot;
        assert!(Arc::ptr_eq(&first, &repeat));

        let grown = state.apply_page(&task, &page([4]), &depth).snapshot;
        assert!(!Arc::ptr_eq(&first, &grown));
        assert_eq!(first.len(), 3);
        assert_eq!(grown.len(), 4);
    }

    #[test]
    fn test_abandoned_task_keeps_user_out_of_done() {
        let mut state = state_with_root();
        state.pending.insert(1, 2);

        state.abandon_task(1);
        state.finish_task(1);

        assert!(!state.done.contains(&1));
        assert!(state.incomplete.contains(&1));
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_finish_task_retires_user_after_last_direction() {
        let mut state = state_with_root();
        state.pending.insert(1, 2);

        state.finish_task(1);
        assert!(!state.done.contains(&1));
        state.finish_task(1);
        assert!(state.done.contains(&1));
        assert!(state.pending.is_empty());
    }
}
