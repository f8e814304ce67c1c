use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::action::Action;
use crate::batch::{Batch, MutationKind, MutationRegistry};
use crate::classify::{classify_all, APPROVED_PREFIX, UNSUBSCRIBED_PREFIX};
use crate::event::Event;
use crate::keys::{Bounds, Command, Navigator, Outcome, UiState};
use crate::optimistic::{Patch, PatchLedger};
use crate::seen::SeenStore;
use crate::source::NotificationSource;
use crate::tabs::{derive_tabs, filter_for_tab, selected_tab, Tab};
use crate::timer::{Scheduler, TimerKey, TokioScheduler};
use crate::types::{ParsedNotification, ViewerContext};

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub debounce: Duration,
    pub key_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce: crate::batch::DEBOUNCE,
            key_timeout: crate::keys::KEY_TIMEOUT,
        }
    }
}

pub struct App<S: Scheduler = TokioScheduler> {
    pub notifications: Vec<ParsedNotification>,
    pub viewer: Option<ViewerContext>,
    pub loading: bool,
    pub error: Option<String>,
    /// One-line message for the footer, cleared by the next key
    pub notice: Option<String>,
    pub should_quit: bool,
    nav: Navigator,
    registry: MutationRegistry,
    ledger: PatchLedger,
    seen: SeenStore,
    scheduler: S,
    source: Arc<dyn NotificationSource>,
    action_tx: mpsc::UnboundedSender<Action>,
    in_flight: Vec<JoinHandle<()>>,
    load_id: u64,
}

impl<S: Scheduler> App<S> {
    pub fn new(
        source: Arc<dyn NotificationSource>,
        seen: SeenStore,
        scheduler: S,
        timing: Timing,
        action_tx: mpsc::UnboundedSender<Action>,
    ) -> Self {
        Self {
            notifications: Vec::new(),
            viewer: None,
            loading: false,
            error: None,
            notice: None,
            should_quit: false,
            nav: Navigator::new(timing.key_timeout),
            registry: MutationRegistry::new(timing.debounce),
            ledger: PatchLedger::new(),
            seen,
            scheduler,
            source,
            action_tx,
            in_flight: Vec::new(),
            load_id: 0,
        }
    }

    pub fn ui(&self) -> &UiState {
        self.nav.ui()
    }

    pub fn tabs(&self) -> Vec<Tab> {
        derive_tabs(&self.notifications)
    }

    pub fn current_tab(&self) -> Option<Tab> {
        selected_tab(&self.tabs(), self.ui().selected_tab_index).copied()
    }

    /// The selected tab's notifications in display order
    pub fn visible(&self) -> Vec<&ParsedNotification> {
        match self.current_tab() {
            Some(tab) => filter_for_tab(&self.notifications, tab.name),
            None => Vec::new(),
        }
    }

    pub fn selected(&self) -> Option<&ParsedNotification> {
        self.visible().get(self.ui().selected_index).copied()
    }

    /// Ids waiting in a debounce window, across all kinds
    pub fn pending_count(&self) -> usize {
        MutationKind::ALL
            .into_iter()
            .filter_map(|kind| self.registry.queue(kind))
            .map(|queue| queue.pending().len())
            .sum()
    }

    fn bounds(&self) -> Bounds {
        let tabs = self.tabs();
        let items = selected_tab(&tabs, self.ui().selected_tab_index).map_or(0, |t| t.count);
        Bounds {
            items,
            tabs: tabs.len(),
        }
    }

    fn reconcile(&mut self) {
        let bounds = self.bounds();
        self.nav.reconcile(bounds);
    }

    pub fn handle_event(&self, event: Event) -> Action {
        match event {
            Event::Key(key) => Action::Key(key),
            Event::Render => Action::None,
        }
    }

    pub fn update(&mut self, action: Action) {
        match action {
            Action::Key(key) => {
                self.notice = None;
                let outcome = if key.is_interrupt() {
                    self.nav.exit()
                } else {
                    let bounds = self.bounds();
                    self.nav.handle_key(key, bounds, &mut self.scheduler)
                };
                if let Outcome::Command(command) = outcome {
                    self.run(command);
                }
            }

            Action::Refresh => self.spawn_fetch(),
            Action::FetchCompleted {
                notifications,
                viewer,
                load_id,
            } => {
                if load_id != self.load_id {
                    tracing::debug!(load_id, current = self.load_id, "dropping stale fetch");
                    return;
                }
                self.loading = false;
                self.error = None;

                let mut parsed = classify_all(&notifications, &viewer, &self.seen);
                self.seen.record_fetch(&parsed, Utc::now());
                self.seen.save();
                if !self.ledger.is_empty() {
                    self.ledger.reapply(&mut parsed);
                }
                tracing::info!(
                    fetched = notifications.len(),
                    listed = parsed.len(),
                    "notifications loaded"
                );

                self.notifications = parsed;
                self.viewer = Some(viewer);
                self.reconcile();
            }
            Action::FetchFailed { message, load_id } => {
                if load_id != self.load_id {
                    return;
                }
                tracing::warn!(error = %message, "fetch failed");
                self.loading = false;
                self.error = Some(message);
            }

            Action::TimerFired { key, generation } => {
                if !self.scheduler.claim(key, generation) {
                    return;
                }
                tracing::debug!(?key, "timer fired");
                match key {
                    TimerKey::KeyBuffer => self.nav.on_timeout(),
                    TimerKey::Debounce(kind) => self.flush(kind),
                }
            }

            Action::BatchSettled { batch, kind, error } => {
                let ok = error.is_none();
                let rolled_back = self.ledger.settle(batch, ok, &mut self.notifications);
                if let Some(error) = error {
                    tracing::warn!(%kind, ?batch, rolled_back, %error, "mutation failed");
                    self.notice = Some(format!("Could not {}: {}", kind, error));
                }
                self.reconcile();
            }
            Action::ApproveSettled { id, error } => {
                let ok = error.is_none();
                self.ledger.settle_approval(&id, ok, &mut self.notifications);
                if let Some(error) = error {
                    tracing::warn!(%id, %error, "approve failed");
                    self.notice = Some(format!("Could not approve: {}", error));
                }
            }

            Action::None => {}
        }
    }

    fn run(&mut self, command: Command) {
        if command == Command::Exit {
            self.should_quit = true;
            return;
        }
        if command == Command::Refresh {
            self.spawn_fetch();
            return;
        }

        let Some(selected) = self.selected() else {
            return;
        };
        let id = selected.id.clone();
        let subject_id = selected.subject_id.clone();
        let unread = selected.unread;
        let url = selected.url.clone();

        match command {
            Command::OpenInBrowser => {
                if let Err(e) = open::that(&url) {
                    tracing::warn!(%url, error = %e, "could not open browser");
                    self.notice = Some(format!("Could not open {}", url));
                }
            }
            Command::MarkRead if unread => {
                let patch = Patch::unread(id.clone(), false);
                self.enqueue(MutationKind::MarkRead, id, subject_id, patch);
            }
            Command::MarkUnread if !unread => {
                let patch = Patch::unread(id.clone(), true);
                self.enqueue(MutationKind::MarkUnread, id, subject_id, patch);
            }
            Command::MarkDone => {
                self.seen.record_done(&id, Utc::now());
                self.seen.save();
                let patch = Patch::removed(id.clone());
                self.enqueue(MutationKind::MarkDone, id, subject_id, patch);
            }
            Command::Unsubscribe => {
                self.seen.record_unsubscribed(&id, Utc::now());
                self.seen.save();
                let patch = Patch::title(id.clone(), UNSUBSCRIBED_PREFIX);
                self.enqueue(MutationKind::Unsubscribe, id, subject_id, patch);
            }
            Command::Approve => {
                let patch = Patch::title(id.clone(), APPROVED_PREFIX);
                if self.ledger.stage_approval(patch, &mut self.notifications) {
                    self.spawn_approve(id, subject_id);
                }
            }
            _ => {}
        }
    }

    /// Queue the remote call and apply its patch right away
    fn enqueue(&mut self, kind: MutationKind, id: String, subject_id: String, patch: Patch) {
        let target = if kind.targets_subject() { subject_id } else { id };
        self.registry.enqueue(kind, target, &mut self.scheduler);
        self.ledger.stage(kind, patch, &mut self.notifications);
        self.reconcile();
    }

    fn flush(&mut self, kind: MutationKind) {
        if let Some(batch) = self.registry.take(kind) {
            self.ledger.seal(kind, batch.id);
            self.spawn_mutation(batch);
        }
    }

    /// Flush every queue and wait for all remote calls to settle
    pub async fn flush_pending_mutations(&mut self) {
        self.in_flight.retain(|h| !h.is_finished());
        if self.registry.is_idle() && self.in_flight.is_empty() {
            return;
        }
        let batches = self.registry.take_all(&mut self.scheduler);
        tracing::info!(
            batches = batches.len(),
            in_flight = self.in_flight.len(),
            "flushing pending mutations"
        );
        for batch in batches {
            self.ledger.seal(batch.kind, batch.id);
            self.spawn_mutation(batch);
        }
        let handles = std::mem::take(&mut self.in_flight);
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "mutation task did not complete");
            }
        }
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.in_flight.retain(|h| !h.is_finished());
        self.in_flight.push(handle);
    }

    fn spawn_fetch(&mut self) {
        self.load_id += 1;
        self.loading = true;
        let load_id = self.load_id;
        let tx = self.action_tx.clone();
        let source = Arc::clone(&self.source);
        tokio::spawn(async move {
            let action = match source.fetch().await {
                Ok((notifications, viewer)) => Action::FetchCompleted {
                    notifications,
                    viewer,
                    load_id,
                },
                Err(e) => Action::FetchFailed {
                    message: e.to_string(),
                    load_id,
                },
            };
            tx.send(action).ok();
        });
    }

    fn spawn_mutation(&mut self, batch: Batch) {
        tracing::info!(kind = %batch.kind, ids = batch.ids.len(), "sending batch");
        let tx = self.action_tx.clone();
        let source = Arc::clone(&self.source);
        let handle = tokio::spawn(async move {
            let error = source
                .mutate(batch.kind, &batch.ids)
                .await
                .err()
                .map(|e| e.to_string());
            tx.send(Action::BatchSettled {
                batch: batch.id,
                kind: batch.kind,
                error,
            })
            .ok();
        });
        self.track(handle);
    }

    fn spawn_approve(&mut self, id: String, subject_id: String) {
        let tx = self.action_tx.clone();
        let source = Arc::clone(&self.source);
        let handle = tokio::spawn(async move {
            let error = source.approve(&subject_id).await.err().map(|e| e.to_string());
            tx.send(Action::ApproveSettled { id, error }).ok();
        });
        self.track(handle);
    }

    #[cfg(test)]
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    #[cfg(test)]
    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyInput;
    use crate::source::fake::FakeSource;
    use crate::timer::ManualScheduler;
    use crate::types::{PullRequestSubject, RawNotification, Reason, Subject};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    type TestApp = App<ManualScheduler>;

    fn raw(id: &str, reason: &str, unread: bool, updated: i64) -> RawNotification {
        RawNotification {
            id: id.into(),
            unread,
            done: false,
            reason: reason.into(),
            updated_at: Utc.timestamp_opt(updated, 0).unwrap(),
            subject: Some(Subject::PullRequest(Box::new(PullRequestSubject {
                id: format!("PR_{}", id),
                number: 1,
                title: format!("Title {}", id),
                url: format!("https://github.com/acme/api/pull/{}", id),
                repository: "acme/api".into(),
                ..PullRequestSubject::default()
            }))),
        }
    }

    type Harness = (TestApp, Arc<FakeSource>, mpsc::UnboundedReceiver<Action>);

    fn setup(raw: Vec<RawNotification>) -> Harness {
        let viewer = ViewerContext::new("me", vec!["backend".to_string()]);
        let source = Arc::new(FakeSource::new(raw, viewer));
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(
            source.clone(),
            SeenStore::in_memory(),
            ManualScheduler::new(),
            Timing::default(),
            tx,
        );
        (app, source, rx)
    }

    /// Feed the next posted action back into the app
    async fn pump(app: &mut TestApp, rx: &mut mpsc::UnboundedReceiver<Action>) {
        let action = rx.recv().await.unwrap();
        app.update(action);
    }

    async fn loaded(raw: Vec<RawNotification>) -> Harness {
        let (mut app, source, mut rx) = setup(raw);
        app.update(Action::Refresh);
        pump(&mut app, &mut rx).await;
        (app, source, rx)
    }

    fn key(app: &mut TestApp, ch: char) {
        app.update(Action::Key(KeyInput::char(ch)));
    }

    /// Advance simulated time, delivering due timers
    fn wait(app: &mut TestApp, by: Duration) {
        for (key, generation) in app.scheduler_mut().advance(by) {
            app.update(Action::TimerFired { key, generation });
        }
    }

    fn visible_ids(app: &TestApp) -> Vec<String> {
        app.visible().iter().map(|n| n.id.clone()).collect()
    }

    #[tokio::test]
    async fn fetch_classifies_and_records_seen() {
        let (app, _, _rx) = loaded(vec![raw("1", "mention", true, 10)]).await;
        assert!(!app.loading);
        assert_eq!(app.tabs(), vec![Tab { name: "mention", count: 1 }]);
        assert_eq!(app.selected().unwrap().reason, Reason::Mention);
        assert!(app.seen().get("1").is_some());
    }

    #[tokio::test]
    async fn fetch_error_leaves_list_untouched() {
        let (mut app, source, mut rx) = loaded(vec![raw("1", "mention", true, 10)]).await;
        *source.fail_fetch.lock().unwrap() = Some("boom".into());
        app.update(Action::Refresh);
        pump(&mut app, &mut rx).await;
        assert_eq!(app.error.as_deref(), Some("GitHub API error: boom"));
        assert_eq!(app.notifications.len(), 1);
    }

    #[tokio::test]
    async fn stale_fetch_is_dropped() {
        let (mut app, _, mut rx) = setup(vec![raw("1", "mention", true, 10)]);
        app.update(Action::Refresh);
        app.update(Action::Refresh);
        app.update(Action::FetchCompleted {
            notifications: vec![],
            viewer: ViewerContext::default(),
            load_id: 1,
        });
        assert!(app.loading);
        pump(&mut app, &mut rx).await;
        pump(&mut app, &mut rx).await;
        assert!(!app.loading);
        assert_eq!(app.notifications.len(), 1);
    }

    #[tokio::test]
    async fn mark_done_batches_and_removes_immediately() {
        let (mut app, source, mut rx) = loaded(vec![
            raw("1", "mention", true, 30),
            raw("2", "mention", true, 20),
            raw("3", "mention", true, 10),
        ])
        .await;

        key(&mut app, 'd');
        key(&mut app, 'd');
        key(&mut app, 'y');
        assert!(app.visible().is_empty());
        assert!(source.calls().is_empty());

        wait(&mut app, Duration::from_secs(5));
        pump(&mut app, &mut rx).await;
        assert_eq!(
            source.calls(),
            vec![(
                MutationKind::MarkDone,
                vec!["1".to_string(), "2".to_string(), "3".to_string()]
            )]
        );
        assert!(app.seen().get("2").unwrap().last_done().is_some());
    }

    #[tokio::test]
    async fn failed_mark_done_brings_item_back() {
        let (mut app, source, mut rx) =
            loaded(vec![raw("1", "mention", true, 30), raw("2", "mention", true, 20)]).await;
        source.fail(MutationKind::MarkDone);

        key(&mut app, 'j');
        key(&mut app, 'd');
        assert_eq!(visible_ids(&app), vec!["1"]);
        assert_eq!(app.ui().selected_index, 0);

        wait(&mut app, Duration::from_secs(5));
        pump(&mut app, &mut rx).await;
        assert_eq!(visible_ids(&app), vec!["1", "2"]);
        assert!(app.notice.is_some());
    }

    #[tokio::test]
    async fn failed_mark_read_restores_unread() {
        let (mut app, source, mut rx) = loaded(vec![raw("1", "mention", true, 30)]).await;
        source.fail(MutationKind::MarkRead);

        key(&mut app, 'm');
        assert!(!app.selected().unwrap().unread);
        wait(&mut app, Duration::from_secs(5));
        pump(&mut app, &mut rx).await;
        assert!(app.selected().unwrap().unread);
    }

    #[tokio::test]
    async fn read_rollback_survives_a_pending_done() {
        let (mut app, source, mut rx) = loaded(vec![raw("1", "mention", true, 30)]).await;
        source.fail(MutationKind::MarkRead);
        source.fail(MutationKind::MarkDone);

        key(&mut app, 'm');
        wait(&mut app, Duration::from_secs(1));
        key(&mut app, 'd');
        assert!(app.visible().is_empty());

        // The read batch fails while the done batch is still waiting
        wait(&mut app, Duration::from_secs(4));
        pump(&mut app, &mut rx).await;
        assert!(app.visible().is_empty());

        wait(&mut app, Duration::from_secs(2));
        pump(&mut app, &mut rx).await;
        assert_eq!(
            source.calls(),
            vec![
                (MutationKind::MarkRead, vec!["1".to_string()]),
                (MutationKind::MarkDone, vec!["1".to_string()]),
            ]
        );
        assert_eq!(visible_ids(&app), vec!["1"]);
        assert!(app.selected().unwrap().unread);
    }

    #[tokio::test]
    async fn separate_windows_make_separate_calls() {
        let (mut app, source, mut rx) =
            loaded(vec![raw("1", "mention", true, 30), raw("2", "mention", true, 20)]).await;
        key(&mut app, 'm');
        wait(&mut app, Duration::from_secs(6));
        pump(&mut app, &mut rx).await;
        // "1" is now read and sorts below "2", which takes the selection
        assert_eq!(app.selected().unwrap().id, "2");
        key(&mut app, 'm');
        wait(&mut app, Duration::from_secs(6));
        pump(&mut app, &mut rx).await;
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn mark_read_skips_read_items() {
        let (mut app, source, _rx) = loaded(vec![raw("1", "mention", false, 30)]).await;
        key(&mut app, 'm');
        wait(&mut app, Duration::from_secs(6));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_targets_the_pull_request() {
        let (mut app, source, mut rx) = loaded(vec![raw("1", "mention", true, 30)]).await;
        key(&mut app, 'U');
        assert!(app.selected().unwrap().title.starts_with(UNSUBSCRIBED_PREFIX));
        assert!(app.seen().get("1").unwrap().is_unsubscribed());

        wait(&mut app, Duration::from_secs(5));
        pump(&mut app, &mut rx).await;
        assert_eq!(
            source.calls(),
            vec![(MutationKind::Unsubscribe, vec!["PR_1".to_string()])]
        );
    }

    #[tokio::test]
    async fn refetch_keeps_pending_patches() {
        let (mut app, _, mut rx) =
            loaded(vec![raw("1", "mention", true, 30), raw("2", "mention", true, 20)]).await;
        key(&mut app, 'd');
        app.update(Action::Refresh);
        pump(&mut app, &mut rx).await;
        assert_eq!(visible_ids(&app), vec!["2"]);
    }

    #[tokio::test]
    async fn exit_flushes_pending_mutations() {
        let (mut app, source, _rx) = loaded(vec![raw("1", "mention", true, 30)]).await;
        key(&mut app, 'm');
        app.update(Action::Key(KeyInput::escape()));
        app.update(Action::Key(KeyInput::escape()));
        assert!(app.should_quit);
        assert!(app.ui().exiting);
        assert_eq!(app.pending_count(), 1);

        app.flush_pending_mutations().await;
        assert_eq!(app.pending_count(), 0);
        assert_eq!(
            source.calls(),
            vec![(MutationKind::MarkRead, vec!["1".to_string()])]
        );
    }

    #[tokio::test]
    async fn ctrl_c_takes_the_exit_path() {
        let (mut app, _, _rx) = loaded(vec![]).await;
        let interrupt = KeyInput {
            ch: Some('c'),
            flags: crate::event::KeyFlags {
                ctrl: true,
                ..Default::default()
            },
        };
        app.update(Action::Key(interrupt));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn failed_approve_drops_marker() {
        let (mut app, source, mut rx) = loaded(vec![raw("1", "mention", true, 30)]).await;
        *source.fail_approve.lock().unwrap() = true;
        key(&mut app, 'A');
        assert!(app.selected().unwrap().title.starts_with(APPROVED_PREFIX));
        pump(&mut app, &mut rx).await;
        assert_eq!(app.selected().unwrap().title, "Title 1");
        assert_eq!(*source.approvals.lock().unwrap(), vec!["PR_1".to_string()]);
    }

    #[tokio::test]
    async fn tab_switch_resets_selection() {
        let (mut app, _, _rx) = loaded(vec![
            raw("1", "mention", true, 30),
            raw("2", "mention", true, 20),
            raw("3", "comment", true, 10),
        ])
        .await;
        key(&mut app, 'j');
        assert_eq!(app.ui().selected_index, 1);
        key(&mut app, 'l');
        assert_eq!(app.current_tab().unwrap().name, "comment");
        assert_eq!(app.ui().selected_index, 0);
    }

    #[tokio::test]
    async fn key_buffer_times_out_through_the_loop() {
        let (mut app, _, _rx) = loaded(vec![raw("1", "mention", true, 30)]).await;
        key(&mut app, 'g');
        assert!(app.ui().keys.g_pending());
        wait(&mut app, Duration::from_secs(2));
        assert!(app.ui().keys.is_empty());
    }
}
