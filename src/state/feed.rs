/// Cursor-paginated feed of item groups
///
/// The controller is a synchronous state machine. It never awaits anything
/// itself: `start`, `refetch` and `fetch_next_page` hand out `FetchTicket`s,
/// the host runs them against a `QuerySource`, and `apply` folds the result
/// back in. Every ticket carries the generation (query identity) it was
/// issued for, so responses that arrive after the filters changed are
/// dropped instead of being merged into the new feed.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::data::{Cursor, GroupId, ItemGroup};
use super::filters::FilterSet;
use crate::error::FetchError;
use crate::query::{FeedPage, FeedRequest, QueryOptions};

/// Phase of the feed state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    /// Nothing started yet, or torn down
    Idle,
    /// Page one of the current identity is in flight
    FetchingFirstPage,
    /// At least one response applied, nothing in flight
    Ready,
    /// A next-page request is in flight
    RefetchingMore,
    /// Page one failed and there is nothing to show
    Failed,
}

/// Inputs of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// New query identity
    Start,
    /// Reload page one for the current identity
    Refetch,
    RequestNextPage,
    PageLoaded,
    PageFailed { has_items: bool },
}

impl FeedPhase {
    /// Transition table. `None` means the event is not accepted in this phase.
    pub fn next(self, event: FeedEvent) -> Option<FeedPhase> {
        use FeedEvent::*;
        use FeedPhase::*;

        match (self, event) {
            (_, Start) => Some(FetchingFirstPage),
            (Ready | Failed, Refetch) => Some(FetchingFirstPage),
            (Ready, RequestNextPage) => Some(RefetchingMore),
            (FetchingFirstPage | RefetchingMore, PageLoaded) => Some(Ready),
            (FetchingFirstPage | RefetchingMore, PageFailed { has_items: true }) => Some(Ready),
            (FetchingFirstPage | RefetchingMore, PageFailed { has_items: false }) => Some(Failed),
            _ => None,
        }
    }

    pub fn is_fetching(self) -> bool {
        matches!(self, FeedPhase::FetchingFirstPage | FeedPhase::RefetchingMore)
    }
}

/// Which page a ticket asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    FirstPage,
    NextPage,
}

/// A request issued by the controller, tagged with its query identity
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub kind: FetchKind,
    pub request: FeedRequest,
    pub options: QueryOptions,
}

/// What `apply` did with a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Items merged; `added` counts the ones that were not duplicates
    Applied { added: usize },
    /// The request failed; groups were left untouched
    Failed,
    /// The ticket belongs to a superseded identity or an already settled request
    Stale,
}

/// Feed state for one query identity at a time
#[derive(Debug, Clone)]
pub struct FeedController {
    phase: FeedPhase,
    generation: u64,
    filters: Option<FilterSet>,
    limit: usize,
    groups: Vec<ItemGroup>,
    seen: HashSet<GroupId>,
    cursor: Option<Cursor>,
    /// A page of the current identity has been applied at least once
    rendered: bool,
    last_error: Option<FetchError>,
}

impl Default for FeedController {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedController {
    pub fn new() -> Self {
        Self {
            phase: FeedPhase::Idle,
            generation: 0,
            filters: None,
            limit: 0,
            groups: Vec::new(),
            seen: HashSet::new(),
            cursor: None,
            rendered: false,
            last_error: None,
        }
    }

    /// Begin a new query identity and request its first page.
    ///
    /// Discards every group of the previous identity. Responses still in
    /// flight for it will be reported as `Stale`.
    pub fn start(&mut self, filters: FilterSet, limit: usize) -> FetchTicket {
        self.generation += 1;
        self.filters = Some(filters.without_empty());
        self.limit = limit;
        self.groups.clear();
        self.seen.clear();
        self.cursor = None;
        self.rendered = false;
        self.last_error = None;
        self.transition(FeedEvent::Start);

        info!(generation = self.generation, limit, "🔍 Starting feed");
        self.ticket(FetchKind::FirstPage, None)
    }

    /// Start only if `filters` (after dropping empty values) or `limit` differ
    /// from the current identity
    pub fn sync(&mut self, filters: &FilterSet, limit: usize) -> Option<FetchTicket> {
        let cleaned = filters.without_empty();
        if self.filters.as_ref() == Some(&cleaned) && self.limit == limit {
            return None;
        }
        Some(self.start(cleaned, limit))
    }

    /// Request the page after the last one applied.
    ///
    /// Returns `None` (and issues nothing) when there is no next page or a
    /// request is already in flight.
    pub fn fetch_next_page(&mut self) -> Option<FetchTicket> {
        if !self.has_next_page() {
            return None;
        }
        if self.phase.is_fetching() {
            debug!(generation = self.generation, "next page coalesced into in-flight request");
            return None;
        }
        self.transition(FeedEvent::RequestNextPage)?;
        self.last_error = None;
        let cursor = self.cursor.clone();
        Some(self.ticket(FetchKind::NextPage, cursor))
    }

    /// Reload page one of the current identity, keeping the groups on screen
    /// until the response replaces them
    pub fn refetch(&mut self) -> Option<FetchTicket> {
        self.transition(FeedEvent::Refetch)?;
        self.last_error = None;
        Some(self.ticket(FetchKind::FirstPage, None))
    }

    /// Fold a response into the feed
    pub fn apply(&mut self, ticket: &FetchTicket, result: Result<FeedPage, FetchError>) -> ApplyOutcome {
        if ticket.generation != self.generation || !self.awaits(ticket.kind) {
            warn!(
                ticket = ticket.generation,
                current = self.generation,
                "dropping stale response"
            );
            return ApplyOutcome::Stale;
        }

        match result {
            Ok(page) => {
                if ticket.kind == FetchKind::FirstPage {
                    self.groups.clear();
                    self.seen.clear();
                }
                let before = self.groups.len();
                for group in page.items {
                    if self.seen.insert(group.id().clone()) {
                        self.groups.push(group);
                    }
                }
                let added = self.groups.len() - before;

                self.cursor = page.next_cursor;
                self.rendered = true;
                self.last_error = None;
                self.transition(FeedEvent::PageLoaded);

                info!(
                    generation = self.generation,
                    added,
                    total = self.groups.len(),
                    has_next = self.cursor.is_some(),
                    "📄 Page applied"
                );
                ApplyOutcome::Applied { added }
            }
            Err(error) => {
                warn!(generation = self.generation, %error, "⚠️  Page fetch failed");
                let has_items = self.rendered;
                self.last_error = Some(error);
                self.transition(FeedEvent::PageFailed { has_items });
                ApplyOutcome::Failed
            }
        }
    }

    /// Return to `Idle` and forget everything; in-flight tickets become stale
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::new();
        self.generation = generation;
    }

    pub fn phase(&self) -> FeedPhase {
        self.phase
    }

    /// Groups in server order, without duplicates
    pub fn groups(&self) -> &[ItemGroup] {
        &self.groups
    }

    /// Filters of the current identity (empty values already removed)
    pub fn filters(&self) -> Option<&FilterSet> {
        self.filters.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_next_page(&self) -> bool {
        self.rendered && self.cursor.is_some()
    }

    /// First fetch of a fresh identity, nothing rendered yet
    pub fn is_loading(&self) -> bool {
        self.phase == FeedPhase::FetchingFirstPage && !self.rendered
    }

    /// A fetch for an identity that already rendered is in flight
    pub fn is_refetching(&self) -> bool {
        self.rendered && self.phase.is_fetching()
    }

    /// Error of the most recent failed request, cleared once a new request
    /// is issued or a page arrives
    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    fn awaits(&self, kind: FetchKind) -> bool {
        matches!(
            (self.phase, kind),
            (FeedPhase::FetchingFirstPage, FetchKind::FirstPage)
                | (FeedPhase::RefetchingMore, FetchKind::NextPage)
        )
    }

    fn transition(&mut self, event: FeedEvent) -> Option<FeedPhase> {
        match self.phase.next(event) {
            Some(next) => {
                self.phase = next;
                Some(next)
            }
            None => {
                debug!(phase = ?self.phase, ?event, "event ignored");
                None
            }
        }
    }

    fn ticket(&self, kind: FetchKind, cursor: Option<Cursor>) -> FetchTicket {
        FetchTicket {
            generation: self.generation,
            kind,
            request: FeedRequest {
                filters: self.filters.clone().unwrap_or_default(),
                cursor,
                limit: self.limit,
            },
            options: QueryOptions { skip_batch: true },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::Image;
    use crate::state::filters::keys;
    use proptest::prelude::*;

    fn group(ids: &[i64]) -> ItemGroup {
        ItemGroup::new(ids.iter().map(|&id| Image::sized(id, 300, 400)).collect()).unwrap()
    }

    fn page(items: Vec<ItemGroup>, next: Option<&str>) -> FeedPage {
        FeedPage { items, next_cursor: next.map(Cursor::new) }
    }

    fn newest() -> FilterSet {
        FilterSet::new().with(keys::SORT, "Newest").with(keys::PERIOD, "AllTime")
    }

    fn ids(feed: &FeedController) -> Vec<&str> {
        feed.groups().iter().map(|g| g.id().as_str()).collect()
    }

    #[test]
    fn test_transition_table() {
        use FeedEvent::*;
        use FeedPhase::*;

        assert_eq!(Idle.next(Start), Some(FetchingFirstPage));
        assert_eq!(Idle.next(RequestNextPage), None);
        assert_eq!(Idle.next(Refetch), None);
        assert_eq!(Ready.next(RequestNextPage), Some(RefetchingMore));
        assert_eq!(RefetchingMore.next(RequestNextPage), None);
        assert_eq!(RefetchingMore.next(Start), Some(FetchingFirstPage));
        assert_eq!(FetchingFirstPage.next(PageFailed { has_items: false }), Some(Failed));
        assert_eq!(RefetchingMore.next(PageFailed { has_items: true }), Some(Ready));
        assert_eq!(Failed.next(Refetch), Some(FetchingFirstPage));
        assert_eq!(Ready.next(PageLoaded), None);
    }

    #[test]
    fn test_two_page_scenario() {
        let mut feed = FeedController::new();
        let first = feed.start(newest(), 2);
        assert!(feed.is_loading());
        assert_eq!(first.request.cursor, None);
        assert_eq!(first.request.limit, 2);
        assert!(first.options.skip_batch);

        let g1 = ItemGroup::new(vec![Image::sized(1, 300, 500)]).unwrap();
        let g2 = ItemGroup::new(vec![Image::sized(2, 400, 800)]).unwrap();
        let g3 = ItemGroup::new(vec![Image::sized(3, 600, 300)]).unwrap();

        feed.apply(&first, Ok(page(vec![g1, g2], Some("c1"))));
        assert!(feed.has_next_page());
        assert!(!feed.is_loading());

        let second = feed.fetch_next_page().unwrap();
        assert_eq!(second.request.cursor, Some(Cursor::new("c1")));
        assert!(feed.is_refetching());

        feed.apply(&second, Ok(page(vec![g3], None)));
        assert_eq!(ids(&feed), vec!["1", "2", "3"]);
        assert!(!feed.has_next_page());
        assert_eq!(feed.phase(), FeedPhase::Ready);
    }

    #[test]
    fn test_fetch_next_page_is_noop_without_next_page() {
        let mut feed = FeedController::new();
        assert!(feed.fetch_next_page().is_none());

        let first = feed.start(newest(), 10);
        // still loading page one
        assert!(feed.fetch_next_page().is_none());

        feed.apply(&first, Ok(page(vec![group(&[1])], None)));
        assert!(feed.fetch_next_page().is_none());
        assert_eq!(feed.phase(), FeedPhase::Ready);
    }

    #[test]
    fn test_overlapping_next_page_requests_coalesce() {
        let mut feed = FeedController::new();
        let first = feed.start(newest(), 1);
        feed.apply(&first, Ok(page(vec![group(&[1])], Some("c1"))));

        assert!(feed.fetch_next_page().is_some());
        assert!(feed.fetch_next_page().is_none());
        assert!(feed.refetch().is_none());
    }

    #[test]
    fn test_merge_deduplicates_keeping_first_seen() {
        let mut feed = FeedController::new();
        let first = feed.start(newest(), 3);
        feed.apply(&first, Ok(page(vec![group(&[1]), group(&[2, 3]), group(&[4])], Some("c1"))));

        let second = feed.fetch_next_page().unwrap();
        let outcome = feed.apply(
            &second,
            Ok(page(vec![group(&[4]), group(&[5]), group(&[2, 3]), group(&[3, 2])], None)),
        );

        assert_eq!(outcome, ApplyOutcome::Applied { added: 2 });
        assert_eq!(ids(&feed), vec!["1", "2_3", "4", "5", "3_2"]);
    }

    #[test]
    fn test_stale_next_page_dropped_after_filter_change() {
        let mut feed = FeedController::new();
        let first = feed.start(newest(), 2);
        feed.apply(&first, Ok(page(vec![group(&[1]), group(&[2])], Some("c1"))));
        let in_flight = feed.fetch_next_page().unwrap();

        let restart = feed
            .sync(&newest().with(keys::EXCLUDE_CROSS_POSTS, true), 2)
            .unwrap();
        assert!(feed.groups().is_empty());
        assert!(feed.is_loading());

        assert_eq!(feed.apply(&in_flight, Ok(page(vec![group(&[3])], None))), ApplyOutcome::Stale);
        assert!(feed.groups().is_empty());

        feed.apply(&restart, Ok(page(vec![group(&[10])], None)));
        assert_eq!(ids(&feed), vec!["10"]);
    }

    #[test]
    fn test_sync_ignores_equal_identity() {
        let mut feed = FeedController::new();
        assert!(feed.sync(&newest(), 5).is_some());
        // empty values do not make a new identity
        assert!(feed.sync(&newest().with(keys::USERNAME, ""), 5).is_none());
        assert!(feed.sync(&newest(), 6).is_some());
    }

    #[test]
    fn test_first_page_failure_is_distinct_from_empty() {
        let mut feed = FeedController::new();
        let first = feed.start(newest(), 5);
        let outcome = feed.apply(&first, Err(FetchError::Transport("offline".into())));

        assert_eq!(outcome, ApplyOutcome::Failed);
        assert_eq!(feed.phase(), FeedPhase::Failed);
        assert_eq!(feed.last_error(), Some(&FetchError::Transport("offline".into())));

        let retry = feed.refetch().unwrap();
        assert!(feed.is_loading());
        feed.apply(&retry, Ok(FeedPage::default()));
        assert_eq!(feed.phase(), FeedPhase::Ready);
        assert!(feed.groups().is_empty());
        assert!(feed.last_error().is_none());
    }

    #[test]
    fn test_next_page_failure_keeps_rendered_groups() {
        let mut feed = FeedController::new();
        let first = feed.start(newest(), 1);
        feed.apply(&first, Ok(page(vec![group(&[1])], Some("c1"))));
        let second = feed.fetch_next_page().unwrap();

        feed.apply(&second, Err(FetchError::Transport("timeout".into())));
        assert_eq!(feed.phase(), FeedPhase::Ready);
        assert_eq!(ids(&feed), vec!["1"]);
        assert!(feed.last_error().is_some());

        // the cursor survived, so the same page can be asked for again
        let again = feed.fetch_next_page().unwrap();
        assert_eq!(again.request.cursor, Some(Cursor::new("c1")));
        // the old error no longer applies while the retry is in flight
        assert!(feed.last_error().is_none());
        assert!(feed.is_refetching());
    }

    #[test]
    fn test_refetch_replaces_groups() {
        let mut feed = FeedController::new();
        let first = feed.start(newest(), 2);
        feed.apply(&first, Ok(page(vec![group(&[1]), group(&[2])], Some("c1"))));

        let reload = feed.refetch().unwrap();
        assert!(feed.is_refetching());
        assert!(!feed.is_loading());
        assert_eq!(feed.groups().len(), 2);

        feed.apply(&reload, Ok(page(vec![group(&[9])], None)));
        assert_eq!(ids(&feed), vec!["9"]);
    }

    #[test]
    fn test_reset_makes_in_flight_stale() {
        let mut feed = FeedController::new();
        let first = feed.start(newest(), 2);
        feed.reset();
        assert_eq!(feed.phase(), FeedPhase::Idle);
        assert_eq!(feed.apply(&first, Ok(FeedPage::default())), ApplyOutcome::Stale);
    }

    /// Items served for a ticket are tagged with the username filter that asked for them
    fn serve(ticket: &FetchTicket, serial: i64) -> FeedPage {
        let user = ticket.request.filters.text(keys::USERNAME).unwrap_or_default().to_string();
        let item = group(&[serial]).with_post(serial, Some(user), 0);
        page(vec![item], Some("more"))
    }

    #[derive(Debug, Clone)]
    enum Op {
        SetUser(u8),
        NextPage,
        Resolve(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4).prop_map(Op::SetUser),
            Just(Op::NextPage),
            (0usize..8).prop_map(Op::Resolve),
        ]
    }

    proptest! {
        #[test]
        fn prop_only_latest_identity_survives(ops in prop::collection::vec(op(), 1..40)) {
            let mut feed = FeedController::new();
            let mut pending = vec![feed.start(FilterSet::new().with(keys::USERNAME, "u0"), 1)];
            let mut latest = "u0".to_string();
            let mut serial = 0;

            for op in ops {
                match op {
                    Op::SetUser(n) => {
                        latest = format!("u{}", n);
                        if let Some(ticket) = feed.sync(&FilterSet::new().with(keys::USERNAME, latest.as_str()), 1) {
                            pending.push(ticket);
                        }
                    }
                    Op::NextPage => pending.extend(feed.fetch_next_page()),
                    Op::Resolve(index) if !pending.is_empty() => {
                        let ticket = pending.remove(index % pending.len());
                        serial += 1;
                        feed.apply(&ticket, Ok(serve(&ticket, serial)));
                    }
                    Op::Resolve(_) => {}
                }
            }
            for ticket in pending.drain(..) {
                serial += 1;
                feed.apply(&ticket, Ok(serve(&ticket, serial)));
            }

            for group in feed.groups() {
                prop_assert_eq!(group.username.as_deref(), Some(latest.as_str()));
            }
            let unique: HashSet<_> = feed.groups().iter().map(|g| g.id().clone()).collect();
            prop_assert_eq!(unique.len(), feed.groups().len());
        }
    }
}
