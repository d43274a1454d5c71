/// Gallery composition root
///
/// `GalleryView` wires the filter store, the feed controller, the load
/// trigger and the masonry layout together. It is renderer-agnostic: the
/// host feeds it events (mount, filter changes, page results, resizes,
/// scrolls), runs the `FetchTicket`s it hands back, and draws whatever
/// `display()` reports.

use tracing::{debug, info};

use crate::config::GalleryConfig;
use crate::error::FetchError;
use crate::layout::masonry::{MasonryLayout, StaticItem};
use crate::links;
use crate::query::{FeedPage, QuerySource};
use crate::state::data::ItemGroup;
use crate::state::feed::{ApplyOutcome, FeedController, FeedPhase, FetchTicket};
use crate::state::filters::{keys, FilterPatch, FilterScope, FilterSet, FilterStateStore, ImageSort, MetricPeriod};
use crate::ui::viewport::{ScrollViewport, ViewportLoadTrigger};

/// Filter scope the gallery reads and writes
pub const SCOPE: FilterScope = FilterScope::ModelImages;

/// A selectable version of the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVersion {
    pub id: i64,
    pub name: String,
}

/// Options for the pinned generation card
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    pub generation_model_id: Option<i64>,
    pub include_editing_actions: bool,
}

/// Read-only inputs shared with every consumer of the gallery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryContext {
    pub model_id: i64,
    pub username: Option<String>,
    pub model_versions: Vec<ModelVersion>,
    pub selected_version_id: Option<i64>,
    pub generation: Option<GenerationOptions>,
    /// Where "Add Post" should send the user back to
    pub return_url: String,
    /// Muted viewers get no add actions
    pub viewer_muted: bool,
}

impl GalleryContext {
    pub fn new(model_id: i64) -> Self {
        Self {
            model_id,
            ..Self::default()
        }
    }

    /// Name of the selected version, if it is one of the known ones
    pub fn selected_version_name(&self) -> Option<&str> {
        let selected = self.selected_version_id?;
        self.model_versions
            .iter()
            .find(|version| version.id == selected)
            .map(|version| version.name.as_str())
    }
}

/// What the renderer should show
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GalleryDisplay<'a> {
    /// First page of a fresh identity is on its way
    Loading,
    /// First page failed and there is nothing to show
    Failed(&'a FetchError),
    /// The query succeeded with zero groups
    Empty,
    Items {
        groups: &'a [ItemGroup],
        layout: &'a MasonryLayout,
        /// Keep the groups visible but dimmed
        refetching: bool,
        /// Render the load-more sentinel below the columns
        show_sentinel: bool,
        /// A later page failed; the groups above are still valid
        error: Option<&'a FetchError>,
    },
}

/// Filters every model gallery starts from
pub fn default_filters() -> FilterSet {
    FilterSet::new()
        .with(keys::SORT, ImageSort::Newest)
        .with(keys::PERIOD, MetricPeriod::AllTime)
}

#[derive(Debug)]
pub struct GalleryView {
    context: GalleryContext,
    store: FilterStateStore,
    config: GalleryConfig,
    feed: FeedController,
    trigger: ViewportLoadTrigger,
    limit: usize,
    viewport_width: f32,
    scroll: ScrollViewport,
    layout: MasonryLayout,
}

impl GalleryView {
    /// Build the view. `store` carries selections from an earlier mount, if any.
    pub fn new(context: GalleryContext, mut store: FilterStateStore, config: GalleryConfig) -> Self {
        store.register_defaults(SCOPE, default_filters());
        let limit = config.page_limit_for(config.initial_viewport_width);
        let viewport_width = config.grid_width(config.initial_viewport_width);

        Self {
            context,
            store,
            feed: FeedController::new(),
            trigger: ViewportLoadTrigger::new(),
            limit,
            viewport_width,
            scroll: ScrollViewport::new(0.0, config.initial_viewport_height),
            layout: MasonryLayout::default(),
            config,
        }
    }

    /// Request the first page
    pub fn mount(&mut self) -> FetchTicket {
        info!(model_id = self.context.model_id, limit = self.limit, "🎨 Gallery mounted");
        let ticket = self.feed.start(self.query_filters(), self.limit);
        self.relayout();
        ticket
    }

    /// Tear down and hand the filter store back to the owner
    pub fn unmount(mut self) -> FilterStateStore {
        self.feed.reset();
        self.store
    }

    /// Scope filters plus the page's own model, version and author,
    /// with empty values removed
    pub fn query_filters(&self) -> FilterSet {
        let mut filters = self.store.get(SCOPE);
        filters.set_optional(keys::MODEL_VERSION_ID, self.context.selected_version_id);
        filters.insert(keys::MODEL_ID, self.context.model_id);
        filters.set_optional(keys::USERNAME, self.context.username.clone());
        filters.without_empty()
    }

    /// Merge `patch` into the scope and restart the feed if the query changed
    pub fn set_filters(&mut self, patch: FilterPatch) -> Option<FetchTicket> {
        self.store.set(SCOPE, patch);
        debug!(revision = self.store.revision(SCOPE), "gallery filters changed");
        self.trigger.rearm();
        let ticket = self.feed.sync(&self.query_filters(), self.limit);
        self.relayout();
        ticket
    }

    pub fn set_sort(&mut self, sort: ImageSort) -> Option<FetchTicket> {
        self.set_filters(FilterPatch::new().set(keys::SORT, sort))
    }

    pub fn set_period(&mut self, period: MetricPeriod) -> Option<FetchTicket> {
        self.set_filters(FilterPatch::new().set(keys::PERIOD, period))
    }

    pub fn toggle_cross_posts(&mut self) -> Option<FetchTicket> {
        let excluded = self.cross_posts_excluded();
        self.set_filters(FilterPatch::new().set(keys::EXCLUDE_CROSS_POSTS, !excluded))
    }

    /// Fold a page result in. May return the next ticket when the sentinel
    /// is still on screen afterwards.
    pub fn on_page(
        &mut self,
        ticket: &FetchTicket,
        result: Result<FeedPage, FetchError>,
    ) -> (ApplyOutcome, Option<FetchTicket>) {
        let outcome = self.feed.apply(ticket, result);
        if outcome == ApplyOutcome::Stale {
            return (outcome, None);
        }
        self.relayout();
        (outcome, self.check_sentinel())
    }

    /// `width` is the space the grid gets, not the whole window
    pub fn on_resize(&mut self, width: f32, height: f32) -> Option<FetchTicket> {
        self.scroll.height = height;
        if width != self.viewport_width {
            self.viewport_width = width;
            self.relayout();
        }
        self.check_sentinel()
    }

    pub fn on_scroll(&mut self, viewport: ScrollViewport) -> Option<FetchTicket> {
        self.scroll = viewport;
        self.check_sentinel()
    }

    /// Re-issue whatever failed last. Failures are never retried on their own.
    pub fn retry(&mut self) -> Option<FetchTicket> {
        if self.feed.phase() == FeedPhase::Failed {
            return self.feed.refetch();
        }
        if self.feed.last_error().is_some() {
            return self.feed.fetch_next_page();
        }
        None
    }

    pub fn display(&self) -> GalleryDisplay<'_> {
        if self.feed.phase() == FeedPhase::Idle || self.feed.is_loading() {
            return GalleryDisplay::Loading;
        }
        if self.feed.phase() == FeedPhase::Failed {
            if let Some(error) = self.feed.last_error() {
                return GalleryDisplay::Failed(error);
            }
        }
        if self.feed.groups().is_empty() {
            return GalleryDisplay::Empty;
        }
        GalleryDisplay::Items {
            groups: self.feed.groups(),
            layout: &self.layout,
            refetching: self.feed.is_refetching(),
            show_sentinel: self.feed.has_next_page(),
            error: self.feed.last_error(),
        }
    }

    pub fn context(&self) -> &GalleryContext {
        &self.context
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    pub fn feed(&self) -> &FeedController {
        &self.feed
    }

    pub fn filters(&self) -> FilterSet {
        self.store.get(SCOPE)
    }

    pub fn store(&self) -> &FilterStateStore {
        &self.store
    }

    pub fn layout(&self) -> &MasonryLayout {
        &self.layout
    }

    pub fn cross_posts_excluded(&self) -> bool {
        self.store.get(SCOPE).flag(keys::EXCLUDE_CROSS_POSTS)
    }

    pub fn cross_post_label(&self) -> &'static str {
        if self.cross_posts_excluded() {
            "Show Cross-posts"
        } else {
            "Hide Cross-posts"
        }
    }

    pub fn show_add_actions(&self) -> bool {
        !self.context.viewer_muted
    }

    pub fn add_post_link(&self) -> String {
        links::add_post_link(
            self.context.model_id,
            self.context.selected_version_id,
            &self.context.return_url,
        )
    }

    pub fn add_review_link(&self) -> String {
        links::add_review_link(
            self.context.model_id,
            self.context.selected_version_id,
            &self.context.return_url,
        )
    }

    /// The generation card is pinned only for a selected version of a
    /// model that supports generation
    pub fn static_item(&self) -> Option<StaticItem> {
        let generation = self.context.generation.as_ref()?;
        match (generation.generation_model_id, self.context.selected_version_id) {
            (Some(_), Some(_)) => Some(StaticItem { height: self.config.static_item_height }),
            _ => None,
        }
    }

    /// Where the load-more sentinel starts, one gap below the tallest column
    pub fn sentinel_top(&self) -> f32 {
        if self.layout.is_empty() && self.layout.static_item().is_none() {
            return 0.0;
        }
        self.layout.total_height() + self.config.masonry.gap
    }

    fn relayout(&mut self) {
        self.layout = MasonryLayout::compute(
            self.feed.groups(),
            &self.config.masonry,
            self.viewport_width,
            self.static_item(),
        );
    }

    /// Ask for the next page when the sentinel just became reachable
    fn check_sentinel(&mut self) -> Option<FetchTicket> {
        let visible = self.feed.has_next_page()
            && self.scroll.sees(self.sentinel_top(), self.config.sentinel_margin);
        let condition = !self.feed.is_refetching() && self.feed.last_error().is_none();

        let feed = &mut self.feed;
        self.trigger
            .observe_with(visible, condition, || {
                debug!("sentinel visible, loading next page");
                feed.fetch_next_page()
            })
            .flatten()
    }
}

/// Run a ticket against `source`, returning the ticket with its result
pub async fn fetch<S: QuerySource>(
    source: S,
    ticket: FetchTicket,
) -> (FetchTicket, Result<FeedPage, FetchError>) {
    let result = source.fetch_page(ticket.request.clone(), ticket.options).await;
    (ticket, result)
}
