use iced::widget::{button, column, container, pick_list, row, scrollable, text, Column, Row};
use iced::{window, Alignment, Element, Length, Size, Subscription, Task, Theme};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use post_gallery::config::{self, GalleryConfig};
use post_gallery::query::FeedPage;
use post_gallery::state::feed::FetchTicket;
use post_gallery::state::filters::{FilterStateStore, ImageSort, MetricPeriod};
use post_gallery::state::library::{Catalog, CatalogSource};
use post_gallery::ui::card;
use post_gallery::ui::gallery::{self, GalleryContext, GalleryDisplay, GalleryView, GenerationOptions, ModelVersion};
use post_gallery::ui::viewport::ScrollViewport;
use post_gallery::FetchError;

/// Model whose gallery the demo window shows
const DEMO_MODEL_ID: i64 = 12;
const DEMO_POST_COUNT: usize = 240;

/// Main application state
struct PostGallery {
    gallery: GalleryView,
    /// Query source the gallery's tickets run against
    source: CatalogSource,
    /// Status message to display to the user
    status: String,
    /// Where filter selections are saved, and the revision last written
    filters_path: Option<PathBuf>,
    saved_revision: u64,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// A page request finished (successfully or not)
    PageLoaded(FetchTicket, Result<FeedPage, FetchError>),
    SortSelected(ImageSort),
    PeriodSelected(MetricPeriod),
    ToggleCrossPosts,
    Scrolled(scrollable::Viewport),
    Resized(Size),
    Retry,
    /// Navigation is handled by the host; the demo only shows the target
    OpenLink(String),
}

impl PostGallery {
    /// Create a new instance of the application
    fn new(config: GalleryConfig) -> (Self, Task<Message>) {

        // If this fails, we panic because the app cannot function without its catalog
        let db_path = config::default_database_path()
            .expect("Could not determine user data directory");
        let mut catalog = Catalog::open(&db_path)
            .expect("Failed to initialize catalog. Check permissions and disk space.");

        if catalog.post_count().unwrap_or(0) == 0 {
            catalog
                .seed_demo(DEMO_MODEL_ID, DEMO_POST_COUNT)
                .expect("Failed to seed demo posts");
        }
        let post_count = catalog.post_count().unwrap_or(0);
        info!(post_count, "🎨 Post gallery initialized");

        let context = GalleryContext {
            model_id: DEMO_MODEL_ID,
            model_versions: vec![
                ModelVersion { id: DEMO_MODEL_ID * 10, name: "v1.0".to_string() },
                ModelVersion { id: DEMO_MODEL_ID * 10 + 1, name: "v2.0".to_string() },
            ],
            selected_version_id: Some(DEMO_MODEL_ID * 10),
            generation: Some(GenerationOptions {
                generation_model_id: Some(DEMO_MODEL_ID),
                include_editing_actions: false,
            }),
            return_url: format!("/models/{}", DEMO_MODEL_ID),
            ..GalleryContext::default()
        };

        let filters_path = config::default_filters_path();
        let store = match filters_path.as_deref().map(config::load_filters) {
            Some(Ok(store)) => store,
            Some(Err(err)) => {
                warn!(%err, "⚠️  Ignoring unreadable filter selections");
                FilterStateStore::new()
            }
            None => FilterStateStore::new(),
        };

        let mut gallery = GalleryView::new(context, store, config);
        let source = catalog.source();
        let first = gallery.mount();
        let saved_revision = gallery.store().revision(gallery::SCOPE);

        let app = PostGallery {
            gallery,
            source,
            status: format!("{} posts in catalog.", post_count),
            filters_path,
            saved_revision,
        };
        let task = app.run(Some(first));
        (app, task)
    }

    /// Turn a ticket into a background query
    fn run(&self, ticket: Option<FetchTicket>) -> Task<Message> {
        match ticket {
            Some(ticket) => Task::perform(gallery::fetch(self.source.clone(), ticket), |(ticket, result)| {
                Message::PageLoaded(ticket, result)
            }),
            None => Task::none(),
        }
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        let ticket = match message {
            Message::PageLoaded(ticket, result) => self.gallery.on_page(&ticket, result).1,
            Message::SortSelected(sort) => self.gallery.set_sort(sort),
            Message::PeriodSelected(period) => self.gallery.set_period(period),
            Message::ToggleCrossPosts => self.gallery.toggle_cross_posts(),
            Message::Scrolled(viewport) => self.gallery.on_scroll(ScrollViewport::new(
                viewport.absolute_offset().y,
                viewport.bounds().height,
            )),
            Message::Resized(size) => {
                let width = self.gallery.config().grid_width(size.width);
                self.gallery.on_resize(width, size.height)
            }
            Message::Retry => self.gallery.retry(),
            Message::OpenLink(link) => {
                info!(%link, "➡️  Navigation requested");
                self.status = format!("Would navigate to {}", link);
                None
            }
        };
        self.save_filters();
        self.run(ticket)
    }

    /// Write filter selections to disk when they changed since the last write
    fn save_filters(&mut self) {
        let revision = self.gallery.store().revision(gallery::SCOPE);
        if revision == self.saved_revision {
            return;
        }
        self.saved_revision = revision;
        if let Some(path) = &self.filters_path {
            if let Err(err) = config::save_filters(self.gallery.store(), path) {
                warn!(%err, "⚠️  Could not save filter selections");
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let filters = self.gallery.filters();

        let mut title = row![text("Gallery").size(32)].spacing(12).align_y(Alignment::End);
        if self.gallery.show_add_actions() {
            title = title
                .push(button("Add Post").on_press(Message::OpenLink(self.gallery.add_post_link())))
                .push(button("Add Review").on_press(Message::OpenLink(self.gallery.add_review_link())));
        }

        let mut controls = row![
            pick_list(ImageSort::ALL, filters.sort(), Message::SortSelected),
            pick_list(MetricPeriod::ALL, filters.period(), Message::PeriodSelected),
            button(text(self.gallery.cross_post_label())).on_press(Message::ToggleCrossPosts),
        ]
        .spacing(8)
        .align_y(Alignment::Center);
        if let GalleryDisplay::Items { refetching: true, .. } = self.gallery.display() {
            controls = controls.push(text("Refreshing…").size(12));
        }

        column![title, controls, self.body(), text(&self.status).size(14)]
            .spacing(16)
            .padding(self.gallery.config().padding)
            .into()
    }

    fn body(&self) -> Element<Message> {
        match self.gallery.display() {
            GalleryDisplay::Loading => container(text("Loading…"))
                .width(Length::Fill)
                .height(Length::Fixed(200.0))
                .center_x(Length::Fill)
                .center_y(Length::Fixed(200.0))
                .into(),
            GalleryDisplay::Failed(error) => column![
                text("Failed to load the gallery").size(24),
                text(error.to_string()),
                button("Retry").on_press(Message::Retry),
            ]
            .spacing(12)
            .align_x(Alignment::Center)
            .width(Length::Fill)
            .into(),
            GalleryDisplay::Empty => column![
                text("No results found").size(32),
                text("Try adjusting your search or filters to find what you're looking for"),
            ]
            .spacing(8)
            .align_x(Alignment::Center)
            .width(Length::Fill)
            .into(),
            GalleryDisplay::Items { groups, layout, show_sentinel, error, .. } => {
                let spacing = self.gallery.config().masonry.gap;
                let card_width = (layout.column_width() - spacing).max(1.0);

                let mut columns: Vec<Column<Message>> = layout
                    .columns()
                    .into_iter()
                    .map(|indices| {
                        let cards = indices.into_iter().map(|i| {
                            let (_, placement) = &layout.placements()[i];
                            card::view(&groups[i], placement, card_width)
                        });
                        Column::with_children(cards).spacing(spacing)
                    })
                    .collect();

                if let (Some(pinned), Some(first)) = (layout.static_item(), columns.first_mut()) {
                    let editing = self
                        .gallery
                        .context()
                        .generation
                        .as_ref()
                        .is_some_and(|options| options.include_editing_actions);
                    let card = card::generation_card(pinned.height, card_width, editing);
                    *first = Column::new()
                        .push(card)
                        .push(std::mem::replace(first, Column::new()))
                        .spacing(spacing);
                }

                let grid = Row::with_children(columns.into_iter().map(Element::from)).spacing(spacing);

                let mut content = Column::new().spacing(spacing).push(grid);
                if let Some(error) = error {
                    content = content.push(
                        row![text(format!("Could not load more: {}", error)), button("Retry").on_press(Message::Retry)]
                            .spacing(8),
                    );
                } else if show_sentinel {
                    content = content.push(
                        container(text("Loading more…"))
                            .width(Length::Fill)
                            .height(Length::Fixed(36.0))
                            .center_x(Length::Fill),
                    );
                }

                scrollable(content)
                    .on_scroll(Message::Scrolled)
                    .height(Length::Fill)
                    .into()
            }
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        window::resize_events().map(|(_id, size)| Message::Resized(size))
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::load();
    let window_size = Size::new(config.initial_viewport_width, config.initial_viewport_height);

    iced::application("Post Gallery", PostGallery::update, PostGallery::view)
        .subscription(PostGallery::subscription)
        .theme(PostGallery::theme)
        .window_size(window_size)
        .centered()
        .run_with(move || PostGallery::new(config))
}
