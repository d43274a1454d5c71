/// User interface module
///
/// - `gallery.rs` - composition root wiring filters, feed, layout and trigger
/// - `viewport.rs` - sentinel visibility and load-more trigger
/// - `card.rs` - iced widgets for item cards

pub mod card;
pub mod gallery;
pub mod viewport;
