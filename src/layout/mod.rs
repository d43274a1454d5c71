/// Layout engines for the gallery grid

pub mod masonry;

pub use masonry::{MasonryConfig, MasonryLayout, Placement, StaticItem};
