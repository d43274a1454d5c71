/// Masonry layout for item groups
///
/// Groups are placed into balanced columns with a greedy shortest-column
/// pass over the feed order. The computation is pure: the same groups,
/// viewport width and configuration always give the same layout, and the
/// whole layout is rebuilt whenever any of them change.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::state::data::{GroupId, Image, ItemGroup};

/// Sizing parameters for the masonry grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasonryConfig {
    /// Target width of a column
    pub column_width: f32,
    /// Upper bound on the number of columns
    pub max_column_count: usize,
    /// Width cap when only one column fits
    pub max_single_column_width: f32,
    /// Image area never grows beyond this height
    pub max_item_height: f32,
    /// Space taken by the card's header and footer
    pub chrome_height: f32,
    /// Extra space for the stacked-cards indicator of multi-image groups
    pub stack_indicator_height: f32,
    /// Used for any image dimension the source did not provide
    pub fallback_dimension: u32,
    /// Vertical space between stacked cards, and between columns
    pub gap: f32,
}

impl Default for MasonryConfig {
    fn default() -> Self {
        Self {
            column_width: 310.0,
            max_column_count: 6,
            max_single_column_width: 450.0,
            max_item_height: 600.0,
            chrome_height: 57.0,
            stack_indicator_height: 8.0,
            fallback_dimension: 450,
            gap: 16.0,
        }
    }
}

impl MasonryConfig {
    /// Number of columns and the width each one renders at
    pub fn columns(&self, viewport_width: f32) -> (usize, f32) {
        if viewport_width.is_nan() || viewport_width <= 0.0 || self.column_width <= 0.0 {
            return (1, self.column_width.max(1.0));
        }
        let fitting = (viewport_width / self.column_width).floor() as usize;
        let count = fitting.clamp(1, self.max_column_count.max(1));
        let width = if count == 1 {
            viewport_width.min(self.max_single_column_width)
        } else {
            viewport_width / count as f32
        };
        (count, width)
    }

    /// Height a group occupies in a column of `column_width`
    pub fn item_height(&self, group: &ItemGroup, column_width: f32) -> f32 {
        let (width, height) = self.representative_size(group);
        let scaled = column_width * height as f32 / width as f32;
        let stack = if group.is_stack() { self.stack_indicator_height } else { 0.0 };
        scaled.min(self.max_item_height) + self.chrome_height + stack
    }

    /// Dimensions of the image that visually dominates the group
    pub fn representative_size(&self, group: &ItemGroup) -> (u32, u32) {
        let known = |value: Option<u32>| value.filter(|&v| v > 0).unwrap_or(self.fallback_dimension);
        match representative(group) {
            Some(image) => (known(image.width), known(image.height)),
            None => (self.fallback_dimension, self.fallback_dimension),
        }
    }
}

/// Portrait-or-square images first, then the tallest; ties keep group order
pub fn representative(group: &ItemGroup) -> Option<&Image> {
    group.images().iter().min_by(|a, b| prominence(a, b))
}

fn prominence(a: &Image, b: &Image) -> Ordering {
    let a_portrait = a.aspect_ratio() < 1.0;
    let b_portrait = b.aspect_ratio() < 1.0;
    b_portrait
        .cmp(&a_portrait)
        .then_with(|| b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)))
}

/// Where a group ended up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub column: usize,
    /// Top edge within the column, gaps included
    pub offset: f32,
    pub height: f32,
}

/// A card pinned to the top of the first column, outside the packing pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticItem {
    pub height: f32,
}

/// Result of a layout pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasonryLayout {
    column_count: usize,
    column_width: f32,
    static_item: Option<Placement>,
    placements: Vec<(GroupId, Placement)>,
    index: HashMap<GroupId, usize>,
    column_heights: Vec<f32>,
}

impl MasonryLayout {
    /// Lay out `groups` in feed order for a viewport of `viewport_width`
    pub fn compute(
        groups: &[ItemGroup],
        config: &MasonryConfig,
        viewport_width: f32,
        static_item: Option<StaticItem>,
    ) -> Self {
        let (column_count, column_width) = config.columns(viewport_width);
        let mut column_heights = vec![0.0_f32; column_count];
        let mut occupied = vec![false; column_count];

        let static_item = static_item.map(|item| {
            column_heights[0] += item.height;
            occupied[0] = true;
            Placement { column: 0, offset: 0.0, height: item.height }
        });

        let mut placements = Vec::with_capacity(groups.len());
        let mut index = HashMap::with_capacity(groups.len());
        for group in groups {
            let column = shortest_column(&column_heights);
            let height = config.item_height(group, column_width);
            let offset = if occupied[column] { column_heights[column] + config.gap } else { 0.0 };
            let placement = Placement { column, offset, height };
            column_heights[column] = offset + height;
            occupied[column] = true;

            index.insert(group.id().clone(), placements.len());
            placements.push((group.id().clone(), placement));
        }

        debug!(groups = groups.len(), column_count, column_width, "masonry layout computed");

        Self {
            column_count,
            column_width,
            static_item,
            placements,
            index,
            column_heights,
        }
    }

    pub fn get(&self, id: &GroupId) -> Option<&Placement> {
        self.index.get(id).map(|&i| &self.placements[i].1)
    }

    /// Placements in feed order
    pub fn placements(&self) -> &[(GroupId, Placement)] {
        &self.placements
    }

    /// Feed indices per column, top to bottom
    pub fn columns(&self) -> Vec<Vec<usize>> {
        let mut columns = vec![Vec::new(); self.column_count];
        for (i, (_, placement)) in self.placements.iter().enumerate() {
            columns[placement.column].push(i);
        }
        columns
    }

    pub fn static_item(&self) -> Option<&Placement> {
        self.static_item.as_ref()
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn column_width(&self) -> f32 {
        self.column_width
    }

    /// Bottom edge of each column's last card
    pub fn column_heights(&self) -> &[f32] {
        &self.column_heights
    }

    /// Height of the tallest column
    pub fn total_height(&self) -> f32 {
        self.column_heights.iter().copied().fold(0.0, f32::max)
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

/// Lowest running height, first index on ties
fn shortest_column(heights: &[f32]) -> usize {
    let mut best = 0;
    for (i, &height) in heights.iter().enumerate().skip(1) {
        if height < heights[best] {
            best = i;
        }
    }
    best
}
