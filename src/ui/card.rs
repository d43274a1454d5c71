use iced::widget::{column, container, row, text, Space};
use iced::{Element, Length};

use crate::layout::masonry::{representative, Placement};
use crate::state::data::ItemGroup;

/// Card for one item group, sized to its placement
///
/// The image area is a placeholder showing the representative image's
/// dimensions; pixels are the image loader's business, not the gallery's.
pub fn view<'a, M: 'a>(group: &'a ItemGroup, placement: &Placement, width: f32) -> Element<'a, M> {
    let title = match group.post_id {
        Some(post_id) => format!("Post #{}", post_id),
        None => format!("Images {}", group.id()),
    };
    let author = group.username.clone().unwrap_or_else(|| "unknown".to_string());

    let size = representative(group)
        .map(|image| match (image.width, image.height) {
            (Some(w), Some(h)) => format!("{} × {}", w, h),
            _ => "size unknown".to_string(),
        })
        .unwrap_or_default();

    let mut header = row![text(title).size(14), Space::with_width(Length::Fill)];
    if group.is_stack() {
        header = header.push(text(format!("+{}", group.images().len() - 1)).size(12));
    }

    let image_area = container(text(size).size(12))
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .center_y(Length::Fill)
        .style(container::rounded_box);

    container(column![header, image_area, text(author).size(12)].spacing(6))
        .width(Length::Fixed(width))
        .height(Length::Fixed(placement.height))
        .padding(8)
        .style(container::bordered_box)
        .into()
}

/// The pinned generation card
pub fn generation_card<'a, M: 'a>(height: f32, width: f32, with_editing_actions: bool) -> Element<'a, M> {
    let mut content = column![
        text("Create with this model").size(18),
        text("Generate images using the selected version").size(12),
    ]
    .spacing(8);
    if with_editing_actions {
        content = content.push(text("Editing actions enabled").size(12));
    }

    container(content)
        .width(Length::Fixed(width))
        .height(Length::Fixed(height))
        .padding(16)
        .center_y(Length::Fixed(height))
        .style(container::rounded_box)
        .into()
}
