//! Headless model of the scroll container.
//!
//! Pages are stacked vertically, 1-based, separated by a fixed gap. All
//! geometry is in CSS-like pixels of the scroll content.

use std::ops::RangeInclusive;

/// Visible fraction of one page's reserved area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub page: u32,
    pub ratio: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollLayout {
    viewport_height_px: f32,
    scroll_offset_px: f32,
    page_heights_px: Vec<f32>,
    page_spacing_px: f32,
}

impl ScrollLayout {
    pub fn new(viewport_height_px: f32, page_spacing_px: f32, page_heights_px: Vec<f32>) -> Self {
        Self {
            viewport_height_px: viewport_height_px.max(1.0),
            scroll_offset_px: 0.0,
            page_heights_px,
            page_spacing_px: page_spacing_px.max(0.0),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_heights_px.len() as u32
    }

    pub fn viewport_height(&self) -> f32 {
        self.viewport_height_px
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset_px
    }

    pub fn total_height(&self) -> f32 {
        let pages: f32 = self.page_heights_px.iter().sum();
        let gaps = self.page_spacing_px * self.page_heights_px.len().saturating_sub(1) as f32;
        pages + gaps
    }

    pub fn max_scroll(&self) -> f32 {
        (self.total_height() - self.viewport_height_px).max(0.0)
    }

    /// Sets the scroll offset, clamped to the scrollable range.
    pub fn set_scroll_offset(&mut self, offset_px: f32) -> f32 {
        let offset = if offset_px.is_finite() { offset_px } else { 0.0 };
        self.scroll_offset_px = offset.clamp(0.0, self.max_scroll());
        self.scroll_offset_px
    }

    /// Aligns the top of `page` with the top of the viewport (as far as the
    /// content allows) and returns the resulting offset.
    pub fn scroll_to_page(&mut self, page: u32) -> f32 {
        let start = self.page_start(page).unwrap_or(0.0);
        self.set_scroll_offset(start)
    }

    pub fn page_height(&self, page: u32) -> Option<f32> {
        let index = page.checked_sub(1)? as usize;
        self.page_heights_px.get(index).copied()
    }

    pub fn page_start(&self, page: u32) -> Option<f32> {
        let index = page.checked_sub(1)? as usize;
        if index >= self.page_heights_px.len() {
            return None;
        }

        let preceding: f32 = self.page_heights_px[..index].iter().sum();
        Some(preceding + self.page_spacing_px * index as f32)
    }

    fn page_span(&self, page: u32) -> Option<(f32, f32)> {
        let start = self.page_start(page)?;
        Some((start, start + self.page_height(page)?))
    }

    /// Fraction of `page` inside the viewport, 0.0 when off screen.
    pub fn intersection_ratio(&self, page: u32) -> f32 {
        let Some((start, end)) = self.page_span(page) else {
            return 0.0;
        };
        let height = end - start;
        if height <= 0.0 {
            return 0.0;
        }

        let top = self.scroll_offset_px;
        let bottom = top + self.viewport_height_px;
        let overlap = end.min(bottom) - start.max(top);
        (overlap / height).clamp(0.0, 1.0)
    }

    /// Every page currently intersecting the viewport, in page order.
    pub fn intersections(&self) -> Vec<Intersection> {
        self.visible_pages()
            .map(|page| Intersection { page, ratio: self.intersection_ratio(page) })
            .filter(|entry| entry.ratio > 0.0)
            .collect()
    }

    /// True when `page` lies within `margin_px` of the visible viewport.
    pub fn within_margin(&self, page: u32, margin_px: f32) -> bool {
        let Some((start, end)) = self.page_span(page) else {
            return false;
        };

        let top = self.scroll_offset_px - margin_px;
        let bottom = self.scroll_offset_px + self.viewport_height_px + margin_px;
        end > top && start < bottom
    }

    pub fn visible_pages(&self) -> RangeInclusive<u32> {
        if self.page_heights_px.is_empty() {
            return 1..=0;
        }

        let first = self.page_at_offset(self.scroll_offset_px);
        let last = self.page_at_offset(self.scroll_offset_px + self.viewport_height_px);
        first..=last
    }

    fn page_at_offset(&self, offset: f32) -> u32 {
        let mut cursor = 0.0;

        for (index, height) in self.page_heights_px.iter().enumerate() {
            let page_end = cursor + height;
            if offset <= page_end {
                return index as u32 + 1;
            }
            cursor = page_end + self.page_spacing_px;
        }

        self.page_heights_px.len() as u32
    }
}
