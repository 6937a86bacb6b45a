//! Per-page deferred painting.
//!
//! A page starts as a sized placeholder and paints itself once, the first
//! time it comes within the lookahead margin of the viewport. After painting
//! it stops watching the viewport for good.

use crate::render_queue::RenderTicket;
use pdf_engine::RgbaImage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Unmounted,
    Pending,
    /// A render request is out; only the matching ticket may complete it.
    Rendering(RenderTicket),
    Rendered { width: u32, height: u32 },
    /// Painting failed; the page shows a retry affordance.
    Failed(String),
}

#[derive(Debug)]
pub struct LazyPage {
    page: u32,
    state: PageState,
    observing: bool,
    surface: Option<RgbaImage>,
    requests: u32,
}

impl LazyPage {
    pub fn new(page: u32) -> Self {
        Self { page, state: PageState::Unmounted, observing: false, surface: None, requests: 0 }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self.state, PageState::Rendered { .. })
    }

    pub fn surface(&self) -> Option<&RgbaImage> {
        self.surface.as_ref()
    }

    /// Number of render requests this page has issued.
    pub fn render_requests(&self) -> u32 {
        self.requests
    }

    pub fn mount(&mut self) {
        if self.state == PageState::Unmounted {
            self.state = PageState::Pending;
            self.observing = true;
        }
    }

    /// Feeds one proximity observation. Returns a ticket the first time a
    /// pending page enters the margin.
    pub fn on_proximity(&mut self, in_margin: bool, generation: u64) -> Option<RenderTicket> {
        if !self.observing || !in_margin || self.state != PageState::Pending {
            return None;
        }

        let ticket = RenderTicket { page: self.page, generation };
        self.state = PageState::Rendering(ticket);
        self.requests += 1;
        Some(ticket)
    }

    /// Paints `image` if `ticket` is the outstanding request. Stale or
    /// duplicate completions are dropped and return `false`.
    pub fn complete(&mut self, ticket: RenderTicket, image: RgbaImage) -> bool {
        if self.state != PageState::Rendering(ticket) {
            log::debug!("dropping stale render for page {}", self.page);
            return false;
        }

        let (width, height) = image.dimensions();
        self.surface = Some(image);
        self.state = PageState::Rendered { width, height };
        self.observing = false;
        true
    }

    pub fn fail(&mut self, ticket: RenderTicket, error: String) -> bool {
        if self.state != PageState::Rendering(ticket) {
            return false;
        }

        self.state = PageState::Failed(error);
        self.observing = false;
        true
    }

    /// Re-arms a failed page.
    pub fn retry(&mut self) -> bool {
        if !matches!(self.state, PageState::Failed(_)) {
            return false;
        }

        self.state = PageState::Pending;
        self.observing = true;
        true
    }

    /// Stops observing and drops the painted surface.
    pub fn unmount(&mut self) {
        self.state = PageState::Unmounted;
        self.observing = false;
        self.surface = None;
    }
}

/// Reserved slot for one page in the scroll container.
///
/// The slot carries two independent observers: its own [`LazyPage`] and at
/// most one viewport tracker, identified by `tracked_by`.
#[derive(Debug)]
pub struct Placeholder {
    pub reserved_height_px: f32,
    pub renderer: LazyPage,
    natural_height_pt: f32,
    pub(crate) tracked_by: Option<u64>,
}

impl Placeholder {
    pub fn new(page: u32, natural_height_pt: f32, scale: f32, min_height_px: f32) -> Self {
        Self {
            reserved_height_px: reserved_height(natural_height_pt, scale, min_height_px),
            renderer: LazyPage::new(page),
            natural_height_pt,
            tracked_by: None,
        }
    }

    /// Re-reserves the slot for `scale` and drops the painted surface so the
    /// page paints again at the new size. The tracker claim is kept.
    pub fn rescale(&mut self, scale: f32, min_height_px: f32) {
        self.reserved_height_px = reserved_height(self.natural_height_pt, scale, min_height_px);
        self.renderer.unmount();
        self.renderer.mount();
    }

    pub fn page(&self) -> u32 {
        self.renderer.page()
    }

    pub fn tracked_by(&self) -> Option<u64> {
        self.tracked_by
    }
}

fn reserved_height(natural_height_pt: f32, scale: f32, min_height_px: f32) -> f32 {
    (natural_height_pt * scale).round().max(min_height_px)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> RgbaImage {
        RgbaImage::new(10, 20)
    }

    fn mounted(page: u32) -> LazyPage {
        let mut lazy = LazyPage::new(page);
        lazy.mount();
        lazy
    }

    #[test]
    fn unmounted_page_ignores_proximity() {
        let mut lazy = LazyPage::new(1);
        assert_eq!(lazy.on_proximity(true, 1), None);
        assert_eq!(lazy.state(), &PageState::Unmounted);
    }

    #[test]
    fn pending_page_waits_for_margin() {
        let mut lazy = mounted(3);

        assert_eq!(lazy.on_proximity(false, 1), None);
        assert_eq!(lazy.state(), &PageState::Pending);

        let ticket = lazy.on_proximity(true, 1).expect("ticket expected");
        assert_eq!(ticket, RenderTicket { page: 3, generation: 1 });
    }

    #[test]
    fn rendered_page_never_requests_again() {
        let mut lazy = mounted(2);
        let ticket = lazy.on_proximity(true, 1).expect("ticket expected");
        assert!(lazy.complete(ticket, image()));

        for _ in 0..5 {
            assert_eq!(lazy.on_proximity(false, 1), None);
            assert_eq!(lazy.on_proximity(true, 1), None);
        }

        assert_eq!(lazy.render_requests(), 1);
        assert_eq!(lazy.state(), &PageState::Rendered { width: 10, height: 20 });
        assert!(!lazy.is_observing());
    }

    #[test]
    fn in_flight_page_does_not_issue_second_ticket() {
        let mut lazy = mounted(2);
        lazy.on_proximity(true, 1).expect("ticket expected");

        assert_eq!(lazy.on_proximity(true, 1), None);
        assert_eq!(lazy.render_requests(), 1);
    }

    #[test]
    fn stale_ticket_is_not_painted() {
        let mut lazy = mounted(4);
        let ticket = lazy.on_proximity(true, 7).expect("ticket expected");

        assert!(!lazy.complete(RenderTicket { page: 4, generation: 6 }, image()));
        assert!(lazy.surface().is_none());

        assert!(lazy.complete(ticket, image()));
        assert!(!lazy.complete(ticket, image()));
    }

    #[test]
    fn failure_is_isolated_and_retryable() {
        let mut lazy = mounted(5);
        let ticket = lazy.on_proximity(true, 1).expect("ticket expected");

        assert!(lazy.fail(ticket, "boom".to_owned()));
        assert_eq!(lazy.state(), &PageState::Failed("boom".to_owned()));
        assert_eq!(lazy.on_proximity(true, 1), None);

        assert!(lazy.retry());
        let retry_ticket = lazy.on_proximity(true, 1).expect("retry ticket expected");
        assert!(lazy.complete(retry_ticket, image()));
        assert!(lazy.is_rendered());
    }

    #[test]
    fn unmount_drops_surface() {
        let mut lazy = mounted(1);
        let ticket = lazy.on_proximity(true, 1).expect("ticket expected");
        lazy.complete(ticket, image());

        lazy.unmount();
        assert!(lazy.surface().is_none());
        assert_eq!(lazy.state(), &PageState::Unmounted);
    }

    #[test]
    fn placeholder_reserves_at_least_minimum_height() {
        assert_eq!(Placeholder::new(1, 100.0, 1.2, 400.0).reserved_height_px, 400.0);
        assert_eq!(Placeholder::new(1, 792.0, 1.2, 400.0).reserved_height_px, 950.0);
    }

    #[test]
    fn rescale_resizes_and_rearms_a_painted_page() {
        let mut slot = Placeholder::new(2, 792.0, 1.0, 100.0);
        slot.renderer.mount();
        let ticket = slot.renderer.on_proximity(true, 1).expect("ticket expected");
        slot.renderer.complete(ticket, image());
        slot.tracked_by = Some(7);

        slot.rescale(2.0, 100.0);

        assert_eq!(slot.reserved_height_px, 1584.0);
        assert_eq!(slot.renderer.state(), &PageState::Pending);
        assert!(slot.renderer.surface().is_none());
        assert_eq!(slot.tracked_by(), Some(7));
        assert!(!slot.renderer.complete(ticket, image()));
        assert!(slot.renderer.on_proximity(true, 2).is_some());
    }
}
