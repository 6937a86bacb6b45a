//! Viewer state machine.
//!
//! ```text
//! Closed --open--> Loading --ok--> Ready --close--> Closed
//!                     |
//!                     +--err--> Error --retry--> Loading
//!                                 |
//!                                 +--close--> Closed
//! ```
//!
//! The controller owns the decoded document handle, the placeholders and the
//! tracker for one reading session. Time is passed in by the caller so the
//! debounce and jump-settle windows follow the host's event loop.

use crate::config::{fit_width_scale, ViewerConfig, ZoomMode, MAX_SCALE, MIN_SCALE};
use crate::layout::ScrollLayout;
use crate::lazy_page::{PageState, Placeholder};
use crate::render_queue::{RenderPriority, RenderQueue, RenderTicket};
use crate::tracker::ViewportTracker;
use crate::{ErrorKind, ViewerError};
use doc_model::{clamp_page, DocumentId};
use doc_store::{Library, ProgressOutcome};
use pdf_engine::{DocumentHandle, PdfEngine, PdfEngineError, RenderRequest, RgbaImage};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    Closed,
    Loading,
    Ready,
    Error(ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    PhaseChanged(ViewerPhase),
    PageChanged { page: u32, page_count: u32 },
    PagePainted { page: u32 },
    PageFailed { page: u32, error: String },
    ProgressSaved { id: DocumentId, page: u32 },
    ProgressSaveFailed { id: DocumentId, page: u32, error: String },
}

struct Session {
    id: DocumentId,
    handle: DocumentHandle,
    page_count: u32,
    current_page: u32,
    scale: f32,
    layout: ScrollLayout,
    placeholders: Vec<Placeholder>,
    tracker: ViewportTracker,
}

impl Session {
    fn placeholder_mut(&mut self, page: u32) -> Option<&mut Placeholder> {
        let index = page.checked_sub(1)? as usize;
        self.placeholders.get_mut(index)
    }

    fn placeholder(&self, page: u32) -> Option<&Placeholder> {
        let index = page.checked_sub(1)? as usize;
        self.placeholders.get(index)
    }
}

pub struct ViewerController<E: PdfEngine> {
    library: Library,
    engine: E,
    config: ViewerConfig,
    phase: ViewerPhase,
    target: Option<DocumentId>,
    session: Option<Session>,
    queue: RenderQueue,
    subscribers: Vec<Sender<ViewerEvent>>,
    outcomes: Option<Receiver<ProgressOutcome>>,
}

impl<E: PdfEngine> ViewerController<E> {
    pub fn new(library: Library, engine: E, config: ViewerConfig) -> Self {
        let outcomes = library
            .progress()
            .subscribe()
            .inspect_err(|err| log::warn!("progress outcomes unavailable: {err}"))
            .ok();

        Self {
            library,
            engine,
            config,
            phase: ViewerPhase::Closed,
            target: None,
            session: None,
            queue: RenderQueue::new(),
            subscribers: Vec::new(),
            outcomes,
        }
    }

    /// Receives every state transition and page event from now on.
    pub fn subscribe(&mut self) -> Receiver<ViewerEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    pub fn phase(&self) -> ViewerPhase {
        self.phase
    }

    pub fn document_id(&self) -> Option<&DocumentId> {
        self.session.as_ref().map(|session| &session.id)
    }

    pub fn current_page(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.current_page)
    }

    pub fn page_count(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.page_count)
    }

    pub fn scale(&self) -> Option<f32> {
        self.session.as_ref().map(|session| session.scale)
    }

    pub fn layout(&self) -> Option<&ScrollLayout> {
        self.session.as_ref().map(|session| &session.layout)
    }

    pub fn page_state(&self, page: u32) -> Option<&PageState> {
        self.session.as_ref()?.placeholder(page).map(|slot| slot.renderer.state())
    }

    pub fn page_surface(&self, page: u32) -> Option<&RgbaImage> {
        self.session.as_ref()?.placeholder(page)?.renderer.surface()
    }

    pub fn render_requests(&self, page: u32) -> u32 {
        self.session
            .as_ref()
            .and_then(|session| session.placeholder(page))
            .map(|slot| slot.renderer.render_requests())
            .unwrap_or(0)
    }

    pub fn pending_renders(&self) -> usize {
        self.queue.len()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Loads `id` and lands on its last read page.
    ///
    /// Any open session is closed first.
    pub fn open(&mut self, id: DocumentId, now: Instant) -> Result<(), ViewerError> {
        if self.session.is_some() {
            self.close();
        }

        self.target = Some(id.clone());
        self.set_phase(ViewerPhase::Loading);

        match self.load(&id) {
            Ok(session) => {
                let (page, page_count) = (session.current_page, session.page_count);
                self.session = Some(session);
                self.set_phase(ViewerPhase::Ready);
                self.emit(ViewerEvent::PageChanged { page, page_count });
                self.refresh(now);
                Ok(())
            }
            Err(err) => {
                log::warn!("failed to open {id}: {err}");
                let kind = err.kind().unwrap_or(ErrorKind::StorageUnavailable);
                self.set_phase(ViewerPhase::Error(kind));
                Err(err)
            }
        }
    }

    /// Re-runs `open` for the document that last failed.
    pub fn retry(&mut self, now: Instant) -> Result<(), ViewerError> {
        let ViewerPhase::Error(kind) = self.phase else {
            return Ok(());
        };
        if kind == ErrorKind::NotFound {
            return Err(ViewerError::NotRetryable(kind));
        }

        let id = self.target.clone().ok_or(ViewerError::NotOpen)?;
        self.open(id, now)
    }

    fn load(&mut self, id: &DocumentId) -> Result<Session, ViewerError> {
        let bytes = self.library.read(id)?;

        // Outstanding progress for this id must land before we read it back.
        if let Err(err) = self.library.progress().flush() {
            log::warn!("could not flush progress before opening {id}: {err}");
        }
        let stored_page = self.library.metadata(id)?.map(|meta| meta.last_page);

        let handle = self.decode(bytes)?;
        let (placeholders, scale) = match self.build_placeholders(handle) {
            Ok(built) => built,
            Err(err) => {
                self.release(handle);
                return Err(ViewerError::DecodeFailure(err));
            }
        };
        let page_count = placeholders.len() as u32;

        let start_page = clamp_page(i64::from(stored_page.unwrap_or(1)), page_count);
        if let Some(stored) = stored_page.filter(|stored| *stored != start_page) {
            log::debug!("clamping stored page {stored} of {id} to {start_page}");
            self.persist(id, start_page);
        }

        let mut layout = layout_for(&self.config, &placeholders);
        layout.scroll_to_page(start_page);

        let mut session = Session {
            id: id.clone(),
            handle,
            page_count,
            current_page: start_page,
            scale,
            layout,
            placeholders,
            tracker: ViewportTracker::new(&self.config),
        };
        let generation = self.queue.begin_generation();
        for slot in &mut session.placeholders {
            slot.renderer.mount();
        }
        session.tracker.attach(&mut session.placeholders, start_page);
        session.tracker.rebase(&session.layout.intersections());

        log::debug!(
            "opened {id} at page {start_page}/{page_count}, scale {scale:.2}, render generation {generation}"
        );
        Ok(session)
    }

    fn decode(&mut self, bytes: Vec<u8>) -> Result<DocumentHandle, ViewerError> {
        match self.engine.open(bytes.clone()) {
            Ok(handle) => Ok(handle),
            Err(first) => {
                log::debug!("decode failed ({first}), retrying once");
                self.engine.open(bytes).map_err(ViewerError::DecodeFailure)
            }
        }
    }

    /// Reserves one placeholder per page at the opening scale.
    fn build_placeholders(
        &self,
        handle: DocumentHandle,
    ) -> Result<(Vec<Placeholder>, f32), PdfEngineError> {
        let page_count = self.engine.page_count(handle)?;
        if page_count == 0 {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        let sizes = (0..page_count)
            .map(|index| self.engine.page_size(handle, index))
            .collect::<Result<Vec<_>, _>>()?;
        let scale = match self.config.zoom_mode {
            ZoomMode::Fixed => self.config.render_scale,
            ZoomMode::FitWidth => fit_width_scale(self.config.viewport_width_px, sizes[0].width_pt),
        };

        let placeholders = sizes
            .iter()
            .zip(1..)
            .map(|(size, page)| {
                Placeholder::new(page, size.height_pt, scale, self.config.min_placeholder_height_px)
            })
            .collect();
        Ok((placeholders, scale))
    }

    /// Lays the document out again at `scale`, clamped to
    /// [`MIN_SCALE`]..=[`MAX_SCALE`], keeping the current page in view. Every
    /// page paints again at the new size. Returns the applied scale, or `None`
    /// when nothing changed.
    pub fn set_scale(&mut self, scale: f32, now: Instant) -> Option<f32> {
        if !scale.is_finite() {
            return None;
        }
        let scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        let session = self.session.as_mut()?;
        if (session.scale - scale).abs() < f32::EPSILON {
            return None;
        }

        let generation = self.queue.begin_generation();
        session.scale = scale;
        for slot in &mut session.placeholders {
            slot.rescale(scale, self.config.min_placeholder_height_px);
        }
        session.layout = layout_for(&self.config, &session.placeholders);
        session.layout.scroll_to_page(session.current_page);
        session.tracker.rebase(&session.layout.intersections());
        log::debug!(
            "rescaled {} to {scale:.2} at page {}, render generation {generation}",
            session.id,
            session.current_page
        );

        self.refresh(now);
        Some(scale)
    }

    /// Changes the scale by `delta`; see [`ViewerController::set_scale`].
    pub fn zoom(&mut self, delta: f32, now: Instant) -> Option<f32> {
        let current = self.scale()?;
        self.set_scale(current + delta, now)
    }

    /// User scroll. Returns the new current page if it changed.
    pub fn scroll_to(&mut self, offset_px: f32, now: Instant) -> Option<u32> {
        let session = self.session.as_mut()?;
        session.layout.set_scroll_offset(offset_px);
        self.refresh(now)
    }

    /// Programmatic navigation. Returns the clamped target, or `None` when
    /// there is nothing to do.
    pub fn goto_page(&mut self, page: i64, now: Instant) -> Option<u32> {
        let session = self.session.as_mut()?;
        let target = clamp_page(page, session.page_count);
        if target == session.current_page {
            return None;
        }

        session.tracker.lock_for_jump(target, now);
        session.layout.scroll_to_page(target);
        session.current_page = target;
        let page_count = session.page_count;

        self.emit(ViewerEvent::PageChanged { page: target, page_count });
        self.refresh(now);
        Some(target)
    }

    pub fn next_page(&mut self, now: Instant) -> Option<u32> {
        let current = self.current_page()?;
        self.goto_page(i64::from(current) + 1, now)
    }

    pub fn prev_page(&mut self, now: Instant) -> Option<u32> {
        let current = self.current_page()?;
        self.goto_page(i64::from(current) - 1, now)
    }

    /// Scroll-end signal from the host; ends the jump lock early.
    pub fn scroll_settled(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.tracker.scroll_settled(now);
        }
    }

    /// Advances timers: hands settled page changes to the progress writer and
    /// reports write outcomes.
    pub fn tick(&mut self, now: Instant) {
        let due = self
            .session
            .as_mut()
            .and_then(|session| session.tracker.poll(now).map(|page| (session.id.clone(), page)));
        if let Some((id, page)) = due {
            self.persist(&id, page);
        }

        let outcomes: Vec<_> = match &self.outcomes {
            Some(receiver) => receiver.try_iter().collect(),
            None => Vec::new(),
        };
        let current = self.session.as_ref().map(|session| session.id.clone());

        for outcome in outcomes {
            let id = match &outcome {
                ProgressOutcome::Saved { id, .. }
                | ProgressOutcome::Missing { id, .. }
                | ProgressOutcome::Failed { id, .. } => id,
            };
            if current.as_ref() != Some(id) {
                continue;
            }

            match outcome {
                ProgressOutcome::Saved { id, page } => {
                    self.emit(ViewerEvent::ProgressSaved { id, page });
                }
                ProgressOutcome::Missing { id, page } => {
                    log::debug!("progress for {id} (page {page}) had no record to update");
                }
                ProgressOutcome::Failed { id, page, error } => {
                    self.emit(ViewerEvent::ProgressSaveFailed { id, page, error });
                }
            }
        }
    }

    fn persist(&mut self, id: &DocumentId, page: u32) {
        match self.library.record_progress(id, page) {
            Ok(Some(seq)) => log::debug!("queued page {page} for {id} (seq {seq})"),
            Ok(None) => log::debug!("{id} is being deleted; not saving page {page}"),
            Err(err) => {
                log::warn!("failed to queue page {page} for {id}: {err}");
                self.emit(ViewerEvent::ProgressSaveFailed {
                    id: id.clone(),
                    page,
                    error: err.to_string(),
                });
            }
        }
    }

    /// Feeds the current geometry to both observers.
    fn refresh(&mut self, now: Instant) -> Option<u32> {
        let session = self.session.as_mut()?;
        let margin = self.config.proximity_margin_px;
        let generation = self.queue.generation();

        for slot in &mut session.placeholders {
            let page = slot.page();
            let near = session.layout.within_margin(page, margin);
            if let Some(ticket) = slot.renderer.on_proximity(near, generation) {
                let priority = if session.layout.intersection_ratio(page) > 0.0 {
                    RenderPriority::Visible
                } else {
                    RenderPriority::Margin
                };
                self.queue.enqueue(ticket, priority);
            }
        }

        let batch = session.layout.intersections();
        let change = session.tracker.observe(&batch, now)?;
        session.current_page = change.page;
        let page_count = session.page_count;

        self.emit(ViewerEvent::PageChanged { page: change.page, page_count });
        Some(change.page)
    }

    /// Takes queued render requests for hosts that paint off the event loop.
    /// Results come back through [`ViewerController::complete_render`].
    pub fn take_render_tickets(&mut self) -> Vec<RenderTicket> {
        if self.session.is_none() {
            return Vec::new();
        }
        self.queue.drain().into_iter().map(|job| job.ticket).collect()
    }

    /// Paints every queued page through the engine. Returns how many painted.
    pub fn render_pending(&mut self) -> usize {
        let mut painted = 0;
        for ticket in self.take_render_tickets() {
            if self.render_ticket(ticket).is_ok_and(|done| done) {
                painted += 1;
            }
        }
        painted
    }

    /// Renders one ticket now. A failure is confined to that page.
    pub fn render_ticket(&mut self, ticket: RenderTicket) -> Result<bool, ViewerError> {
        let session = self.session.as_ref().ok_or(ViewerError::NotOpen)?;
        let (handle, scale) = (session.handle, session.scale);
        let request = RenderRequest { page_index: ticket.page.saturating_sub(1), scale };

        match self.engine.render_page(handle, request) {
            Ok(image) => Ok(self.complete_render(ticket, Ok(image))),
            Err(source) => {
                self.complete_render(ticket, Err(source.to_string()));
                Err(ViewerError::RenderFailure { page: ticket.page, source })
            }
        }
    }

    /// Applies a render result. Results for closed sessions, other
    /// generations or pages no longer awaiting paint are dropped.
    pub fn complete_render(&mut self, ticket: RenderTicket, result: Result<RgbaImage, String>) -> bool {
        let Some(session) = self.session.as_mut() else {
            log::debug!("dropping render of page {} after close", ticket.page);
            return false;
        };
        if ticket.generation != self.queue.generation() {
            log::debug!("dropping render of page {} from an old session", ticket.page);
            return false;
        }
        let Some(slot) = session.placeholder_mut(ticket.page) else {
            return false;
        };

        match result {
            Ok(image) => {
                if !slot.renderer.complete(ticket, image) {
                    return false;
                }
                self.emit(ViewerEvent::PagePainted { page: ticket.page });
                true
            }
            Err(error) => {
                if slot.renderer.fail(ticket, error.clone()) {
                    log::warn!("page {} failed to render: {error}", ticket.page);
                    self.emit(ViewerEvent::PageFailed { page: ticket.page, error });
                }
                false
            }
        }
    }

    /// Re-arms a failed page and lets it request a render if it is in range.
    pub fn retry_page(&mut self, page: u32, now: Instant) -> bool {
        let retried = self
            .session
            .as_mut()
            .and_then(|session| session.placeholder_mut(page))
            .is_some_and(|slot| slot.renderer.retry());
        if retried {
            self.refresh(now);
        }
        retried
    }

    /// Tears the session down. Pending debounced writes are discarded.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.tracker.detach(&mut session.placeholders);
            for slot in &mut session.placeholders {
                slot.renderer.unmount();
            }
            self.queue.begin_generation();
            self.release(session.handle);
            log::debug!("closed {}", session.id);
        }

        self.target = None;
        if self.phase != ViewerPhase::Closed {
            self.set_phase(ViewerPhase::Closed);
        }
    }

    fn release(&mut self, handle: DocumentHandle) {
        if let Err(err) = self.engine.close(handle) {
            log::warn!("failed to release document handle {}: {err}", handle.raw());
        }
    }

    fn set_phase(&mut self, phase: ViewerPhase) {
        log::debug!("viewer {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.emit(ViewerEvent::PhaseChanged(phase));
    }

    fn emit(&mut self, event: ViewerEvent) {
        self.subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

fn layout_for(config: &ViewerConfig, placeholders: &[Placeholder]) -> ScrollLayout {
    let heights = placeholders.iter().map(|slot| slot.reserved_height_px).collect();
    ScrollLayout::new(config.viewport_height_px, config.page_spacing_px, heights)
}

impl<E: PdfEngine> Drop for ViewerController<E> {
    fn drop(&mut self) {
        self.close();
    }
}
