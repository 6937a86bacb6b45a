use std::collections::{HashMap, VecDeque};

/// Proof that a page was asked to paint within a given viewer session.
///
/// Results carrying a ticket from an older generation are stale and get dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTicket {
    pub page: u32,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPriority {
    /// Page intersects the viewport.
    Visible,
    /// Page is only inside the lookahead margin.
    Margin,
}

impl RenderPriority {
    fn rank(self) -> u8 {
        match self {
            Self::Visible => 0,
            Self::Margin => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderJob {
    pub ticket: RenderTicket,
    pub priority: RenderPriority,
}

#[derive(Debug, Default)]
pub struct RenderQueue {
    generation: u64,
    pending: HashMap<u32, RenderJob>,
    order: VecDeque<u32>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new session; everything queued for the previous one is dropped.
    pub fn begin_generation(&mut self) -> u64 {
        self.generation += 1;
        self.pending.clear();
        self.order.clear();
        self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn enqueue(&mut self, ticket: RenderTicket, priority: RenderPriority) {
        if ticket.generation != self.generation {
            log::debug!("ignoring render ticket for page {} from old session", ticket.page);
            return;
        }

        match self.pending.get_mut(&ticket.page) {
            Some(existing) => {
                if priority.rank() < existing.priority.rank() {
                    existing.priority = priority;
                }
            }
            None => {
                self.pending.insert(ticket.page, RenderJob { ticket, priority });
                self.order.push_back(ticket.page);
            }
        }
    }

    pub fn pop_next(&mut self) -> Option<RenderJob> {
        let mut best: Option<RenderJob> = None;

        for page in &self.order {
            let Some(job) = self.pending.get(page).copied() else {
                continue;
            };

            match best {
                Some(current) if job.priority.rank() >= current.priority.rank() => {}
                _ => best = Some(job),
            }

            if matches!(best, Some(RenderJob { priority: RenderPriority::Visible, .. })) {
                break;
            }
        }

        let job = best?;
        self.pending.remove(&job.ticket.page);
        if let Some(index) = self.order.iter().position(|page| *page == job.ticket.page) {
            self.order.remove(index);
        }

        Some(job)
    }

    pub fn drain(&mut self) -> Vec<RenderJob> {
        let mut jobs = Vec::with_capacity(self.pending.len());
        while let Some(job) = self.pop_next() {
            jobs.push(job);
        }
        jobs
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
