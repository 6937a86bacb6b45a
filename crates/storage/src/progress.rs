//! Background writer for reading-progress updates.
//!
//! Each document id has at most one pending intent. Submitting a new page for
//! an id replaces the pending one, and a single worker thread applies intents
//! one at a time, so the last *submitted* page is the one left on disk even
//! when an older write is still running.

use crate::{SharedStore, StoreError};
use doc_model::DocumentId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Result of applying one progress intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressOutcome {
    Saved { id: DocumentId, page: u32 },
    /// The id had no metadata record (deleted, or never uploaded).
    Missing { id: DocumentId, page: u32 },
    Failed { id: DocumentId, page: u32, error: String },
}

#[derive(Debug, Clone, Copy)]
struct Intent {
    page: u32,
    seq: u64,
}

#[derive(Debug, Default)]
struct Queue {
    pending: HashMap<DocumentId, Intent>,
    order: VecDeque<DocumentId>,
    retired: HashSet<DocumentId>,
    next_seq: u64,
    in_flight: usize,
    shutdown: bool,
}

impl Queue {
    fn pop_next(&mut self) -> Option<(DocumentId, Intent)> {
        while let Some(id) = self.order.pop_front() {
            if let Some(intent) = self.pending.remove(&id) {
                return Some((id, intent));
            }
        }
        None
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight == 0
    }
}

#[derive(Debug, Default)]
struct State {
    queue: Mutex<Queue>,
    changed: Condvar,
    listeners: Mutex<Vec<Sender<ProgressOutcome>>>,
}

impl State {
    fn lock(&self) -> Result<MutexGuard<'_, Queue>, StoreError> {
        self.queue.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Sends `outcome` to every live subscriber, forgetting dropped ones.
    fn publish(&self, outcome: &ProgressOutcome) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|listener| listener.send(outcome.clone()).is_ok());
        }
    }
}

pub struct ProgressWriter {
    state: Arc<State>,
    thread: Option<JoinHandle<()>>,
}

impl ProgressWriter {
    pub fn spawn(store: SharedStore) -> Result<Self, StoreError> {
        let state = Arc::new(State::default());

        let worker_state = Arc::clone(&state);
        let thread = thread::Builder::new()
            .name("readshelf-progress".to_owned())
            .spawn(move || run(store, worker_state))?;

        Ok(Self { state, thread: Some(thread) })
    }

    /// Receives the outcome of every intent applied from now on. Each
    /// subscriber gets its own copy.
    pub fn subscribe(&self) -> Result<Receiver<ProgressOutcome>, StoreError> {
        let (sender, receiver) = mpsc::channel();
        self.state.listeners.lock().map_err(|_| StoreError::Poisoned)?.push(sender);
        Ok(receiver)
    }

    /// Records `page` as the newest intended position for `id`.
    ///
    /// Returns the sequence number assigned to the intent, or `None` when the
    /// id has been retired by a delete.
    pub fn submit(&self, id: &DocumentId, page: u32) -> Result<Option<u64>, StoreError> {
        if page == 0 {
            return Err(StoreError::InvalidPage(page));
        }

        let mut queue = self.state.lock()?;
        if queue.retired.contains(id) {
            log::debug!("dropping progress for retired document {id}");
            return Ok(None);
        }

        queue.next_seq += 1;
        let seq = queue.next_seq;
        if queue.pending.insert(id.clone(), Intent { page, seq }).is_none() {
            queue.order.push_back(id.clone());
        }
        drop(queue);

        self.state.changed.notify_all();
        Ok(Some(seq))
    }

    /// Drops any pending intent for `id`. An intent already being written
    /// finishes; the store's own serialization orders it against a delete.
    pub fn cancel(&self, id: &DocumentId) -> Result<bool, StoreError> {
        let removed = self.state.lock()?.pending.remove(id).is_some();
        Ok(removed)
    }

    /// Cancels pending intents for `id` and refuses new ones until
    /// [`ProgressWriter::revive`].
    pub fn retire(&self, id: &DocumentId) -> Result<(), StoreError> {
        let mut queue = self.state.lock()?;
        queue.pending.remove(id);
        queue.retired.insert(id.clone());
        Ok(())
    }

    /// Accepts intents for `id` again.
    pub fn revive(&self, id: &DocumentId) -> Result<(), StoreError> {
        self.state.lock()?.retired.remove(id);
        Ok(())
    }

    pub fn is_retired(&self, id: &DocumentId) -> Result<bool, StoreError> {
        Ok(self.state.lock()?.retired.contains(id))
    }

    pub fn pending_page(&self, id: &DocumentId) -> Result<Option<u32>, StoreError> {
        Ok(self.state.lock()?.pending.get(id).map(|intent| intent.page))
    }

    /// Blocks until every submitted intent has been applied.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut queue = self.state.lock()?;
        while !queue.is_idle() {
            queue = self.state.changed.wait(queue).map_err(|_| StoreError::Poisoned)?;
        }
        Ok(())
    }
}

impl Drop for ProgressWriter {
    fn drop(&mut self) {
        if let Ok(mut queue) = self.state.queue.lock() {
            queue.shutdown = true;
        }
        self.state.changed.notify_all();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("progress writer thread panicked");
            }
        }
    }
}

fn run(store: SharedStore, state: Arc<State>) {
    loop {
        let (id, intent) = {
            let Ok(mut queue) = state.queue.lock() else {
                return;
            };
            loop {
                if let Some(next) = queue.pop_next() {
                    queue.in_flight += 1;
                    break next;
                }
                if queue.shutdown {
                    return;
                }
                queue = match state.changed.wait(queue) {
                    Ok(queue) => queue,
                    Err(_) => return,
                };
            }
        };

        let outcome = match store.get().and_then(|blob| blob.update_last_page(&id, intent.page)) {
            Ok(true) => {
                log::debug!("saved page {} for {id} (seq {})", intent.page, intent.seq);
                ProgressOutcome::Saved { id, page: intent.page }
            }
            Ok(false) => ProgressOutcome::Missing { id, page: intent.page },
            Err(err) => {
                log::warn!("failed to save page {} for {id}: {err}", intent.page);
                ProgressOutcome::Failed { id, page: intent.page, error: err.to_string() }
            }
        };
        state.publish(&outcome);

        if let Ok(mut queue) = state.queue.lock() {
            queue.in_flight -= 1;
        }
        state.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer_with_doc() -> (SharedStore, ProgressWriter, DocumentId) {
        let store = SharedStore::in_memory();
        let meta = store.get().expect("open").put(None, "a.pdf", b"a").expect("put");
        let writer = ProgressWriter::spawn(store.clone()).expect("spawn writer");
        (store, writer, meta.id)
    }

    fn last_page(store: &SharedStore, id: &DocumentId) -> u32 {
        store.get().expect("open").metadata(id).expect("query").expect("record").last_page
    }

    #[test]
    fn newer_intent_replaces_pending_one() {
        let (store, writer, id) = writer_with_doc();

        writer.submit(&id, 7).expect("submit");
        writer.submit(&id, 2).expect("submit");
        writer.flush().expect("flush");

        assert_eq!(last_page(&store, &id), 2);
    }

    #[test]
    fn sequence_numbers_increase() {
        let (_store, writer, id) = writer_with_doc();

        let first = writer.submit(&id, 3).expect("submit").expect("accepted");
        let second = writer.submit(&id, 4).expect("submit").expect("accepted");
        assert!(second > first);
    }

    #[test]
    fn retired_ids_refuse_new_intents() {
        let (store, writer, id) = writer_with_doc();
        writer.retire(&id).expect("retire");

        assert_eq!(writer.submit(&id, 5).expect("submit"), None);
        writer.flush().expect("flush");
        assert_eq!(last_page(&store, &id), 1);

        writer.revive(&id).expect("revive");
        assert!(writer.submit(&id, 5).expect("submit").is_some());
        writer.flush().expect("flush");
        assert_eq!(last_page(&store, &id), 5);
    }

    #[test]
    fn unknown_id_reports_missing() {
        let (_store, writer, _id) = writer_with_doc();
        let ghost = DocumentId::parse("doc_ghost").expect("valid id");

        let outcomes = writer.subscribe().expect("subscribe");
        writer.submit(&ghost, 3).expect("submit");
        writer.flush().expect("flush");

        let seen: Vec<_> = outcomes.try_iter().collect();
        assert_eq!(seen, vec![ProgressOutcome::Missing { id: ghost, page: 3 }]);
    }

    #[test]
    fn every_subscriber_sees_each_outcome() {
        let (_store, writer, id) = writer_with_doc();
        let first = writer.subscribe().expect("subscribe");
        let second = writer.subscribe().expect("subscribe");
        let dropped = writer.subscribe().expect("subscribe");
        drop(dropped);

        writer.submit(&id, 4).expect("submit");
        writer.flush().expect("flush");

        let saved = ProgressOutcome::Saved { id, page: 4 };
        assert_eq!(first.try_iter().collect::<Vec<_>>(), vec![saved.clone()]);
        assert_eq!(second.try_iter().collect::<Vec<_>>(), vec![saved]);
    }

    #[test]
    fn zero_page_is_rejected_before_queueing() {
        let (_store, writer, id) = writer_with_doc();

        assert!(matches!(writer.submit(&id, 0), Err(StoreError::InvalidPage(0))));
        assert_eq!(writer.pending_page(&id).expect("query"), None);
    }
}
