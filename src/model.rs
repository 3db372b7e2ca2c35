use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Capped history of raw parameter writes kept by [`RecordingModel`].
const MAX_WRITES: usize = 10_000;

/// The visual model as the engine sees it: an opaque parameter sink with a
/// readiness flag. Staged values become visible on `commit_parameters`.
pub trait ModelParameters: Send + Sync {
    fn is_ready(&self) -> bool;
    fn set_parameter(&self, id: &str, value: f32);
    fn commit_parameters(&self);
}

/// In-memory model used by the demo binary and the tests. Records every
/// write so behavior (mouth range, expression exclusivity) can be asserted
/// after the fact.
#[derive(Debug)]
pub struct RecordingModel {
    ready: AtomicBool,
    staged: Mutex<HashMap<String, f32>>,
    committed: Mutex<HashMap<String, f32>>,
    writes: Mutex<VecDeque<(String, f32)>>,
    commits: AtomicUsize,
}

impl RecordingModel {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            staged: Mutex::new(HashMap::new()),
            committed: Mutex::new(HashMap::new()),
            writes: Mutex::new(VecDeque::with_capacity(256)),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Last committed value of a parameter, if it was ever written.
    pub fn value_of(&self, id: &str) -> Option<f32> {
        self.committed.lock().expect("model lock").get(id).copied()
    }

    /// Every raw value ever staged for `id`, oldest first.
    pub fn writes_for(&self, id: &str) -> Vec<f32> {
        self.writes
            .lock()
            .expect("model lock")
            .iter()
            .filter(|(wid, _)| wid == id)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Default for RecordingModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelParameters for RecordingModel {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn set_parameter(&self, id: &str, value: f32) {
        self.staged
            .lock()
            .expect("model lock")
            .insert(id.to_string(), value);
        let mut writes = self.writes.lock().expect("model lock");
        if writes.len() >= MAX_WRITES {
            writes.pop_front();
        }
        writes.push_back((id.to_string(), value));
    }

    fn commit_parameters(&self) {
        let staged = self.staged.lock().expect("model lock");
        let mut committed = self.committed.lock().expect("model lock");
        for (id, value) in staged.iter() {
            committed.insert(id.clone(), *value);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
    }
}
