//! Listener registry and candidate-to-listener resolution.

use super::types::TreeChangeListener;
use crate::candidate::{Candidate, CandidateNode, ModificationType};
use crate::types::Path;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

struct Registration {
    path: Path,
    listener: Arc<dyn TreeChangeListener>,
    closed: Arc<AtomicBool>,
}

struct RegistryShared {
    registrations: RwLock<HashMap<u64, Registration>>,
    next_id: AtomicU64,
}

/// Registrations for one store instance.
///
/// Dispatch iterates a snapshot of the registration set, so listeners may
/// register or deregister from inside a callback; such changes apply to the
/// next notification pass. A close may race one in-flight delivery.
pub(crate) struct ListenerRegistry {
    shared: Arc<RegistryShared>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        ListenerRegistry {
            shared: Arc::new(RegistryShared {
                registrations: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn register(
        &self,
        path: Path,
        listener: Arc<dyn TreeChangeListener>,
    ) -> ListenerRegistration {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));
        self.shared.registrations.write().insert(
            id,
            Registration {
                path,
                listener,
                closed: closed.clone(),
            },
        );
        ListenerRegistration {
            id,
            closed,
            shared: self.shared.clone(),
        }
    }

    pub fn registration_count(&self) -> usize {
        self.shared.registrations.read().len()
    }

    /// Deliver `candidate` to every registration it intersects.
    pub fn notify(&self, candidate: &Candidate) {
        let targets: Vec<(Path, Arc<dyn TreeChangeListener>, Arc<AtomicBool>)> = {
            let registrations = self.shared.registrations.read();
            registrations
                .values()
                .map(|r| (r.path.clone(), r.listener.clone(), r.closed.clone()))
                .collect()
        };

        for (path, listener, closed) in targets {
            if closed.load(Ordering::Acquire) {
                continue;
            }
            let changes = resolve(candidate, &path);
            if changes.is_empty() {
                continue;
            }
            trace!(path = %path, changes = changes.len(), "dispatching tree change");
            listener.on_tree_changed(&changes);
        }
    }
}

/// Handle for one listener registration. Closing (or dropping) it stops
/// further deliveries; at worst one in-flight delivery may still arrive.
pub struct ListenerRegistration {
    id: u64,
    closed: Arc<AtomicBool>,
    shared: Arc<RegistryShared>,
}

impl ListenerRegistration {
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.shared.registrations.write().remove(&self.id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.close();
    }
}

/// The most specific changed subtrees of `candidate` at or under
/// `registration_path`, each as a candidate rooted at its own path.
fn resolve(candidate: &Candidate, registration_path: &Path) -> Vec<Candidate> {
    if registration_path.contains(candidate.root_path()) {
        let mut out = Vec::new();
        split(candidate.root_node(), candidate.root_path(), &mut out);
        return out;
    }
    if candidate.root_path().is_ancestor_of(registration_path) {
        let Some(rest) = registration_path.strip_prefix(candidate.root_path()) else {
            return Vec::new();
        };
        let mut node = candidate.root_node();
        for segment in rest {
            match node.child(segment) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        let mut out = Vec::new();
        split(node, registration_path, &mut out);
        return out;
    }
    Vec::new()
}

/// Descend through interior nodes to the terminal writes and deletes.
fn split(node: &CandidateNode, path: &Path, out: &mut Vec<Candidate>) {
    match node.modification_type() {
        ModificationType::Unmodified => {}
        ModificationType::Write | ModificationType::Delete => {
            out.push(Candidate::new(path.clone(), node.clone()));
        }
        ModificationType::SubtreeModified
        | ModificationType::Appeared
        | ModificationType::Disappeared => {
            if node.children().is_empty() {
                out.push(Candidate::new(path.clone(), node.clone()));
            } else {
                for (segment, child) in node.children() {
                    split(child, &path.child(segment.clone()), out);
                }
            }
        }
    }
}
