//! Canvas document and the host interface the replication engine drives.

use crate::shapes::{Shape, ShapeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

/// Boxed future for collaborator calls that complete asynchronously.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback fired after a local mutation has been rendered.
pub type LocalChangeHandler = Box<dyn Fn() + Send + Sync>;

/// Errors raised by a canvas when asked to load state.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("snapshot has {count} shapes, canvas accepts at most {limit}")]
    TooManyShapes { count: usize, limit: usize },
    #[error("canvas rejected snapshot: {0}")]
    Rejected(String),
}

/// Full state of a canvas at one instant: every shape, back to front.
///
/// Serializes as a bare JSON array of shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub shapes: Vec<Shape>,
}

impl Snapshot {
    pub fn new(shapes: Vec<Shape>) -> Self {
        Self { shapes }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter()
    }
}

impl FromIterator<Shape> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Shape>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A canvas document containing all shapes.
#[derive(Debug, Clone, Default)]
pub struct CanvasDocument {
    /// All shapes in the document, keyed by ID.
    pub shapes: HashMap<ShapeId, Shape>,
    /// Z-order of shapes (back to front).
    pub z_order: Vec<ShapeId>,
}

impl CanvasDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape on top. Re-adding an existing id replaces it in place.
    pub fn add_shape(&mut self, shape: Shape) {
        let id = shape.id();
        if self.shapes.insert(id, shape).is_none() {
            self.z_order.push(id);
        }
    }

    pub fn remove_shape(&mut self, id: ShapeId) -> Option<Shape> {
        self.z_order.retain(|&shape_id| shape_id != id);
        self.shapes.remove(&id)
    }

    /// Replace an existing shape. Returns false if the id is unknown.
    pub fn update_shape(&mut self, shape: Shape) -> bool {
        match self.shapes.get_mut(&shape.id()) {
            Some(existing) => {
                *existing = shape;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
        self.z_order.clear();
    }

    pub fn get_shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    /// Shapes in z-order (back to front).
    pub fn shapes_ordered(&self) -> impl Iterator<Item = &Shape> {
        self.z_order.iter().filter_map(|id| self.shapes.get(id))
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn to_snapshot(&self) -> Snapshot {
        self.shapes_ordered().cloned().collect()
    }

    /// Overwrite the whole document with `snapshot`.
    ///
    /// If an id repeats, the later shape wins but keeps the first position.
    pub fn replace_with(&mut self, snapshot: Snapshot) {
        self.clear();
        for shape in snapshot.shapes {
            self.add_shape(shape);
        }
    }
}

/// What the replication engine needs from a drawing canvas.
///
/// Implementations must raise the local-change event after every mutation
/// that should reach other peers, including the one caused by
/// [`CanvasHost::load_state`] completing.
pub trait CanvasHost: Send + Sync {
    /// Serialize the current document.
    fn serialize_state(&self) -> Snapshot;

    /// Replace the whole document. Resolves once the new state is in place.
    fn load_state(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), CanvasError>>;

    /// Register a callback for local changes.
    fn on_local_change(&self, handler: LocalChangeHandler);

    /// Visit every shape mutably; `f` returns whether it changed the shape.
    /// Returns the number of shapes changed.
    fn for_each_shape_mut(&self, f: &mut dyn FnMut(&mut Shape) -> bool) -> usize;
}

/// In-process canvas shared between the UI side and the replication engine.
#[derive(Default)]
pub struct SharedCanvas {
    document: Mutex<CanvasDocument>,
    listeners: RwLock<Vec<LocalChangeHandler>>,
    shape_limit: Option<usize>,
}

impl SharedCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: CanvasDocument) -> Self {
        Self {
            document: Mutex::new(document),
            ..Self::default()
        }
    }

    /// Refuse snapshots with more than `limit` shapes.
    pub fn with_shape_limit(mut self, limit: usize) -> Self {
        self.shape_limit = Some(limit);
        self
    }

    fn doc(&self) -> MutexGuard<'_, CanvasDocument> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener();
        }
    }

    /// Mutate the document as a local edit, then raise the change event.
    pub fn edit<R>(&self, f: impl FnOnce(&mut CanvasDocument) -> R) -> R {
        let result = f(&mut self.doc());
        self.notify();
        result
    }

    pub fn add_shape(&self, shape: Shape) {
        self.edit(|doc| doc.add_shape(shape));
    }

    pub fn remove_shape(&self, id: ShapeId) -> Option<Shape> {
        self.edit(|doc| doc.remove_shape(id))
    }

    pub fn update_shape(&self, shape: Shape) -> bool {
        self.edit(|doc| doc.update_shape(shape))
    }

    pub fn get_shape(&self, id: ShapeId) -> Option<Shape> {
        self.doc().get_shape(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.doc().len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc().is_empty()
    }

    /// Read-only view of the document.
    pub fn read<R>(&self, f: impl FnOnce(&CanvasDocument) -> R) -> R {
        f(&self.doc())
    }
}

impl CanvasHost for SharedCanvas {
    fn serialize_state(&self) -> Snapshot {
        self.doc().to_snapshot()
    }

    fn load_state(&self, snapshot: Snapshot) -> BoxFuture<'_, Result<(), CanvasError>> {
        Box::pin(async move {
            if let Some(limit) = self.shape_limit {
                if snapshot.len() > limit {
                    return Err(CanvasError::TooManyShapes {
                        count: snapshot.len(),
                        limit,
                    });
                }
            }
            self.doc().replace_with(snapshot);
            // The reload renders like any other change.
            self.notify();
            Ok(())
        })
    }

    fn on_local_change(&self, handler: LocalChangeHandler) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    fn for_each_shape_mut(&self, f: &mut dyn FnMut(&mut Shape) -> bool) -> usize {
        let changed = {
            let mut doc = self.doc();
            let CanvasDocument { shapes, z_order } = &mut *doc;
            let mut changed = 0;
            for id in z_order.iter() {
                if let Some(shape) = shapes.get_mut(id) {
                    if f(shape) {
                        changed += 1;
                    }
                }
            }
            changed
        };
        if changed > 0 {
            self.notify();
        }
        changed
    }
}
