//! Component tokens and the cancellable work they own.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use tokio::task::AbortHandle;
use uuid::Uuid;

/// Identity of one registered component instance.
///
/// Tokens are minted at registration, never at definition, so every mount
/// of the same component gets its own registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentToken(Uuid);

impl ComponentToken {
    /// Mint a fresh token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

}

impl Default for ComponentToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComponentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four kinds of pending work a component can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Timeout,
    Interval,
    AnimationFrame,
    Observer,
}

/// A reference to one piece of pending work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    kind: HandleKind,
    id: u64,
}

impl Handle {
    pub(crate) fn new(kind: HandleKind, id: u64) -> Self {
        Self { kind, id }
    }

    /// What sort of work this handle refers to.
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Manager-wide id; later handles have larger ids.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Something watching the environment (resize, intersection) that must be
/// disconnected on teardown.
pub trait Observer: Send {
    /// Stop observing. Called at most once, from teardown or `cancel`.
    fn disconnect(&mut self);
}

impl<F> Observer for F
where
    F: FnMut() + Send,
{
    fn disconnect(&mut self) {
        self()
    }
}

pub(crate) type FrameCallback = Box<dyn FnOnce(Instant) + Send>;

/// Sizes of a component's four handle sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    /// Timeouts not yet fired
    pub timeouts: usize,
    /// Intervals still repeating
    pub intervals: usize,
    /// Frame callbacks waiting for the next tick
    pub animation_frames: usize,
    /// Connected observers
    pub observers: usize,
}

impl PendingCounts {
    /// Handles pending across all four sets.
    pub fn total(&self) -> usize {
        self.timeouts + self.intervals + self.animation_frames + self.observers
    }
}

/// Work removed from a handle set, ready to be canceled.
pub(crate) enum Pending {
    Task(AbortHandle),
    Frame(FrameCallback),
    Observer(Box<dyn Observer>),
}

impl Pending {
    /// Stop the work. Aborted tasks never reach their callback; frame
    /// callbacks are dropped unrun.
    pub(crate) fn cancel(self) {
        match self {
            Pending::Task(task) => task.abort(),
            Pending::Frame(callback) => drop(callback),
            Pending::Observer(mut observer) => observer.disconnect(),
        }
    }
}

/// Everything one component has scheduled and not yet seen complete.
///
/// Keys are handle ids, which increase monotonically, so iteration follows
/// scheduling order.
#[derive(Default)]
pub(crate) struct HandleSet {
    timeouts: BTreeMap<u64, AbortHandle>,
    intervals: BTreeMap<u64, AbortHandle>,
    frames: BTreeMap<u64, FrameCallback>,
    observers: BTreeMap<u64, Box<dyn Observer>>,
}

impl HandleSet {
    pub(crate) fn insert_task(&mut self, handle: Handle, task: AbortHandle) {
        match handle.kind {
            HandleKind::Timeout => {
                self.timeouts.insert(handle.id, task);
            }
            HandleKind::Interval => {
                self.intervals.insert(handle.id, task);
            }
            // Frames and observers are not tasks
            HandleKind::AnimationFrame | HandleKind::Observer => task.abort(),
        }
    }

    pub(crate) fn insert_frame(&mut self, handle: Handle, callback: FrameCallback) {
        self.frames.insert(handle.id, callback);
    }

    pub(crate) fn insert_observer(&mut self, handle: Handle, observer: Box<dyn Observer>) {
        self.observers.insert(handle.id, observer);
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        match handle.kind {
            HandleKind::Timeout => self.timeouts.contains_key(&handle.id),
            HandleKind::Interval => self.intervals.contains_key(&handle.id),
            HandleKind::AnimationFrame => self.frames.contains_key(&handle.id),
            HandleKind::Observer => self.observers.contains_key(&handle.id),
        }
    }

    /// Remove a handle, returning its work if it was still pending.
    pub(crate) fn take(&mut self, handle: Handle) -> Option<Pending> {
        match handle.kind {
            HandleKind::Timeout => self.timeouts.remove(&handle.id).map(Pending::Task),
            HandleKind::Interval => self.intervals.remove(&handle.id).map(Pending::Task),
            HandleKind::AnimationFrame => self.frames.remove(&handle.id).map(Pending::Frame),
            HandleKind::Observer => self.observers.remove(&handle.id).map(Pending::Observer),
        }
    }

    /// Handles of every pending frame callback, in request order. The
    /// callbacks stay in the set until taken.
    pub(crate) fn frame_handles(&self) -> Vec<Handle> {
        self.frames
            .keys()
            .map(|id| Handle::new(HandleKind::AnimationFrame, *id))
            .collect()
    }

    pub(crate) fn counts(&self) -> PendingCounts {
        PendingCounts {
            timeouts: self.timeouts.len(),
            intervals: self.intervals.len(),
            animation_frames: self.frames.len(),
            observers: self.observers.len(),
        }
    }

    /// Cancel everything and return how many handles were pending.
    pub(crate) fn cancel_all(self) -> usize {
        let pending: Vec<Pending> = self
            .timeouts
            .into_values()
            .chain(self.intervals.into_values())
            .map(Pending::Task)
            .chain(self.frames.into_values().map(Pending::Frame))
            .chain(self.observers.into_values().map(Pending::Observer))
            .collect();

        let canceled = pending.len();
        pending.into_iter().for_each(Pending::cancel);
        canceled
    }
}
