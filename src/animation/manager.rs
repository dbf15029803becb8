//! Animation lifecycle manager.
//!
//! Components register to receive a token, schedule timeouts, intervals,
//! animation frames and observers against it, and unregister on teardown.
//! Unregistering cancels everything the component still has pending. The
//! manager also watches frame times and the number of live registrations,
//! degrading or disabling animation globally when either gets out of hand.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle as RuntimeHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::handles::{ComponentToken, Handle, HandleKind, HandleSet, Observer, Pending, PendingCounts};
use super::mode::{AnimationDelay, PerformanceMode};
use super::monitor::{PerformanceMonitor, PerformanceReport};
use crate::config::AnimationConfig;
use crate::error::{MarqueeError, Result};

/// Heap usage as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

impl MemoryUsage {
    /// Fraction of the limit in use; zero when the limit is unknown.
    pub fn ratio(&self) -> f64 {
        if self.limit_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.limit_bytes as f64
        }
    }
}

/// Source of memory usage readings.
///
/// Returning `None` means the platform has no such introspection, which is
/// treated as "no pressure". Implementations must not call back into the
/// manager.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> Option<MemoryUsage>;
}

/// Probe for platforms without memory introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemoryProbe;

impl MemoryProbe for NoMemoryProbe {
    fn sample(&self) -> Option<MemoryUsage> {
        None
    }
}

struct State {
    registry: HashMap<ComponentToken, HandleSet>,
    monitor: PerformanceMonitor,
    mode: PerformanceMode,
    animations_enabled: bool,
}

struct Inner {
    state: Mutex<State>,
    /// Held while a callback runs and while work is torn down, so teardown
    /// waits out a callback already running on another thread. Reentrant so
    /// callbacks may tear down components themselves. Always taken before
    /// `state`.
    dispatch: ReentrantMutex<()>,
    next_handle: AtomicU64,
    config: AnimationConfig,
    runtime: RuntimeHandle,
    memory_probe: Box<dyn MemoryProbe>,
}

impl Inner {
    fn allocate(&self, kind: HandleKind) -> Handle {
        Handle::new(kind, self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Remove a one-shot handle that is about to fire. Returns `false` if it
    /// was canceled first.
    fn claim(&self, token: ComponentToken, handle: Handle) -> bool {
        self.state
            .lock()
            .registry
            .get_mut(&token)
            .and_then(|set| set.take(handle))
            .is_some()
    }

    fn is_pending(&self, token: ComponentToken, handle: Handle) -> bool {
        self.state
            .lock()
            .registry
            .get(&token)
            .is_some_and(|set| set.contains(handle))
    }

    fn memory_pressure(&self) -> bool {
        self.memory_probe
            .sample()
            .is_some_and(|usage| usage.ratio() > self.config.memory_pressure_ratio)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let registry = std::mem::take(&mut self.state.get_mut().registry);
        for set in registry.into_values() {
            set.cancel_all();
        }
    }
}

/// Shared registry, scheduler and performance governor for animated
/// components.
///
/// Cloning is cheap and every clone refers to the same registry. Timers run
/// on the tokio runtime captured at construction; animation frames are
/// pumped by the host through [`AnimationManager::tick`].
#[derive(Clone)]
pub struct AnimationManager {
    inner: Arc<Inner>,
}

impl AnimationManager {
    /// Create a manager bound to the current tokio runtime.
    pub fn create(config: AnimationConfig) -> Result<Self> {
        let runtime = RuntimeHandle::try_current()
            .map_err(|e| MarqueeError::Runtime(format!("animation manager needs a tokio runtime: {}", e)))?;
        Ok(Self::new(config, runtime))
    }

    /// Create a manager whose timers run on `runtime`.
    pub fn new(config: AnimationConfig, runtime: RuntimeHandle) -> Self {
        Self::with_memory_probe(config, runtime, NoMemoryProbe)
    }

    /// Create a manager that consults `probe` for memory pressure.
    pub fn with_memory_probe<P>(config: AnimationConfig, runtime: RuntimeHandle, probe: P) -> Self
    where
        P: MemoryProbe + 'static,
    {
        let state = State {
            registry: HashMap::new(),
            monitor: PerformanceMonitor::from_config(&config),
            mode: PerformanceMode::High,
            animations_enabled: true,
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                dispatch: ReentrantMutex::new(()),
                next_handle: AtomicU64::new(1),
                config,
                runtime,
                memory_probe: Box::new(probe),
            }),
        }
    }

    /// Cancel everything still registered. Other clones stay usable but
    /// start from an empty registry.
    pub fn dispose(self) {
        let canceled = self.emergency_cleanup();
        info!(canceled, "Animation manager disposed");
    }

    /// Register a new component and return its token.
    pub fn register(&self) -> ComponentToken {
        let token = ComponentToken::new();
        self.register_component(token);
        token
    }

    /// Register a component and return a guard that unregisters it on drop.
    pub fn mount(&self) -> ComponentGuard {
        ComponentGuard {
            manager: self.clone(),
            token: self.register(),
        }
    }

    /// Ensure `token` has a registration and report what it has pending.
    ///
    /// Idempotent per token. Registering beyond the configured ceiling is
    /// never refused; it forces emergency mode and mass cleanup instead.
    pub fn register_component(&self, token: ComponentToken) -> PendingCounts {
        let max = self.inner.config.max_components;

        let (counts, live, entered_emergency) = {
            let mut state = self.inner.state.lock();
            let counts = state.registry.entry(token).or_default().counts();
            let live = state.registry.len();

            let entered_emergency = live > max && state.mode != PerformanceMode::Emergency;
            if live > max {
                state.mode = PerformanceMode::Emergency;
            }
            (counts, live, entered_emergency)
        };

        debug!(component = %token, live, "Component registered");

        if live > max {
            if entered_emergency {
                warn!(live, max, "Too many animated components, entering emergency mode");
            }
            self.emergency_cleanup();
        }

        counts
    }

    /// Cancel every handle owned by `token` and drop its registration.
    ///
    /// Returns the number of handles canceled; unknown or already
    /// unregistered tokens cancel nothing. When this returns, no callback
    /// of the component is running or will start, unless this is called
    /// from inside that callback.
    pub fn unregister_component(&self, token: ComponentToken) -> usize {
        let _dispatch = self.inner.dispatch.lock();
        let removed = self.inner.state.lock().registry.remove(&token);

        match removed {
            Some(set) => {
                let canceled = set.cancel_all();
                debug!(component = %token, canceled, "Component unregistered");
                canceled
            }
            None => 0,
        }
    }

    /// Cancel every handle of every component and clear the registry.
    pub fn emergency_cleanup(&self) -> usize {
        let _dispatch = self.inner.dispatch.lock();
        let registry = std::mem::take(&mut self.inner.state.lock().registry);
        if registry.is_empty() {
            return 0;
        }

        let components = registry.len();
        let canceled: usize = registry.into_values().map(HandleSet::cancel_all).sum();
        warn!(components, canceled, "Emergency animation cleanup");
        canceled
    }

    /// Run `callback` once after `delay`.
    ///
    /// Returns `None` if `token` is not registered.
    pub fn set_timeout<F>(&self, token: ComponentToken, delay: Duration, callback: F) -> Option<Handle>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let set = state.registry.get_mut(&token)?;
        let handle = self.inner.allocate(HandleKind::Timeout);
        let weak = Arc::downgrade(&self.inner);

        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            fire_timeout(&weak, token, handle, callback);
        });

        set.insert_task(handle, task.abort_handle());
        trace!(component = %token, handle = handle.id(), ?delay, "Timeout scheduled");
        Some(handle)
    }

    /// Run `callback` every `period` until canceled. Zero periods are
    /// clamped to one millisecond.
    ///
    /// Returns `None` if `token` is not registered.
    pub fn set_interval<F>(&self, token: ComponentToken, period: Duration, mut callback: F) -> Option<Handle>
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));

        let mut state = self.inner.state.lock();
        let set = state.registry.get_mut(&token)?;
        let handle = self.inner.allocate(HandleKind::Interval);
        let weak = Arc::downgrade(&self.inner);

        let task = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !fire_interval(&weak, token, handle, &mut callback) {
                    break;
                }
            }
        });

        set.insert_task(handle, task.abort_handle());
        trace!(component = %token, handle = handle.id(), ?period, "Interval scheduled");
        Some(handle)
    }

    /// Run `callback` on the next [`tick`](Self::tick).
    ///
    /// Returns `None` if `token` is not registered.
    pub fn request_animation_frame<F>(&self, token: ComponentToken, callback: F) -> Option<Handle>
    where
        F: FnOnce(Instant) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let set = state.registry.get_mut(&token)?;
        let handle = self.inner.allocate(HandleKind::AnimationFrame);
        set.insert_frame(handle, Box::new(callback));
        Some(handle)
    }

    /// Track an observer so it is disconnected on teardown.
    ///
    /// Returns `None` if `token` is not registered; the observer is then
    /// dropped without being disconnected.
    pub fn observe<O>(&self, token: ComponentToken, observer: O) -> Option<Handle>
    where
        O: Observer + 'static,
    {
        let mut state = self.inner.state.lock();
        let set = state.registry.get_mut(&token)?;
        let handle = self.inner.allocate(HandleKind::Observer);
        set.insert_observer(handle, Box::new(observer));
        Some(handle)
    }

    /// Cancel one handle. Returns `false` if it already fired or was
    /// canceled.
    pub fn cancel(&self, token: ComponentToken, handle: Handle) -> bool {
        let _dispatch = self.inner.dispatch.lock();
        let pending = self
            .inner
            .state
            .lock()
            .registry
            .get_mut(&token)
            .and_then(|set| set.take(handle));

        match pending {
            Some(pending) => {
                pending.cancel();
                trace!(component = %token, handle = handle.id(), kind = ?handle.kind(), "Handle canceled");
                true
            }
            None => false,
        }
    }

    /// Pump one animation frame.
    ///
    /// Records a frame-time sample while any component is registered, then
    /// runs every frame callback requested before this call. A callback
    /// canceled by an earlier one in the same tick does not run. Returns
    /// the number of callbacks run.
    pub fn tick(&self, now: Instant) -> usize {
        let sampling = !self.inner.state.lock().registry.is_empty();
        if sampling {
            self.record_frame(now);
        }

        let mut frames: Vec<(ComponentToken, Handle)> = {
            let state = self.inner.state.lock();
            state
                .registry
                .iter()
                .flat_map(|(token, set)| {
                    let token = *token;
                    set.frame_handles().into_iter().map(move |handle| (token, handle))
                })
                .collect()
        };
        frames.sort_by_key(|(_, handle)| handle.id());

        let _dispatch = self.inner.dispatch.lock();
        let mut fired = 0;
        for (token, handle) in frames {
            let pending = self
                .inner
                .state
                .lock()
                .registry
                .get_mut(&token)
                .and_then(|set| set.take(handle));

            if let Some(Pending::Frame(callback)) = pending {
                callback(now);
                fired += 1;
            }
        }
        fired
    }

    /// Feed one frame timestamp to the sampler and re-evaluate the mode.
    ///
    /// Returns the rolling report once enough samples exist. Entering
    /// emergency mode cancels all registered work.
    pub fn record_frame(&self, now: Instant) -> Option<PerformanceReport> {
        let (report, previous, next) = {
            let mut state = self.inner.state.lock();
            let report = state.monitor.record_frame(now)?;

            let over_ceiling = state.registry.len() > self.inner.config.max_components;
            let next = PerformanceMode::evaluate(&report, self.inner.memory_pressure(), over_ceiling);
            let previous = std::mem::replace(&mut state.mode, next);
            (report, previous, next)
        };

        if previous != next {
            if next == PerformanceMode::Emergency {
                warn!(
                    from = %previous,
                    average_ms = report.average.as_secs_f64() * 1000.0,
                    max_ms = report.max.as_secs_f64() * 1000.0,
                    "Entering emergency performance mode"
                );
                self.emergency_cleanup();
            } else {
                info!(
                    from = %previous,
                    to = %next,
                    average_ms = report.average.as_secs_f64() * 1000.0,
                    max_ms = report.max.as_secs_f64() * 1000.0,
                    "Performance mode changed"
                );
            }
        }

        Some(report)
    }

    /// The current global performance mode.
    pub fn performance_mode(&self) -> PerformanceMode {
        self.inner.state.lock().mode
    }

    /// The most recent rolling report, if enough samples have been seen.
    pub fn performance_report(&self) -> Option<PerformanceReport> {
        self.inner.state.lock().monitor.latest()
    }

    /// Return to `High` and discard collected samples.
    pub fn reset_performance_mode(&self) {
        let mut state = self.inner.state.lock();
        state.mode = PerformanceMode::High;
        state.monitor.reset();
        info!("Performance mode reset");
    }

    /// Explicitly allow or forbid animation, independent of performance.
    pub fn set_animations_enabled(&self, enabled: bool) {
        self.inner.state.lock().animations_enabled = enabled;
        debug!(enabled, "Animations toggled");
    }

    /// Whether animation is allowed at the policy layer: not toggled off
    /// and no reduced-motion preference.
    pub fn animations_enabled(&self) -> bool {
        self.inner.state.lock().animations_enabled && !self.inner.config.prefers_reduced_motion
    }

    /// Scale a requested delay by the current mode.
    pub fn get_animation_delay(&self, base: Duration) -> AnimationDelay {
        if !self.animations_enabled() {
            return AnimationDelay::Disabled;
        }
        self.performance_mode().scale(base)
    }

    /// Pending work for `token`, or `None` if it is not registered.
    pub fn pending(&self, token: ComponentToken) -> Option<PendingCounts> {
        self.inner.state.lock().registry.get(&token).map(HandleSet::counts)
    }

    /// Whether `token` currently has a registration.
    pub fn is_registered(&self, token: ComponentToken) -> bool {
        self.inner.state.lock().registry.contains_key(&token)
    }

    /// Number of live registrations.
    pub fn registered_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }
}

/// Run a timeout's callback if its handle is still pending.
fn fire_timeout<F>(weak: &Weak<Inner>, token: ComponentToken, handle: Handle, callback: F)
where
    F: FnOnce(),
{
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let _dispatch = inner.dispatch.lock();
    if inner.claim(token, handle) {
        callback();
    }
}

/// Run one interval period. Returns `false` once the interval is gone.
fn fire_interval<F>(weak: &Weak<Inner>, token: ComponentToken, handle: Handle, callback: &mut F) -> bool
where
    F: FnMut(),
{
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let _dispatch = inner.dispatch.lock();
    if !inner.is_pending(token, handle) {
        return false;
    }
    callback();
    true
}

/// A registration scoped to a value: dropping the guard unregisters the
/// component on every exit path.
pub struct ComponentGuard {
    manager: AnimationManager,
    token: ComponentToken,
}

impl ComponentGuard {
    /// The token this guard unregisters on drop.
    pub fn token(&self) -> ComponentToken {
        self.token
    }

    /// Schedule a timeout for this component.
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> Option<Handle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.manager.set_timeout(self.token, delay, callback)
    }

    /// Schedule an interval for this component.
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> Option<Handle>
    where
        F: FnMut() + Send + 'static,
    {
        self.manager.set_interval(self.token, period, callback)
    }

    /// Request a frame callback for this component.
    pub fn request_animation_frame<F>(&self, callback: F) -> Option<Handle>
    where
        F: FnOnce(Instant) + Send + 'static,
    {
        self.manager.request_animation_frame(self.token, callback)
    }

    /// Track an observer for this component.
    pub fn observe<O>(&self, observer: O) -> Option<Handle>
    where
        O: Observer + 'static,
    {
        self.manager.observe(self.token, observer)
    }

    /// Cancel one of this component's handles.
    pub fn cancel(&self, handle: Handle) -> bool {
        self.manager.cancel(self.token, handle)
    }

    /// Pending work for this component.
    pub fn pending(&self) -> Option<PendingCounts> {
        self.manager.pending(self.token)
    }

    /// Scale a delay by the current global mode.
    pub fn animation_delay(&self, base: Duration) -> AnimationDelay {
        self.manager.get_animation_delay(base)
    }
}

impl Drop for ComponentGuard {
    fn drop(&mut self) {
        self.manager.unregister_component(self.token);
    }
}
