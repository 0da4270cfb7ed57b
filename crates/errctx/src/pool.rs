//! Pool of reusable error-occurrence instances.
//!
//! Idle instances sit in a bounded lock-free queue. Acquiring never fails: an
//! empty queue means a fresh allocation. Releasing clears the instance and
//! returns it unless the queue is already full.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;

use crate::config::{Config, Retention};
use crate::frame::FrameStore;
use crate::id::{ClassId, NamespaceId, OccurrenceId};
use crate::stack::StackTrace;

/// State of one error occurrence; recycled through the [`Pool`].
#[derive(Debug)]
pub(crate) struct Occurrence {
    pub(crate) class: ClassId,
    pub(crate) namespace: NamespaceId,
    pub(crate) class_name: Option<Arc<str>>,
    pub(crate) occurrence_id: OccurrenceId,
    pub(crate) lightweight: bool,
    /// Backstop guard: set on acquire, cleared by [`Occurrence::disarm`] on
    /// the explicit release paths. Only armed instances are reclaimed.
    pub(crate) armed: bool,
    pub(crate) frames: FrameStore,
    pub(crate) stack: StackTrace,
}

impl Occurrence {
    fn new(retain: &Retention) -> Self {
        Self {
            class: ClassId::INVALID,
            namespace: NamespaceId::INVALID,
            class_name: None,
            occurrence_id: OccurrenceId::NIL,
            lightweight: false,
            armed: false,
            frames: FrameStore::with_capacity(retain),
            stack: StackTrace::with_capacity(retain),
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    fn reset(&mut self, retain: &Retention) {
        self.class = ClassId::INVALID;
        self.namespace = NamespaceId::INVALID;
        self.class_name = None;
        self.occurrence_id = OccurrenceId::NIL;
        self.lightweight = false;
        self.armed = false;
        self.frames.clear(retain);
        self.stack.clear(retain);
    }
}

#[derive(Debug, Default)]
struct Counters {
    allocations: AtomicU64,
    acquisitions: AtomicU64,
    hits: AtomicU64,
    releases: AtomicU64,
    reclamations: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn record_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_acquisition(&self, hit: bool) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reclamation(&self) {
        self.reclamations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances ever allocated, pre-warmed ones included
    pub allocations: u64,
    /// Instances handed out
    pub acquisitions: u64,
    /// Acquisitions served from the idle queue
    pub hits: u64,
    /// Instances returned, by any path
    pub releases: u64,
    /// Returns that went through the drop backstop
    pub reclamations: u64,
    /// Returned instances dropped because the queue was full
    pub discarded: u64,
    /// Instances idle at the time of the snapshot
    pub idle: usize,
}

impl PoolStats {
    /// Instances currently handed out
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.acquisitions.saturating_sub(self.releases)
    }

    /// Fraction of acquisitions served without allocating
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.acquisitions == 0 {
            0.0
        } else {
            self.hits as f64 / self.acquisitions as f64
        }
    }
}

/// Bounded pool of [`Occurrence`] instances.
pub(crate) struct Pool {
    idle: ArrayQueue<Box<Occurrence>>,
    retain: Retention,
    counters: Counters,
}

impl Pool {
    pub(crate) fn new(config: &Config) -> Self {
        let pool = Self {
            idle: ArrayQueue::new(config.max_idle.max(1)),
            retain: config.retain,
            counters: Counters::default(),
        };

        for _ in 0..config.prewarm {
            pool.counters.record_allocation();
            if pool.idle.push(Box::new(Occurrence::new(&pool.retain))).is_err() {
                break;
            }
        }
        tracing::debug!(
            prewarmed = pool.idle.len(),
            max_idle = pool.idle.capacity(),
            "error context pool ready"
        );
        pool
    }

    /// Take an idle instance or allocate one, armed for backstop reclamation.
    pub(crate) fn acquire(&self) -> Box<Occurrence> {
        let mut occ = match self.idle.pop() {
            Some(occ) => {
                self.counters.record_acquisition(true);
                occ
            }
            None => {
                tracing::trace!("error context pool empty; allocating");
                self.counters.record_allocation();
                self.counters.record_acquisition(false);
                Box::new(Occurrence::new(&self.retain))
            }
        };
        occ.armed = true;
        occ
    }

    /// Clear a disarmed instance and return it to the idle queue.
    pub(crate) fn release(&self, mut occ: Box<Occurrence>) {
        debug_assert!(!occ.armed, "released an instance without disarming it");
        occ.reset(&self.retain);
        self.counters.record_release();
        if self.idle.push(occ).is_err() {
            self.counters.record_discard();
        }
    }

    /// Release path taken by the drop backstop.
    ///
    /// Counts a reclamation only for armed instances; a disarmed one was
    /// already accounted for by an explicit release and is returned as such.
    /// Returns whether the guard fired.
    pub(crate) fn reclaim(&self, mut occ: Box<Occurrence>) -> bool {
        let fired = occ.armed;
        if fired {
            self.counters.record_reclamation();
            occ.disarm();
        }
        self.release(occ);
        fired
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let c = &self.counters;
        PoolStats {
            allocations: c.allocations.load(Ordering::Relaxed),
            acquisitions: c.acquisitions.load(Ordering::Relaxed),
            hits: c.hits.load(Ordering::Relaxed),
            releases: c.releases.load(Ordering::Relaxed),
            reclamations: c.reclamations.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            idle: self.idle.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use pretty_assertions::assert_eq;

    fn config(prewarm: usize, max_idle: usize) -> Config {
        Config {
            prewarm,
            max_idle,
            ..Config::default()
        }
    }

    #[test]
    fn prewarm_fills_queue() {
        let pool = Pool::new(&config(4, 8));
        let stats = pool.stats();
        assert_eq!(stats.idle, 4);
        assert_eq!(stats.allocations, 4);
        assert_eq!(stats.acquisitions, 0);
    }

    #[test]
    fn empty_pool_allocates() {
        let pool = Pool::new(&config(0, 2));
        let a = pool.acquire();
        let b = pool.acquire();
        assert!(a.armed && b.armed);
        let stats = pool.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.outstanding(), 2);
        for mut occ in [a, b] {
            occ.disarm();
            pool.release(occ);
        }
        assert_eq!(pool.stats().idle, 2);
    }

    #[test]
    fn release_clears_state() {
        let pool = Pool::new(&config(1, 1));
        let mut occ = pool.acquire();
        occ.class = ClassId::from_raw(7);
        occ.class_name = Some(Arc::from("X"));
        occ.lightweight = true;
        occ.frames.seed();
        occ.frames.set_message("residue");
        occ.frames.push_field(Field::new("k", 1).unwrap());
        occ.disarm();
        pool.release(occ);

        let occ = pool.acquire();
        assert_eq!(occ.class, ClassId::INVALID);
        assert!(occ.class_name.is_none());
        assert!(!occ.lightweight);
        assert!(occ.frames.is_empty());
        assert!(occ.stack.is_empty());
        assert!(occ.occurrence_id.is_nil());
        assert_eq!(pool.stats().hits, 2);
    }

    #[test]
    fn full_queue_discards() {
        let pool = Pool::new(&config(0, 1));
        let mut a = pool.acquire();
        let b = pool.acquire();
        a.disarm();
        pool.release(a);
        assert!(pool.reclaim(b));
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.reclamations, 1);
    }

    #[test]
    fn reclaim_ignores_disarmed_instances() {
        let pool = Pool::new(&config(0, 4));
        let mut occ = pool.acquire();
        assert!(occ.armed);
        occ.disarm();
        assert!(!pool.reclaim(occ));

        let stats = pool.stats();
        assert_eq!(stats.reclamations, 0);
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.idle, 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "without disarming")]
    fn releasing_armed_instance_is_a_bug() {
        let pool = Pool::new(&config(0, 1));
        let occ = pool.acquire();
        pool.release(occ);
    }

    #[test]
    fn hit_rate_of_idle_pool_is_zero() {
        assert_eq!(PoolStats::default().hit_rate(), 0.0);
    }
}
