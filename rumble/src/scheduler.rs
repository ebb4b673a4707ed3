//! The event scheduler of the [`Machine`](super::Machine).
//!
//! Events are kept sorted by how far in the future they are due, measured from the current value
//! of COUNT. Since COUNT wraps every 2^32 ticks, due times are compared through their distance to
//! the current COUNT instead of their absolute value.

use arrayvec::ArrayVec;
use rumble_core::Count;
use strum::{FromRepr, IntoStaticStr};
use tracing::warn;

/// Maximum number of pending events.
pub const CAPACITY: usize = 32;

/// Delay of the first VI after initialization.
pub const FIRST_VI_DELAY: Count = 5000;

/// Possible schedule events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Event {
    /// Vertical blank.
    Vi = 1,
    /// COUNT reached COMPARE.
    Compare,
    /// Dispatch an interrupt that is already pending.
    Check,
    /// Serial interface DMA completion.
    Si,
    /// Parallel interface DMA completion.
    Pi,
    /// One-shot startup event, later re-armed to mark the wrap of COUNT.
    Bootstrap,
    /// Audio buffer completion.
    Ai,
    /// RSP task completion.
    Sp,
    /// RDP list completion.
    Dp,
    /// Second stage of the reset button: the pre-NMI interrupt.
    Hw2,
    /// Non-maskable interrupt, i.e. soft reset.
    Nmi,
}

/// An event in the queue. The kind is kept raw so the queue can carry kinds it doesn't know of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub kind: u8,
    /// Absolute due time, in COUNT units.
    pub time: Count,
}

impl Scheduled {
    #[inline(always)]
    pub fn event(&self) -> Option<Event> {
        Event::from_repr(self.kind)
    }
}

/// Whether an event due at `a` happens before an event due at `b`, as seen from `now`.
#[inline(always)]
pub const fn before(a: Count, b: Count, now: Count) -> bool {
    a.wrapping_sub(now) < b.wrapping_sub(now)
}

/// The event scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler {
    queue: ArrayVec<Scheduled, CAPACITY>,
    /// Due time of the event at the front of the queue.
    next_due: Count,
    /// Whether the startup event already fired. Until then, it always sorts first.
    bootstrap_done: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: ArrayVec::new(),
            next_due: 0,
            bootstrap_done: false,
        }
    }

    /// Empties the queue and schedules the first VI and the startup event.
    pub fn initialize(&mut self, count: Count) {
        self.queue.clear();
        self.bootstrap_done = false;

        self.add(Event::Vi, FIRST_VI_DELAY, count);
        self.add_at(Event::Bootstrap, count, count);
    }

    #[inline(always)]
    fn pinned(&self, scheduled: &Scheduled) -> bool {
        !self.bootstrap_done && scheduled.kind == Event::Bootstrap as u8
    }

    #[inline(always)]
    fn sorts_before(&self, a: &Scheduled, b: &Scheduled, now: Count) -> bool {
        if self.pinned(b) {
            return false;
        }

        self.pinned(a) || before(a.time, b.time, now)
    }

    #[inline(always)]
    fn refresh(&mut self) {
        if let Some(front) = self.queue.first() {
            self.next_due = front.time;
        }
    }

    /// Inserts an event of a raw kind due at the absolute time `time`.
    pub fn add_raw(&mut self, kind: u8, time: Count, now: Count) {
        let event = Scheduled { kind, time };

        if self.queue.iter().any(|e| e.kind == kind) {
            warn!(
                target: "scheduler",
                "duplicate event {:?} (kind {kind}) scheduled at {time}",
                event.event()
            );
        }

        let index = self
            .queue
            .iter()
            .position(|e| self.sorts_before(&event, e, now))
            .unwrap_or(self.queue.len());

        if self.queue.try_insert(index, event).is_err() {
            warn!(target: "scheduler", "event queue is full, dropping {:?}", event.event());
            return;
        }

        self.refresh();
    }

    /// Schedules an event at the absolute time `time`.
    #[inline(always)]
    pub fn add_at(&mut self, event: Event, time: Count, now: Count) {
        self.add_raw(event as u8, time, now);
    }

    /// Schedules an event `delay` COUNT units after `now`.
    #[inline(always)]
    pub fn add(&mut self, event: Event, delay: Count, now: Count) {
        self.add_at(event, now.wrapping_add(delay), now);
    }

    /// Puts an event at the front of the queue, regardless of ordering, and makes it due now.
    pub fn push_front(&mut self, event: Event, now: Count) {
        let scheduled = Scheduled {
            kind: event as u8,
            time: now,
        };

        if self.queue.is_full() {
            if let Some(dropped) = self.queue.pop() {
                warn!(
                    target: "scheduler",
                    "event queue is full, dropping {:?} due at {}",
                    dropped.event(),
                    dropped.time
                );
            }
        }

        self.queue.insert(0, scheduled);
        self.next_due = now;
    }

    /// Removes the first pending event of the given kind.
    pub fn remove(&mut self, event: Event) {
        if let Some(index) = self.queue.iter().position(|e| e.kind == event as u8) {
            self.queue.remove(index);
            self.refresh();
        }
    }

    /// Removes and returns the event at the front of the queue.
    pub fn pop(&mut self) -> Option<Scheduled> {
        if self.queue.is_empty() {
            return None;
        }

        let front = self.queue.remove(0);
        self.refresh();
        Some(front)
    }

    /// Due time of the first pending event of the given kind.
    pub fn time_of(&self, event: Event) -> Option<Count> {
        self.queue
            .iter()
            .find(|e| e.kind == event as u8)
            .map(|e| e.time)
    }

    /// Whether the event at the front of the queue is due.
    #[inline(always)]
    pub fn due(&self, now: Count) -> bool {
        !self.queue.is_empty() && now.wrapping_sub(self.next_due) < 0x8000_0000
    }

    /// Makes the scheduler due right away, so the next poll services it.
    #[inline(always)]
    pub fn expire(&mut self, now: Count) {
        self.next_due = now;
    }

    /// Recomputes the due time of the next poll from the queue.
    #[inline(always)]
    pub fn reschedule(&mut self) {
        self.refresh();
    }

    #[inline(always)]
    pub fn next_due(&self) -> Count {
        self.next_due
    }

    #[inline(always)]
    pub fn bootstrap_done(&self) -> bool {
        self.bootstrap_done
    }

    /// Marks the startup event as fired and re-arms it as the COUNT wrap marker.
    pub fn finish_bootstrap(&mut self, now: Count) {
        self.bootstrap_done = true;
        self.remove(Event::Bootstrap);
        self.add_at(Event::Bootstrap, 0, now);
    }

    /// Rebases the queue for a write of `base` to COUNT, which currently holds `now`. The timer
    /// and startup events are dropped and scheduled again from COMPARE and the new base.
    pub fn translate(&mut self, now: Count, base: Count, compare: Count) {
        let kept: ArrayVec<Scheduled, CAPACITY> = self
            .queue
            .iter()
            .filter(|e| e.kind != Event::Compare as u8 && e.kind != Event::Bootstrap as u8)
            .map(|e| Scheduled {
                kind: e.kind,
                time: e.time.wrapping_sub(now).wrapping_add(base),
            })
            .collect();

        self.queue = kept;
        self.add_at(Event::Compare, compare, base);

        let bootstrap = if self.bootstrap_done { 0 } else { base };
        self.add_at(Event::Bootstrap, bootstrap, base);
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterates over the pending events, in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &Scheduled> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn kinds(scheduler: &Scheduler) -> Vec<Option<Event>> {
        scheduler.iter().map(Scheduled::event).collect()
    }

    proptest! {
        #[test]
        fn before_is_antisymmetric(a in any::<u32>(), b in any::<u32>(), now in any::<u32>()) {
            prop_assert!(!(before(a, b, now) && before(b, a, now)));
        }

        #[test]
        fn before_follows_subtraction(a in any::<u32>(), d in 1u32..0x8000_0000, k in 0u32..0x8000_0000) {
            let b = a.wrapping_add(d);
            let now = a.wrapping_sub(k.min(0x8000_0000 - d));
            prop_assert!(before(a, b, now));
            prop_assert!(!before(b, a, now));
        }
    }

    #[test]
    fn before_across_wrap() {
        assert!(before(0xFFFF_FFF0, 0x0000_0010, 0xFFFF_FF00));
        assert!(!before(0x0000_0010, 0xFFFF_FFF0, 0xFFFF_FF00));
    }

    #[test]
    fn fires_in_due_order() {
        let now = 0xFFFF_FFE0;
        let mut scheduler = Scheduler::new();
        scheduler.add(Event::Ai, 50, now);
        scheduler.add(Event::Pi, 10, now);
        scheduler.add(Event::Si, 30, now);

        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop())
            .map(|e| e.event())
            .collect();
        assert_eq!(order, vec![Some(Event::Pi), Some(Event::Si), Some(Event::Ai)]);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut scheduler = Scheduler::new();
        scheduler.add(Event::Pi, 20, 0);
        scheduler.add(Event::Pi, 10, 0);

        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.pop().map(|e| e.time), Some(10));
        assert_eq!(scheduler.pop().map(|e| e.time), Some(20));
    }

    #[test]
    fn bootstrap_is_pinned_until_done() {
        let mut scheduler = Scheduler::new();
        scheduler.initialize(100);
        scheduler.add(Event::Pi, 0, 100);

        assert_eq!(kinds(&scheduler)[0], Some(Event::Bootstrap));
        assert!(scheduler.due(100));

        scheduler.pop();
        scheduler.finish_bootstrap(100);

        // re-armed at absolute 0, i.e. right before COUNT wraps
        assert_eq!(
            kinds(&scheduler),
            vec![Some(Event::Pi), Some(Event::Vi), Some(Event::Bootstrap)]
        );
        assert_eq!(scheduler.time_of(Event::Bootstrap), Some(0));
    }

    #[test]
    fn due_tracks_front() {
        let mut scheduler = Scheduler::new();
        scheduler.add(Event::Vi, 100, 0);

        assert!(!scheduler.due(0));
        assert!(!scheduler.due(99));
        assert!(scheduler.due(100));
        assert!(scheduler.due(150));

        scheduler.expire(10);
        assert!(scheduler.due(10));
        scheduler.reschedule();
        assert!(!scheduler.due(10));
    }

    #[test]
    fn check_goes_to_front() {
        let mut scheduler = Scheduler::new();
        scheduler.add(Event::Vi, 10, 0);
        scheduler.push_front(Event::Check, 5);

        assert!(scheduler.due(5));
        assert_eq!(scheduler.pop().and_then(|e| e.event()), Some(Event::Check));
    }

    #[test]
    fn check_on_a_full_queue_drops_the_latest() {
        let mut scheduler = Scheduler::new();
        for i in 1..=CAPACITY as u32 {
            scheduler.add(Event::Pi, i * 10, 0);
        }

        scheduler.push_front(Event::Check, 0);

        assert_eq!(scheduler.len(), CAPACITY);
        assert_eq!(scheduler.iter().next().and_then(Scheduled::event), Some(Event::Check));
        assert_eq!(scheduler.iter().last().map(|e| e.time), Some((CAPACITY as u32 - 1) * 10));
    }

    #[test]
    fn translate_rebases() {
        let mut scheduler = Scheduler::new();
        scheduler.initialize(1000);
        scheduler.pop();
        scheduler.finish_bootstrap(1000);
        scheduler.add_at(Event::Compare, 9000, 1000);
        scheduler.add(Event::Pi, 300, 1000);

        scheduler.translate(1000, 0x10, 2000);

        assert_eq!(scheduler.time_of(Event::Pi), Some(0x10 + 300));
        assert_eq!(scheduler.time_of(Event::Vi), Some(0x10 + FIRST_VI_DELAY));
        assert_eq!(scheduler.time_of(Event::Compare), Some(2000));
        assert_eq!(scheduler.time_of(Event::Bootstrap), Some(0));
        assert_eq!(
            kinds(&scheduler),
            vec![
                Some(Event::Pi),
                Some(Event::Compare),
                Some(Event::Vi),
                Some(Event::Bootstrap)
            ]
        );
    }

    #[test]
    fn unknown_kinds_are_carried() {
        let mut scheduler = Scheduler::new();
        scheduler.add_raw(0xEE, 5, 0);
        assert_eq!(scheduler.pop().map(|e| e.event()), Some(None));
    }
}
