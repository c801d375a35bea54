/// Simulation execution loop.
///
/// `Simulation` is the event queue plus the virtual clock: it pops
/// events, advances time and dispatches to a handler. The loop is
/// synchronous and single-threaded. There is no global clock; every
/// component that schedules work receives a `SimulationContext`
/// borrowed from the one `Simulation` driving it.

use tracing::trace;

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId, EventKind};
use crate::eventlog::EventLog;
use crate::scheduler::Scheduler;
use crate::time::VirtualTime;

// ── Handler trait ─────────────────────────────────────────────────────

/// Reacts to dispatched events.
///
/// The handler receives a `SimulationContext` so it can schedule
/// follow-up events. Returning an error aborts the run.
pub trait EventHandler {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> SimResult<()>;
}

/// A handler backed by a closure, for tests and one-off scripts.
impl<F> EventHandler for F
where
    F: FnMut(&mut SimulationContext, &Event) -> SimResult<()>,
{
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> SimResult<()> {
        (self)(ctx, event)
    }
}

// ── Simulation Context ───────────────────────────────────────────────

/// Mutable view handed to the handler on every dispatch.
///
/// Borrows the scheduler mutably, so a handler can only affect dispatch
/// order through the schedule API.
pub struct SimulationContext<'a> {
    scheduler: &'a mut Scheduler,
    now: VirtualTime,
}

impl<'a> SimulationContext<'a> {
    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Schedule an event at an absolute virtual time.
    ///
    /// Fails with `InvalidTime` if `at` is before now.
    pub fn schedule_at(&mut self, at: VirtualTime, kind: EventKind) -> SimResult<EventId> {
        if at < self.now {
            return Err(SimError::InvalidTime {
                requested: at,
                current: self.now,
            });
        }
        Ok(self.scheduler.schedule(at, kind))
    }

    /// Schedule an event `delay` after now.
    pub fn schedule_after(&mut self, delay: VirtualTime, kind: EventKind) -> SimResult<EventId> {
        let at = self
            .now
            .checked_add(delay)
            .ok_or_else(|| SimError::Invariant(format!("virtual time overflow scheduling {} after {}", delay, self.now)))?;
        Ok(self.scheduler.schedule(at, kind))
    }

    /// Number of pending events.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Event queue and virtual clock.
///
/// `advance` executes exactly one event; `run` executes events up to a
/// horizon; `run_to_completion` drains the queue.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    scheduler: Scheduler,
    current_time: VirtualTime,
    events_processed: u64,
    log: Option<EventLog>,
}

impl Simulation {
    /// Create a new simulation starting at time zero.
    pub fn new() -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            current_time: VirtualTime::ZERO,
            events_processed: 0,
            log: None,
        }
    }

    /// Record every dispatched event from now on.
    pub fn enable_logging(&mut self) {
        if self.log.is_none() {
            self.log = Some(EventLog::new());
        }
    }

    /// The dispatch log, if logging is enabled.
    pub fn event_log(&self) -> Option<&EventLog> {
        self.log.as_ref()
    }

    pub fn current_time(&self) -> VirtualTime {
        self.current_time
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Fire time of the next pending event.
    pub fn next_event_time(&self) -> Option<VirtualTime> {
        self.scheduler.peek_next().map(|e| e.fire_at)
    }

    /// Returns `true` if there are no more events to process.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }

    /// Schedule an event from outside the loop.
    ///
    /// Fails with `InvalidTime` if `at` is before the current time.
    pub fn schedule(&mut self, at: VirtualTime, kind: EventKind) -> SimResult<EventId> {
        self.context().schedule_at(at, kind)
    }

    /// A context at the current time, for seeding events through the
    /// same API handlers use.
    pub fn context(&mut self) -> SimulationContext<'_> {
        SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        }
    }

    /// Execute a single event: pop it, advance time, dispatch.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    pub fn advance(&mut self, handler: &mut dyn EventHandler) -> SimResult<Option<Event>> {
        let Some(event) = self.scheduler.pop_next() else {
            return Ok(None);
        };

        if event.fire_at < self.current_time {
            return Err(SimError::Invariant(format!(
                "time went backward: current={}, event={}",
                self.current_time, event.fire_at
            )));
        }
        self.current_time = event.fire_at;
        self.events_processed += 1;

        trace!(id = event.id.raw(), time = %event.fire_at, kind = %event.kind, "dispatch");
        if let Some(log) = self.log.as_mut() {
            log.record(event.clone());
        }

        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        };
        handler.handle(&mut ctx, &event)?;

        Ok(Some(event))
    }

    /// Run until the queue is empty or the next event would fire after
    /// `until`. Events at exactly `until` are executed; later ones stay
    /// pending.
    ///
    /// Returns the number of events processed during this call.
    pub fn run(&mut self, until: VirtualTime, handler: &mut dyn EventHandler) -> SimResult<u64> {
        let start = self.events_processed;
        while let Some(next) = self.next_event_time() {
            if next > until {
                break;
            }
            self.advance(handler)?;
        }
        Ok(self.events_processed - start)
    }

    /// Run until the queue is empty.
    pub fn run_to_completion(&mut self, handler: &mut dyn EventHandler) -> SimResult<u64> {
        self.run(VirtualTime::MAX, handler)
    }

    /// Drop all pending events without executing them.
    /// Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        self.scheduler.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorId;

    fn tick(g: u32) -> EventKind {
        EventKind::GeneratorTick {
            generator: GeneratorId::new(g),
        }
    }

    fn tag(event: &Event) -> u32 {
        match &event.kind {
            EventKind::GeneratorTick { generator } => generator.raw(),
            EventKind::PacketArrival { .. } => u32::MAX,
        }
    }

    #[test]
    fn test_basic_execution_loop() {
        let mut sim = Simulation::new();
        sim.schedule(VirtualTime::from_millis(10), tick(1)).unwrap();
        sim.schedule(VirtualTime::from_millis(20), tick(2)).unwrap();
        sim.schedule(VirtualTime::from_millis(30), tick(3)).unwrap();

        let mut seen = Vec::new();
        let processed = sim
            .run_to_completion(&mut |_ctx: &mut SimulationContext, event: &Event| -> SimResult<()> {
                seen.push(tag(event));
                Ok(())
            })
            .unwrap();

        assert_eq!(processed, 3);
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(sim.current_time(), VirtualTime::from_millis(30));
    }

    #[test]
    fn test_schedule_in_past_fails() {
        let mut sim = Simulation::new();
        sim.schedule(VirtualTime::from_secs(5), tick(0)).unwrap();

        let result = sim.advance(&mut |ctx: &mut SimulationContext, _event: &Event| -> SimResult<()> {
            ctx.schedule_at(VirtualTime::from_secs(4), tick(1))?;
            Ok(())
        });

        match result {
            Err(SimError::InvalidTime { requested, current }) => {
                assert_eq!(requested, VirtualTime::from_secs(4));
                assert_eq!(current, VirtualTime::from_secs(5));
            }
            other => panic!("expected InvalidTime, got {:?}", other),
        }
    }

    #[test]
    fn test_schedule_at_now_is_allowed() {
        let mut sim = Simulation::new();
        sim.schedule(VirtualTime::from_secs(1), tick(0)).unwrap();
        let mut count = 0;
        sim.run_to_completion(&mut |ctx: &mut SimulationContext, _event: &Event| -> SimResult<()> {
            count += 1;
            if count == 1 {
                ctx.schedule_at(ctx.now(), tick(1))?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_handler_schedules_followup() {
        let mut sim = Simulation::new();
        sim.schedule(VirtualTime::ZERO, tick(0)).unwrap();

        let mut times = Vec::new();
        sim.run_to_completion(&mut |ctx: &mut SimulationContext, _event: &Event| -> SimResult<()> {
            times.push(ctx.now().as_nanos());
            if ctx.now() < VirtualTime::from_nanos(30) {
                ctx.schedule_after(VirtualTime::from_nanos(10), tick(0))?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(times, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_run_stops_at_horizon() {
        let mut sim = Simulation::new();
        for s in [1, 2, 3, 4] {
            sim.schedule(VirtualTime::from_secs(s), tick(s as u32)).unwrap();
        }

        let mut seen = Vec::new();
        let processed = sim
            .run(VirtualTime::from_secs(2), &mut |_ctx: &mut SimulationContext, e: &Event| -> SimResult<()> {
                seen.push(tag(e));
                Ok(())
            })
            .unwrap();

        // the event exactly at the horizon runs, later ones do not
        assert_eq!(processed, 2);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(sim.current_time(), VirtualTime::from_secs(2));
        assert_eq!(sim.pending_count(), 2);

        assert_eq!(sim.discard_pending(), 2);
        assert!(sim.is_finished());
    }

    #[test]
    fn test_advance_on_empty_queue() {
        let mut sim = Simulation::new();
        let mut noop = |_ctx: &mut SimulationContext, _e: &Event| -> SimResult<()> { Ok(()) };
        assert!(sim.advance(&mut noop).unwrap().is_none());
        assert_eq!(sim.run_to_completion(&mut noop).unwrap(), 0);
    }

    #[test]
    fn test_time_monotonicity() {
        let mut sim = Simulation::new();
        for ms in [100, 50, 75, 10] {
            sim.schedule(VirtualTime::from_millis(ms), tick(0)).unwrap();
        }
        let mut times = Vec::new();
        sim.run_to_completion(&mut |ctx: &mut SimulationContext, _e: &Event| -> SimResult<()> {
            times.push(ctx.now().as_nanos() / 1_000_000);
            Ok(())
        })
        .unwrap();
        assert_eq!(times, vec![10, 50, 75, 100]);
    }

    #[test]
    fn test_handler_error_aborts_run() {
        let mut sim = Simulation::new();
        sim.schedule(VirtualTime::from_secs(1), tick(0)).unwrap();
        sim.schedule(VirtualTime::from_secs(2), tick(1)).unwrap();

        let err = sim
            .run_to_completion(&mut |_ctx: &mut SimulationContext, _e: &Event| -> SimResult<()> {
                Err(SimError::Invariant("boom".into()))
            })
            .unwrap_err();
        assert!(matches!(err, SimError::Invariant(_)));
        assert_eq!(sim.events_processed(), 1);
        assert_eq!(sim.pending_count(), 1);
    }

    #[test]
    fn test_logging_records_dispatch_order() {
        fn run_once() -> u64 {
            let mut sim = Simulation::new();
            sim.enable_logging();
            sim.schedule(VirtualTime::from_secs(5), tick(0)).unwrap();
            sim.schedule(VirtualTime::from_secs(5), tick(1)).unwrap();
            sim.schedule(VirtualTime::from_secs(3), tick(2)).unwrap();
            sim.run_to_completion(&mut |_c: &mut SimulationContext, _e: &Event| -> SimResult<()> { Ok(()) })
                .unwrap();
            let log = sim.event_log().unwrap();
            assert_eq!(log.len(), 3);
            log.log_hash()
        }
        assert_eq!(run_once(), run_once());
    }
}
