use tracing::warn;

pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

struct Task<C> {
    name: &'static str,
    interval_ms: u64,
    next_due_ms: u64,
    run: Box<dyn FnMut(&mut C) -> Result<(), TaskError>>,
}

/// Cooperative periodic-task table for a single control thread.
///
/// Tasks share the host loop: each `tick` runs every task whose due time has
/// elapsed, sequentially, against the one mutable context. Tasks have to
/// return promptly or they delay their siblings.
pub struct Scheduler<C> {
    tasks: Vec<Task<C>>,
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Registers a periodic task. It first fires on the next `tick`.
    pub fn schedule_each<F>(&mut self, name: &'static str, interval_ms: u64, run: F)
    where
        F: FnMut(&mut C) -> Result<(), TaskError> + 'static,
    {
        self.tasks.push(Task {
            name,
            interval_ms,
            next_due_ms: 0,
            run: Box::new(run),
        });
    }

    /// Runs every due task once. A failing task is logged and never keeps
    /// the remaining due tasks from running in the same tick.
    pub fn tick(&mut self, ctx: &mut C, now_ms: u64) {
        for task in &mut self.tasks {
            if now_ms < task.next_due_ms {
                continue;
            }
            if let Err(err) = (task.run)(ctx) {
                warn!("scheduled task {} failed: {err}", task.name);
            }
            // One run per tick even after a long host stall; no catch-up burst.
            task.next_due_ms = now_ms + task.interval_ms;
        }
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counts {
        fast: u32,
        slow: u32,
    }

    fn fast_and_slow() -> Scheduler<Counts> {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_each("fast", 10, |counts: &mut Counts| {
            counts.fast += 1;
            Ok(())
        });
        scheduler.schedule_each("slow", 100, |counts: &mut Counts| {
            counts.slow += 1;
            Ok(())
        });
        scheduler
    }

    #[test]
    fn tasks_fire_at_independent_intervals() {
        let mut scheduler = fast_and_slow();
        let mut counts = Counts::default();

        for now_ms in (0..=250).step_by(10) {
            scheduler.tick(&mut counts, now_ms);
        }

        assert_eq!(counts.fast, 26);
        assert_eq!(counts.slow, 3);
    }

    #[test]
    fn failing_task_does_not_block_siblings() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_each("broken", 10, |_: &mut Counts| Err("boom".into()));
        scheduler.schedule_each("slow", 10, |counts: &mut Counts| {
            counts.slow += 1;
            Ok(())
        });

        let mut counts = Counts::default();
        scheduler.tick(&mut counts, 0);
        scheduler.tick(&mut counts, 10);

        assert_eq!(counts.slow, 2);
    }

    #[test]
    fn host_stall_does_not_trigger_a_catch_up_burst() {
        let mut scheduler = fast_and_slow();
        let mut counts = Counts::default();

        scheduler.tick(&mut counts, 0);
        // The host slept through many 10ms intervals.
        scheduler.tick(&mut counts, 1_000);
        scheduler.tick(&mut counts, 1_005);

        assert_eq!(counts.fast, 2);
        assert_eq!(counts.slow, 2);
    }

    #[test]
    fn task_is_not_due_before_its_interval_elapses() {
        let mut scheduler = fast_and_slow();
        let mut counts = Counts::default();

        scheduler.tick(&mut counts, 0);
        scheduler.tick(&mut counts, 5);

        assert_eq!(counts.fast, 1);
        assert_eq!(counts.slow, 1);
    }
}
