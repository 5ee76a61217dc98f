//! Worker loop of a dispatcher instance

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use contracts::Verbosity;

use crate::instance::{Instance, WorkerExit};
use crate::queue::Delivery;

/// Signals the exit flag however the loop ends
struct ExitSignal<'a>(&'a WorkerExit);

impl Drop for ExitSignal<'_> {
    fn drop(&mut self) {
        self.0.signal();
    }
}

/// Thread entry point
pub(crate) fn run(instance: Arc<Instance>, runtime: Runtime) {
    let _exit = ExitSignal(&instance.exit);
    debug!(dispatcher = %instance.name, "Dispatcher worker started");

    let executed = runtime.block_on(worker_loop(&instance));

    debug!(dispatcher = %instance.name, executed, "Dispatcher worker stopped");
}

async fn worker_loop(instance: &Instance) -> u64 {
    let mut executed: u64 = 0;

    loop {
        let (delivery, next_deadline) = {
            let mut queues = instance.lock_queues();
            if queues.is_closed() {
                break;
            }
            queues.promote(instance.clock.elapsed());
            let delivery = queues.pop();
            instance
                .metrics
                .set_depths(queues.ready_len(), queues.pending_len());
            (delivery, queues.next_deadline())
        };

        if let Some(delivery) = delivery {
            instance.space.notify_all();
            execute(instance, delivery);
            executed += 1;
            continue;
        }

        match next_deadline {
            Some(tick) => {
                let at = tokio::time::Instant::from_std(instance.clock.instant_at(tick));
                tokio::select! {
                    _ = instance.wake.notified() => {}
                    _ = tokio::time::sleep_until(at) => {}
                }
            }
            None => instance.wake.notified().await,
        }
    }

    executed
}

fn execute(instance: &Instance, delivery: Delivery) {
    let Delivery {
        module,
        event,
        payload,
        work,
    } = delivery;

    // Hold back delivery until on_reg has returned.
    module.wait_registered();

    let verbosity = instance.verbosity();
    if verbosity.contains(Verbosity::DEBUG) {
        info!(
            dispatcher = %instance.name,
            module = %module.name(),
            event,
            len = payload.len(),
            work = work.is_some(),
            "Dispatching"
        );
    }

    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| module.module().on_msg(event, &payload)));
    let elapsed = started.elapsed();

    let failed = match result {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            warn!(
                dispatcher = %instance.name,
                module = %module.name(),
                event,
                error = %e,
                "on_msg failed"
            );
            true
        }
        Err(_) => {
            error!(
                dispatcher = %instance.name,
                module = %module.name(),
                event,
                "on_msg panicked"
            );
            true
        }
    };
    instance.metrics.record_execution(elapsed, failed);

    if verbosity.contains(Verbosity::TIMING) {
        info!(
            dispatcher = %instance.name,
            module = %module.name(),
            event,
            elapsed_us = elapsed.as_micros() as u64,
            "Callback finished"
        );
    }

    if let Some(key) = work {
        let now = instance.clock.now();
        let rearmed = instance.lock_queues().finish(key, payload, now);
        if !rearmed {
            debug!(dispatcher = %instance.name, work = %key, "Work retired");
        }
    }
}
