//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 调度语义测试（单线程执行、优先级、周期、取消）
//! - 配置到 dispatcher 的端到端测试

#[cfg(test)]
mod support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Condvar, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use contracts::{EventCode, Payload};
    use dispatcher::{DispatchHandle, DispatcherError, Module};

    /// Poll `cond` until it holds or `timeout` passes
    pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    /// Blocks callbacks until opened
    #[derive(Default)]
    pub struct Gate {
        state: Mutex<(usize, bool)>,
        cond: Condvar,
    }

    impl Gate {
        pub fn pass(&self) {
            let mut state = self.state.lock().unwrap();
            state.0 += 1;
            self.cond.notify_all();
            while !state.1 {
                state = self.cond.wait(state).unwrap();
            }
        }

        /// Wait until `n` callers are inside `pass`
        pub fn wait_entered(&self, n: usize) {
            let state = self.state.lock().unwrap();
            let (_state, result) = self
                .cond
                .wait_timeout_while(state, Duration::from_secs(5), |s| s.0 < n)
                .unwrap();
            assert!(!result.timed_out(), "gate never entered");
        }

        pub fn open(&self) {
            self.state.lock().unwrap().1 = true;
            self.cond.notify_all();
        }
    }

    /// One delivery seen by a [`Probe`]
    #[derive(Debug, Clone)]
    pub struct Seen {
        pub event: EventCode,
        pub data: Vec<u8>,
        pub at: Instant,
        pub thread: Option<String>,
    }

    /// Records every delivery; events with a gate block on it
    #[derive(Default)]
    pub struct Probe {
        name: String,
        seen: Mutex<Vec<Seen>>,
        gates: Mutex<HashMap<EventCode, Arc<Gate>>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        hold: Mutex<Option<Duration>>,
    }

    impl Probe {
        pub fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                ..Default::default()
            })
        }

        /// Block deliveries of `event` on a new gate
        pub fn gate(&self, event: EventCode) -> Arc<Gate> {
            let gate = Arc::new(Gate::default());
            self.gates.lock().unwrap().insert(event, gate.clone());
            gate
        }

        /// Sleep this long in every callback
        pub fn hold_for(&self, duration: Duration) {
            *self.hold.lock().unwrap() = Some(duration);
        }

        pub fn seen(&self) -> Vec<Seen> {
            self.seen.lock().unwrap().clone()
        }

        pub fn events(&self) -> Vec<EventCode> {
            self.seen().into_iter().map(|s| s.event).collect()
        }

        pub fn count(&self, event: EventCode) -> usize {
            self.seen().iter().filter(|s| s.event == event).count()
        }

        pub fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    impl Module for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_msg(&self, event: EventCode, payload: &Payload) -> Result<(), DispatcherError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            self.seen.lock().unwrap().push(Seen {
                event,
                data: payload.as_bytes().to_vec(),
                at: Instant::now(),
                thread: thread::current().name().map(str::to_string),
            });

            let gate = self.gates.lock().unwrap().get(&event).cloned();
            if let Some(gate) = gate {
                gate.pass();
            }
            let hold = *self.hold.lock().unwrap();
            if let Some(hold) = hold {
                thread::sleep(hold);
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Posts from `on_reg`, then keeps registration busy for a while
    pub struct SlowRegistrar {
        pub registered: Mutex<bool>,
        /// Whether `on_reg` had finished when the message arrived
        pub saw_registered: Mutex<Option<bool>>,
    }

    impl Module for SlowRegistrar {
        fn name(&self) -> &str {
            "slow-reg"
        }

        fn on_reg(&self, handle: &DispatchHandle) -> Result<(), DispatcherError> {
            handle.post_try(7, Payload::Empty)?;
            thread::sleep(Duration::from_millis(40));
            *self.registered.lock().unwrap() = true;
            Ok(())
        }

        fn on_msg(&self, _event: EventCode, _payload: &Payload) -> Result<(), DispatcherError> {
            let registered = *self.registered.lock().unwrap();
            *self.saw_registered.lock().unwrap() = Some(registered);
            Ok(())
        }
    }
}

#[cfg(test)]
mod contract_tests {
    use contracts::{DispatcherSpec, Priority, Verbosity, VerbosityFlag};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_priority_wire_values() {
        assert_eq!(Priority::Normal.value(), 5);
        assert_eq!(Priority::Urgent.value(), 10);
    }

    #[test]
    fn test_initial_verbosity_from_flags() {
        let mut spec = DispatcherSpec::new("main");
        spec.verbosity = vec![VerbosityFlag::Debug, VerbosityFlag::Timing];
        assert_eq!(spec.initial_verbosity(), Verbosity::DEBUG | Verbosity::TIMING);
    }
}

#[cfg(test)]
mod scheduling_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use contracts::{DispatcherSpec, Payload, Priority, RegistryLimits};
    use dispatcher::{ErrorKind, Registry, Work};
    use observability::RunningStats;

    use crate::support::{wait_until, Probe, SlowRegistrar};

    const GATE: i32 = 100;

    #[test]
    fn test_single_flight_across_producers() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry
            .create(&DispatcherSpec::new("main").with_post_timeout(Duration::from_secs(2)))
            .unwrap();
        let probe = Probe::new("probe");
        probe.hold_for(Duration::from_micros(200));
        let handle = main.register_module(probe.clone()).unwrap();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let handle = handle.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        handle.post(p * 100 + i, Payload::Empty).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || probe.seen().len() == 100));
        assert_eq!(probe.max_active(), 1);
        assert!(probe
            .seen()
            .iter()
            .all(|s| s.thread.as_deref() == Some("main")));

        // Per-producer order is preserved
        for p in 0..4 {
            let mine: Vec<i32> = probe
                .events()
                .into_iter()
                .filter(|e| e / 100 == p)
                .collect();
            assert_eq!(mine, (0..25).map(|i| p * 100 + i).collect::<Vec<_>>());
        }

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_urgent_work_jumps_normal_fifo() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let gate = probe.gate(GATE);
        let handle = main.register_module(probe.clone()).unwrap();

        handle.post_try(GATE, Payload::Empty).unwrap();
        gate.wait_entered(1);

        handle.post_try(1, Payload::Empty).unwrap();
        handle.post_try(2, Payload::Empty).unwrap();
        let mut normal = Work::new(3, Payload::Empty);
        handle.post_ex(&mut normal).unwrap();
        let mut urgent = Work::new(4, Payload::Empty).with_priority(Priority::Urgent);
        handle.post_ex(&mut urgent).unwrap();

        // Both work items are due before the worker looks again
        thread::sleep(Duration::from_millis(20));
        gate.open();

        assert!(wait_until(Duration::from_secs(2), || probe.seen().len() == 5));
        assert_eq!(probe.events(), vec![GATE, 4, 1, 2, 3]);

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_messages_delivered_in_post_order() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let gate = probe.gate(GATE);
        let handle = main.register_module(probe.clone()).unwrap();

        handle.post_try(GATE, Payload::Empty).unwrap();
        gate.wait_entered(1);
        for i in 0..10u8 {
            handle.post_try(1, Payload::inline(&[i]).unwrap()).unwrap();
        }
        gate.open();

        assert!(wait_until(Duration::from_secs(2), || probe.seen().len() == 11));
        let data: Vec<u8> = probe.seen()[1..].iter().map(|s| s.data[0]).collect();
        assert_eq!(data, (0..10).collect::<Vec<u8>>());

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_periodic_spacing_never_below_interval() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let handle = main.register_module(probe.clone()).unwrap();

        let interval = Duration::from_millis(20);
        let mut work = Work::new(5, Payload::Empty).with_period(Duration::ZERO, interval);
        handle.post_ex(&mut work).unwrap();
        thread::sleep(Duration::from_millis(230));
        handle.cancel(&mut work).ok();

        let seen = probe.seen();
        assert!(
            (5..=12).contains(&seen.len()),
            "unexpected run count {}",
            seen.len()
        );
        let mut spacing = RunningStats::default();
        for pair in seen.windows(2) {
            spacing.push(pair[1].at.duration_since(pair[0].at).as_secs_f64() * 1000.0);
        }
        assert!(spacing.min() >= 19.5, "spacing {}", spacing.summary());

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_delayed_periodic_cancelled_between_runs() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let handle = main.register_module(probe.clone()).unwrap();

        let mut work = Work::new(9, Payload::Empty)
            .with_period(Duration::from_millis(50), Duration::from_millis(100));
        handle.post_ex(&mut work).unwrap();

        thread::sleep(Duration::from_millis(200));
        handle.cancel(&mut work).unwrap();
        assert!(!work.is_armed());

        thread::sleep(Duration::from_millis(200));
        assert_eq!(probe.count(9), 2);
        assert_eq!(main.metrics().cancelled, 1);

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_cancel_before_ready() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let handle = main.register_module(probe.clone()).unwrap();

        let mut work = Work::new(1, Payload::Empty).with_period(Duration::from_millis(100), Duration::ZERO);
        handle.post_ex(&mut work).unwrap();
        handle.cancel(&mut work).unwrap();
        assert!(!work.is_armed());

        // A disarmed item cannot be cancelled again
        let err = handle.cancel(&mut work).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);

        thread::sleep(Duration::from_millis(150));
        assert_eq!(probe.count(1), 0);

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_cancel_ready_work_is_too_late_and_runs_once() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let first_gate = probe.gate(GATE);
        let handle = main.register_module(probe.clone()).unwrap();

        // Worker busy while both items fall due
        handle.post_try(GATE, Payload::Empty).unwrap();
        first_gate.wait_entered(1);
        let mut blocker = Work::new(20, Payload::Empty);
        handle.post_ex(&mut blocker).unwrap();
        let mut periodic = Work::new(21, Payload::Empty)
            .with_period(Duration::ZERO, Duration::from_millis(10));
        handle.post_ex(&mut periodic).unwrap();
        thread::sleep(Duration::from_millis(20));

        // Both promoted together; the second waits ready behind the first
        let second_gate = probe.gate(20);
        first_gate.open();
        second_gate.wait_entered(1);

        let err = handle.cancel(&mut periodic).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooLate);
        assert!(periodic.is_armed());

        second_gate.open();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(probe.count(21), 1);
        assert_eq!(main.metrics().too_late, 1);

        // Retired: arming again is allowed
        handle.post_ex(&mut periodic).unwrap();
        handle.cancel(&mut periodic).ok();

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_cancel_executing_work_is_too_late() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let gate = probe.gate(30);
        let handle = main.register_module(probe.clone()).unwrap();

        let mut work = Work::new(30, Payload::Empty).with_period(Duration::ZERO, Duration::from_millis(5));
        handle.post_ex(&mut work).unwrap();
        gate.wait_entered(1);

        assert_eq!(handle.cancel(&mut work).unwrap_err().kind(), ErrorKind::TooLate);
        gate.open();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(probe.count(30), 1);

        // Once retired the ticket is stale
        assert_eq!(handle.cancel(&mut work).unwrap_err().kind(), ErrorKind::TooLate);
        assert!(!work.is_armed());

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_post_ex_rejects_armed_work() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let handle = main.register_module(probe.clone()).unwrap();

        let mut work = Work::new(1, Payload::Empty).with_period(Duration::from_secs(10), Duration::ZERO);
        handle.post_ex(&mut work).unwrap();
        let err = handle.post_ex(&mut work).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);

        // A clone is a fresh, unarmed item
        let mut copy = work.clone();
        assert!(!copy.is_armed());
        handle.post_ex(&mut copy).unwrap();

        handle.cancel(&mut work).unwrap();
        handle.cancel(&mut copy).unwrap();
        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_cancel_on_other_dispatcher_is_bad_parameter() {
        let registry = Registry::init(RegistryLimits::default());
        let a = registry.create(&DispatcherSpec::new("a")).unwrap();
        let b = registry.create(&DispatcherSpec::new("b")).unwrap();
        let on_a = a.register_module(Probe::new("pa")).unwrap();
        let on_b = b.register_module(Probe::new("pb")).unwrap();

        let mut work = Work::new(1, Payload::Empty).with_period(Duration::from_secs(10), Duration::ZERO);
        on_a.post_ex(&mut work).unwrap();
        assert_eq!(on_b.cancel(&mut work).unwrap_err().kind(), ErrorKind::BadParameter);
        on_a.cancel(&mut work).unwrap();

        on_a.deregister().unwrap();
        on_b.deregister().unwrap();
        registry.destroy(&a).unwrap();
        registry.destroy(&b).unwrap();
    }

    #[test]
    fn test_delivery_waits_for_on_reg() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let module = Arc::new(SlowRegistrar {
            registered: Default::default(),
            saw_registered: Default::default(),
        });
        let handle = main.register_module(module.clone()).unwrap();

        assert!(wait_until(Duration::from_secs(2), || module
            .saw_registered
            .lock()
            .unwrap()
            .is_some()));
        assert_eq!(*module.saw_registered.lock().unwrap(), Some(true));

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }
}

#[cfg(test)]
mod capacity_tests {
    use std::time::{Duration, Instant};

    use contracts::{DispatcherSpec, Payload, RegistryLimits};
    use dispatcher::{DispatcherError, ErrorKind, Registry, Resource, Work};

    use crate::support::{wait_until, Probe};

    const GATE: i32 = 100;

    fn shared_payload(len: usize) -> Payload {
        Payload::shared(vec![0u8; len])
    }

    #[test]
    fn test_post_try_exhausts_ready_queue() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry
            .create(&DispatcherSpec::new("main").with_queue_capacity(2))
            .unwrap();
        let probe = Probe::new("probe");
        let gate = probe.gate(GATE);
        let handle = main.register_module(probe.clone()).unwrap();

        handle.post_try(GATE, Payload::Empty).unwrap();
        gate.wait_entered(1);

        handle.post_try(1, Payload::Empty).unwrap();
        handle.post_try(2, Payload::Empty).unwrap();
        let err = handle.post_try(3, Payload::Empty).unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::ResourceExhausted {
                resource: Resource::ReadyQueue,
                ..
            }
        ));
        assert_eq!(main.metrics().rejected, 1);

        gate.open();
        assert!(wait_until(Duration::from_secs(2), || probe.seen().len() == 3));
        assert_eq!(probe.events(), vec![GATE, 1, 2]);

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_post_times_out_when_queue_stays_full() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry
            .create(
                &DispatcherSpec::new("main")
                    .with_queue_capacity(1)
                    .with_post_timeout(Duration::from_millis(30)),
            )
            .unwrap();
        let probe = Probe::new("probe");
        let gate = probe.gate(GATE);
        let handle = main.register_module(probe.clone()).unwrap();

        handle.post_try(GATE, Payload::Empty).unwrap();
        gate.wait_entered(1);
        handle.post(1, Payload::Empty).unwrap();

        let started = Instant::now();
        let err = handle.post(2, Payload::Empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(main.metrics().timeouts, 1);

        gate.open();
        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_post_waits_for_room() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry
            .create(
                &DispatcherSpec::new("main")
                    .with_queue_capacity(1)
                    .with_post_timeout(Duration::from_secs(2)),
            )
            .unwrap();
        let probe = Probe::new("probe");
        let gate = probe.gate(GATE);
        let handle = main.register_module(probe.clone()).unwrap();

        handle.post_try(GATE, Payload::Empty).unwrap();
        gate.wait_entered(1);
        handle.post(1, Payload::Empty).unwrap();

        let opener = {
            let gate = gate.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                gate.open();
            })
        };
        handle.post(2, Payload::Empty).unwrap();
        opener.join().unwrap();

        assert!(wait_until(Duration::from_secs(2), || probe.seen().len() == 3));
        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_pending_set_exhausted() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry
            .create(&DispatcherSpec::new("main").with_pending_capacity(2))
            .unwrap();
        let handle = main.register_module(Probe::new("probe")).unwrap();

        let mut items: Vec<Work> = (0..3)
            .map(|i| Work::new(i, Payload::Empty).with_period(Duration::from_secs(10), Duration::ZERO))
            .collect();
        handle.post_ex(&mut items[0]).unwrap();
        handle.post_ex(&mut items[1]).unwrap();
        let err = handle.post_ex(&mut items[2]).unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::ResourceExhausted {
                resource: Resource::PendingSet,
                ..
            }
        ));
        assert!(!items[2].is_armed());

        for work in &mut items[..2] {
            handle.cancel(work).unwrap();
        }
        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let registry = Registry::init(RegistryLimits::default());
        let mut spec = DispatcherSpec::new("main");
        spec.max_payload_len = 8;
        let main = registry.create(&spec).unwrap();
        let handle = main.register_module(Probe::new("probe")).unwrap();

        let err = handle.post_try(1, shared_payload(16)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
        let mut work = Work::new(1, shared_payload(16));
        assert_eq!(handle.post_ex(&mut work).unwrap_err().kind(), ErrorKind::BadParameter);
        handle.post_try(1, shared_payload(8)).unwrap();

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_module_table_full() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry
            .create(&DispatcherSpec::new("main").with_max_modules(1))
            .unwrap();
        let first = main.register_module(Probe::new("one")).unwrap();
        let err = main.register_module(Probe::new("two")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

        first.deregister().unwrap();
        let second = main.register_module(Probe::new("two")).unwrap();
        second.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use std::time::Duration;

    use contracts::{DispatcherSpec, Payload, RegistryLimits, Verbosity};
    use dispatcher::{ErrorKind, HandleKind, Registry};

    use crate::support::{wait_until, Probe};

    #[test]
    fn test_destroy_requires_deregistered_modules() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let handle = main.register_module(Probe::new("probe")).unwrap();

        let err = registry.destroy(&main).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(main.is_alive());

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
        assert!(!main.is_alive());
        assert!(main.is_finished());

        let err = registry.destroy(&main).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
    }

    #[test]
    fn test_stale_handles_are_rejected() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let handle = main.register_module(Probe::new("probe")).unwrap();
        let copy = handle.clone();

        handle.deregister().unwrap();
        assert!(!copy.is_valid());
        assert_eq!(copy.post_try(1, Payload::Empty).unwrap_err().kind(), ErrorKind::BadParameter);
        assert_eq!(copy.deregister().unwrap_err().kind(), ErrorKind::BadParameter);

        let late = main.register_module(Probe::new("late")).unwrap();
        late.deregister().unwrap();
        registry.destroy(&main).unwrap();

        assert_eq!(
            main.register_module(Probe::new("after")).unwrap_err().kind(),
            ErrorKind::BadParameter
        );
    }

    #[test]
    fn test_deinit_rejected_while_dispatchers_remain() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();

        assert_eq!(registry.deinit().unwrap_err().kind(), ErrorKind::NotSupported);
        registry.destroy(&main).unwrap();
        registry.deinit().unwrap();

        assert_eq!(registry.deinit().unwrap_err().kind(), ErrorKind::NotSupported);
        assert_eq!(
            registry.create(&DispatcherSpec::new("again")).unwrap_err().kind(),
            ErrorKind::NotSupported
        );
    }

    #[test]
    fn test_dispatcher_table_full() {
        let registry = Registry::init(RegistryLimits { max_dispatchers: 1 });
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let err = registry.create(&DispatcherSpec::new("other")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        registry.destroy(&main).unwrap();
    }

    #[test]
    fn test_system_dispatch_handle() {
        let registry = Registry::init(RegistryLimits::default());
        let sys = registry.create(&DispatcherSpec::new("sys")).unwrap();
        let probe = Probe::new("probe");

        let err = registry.system_dispatch_handle(probe.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);

        registry.set_system_dispatcher(&sys).unwrap();
        assert!(sys.is_system());
        let handle = registry.system_dispatch_handle(probe.clone()).unwrap();
        assert_eq!(handle.kind(), HandleKind::System);
        assert_eq!(sys.module_count(), 0);

        handle.post_try(3, Payload::Empty).unwrap();
        assert!(wait_until(Duration::from_secs(2), || probe.count(3) == 1));
        assert_eq!(handle.deregister().unwrap_err().kind(), ErrorKind::BadParameter);

        registry.destroy(&sys).unwrap();
        assert!(registry.system_dispatcher().is_none());
        assert_eq!(handle.post_try(3, Payload::Empty).unwrap_err().kind(), ErrorKind::BadParameter);
    }

    #[test]
    fn test_debug_counts_dispatchers_and_modules() {
        let registry = Registry::init(RegistryLimits::default());
        let a = registry.create(&DispatcherSpec::new("a")).unwrap();
        let b = registry.create(&DispatcherSpec::new("b")).unwrap();
        let h1 = a.register_module(Probe::new("one")).unwrap();
        let h2 = a.register_module(Probe::new("two")).unwrap();

        assert_eq!(registry.debug().unwrap(), 4);
        let report = registry.report();
        assert_eq!(report[0].modules, vec!["one".to_string(), "two".to_string()]);
        assert!(report[1].modules.is_empty());

        registry.set_verbosity_by_idx(report[1].index, Verbosity::TIMING).unwrap();
        assert_eq!(b.verbosity(), Verbosity::TIMING);
        assert_eq!(
            registry.set_verbosity_by_idx(99, Verbosity::NONE).unwrap_err().kind(),
            ErrorKind::BadParameter
        );

        h1.deregister().unwrap();
        h2.deregister().unwrap();
        registry.destroy(&a).unwrap();
        registry.destroy(&b).unwrap();
    }

    #[test]
    fn test_set_verbosity_through_handle() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();
        let probe = Probe::new("probe");
        let handle = main.register_module(probe.clone()).unwrap();

        handle.set_verbosity(Verbosity::DEBUG | Verbosity::TIMING).unwrap();
        assert_eq!(main.verbosity(), Verbosity::DEBUG | Verbosity::TIMING);
        handle.post_try(1, Payload::Empty).unwrap();
        assert!(wait_until(Duration::from_secs(2), || probe.count(1) == 1));
        assert!(main.latency().count >= 1);

        handle.deregister().unwrap();
        registry.destroy(&main).unwrap();
    }

    #[tokio::test]
    async fn test_join_returns_after_destroy() {
        let registry = Registry::init(RegistryLimits::default());
        let main = registry.create(&DispatcherSpec::new("main")).unwrap();

        let joiner = {
            let main = main.clone();
            tokio::task::spawn_blocking(move || main.join())
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!joiner.is_finished());

        registry.destroy(&main).unwrap();
        tokio::time::timeout(Duration::from_secs(2), joiner)
            .await
            .expect("join did not return")
            .unwrap();
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::Payload;
    use dispatcher::{DispatcherBuilder, Work};

    use crate::support::{wait_until, Probe};

    const TOPOLOGY: &str = r#"
version = "V1"
system_dispatcher = "sys"

[limits]
max_dispatchers = 4

[[dispatchers]]
name = "main"
queue_capacity = 8
pending_capacity = 4

[[dispatchers]]
name = "sys"
verbosity = ["timing"]
"#;

    /// Config file -> DispatcherBuilder -> modules -> shutdown
    #[test]
    fn test_config_to_running_dispatchers() {
        let blueprint = ConfigLoader::load_from_str(TOPOLOGY, ConfigFormat::Toml).unwrap();
        let system = DispatcherBuilder::new(blueprint).build().unwrap();
        assert_eq!(system.system().map(|d| d.name().to_string()), Some("sys".into()));

        let main = system.dispatcher("main").unwrap().clone();
        assert_eq!(main.spec().queue_capacity, 8);

        let probe = Probe::new("probe");
        let handle = main.register_module(probe.clone()).unwrap();
        let sys_probe = Probe::new("sys-probe");
        let sys_handle = system
            .registry()
            .system_dispatch_handle(sys_probe.clone())
            .unwrap();

        handle.post_try(1, Payload::inline(b"hello").unwrap()).unwrap();
        let mut tick = Work::new(2, Payload::Empty)
            .with_period(Duration::from_millis(5), Duration::from_millis(10));
        handle.post_ex(&mut tick).unwrap();
        sys_handle.post(3, Payload::Empty).unwrap();

        assert!(wait_until(Duration::from_secs(2), || probe.count(2) >= 3));
        assert!(wait_until(Duration::from_secs(2), || sys_probe.count(3) == 1));
        assert_eq!(probe.seen()[0].data, b"hello".to_vec());

        // Deregistration stops the periodic item without a cancel
        handle.deregister().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let after = probe.count(2);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(probe.count(2), after);

        let metrics = system.metrics();
        assert_eq!(metrics.len(), 2);
        assert!(metrics[0].1.executed >= 4);

        system.shutdown().unwrap();
        assert!(!main.is_alive());
    }
}
