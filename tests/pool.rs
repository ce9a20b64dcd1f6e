//! Supervisor behaviour against real child processes (`/bin/sh` workers).

use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use poolvisor::{
    AliveTracker, Config, Event, EventKind, Launch, LaunchFn, Mode, ModeProfile, Phase,
    PoolStatus, RuntimeError, SchedulingConfig, Subscribe, Supervisor,
};
use tokio::sync::watch;

const LOOP: &str = "trap 'exit 0' TERM; while :; do sleep 0.02; done";

#[derive(Default)]
struct Recorder(Mutex<Vec<Event>>);

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.0.lock().expect("recorder lock").push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.0.lock().expect("recorder lock").clone()
    }

    fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

fn config(workers: usize) -> Config {
    let mut cfg = Config::default();
    cfg.workers = workers;
    cfg.poll_interval = Duration::from_millis(50);
    cfg.grace = Duration::from_secs(3);
    cfg.scheduling = SchedulingConfig {
        cpus: vec![],
        nice: vec![],
        strict: false,
    };
    cfg
}

/// `sh -c script slot<N> <generation>`
fn sh(script: impl Into<String>) -> Arc<dyn Launch> {
    let script = script.into();
    LaunchFn::arc(move |ctx| {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(&script)
            .arg(format!("slot{}", ctx.slot))
            .arg(ctx.generation.to_string());
        cmd
    })
}

async fn wait_status(
    rx: &mut watch::Receiver<PoolStatus>,
    pred: impl FnMut(&PoolStatus) -> bool,
) -> PoolStatus {
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(pred))
        .await
        .expect("status condition in time")
        .expect("supervisor alive")
        .clone()
}

fn spawned_pids(events: &[Event]) -> Vec<i32> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::WorkerSpawned)
        .filter_map(|e| e.pid)
        .collect()
}

fn assert_all_gone(pids: &[i32]) {
    for &pid in pids {
        assert_eq!(
            signal::kill(Pid::from_raw(pid), None),
            Err(Errno::ESRCH),
            "pid {pid} still exists"
        );
    }
}

fn position(events: &[Event], kind: EventKind) -> usize {
    events
        .iter()
        .position(|e| e.kind == kind)
        .unwrap_or_else(|| panic!("no {kind:?} event"))
}

#[tokio::test]
async fn crashed_worker_is_replaced_once() {
    let rec = Arc::new(Recorder::default());
    let alive = Arc::new(AliveTracker::new());
    let script = format!(
        "if [ \"$0\" = slot1 ] && [ \"$1\" = 1 ]; then sleep 0.1; exit 1; fi; {LOOP}"
    );
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![rec.clone() as Arc<dyn Subscribe>, alive.clone()];
    let sup = Supervisor::builder(config(3))
        .with_subscribers(subscribers)
        .with_launcher(sh(script))
        .build()
        .expect("build");
    let handle = sup.handle();
    let mut status = sup.status();
    let run = tokio::spawn(sup.run());

    let snapshot = wait_status(&mut status, |s| {
        s.slots.len() == 3 && s.slots[1].generation == 2 && s.live_count() == 3
    })
    .await;
    assert_eq!(snapshot.slots[0].generation, 1);
    assert_eq!(snapshot.slots[2].generation, 1);

    handle.shutdown();
    run.await.expect("join").expect("clean shutdown");

    let events = rec.events();
    let shutdown_at = position(&events, EventKind::ShutdownRequested);
    let crashes: Vec<&Event> = events[..shutdown_at]
        .iter()
        .filter(|e| e.kind == EventKind::WorkerExited)
        .collect();
    assert_eq!(crashes.len(), 1);
    assert_eq!(crashes[0].slot, Some(1));
    assert_eq!(crashes[0].graceful, Some(false));
    assert_eq!(crashes[0].reason.as_deref(), Some("exited with code 1"));

    let respawn = events[..shutdown_at]
        .iter()
        .filter(|e| e.kind == EventKind::WorkerSpawned && e.slot == Some(1))
        .nth(1)
        .expect("replacement spawn");
    let latency = respawn
        .at
        .duration_since(crashes[0].at)
        .unwrap_or(Duration::ZERO);
    assert!(latency < Duration::from_millis(500), "restart took {latency:?}");

    assert_eq!(rec.count(EventKind::WorkerSpawned), 4);
    assert_eq!(rec.count(EventKind::AllStoppedWithin), 1);
    assert_eq!(alive.live_count().await, 0);
    assert_all_gone(&spawned_pids(&events));
}

#[tokio::test]
async fn simultaneous_crashes_are_each_restarted_once() {
    let rec = Arc::new(Recorder::default());
    let sup = Supervisor::builder(config(3))
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .with_launcher(sh(LOOP))
        .build()
        .expect("build");
    let handle = sup.handle();
    let mut status = sup.status();
    let run = tokio::spawn(sup.run());

    let before = wait_status(&mut status, |s| s.phase == Phase::Running && s.live_count() == 3).await;
    // Back to back, without yielding: the exits share one wake.
    for view in &before.slots {
        let pid = view.pid.expect("live pid");
        signal::kill(Pid::from_raw(pid), Signal::SIGKILL).expect("kill worker");
    }

    let after = wait_status(&mut status, |s| {
        s.live_count() == 3 && s.slots.iter().all(|v| v.generation == 2)
    })
    .await;
    for (old, new) in before.slots.iter().zip(&after.slots) {
        assert_ne!(old.pid, new.pid);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(status.borrow().slots.iter().all(|v| v.generation == 2));

    handle.shutdown();
    run.await.expect("join").expect("clean shutdown");

    let events = rec.events();
    let shutdown_at = position(&events, EventKind::ShutdownRequested);
    let spawned = events[..shutdown_at]
        .iter()
        .filter(|e| e.kind == EventKind::WorkerSpawned)
        .count();
    let exited: Vec<Option<usize>> = events[..shutdown_at]
        .iter()
        .filter(|e| e.kind == EventKind::WorkerExited)
        .map(|e| e.slot)
        .collect();
    assert_eq!(spawned, 6);
    assert_eq!(exited.len(), 3);
    for slot in 0..3 {
        assert!(exited.contains(&Some(slot)));
    }
    assert_all_gone(&spawned_pids(&events));
}

#[tokio::test]
async fn broadcast_reaches_every_worker_and_sticks_for_restarts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("modes.log");
    let script = format!(
        "trap 'echo \"$0 light\" >> {log}' USR1; trap 'echo \"$0 heavy\" >> {log}' USR2; {LOOP}",
        log = log.display()
    );

    let launched = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&launched);
    let launcher = LaunchFn::arc(move |ctx| {
        seen.lock()
            .expect("launch log")
            .push((ctx.slot, ctx.generation, ctx.mode));
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(&script).arg(format!("slot{}", ctx.slot));
        cmd
    });

    let rec = Arc::new(Recorder::default());
    let sup = Supervisor::builder(config(3))
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .with_launcher(launcher)
        .build()
        .expect("build");
    let handle = sup.handle();
    let mut status = sup.status();
    let run = tokio::spawn(sup.run());

    let snapshot = wait_status(&mut status, |s| s.phase == Phase::Running && s.live_count() == 3).await;
    // Give the shells time to install their traps.
    tokio::time::sleep(Duration::from_millis(200)).await;

    handle.broadcast(Mode::Light);
    wait_status(&mut status, |s| s.mode == Mode::Light).await;

    let mut lines = Vec::new();
    for _ in 0..200 {
        lines = std::fs::read_to_string(&log)
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect();
        if lines.len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    lines.sort();
    assert_eq!(lines, vec!["slot0 light", "slot1 light", "slot2 light"]);

    // A replacement starts in the pool's current mode.
    let victim = snapshot.slots[2].pid.expect("slot 2 pid");
    signal::kill(Pid::from_raw(victim), Signal::SIGKILL).expect("kill worker");
    wait_status(&mut status, |s| s.slots[2].generation == 2 && s.live_count() == 3).await;

    handle.shutdown();
    run.await.expect("join").expect("clean shutdown");

    let launched = launched.lock().expect("launch log").clone();
    assert!(launched.contains(&(2, 2, Mode::Light)));
    assert!(launched.contains(&(0, 1, Mode::Heavy)));

    let broadcasts: Vec<Event> = rec
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::ModeBroadcast)
        .collect();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].mode, Some(Mode::Light));
    assert_eq!(broadcasts[0].attempt, Some(3));
}

#[tokio::test]
async fn reload_replaces_slots_in_order() {
    let rec = Arc::new(Recorder::default());
    let sup = Supervisor::builder(config(3))
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .with_launcher(sh(LOOP))
        .build()
        .expect("build");
    let handle = sup.handle();
    let mut status = sup.status();
    let run = tokio::spawn(sup.run());

    wait_status(&mut status, |s| s.phase == Phase::Running && s.live_count() == 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.reload();
    let done = wait_status(&mut status, |s| {
        s.phase == Phase::Running && s.slots.iter().all(|v| v.generation == 2)
    })
    .await;
    assert_eq!(done.live_count(), 3);

    handle.shutdown();
    run.await.expect("join").expect("clean shutdown");

    let events = rec.events();
    let start = position(&events, EventKind::ReloadStarting);
    let end = position(&events, EventKind::ReloadCompleted);
    let steps: Vec<(EventKind, Option<usize>)> = events[start..end]
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                EventKind::WorkerExited | EventKind::WorkerSpawned | EventKind::ReloadSlotReplaced
            )
        })
        .map(|e| (e.kind, e.slot))
        .collect();

    let mut expected = Vec::new();
    for slot in 0..3 {
        expected.push((EventKind::WorkerExited, Some(slot)));
        expected.push((EventKind::WorkerSpawned, Some(slot)));
        expected.push((EventKind::ReloadSlotReplaced, Some(slot)));
    }
    assert_eq!(steps, expected);
    assert_eq!(events[end].attempt, Some(3));
    assert!(
        events[start..end]
            .iter()
            .filter(|e| e.kind == EventKind::WorkerExited)
            .all(|e| e.graceful == Some(true))
    );
}

#[tokio::test]
async fn shutdown_during_reload_finishes_current_slot() {
    let rec = Arc::new(Recorder::default());
    let slow_exit = "trap 'sleep 0.3; exit 0' TERM; while :; do sleep 0.02; done";
    let sup = Supervisor::builder(config(3))
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .with_launcher(sh(slow_exit))
        .build()
        .expect("build");
    let handle = sup.handle();
    let mut status = sup.status();
    let run = tokio::spawn(sup.run());

    wait_status(&mut status, |s| s.phase == Phase::Running && s.live_count() == 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.reload();
    // Slot 0 is replaced; slot 1 is being drained.
    wait_status(&mut status, |s| s.slots[0].generation == 2).await;
    handle.shutdown();

    run.await.expect("join").expect("clean shutdown");
    assert_eq!(status.borrow().phase, Phase::Stopped);
    assert_eq!(status.borrow().live_count(), 0);

    let events = rec.events();
    let replaced: Vec<Option<usize>> = events
        .iter()
        .filter(|e| e.kind == EventKind::ReloadSlotReplaced)
        .map(|e| e.slot)
        .collect();
    assert_eq!(replaced, vec![Some(0), Some(1)]);

    let completed = position(&events, EventKind::ReloadCompleted);
    let shutdown_at = position(&events, EventKind::ShutdownRequested);
    assert!(completed < shutdown_at);
    assert_eq!(events[completed].attempt, Some(2));
    assert!(
        !events[shutdown_at..]
            .iter()
            .any(|e| e.kind == EventKind::WorkerSpawned)
    );
    assert_all_gone(&spawned_pids(&events));
}

#[tokio::test]
async fn unresponsive_workers_are_killed_after_grace() {
    let rec = Arc::new(Recorder::default());
    let mut cfg = config(2);
    cfg.grace = Duration::from_millis(200);
    let sup = Supervisor::builder(cfg)
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .with_launcher(sh("trap '' TERM; while :; do sleep 0.02; done"))
        .build()
        .expect("build");
    let handle = sup.handle();
    let mut status = sup.status();
    let run = tokio::spawn(sup.run());

    wait_status(&mut status, |s| s.phase == Phase::Running && s.live_count() == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown();

    let err = run.await.expect("join").unwrap_err();
    match err {
        RuntimeError::GraceExceeded { grace, stuck } => {
            assert_eq!(grace, Duration::from_millis(200));
            assert_eq!(stuck, vec![0, 1]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(rec.count(EventKind::ForceKilled), 2);
    assert_eq!(rec.count(EventKind::GraceExceeded), 1);
    assert_all_gone(&spawned_pids(&rec.events()));
}

#[tokio::test]
async fn exhausted_slots_end_the_supervisor() {
    let rec = Arc::new(Recorder::default());
    let mut cfg = config(2);
    cfg.max_spawn_failures = 3;
    cfg.backoff.first = Duration::from_millis(5);
    cfg.backoff.max = Duration::from_millis(20);
    let sup = Supervisor::builder(cfg)
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .with_launcher(LaunchFn::arc(|_| Command::new("/nonexistent/poolvisor-worker")))
        .build()
        .expect("build");

    let err = tokio::time::timeout(Duration::from_secs(10), sup.run())
        .await
        .expect("supervisor gave up in time")
        .unwrap_err();
    assert!(matches!(err, RuntimeError::AllSlotsFailed { slots: 2 }));
    assert_eq!(rec.count(EventKind::SpawnFailed), 6);
    assert_eq!(rec.count(EventKind::SlotExhausted), 2);
    assert_eq!(rec.count(EventKind::WorkerSpawned), 0);
}

#[tokio::test]
async fn crash_loop_restarts_are_delayed() {
    let rec = Arc::new(Recorder::default());
    let mut cfg = config(1);
    cfg.restart.max_restarts = 2;
    cfg.restart.window = Duration::from_secs(30);
    cfg.backoff.first = Duration::from_millis(100);
    cfg.backoff.factor = 1.0;
    cfg.backoff.max = Duration::from_millis(100);
    let sup = Supervisor::builder(cfg)
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .with_launcher(sh("exit 1"))
        .build()
        .expect("build");
    let handle = sup.handle();
    let run = tokio::spawn(sup.run());

    tokio::time::sleep(Duration::from_millis(600)).await;
    handle.shutdown();
    run.await.expect("join").expect("clean shutdown");

    let spawns = rec.count(EventKind::WorkerSpawned);
    assert!((4..15).contains(&spawns), "spawned {spawns} times");

    let delays: Vec<Option<u32>> = rec
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::RestartScheduled)
        .map(|e| e.delay_ms)
        .collect();
    assert!(!delays.is_empty());
    assert!(delays.iter().all(|d| *d == Some(100)));
}

#[tokio::test]
async fn reload_rereads_config_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("poolvisor.toml");
    std::fs::write(
        &path,
        "workers = 1\npoll_interval_ms = 50\n[light]\nbusy_ms = 2\nidle_ms = 8\n[scheduling]\ncpus = []\nnice = []\n",
    )
    .expect("write config");
    let cfg = Config::load(&path).expect("load");

    let launched = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&launched);
    let launcher = LaunchFn::arc(move |ctx| {
        seen.lock()
            .expect("launch log")
            .push((ctx.generation, ctx.config.light));
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(LOOP);
        cmd
    });

    let rec = Arc::new(Recorder::default());
    let sup = Supervisor::builder(cfg)
        .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
        .with_launcher(launcher)
        .with_config_path(&path)
        .build()
        .expect("build");
    let handle = sup.handle();
    let mut status = sup.status();
    let run = tokio::spawn(sup.run());
    wait_status(&mut status, |s| s.phase == Phase::Running && s.live_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    std::fs::write(
        &path,
        "workers = 4\n[light]\nbusy_ms = 5\nidle_ms = 5\n[scheduling]\ncpus = []\nnice = []\n",
    )
    .expect("rewrite config");
    handle.reload();
    wait_status(&mut status, |s| s.phase == Phase::Running && s.slots[0].generation == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    std::fs::write(&path, "workers = [").expect("break config");
    handle.reload();
    let last = wait_status(&mut status, |s| s.phase == Phase::Running && s.slots[0].generation == 3).await;
    assert_eq!(last.slots.len(), 1);

    handle.shutdown();
    run.await.expect("join").expect("clean shutdown");

    let launched = launched.lock().expect("launch log").clone();
    assert_eq!(
        launched,
        vec![
            (1, ModeProfile::from_millis(2, 8)),
            (2, ModeProfile::from_millis(5, 5)),
            (3, ModeProfile::from_millis(5, 5)),
        ]
    );
    assert_eq!(rec.count(EventKind::ConfigReloadFailed), 1);
}
