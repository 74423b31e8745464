mod common;

use forkgate_core::poll::{self, PollConfig};
use forkgate_core::{
    ByteCell, ChildState, Context, EXIT_HOOK_FAILED, EXIT_PANICKED, HandshakeConfig, Process,
    ProcessConfig, ProcessError, Started, SyncBackend, SyncName, Worker,
};
use forkgate_unix::ShmPlatform;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the forked worker should do in each hook
#[derive(Clone, Copy, PartialEq)]
enum Init {
    Succeed,
    Fail,
    Abort,
    Sleep(Duration),
}

/// Forked worker reporting through two shared bytes: `main_ran` and `finally_ran`
struct Napper {
    platform: ShmPlatform,
    init: Init,
    nap: Duration,
    panic_in_main: bool,
    main_ran: SyncName,
    finally_ran: SyncName,
}

impl Napper {
    fn new(platform: &ShmPlatform, tag: &str) -> Self {
        Self {
            platform: platform.clone(),
            init: Init::Succeed,
            nap: Duration::ZERO,
            panic_in_main: false,
            main_ran: common::marker(platform, &format!("{tag}:main")),
            finally_ran: common::marker(platform, &format!("{tag}:finally")),
        }
    }

    fn mark(&self, name: &SyncName) {
        if let Ok(cell) = self.platform.open_cell(name) {
            cell.write(1);
        }
    }
}

impl Worker for Napper {
    fn init(&mut self, _ctx: &Context<'_>) -> anyhow::Result<()> {
        match self.init {
            Init::Succeed => Ok(()),
            Init::Fail => anyhow::bail!("refusing to start"),
            Init::Abort => std::process::abort(),
            Init::Sleep(duration) => {
                std::thread::sleep(duration);
                Ok(())
            }
        }
    }

    fn main(&mut self, ctx: &Context<'_>) -> anyhow::Result<()> {
        self.mark(&self.main_ran);
        if self.panic_in_main {
            panic!("worker main gave up");
        }
        ctx.sleep(self.nap);
        Ok(())
    }

    fn finally(&mut self, _ctx: &Context<'_>) {
        self.mark(&self.finally_ran);
    }
}

impl Drop for Napper {
    fn drop(&mut self) {
        let _ = self.platform.unlink(&self.main_ran);
        let _ = self.platform.unlink(&self.finally_ran);
    }
}

/// A second kind, unaffected by the first kind's global stop
struct Bystander(Napper);

impl Worker for Bystander {
    fn init(&mut self, ctx: &Context<'_>) -> anyhow::Result<()> {
        self.0.init(ctx)
    }

    fn main(&mut self, ctx: &Context<'_>) -> anyhow::Result<()> {
        self.0.main(ctx)
    }

    fn finally(&mut self, ctx: &Context<'_>) {
        self.0.finally(ctx)
    }
}

fn forked_pid(started: Started) -> forkgate_core::WorkerPid {
    match started {
        Started::Forked { pid } => pid,
        Started::Inline => panic!("expected a forked worker"),
    }
}

fn wait_running<W: Worker>(process: &Process<W, ShmPlatform>) -> bool {
    poll::wait_until(Some(Duration::from_secs(5)), &PollConfig::default(), || {
        process.is_running().unwrap_or(false)
    })
}

#[test]
fn test_start_returns_once_init_resolves() {
    let platform = common::platform("early");
    let mut worker = Napper::new(&platform, "early");
    worker.nap = Duration::from_secs(30);
    let (main_ran, finally_ran) = (worker.main_ran.clone(), worker.finally_ran.clone());
    let mut process =
        Process::with_config(worker, ProcessConfig::named("worker"), Arc::clone(&platform));
    assert!(!process.is_running().unwrap());

    let begun = Instant::now();
    let pid = forked_pid(process.start().unwrap());
    assert!(begun.elapsed() < Duration::from_secs(10));

    assert!(wait_running(&process));
    assert!(process.stop_and_wait(Some(Duration::from_secs(10))).unwrap());
    assert_eq!(process.join(pid).unwrap(), ChildState::Exited(0));

    assert!(!process.is_running().unwrap());
    assert_eq!(common::read_marker(&platform, &main_ran), 1);
    assert_eq!(common::read_marker(&platform, &finally_ran), 1);
    process.handle().unlink().unwrap();
}

#[test]
fn test_init_failure_resolves_start_with_error() {
    let platform = common::platform("badinit");
    let mut worker = Napper::new(&platform, "badinit");
    worker.init = Init::Fail;
    let finally_ran = worker.finally_ran.clone();
    let mut process =
        Process::with_config(worker, ProcessConfig::named("worker"), Arc::clone(&platform));

    let error = process.start().unwrap_err();

    let ProcessError::StartFailed { pid } = error else {
        panic!("expected StartFailed, got {error}");
    };
    assert_eq!(process.join(pid).unwrap(), ChildState::Exited(EXIT_HOOK_FAILED));
    assert!(!process.is_running().unwrap());
    assert_eq!(common::read_marker(&platform, &finally_ran), 0);
    process.handle().unlink().unwrap();
}

#[test]
fn test_worker_dying_in_init_does_not_hang_start() {
    let platform = common::platform("abort");
    let mut worker = Napper::new(&platform, "abort");
    worker.init = Init::Abort;
    let config = ProcessConfig {
        handshake: HandshakeConfig::bounded(Duration::from_secs(30)),
        ..ProcessConfig::named("worker")
    };
    let mut process = Process::with_config(worker, config, Arc::clone(&platform));

    let error = process.start().unwrap_err();

    assert!(error.is_liveness_failure());
    let ProcessError::WorkerExited { pid, state } = error else {
        panic!("expected WorkerExited, got {error}");
    };
    assert_eq!(state, ChildState::Signaled(Signal::SIGABRT as i32));
    assert_eq!(process.join(pid).unwrap(), state);
    process.handle().unlink().unwrap();
}

#[test]
fn test_handshake_timeout() {
    let platform = common::platform("slow");
    let mut worker = Napper::new(&platform, "slow");
    worker.init = Init::Sleep(Duration::from_millis(500));
    let main_ran = worker.main_ran.clone();
    let config = ProcessConfig {
        handshake: HandshakeConfig::bounded(Duration::from_millis(50)),
        ..ProcessConfig::named("worker")
    };
    let mut process = Process::with_config(worker, config, Arc::clone(&platform));
    process.stop().unwrap();

    let error = process.start().unwrap_err();

    let ProcessError::HandshakeTimeout { pid, waited } = error else {
        panic!("expected HandshakeTimeout, got {error}");
    };
    assert_eq!(waited, Duration::from_millis(50));
    let handshake = process.last_handshake().unwrap().clone();
    assert!(common::exists(&platform, &handshake.init_ok));

    assert_eq!(process.join(pid).unwrap(), ChildState::Exited(0));
    assert!(!common::exists(&platform, &handshake.init_ok));
    assert!(!common::exists(&platform, &handshake.init_failed));
    assert_eq!(common::read_marker(&platform, &main_ran), 0);
    process.handle().unlink().unwrap();
}

#[test]
fn test_handshake_names_reclaimed_after_start() {
    let platform = common::platform("reclaim");
    let mut process = Process::with_config(
        Napper::new(&platform, "reclaim"),
        ProcessConfig::named("worker"),
        Arc::clone(&platform),
    );

    let pid = forked_pid(process.start().unwrap());

    let handshake = process.last_handshake().unwrap().clone();
    assert!(!common::exists(&platform, &handshake.init_ok));
    assert!(!common::exists(&platform, &handshake.init_failed));
    assert_eq!(process.join(pid).unwrap(), ChildState::Exited(0));
    process.handle().unlink().unwrap();
}

#[test]
fn test_panic_in_forked_main_runs_finally() {
    let platform = common::platform("panic");
    let mut worker = Napper::new(&platform, "panic");
    worker.panic_in_main = true;
    let (main_ran, finally_ran) = (worker.main_ran.clone(), worker.finally_ran.clone());
    let mut process =
        Process::with_config(worker, ProcessConfig::named("worker"), Arc::clone(&platform));

    let pid = forked_pid(process.start().unwrap());

    assert_eq!(process.join(pid).unwrap(), ChildState::Exited(EXIT_PANICKED));
    assert_eq!(common::read_marker(&platform, &main_ran), 1);
    assert_eq!(common::read_marker(&platform, &finally_ran), 1);
    assert!(!process.is_running().unwrap());
    process.handle().unlink().unwrap();
}

#[test]
fn test_sigterm_becomes_a_stop_request() {
    let platform = common::platform("sigterm");
    let mut worker = Napper::new(&platform, "sigterm");
    worker.nap = Duration::from_secs(30);
    let finally_ran = worker.finally_ran.clone();
    let mut process =
        Process::with_config(worker, ProcessConfig::named("worker"), Arc::clone(&platform));

    let pid = forked_pid(process.start().unwrap());
    assert!(wait_running(&process));
    kill(Pid::from_raw(pid.0), Signal::SIGTERM).unwrap();

    assert_eq!(process.join(pid).unwrap(), ChildState::Exited(0));
    assert!(process.handle().is_stop_requested().unwrap());
    assert_eq!(common::read_marker(&platform, &finally_ran), 1);
    process.handle().unlink().unwrap();
}

#[test]
fn test_stop_before_start_skips_main_in_child() {
    let platform = common::platform("prestop");
    let worker = Napper::new(&platform, "prestop");
    let (main_ran, finally_ran) = (worker.main_ran.clone(), worker.finally_ran.clone());
    let mut process =
        Process::with_config(worker, ProcessConfig::named("worker"), Arc::clone(&platform));

    process.stop().unwrap();
    let pid = forked_pid(process.start().unwrap());

    assert_eq!(process.join(pid).unwrap(), ChildState::Exited(0));
    assert_eq!(common::read_marker(&platform, &main_ran), 0);
    assert_eq!(common::read_marker(&platform, &finally_ran), 1);
    process.handle().unlink().unwrap();
}

#[test]
fn test_global_stop_reaches_every_instance_of_kind() {
    let platform = common::platform("global");
    let mut processes = Vec::new();
    for name in ["a", "b"] {
        let mut worker = Napper::new(&platform, &format!("global-{name}"));
        worker.nap = Duration::from_secs(30);
        let mut process =
            Process::with_config(worker, ProcessConfig::named(name), Arc::clone(&platform));
        let pid = forked_pid(process.start().unwrap());
        assert!(wait_running(&process));
        processes.push((process, pid));
    }

    Process::<Napper, ShmPlatform>::global_stop(&platform).unwrap();

    for (process, pid) in &mut processes {
        assert_eq!(process.join(*pid).unwrap(), ChildState::Exited(0));
        assert!(!process.is_running().unwrap());
    }

    let bystander = Bystander(Napper::new(&platform, "bystander"));
    let main_ran = bystander.0.main_ran.clone();
    let mut other =
        Process::with_config(bystander, ProcessConfig::named("a"), Arc::clone(&platform));
    let pid = forked_pid(other.start().unwrap());
    assert_eq!(other.join(pid).unwrap(), ChildState::Exited(0));
    assert_eq!(common::read_marker(&platform, &main_ran), 1);

    for (process, _) in &processes {
        process.handle().unlink().unwrap();
    }
    other.handle().unlink().unwrap();
    Process::<Napper, ShmPlatform>::unlink_global_stop(&platform).unwrap();
}

#[test]
fn test_sequential_instances_get_fresh_handshakes() {
    let platform = common::platform("sequential");
    let config = ProcessConfig::named("same");

    let mut first = Process::with_config(
        Napper::new(&platform, "sequential-1"),
        config.clone(),
        Arc::clone(&platform),
    );
    let pid = forked_pid(first.start().unwrap());
    first.join(pid).unwrap();
    let first_handshake = first.last_handshake().unwrap().clone();

    let mut worker = Napper::new(&platform, "sequential-2");
    worker.nap = Duration::from_secs(30);
    let mut second = Process::with_config(worker, config, Arc::clone(&platform));
    assert!(!second.is_running().unwrap());

    let pid = forked_pid(second.start().unwrap());
    assert_ne!(&first_handshake, second.last_handshake().unwrap());
    assert!(wait_running(&second));
    assert!(first.is_running().unwrap());

    first.stop().unwrap();
    assert_eq!(second.join(pid).unwrap(), ChildState::Exited(0));
    assert!(!first.is_running().unwrap());
    second.handle().unlink().unwrap();
}
