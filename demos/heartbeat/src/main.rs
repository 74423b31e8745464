use forkgate::{ChildState, Context, ProcessConfig, Started, Worker};
use std::time::Duration;
use tracing::info;

/// Logs a heartbeat every `interval` until asked to stop
struct Heartbeat {
    interval: Duration,
    beats: u64,
}

impl Worker for Heartbeat {
    fn init(&mut self, ctx: &Context<'_>) -> anyhow::Result<()> {
        info!(instance = ctx.instance_name(), "heartbeat worker starting");
        Ok(())
    }

    fn main(&mut self, ctx: &Context<'_>) -> anyhow::Result<()> {
        while ctx.sleep(self.interval) {
            self.beats += 1;
            info!(beat = self.beats, pid = std::process::id(), "heartbeat");
        }
        Ok(())
    }

    fn finally(&mut self, _ctx: &Context<'_>) {
        info!(beats = self.beats, "heartbeat worker finished");
    }
}

fn main() -> anyhow::Result<()> {
    forkgate::init_tracing();

    let worker = Heartbeat {
        interval: Duration::from_millis(200),
        beats: 0,
    };
    let mut process = forkgate::process(worker, ProcessConfig::named("demo"));

    let Started::Forked { pid } = process.start()? else {
        anyhow::bail!("heartbeat was expected to run in a child");
    };
    println!("✅ Worker started with PID: {pid}");

    std::thread::sleep(Duration::from_secs(1));
    if process.is_running()? {
        println!("✅ Worker is running");
    }

    println!("🧹 Stopping worker...");
    let stopped = process.stop_and_wait(Some(Duration::from_secs(5)))?;
    let state = process.join(pid)?;
    println!("✅ Worker stopped (cleared running flag: {stopped}, {state})");

    process.handle().unlink()?;
    if state != ChildState::Exited(0) {
        anyhow::bail!("worker ended with {state}");
    }
    Ok(())
}
