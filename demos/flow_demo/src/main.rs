use reflow_core::prelude::*;
use reflow_core::scheduler;
use web_time::Duration;

const TICK: Duration = Duration::from_millis(100);

/// xorshift64, enough to make the second producer wander.
struct Noise(u64);

impl Noise {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Virtual time: twelve seconds of producer activity run instantly.
    let clock = ManualClock::new();
    scheduler::set_clock(clock.clone());

    let owner = LifecycleOwner::started();
    let never_started = LifecycleOwner::new();

    let count = Flow::<u64>::new();
    let random = Flow::<u64>::new();

    let greeting = count.map(|v| format!("Hello {v}"));
    let halves = count.map(|v| v / 2).distinct_until_changed();
    let sampled = count.throttle(Duration::from_millis(2500));
    let sum = count.combine(&random, |a, b| a + b);
    let joined = Flow::combine_list(&[count.clone(), random.clone(), halves.clone()], |vs| {
        format!("{vs:?}")
    });

    let mut noise = Noise(0x9e37_79b9_7f4a_7c15);
    let mut next_count = 0;
    for tick in 1..=120u64 {
        clock.advance(TICK);
        let elapsed_ms = tick * 100;

        match elapsed_ms {
            1000 => {
                log::info!("observing");
                greeting.observe(&owner, |v| log::info!("[greeting] {v}"));
                halves.observe(&never_started, |v| log::info!("[halves] {v}"));
                sampled.observe(&never_started, |v| log::info!("[sampled] {v}"));
                random.observe(&owner, |v| log::info!("[random] {v}"));
                sum.observe(&owner, |v| log::info!("[sum] {v}"));
                joined.observe(&owner, |v| log::info!("[joined] {v}"));
            }
            5000 => {
                if let Err(e) = greeting.set("100".to_string()) {
                    log::warn!("[greeting] set rejected: {e}");
                }
            }
            7000 => {
                log::info!("[halves] stop receiving updates");
                halves.stop_receiving_updates();
            }
            10000 => {
                log::info!("[owner] stop");
                owner.on_stop();
            }
            _ => {}
        }

        if elapsed_ms % 500 == 0 {
            count.set(next_count)?;
            next_count += 1;
        }
        if elapsed_ms % 1000 == 0 {
            random.set(noise.next() % 100 * 10_000)?;
        }

        scheduler::run_due_timers();
        scheduler::run_frame();
    }

    log::info!(
        "done: count={:?} sum={:?} halves={:?} pending tasks={}",
        count.get(),
        sum.get(),
        halves.get(),
        scheduler::pending_tasks()
    );
    Ok(())
}
