/*
 * Powering the machine off or rebooting it, on request of a held key.
 *
 * The generator decides when, a worker thread does it. The generator and
 * `power_task` share the executor; the task only hands each request over to
 * the worker, which runs the blocking shell command on its own thread.
 */

use std::io;
use std::process::Command;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Receiver};
use log::{error, info};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PowerAction {
    PowerOff,
    Reboot,
}

pub const CHANNEL_CAPACITY: usize = 4;

pub trait PowerControl {
    fn power_off(&mut self) -> io::Result<()>;
    fn reboot(&mut self) -> io::Result<()>;
}

/// The host's own shutdown commands.
pub struct SystemPower;

impl SystemPower {
    fn run(program: &str, args: &[&str]) -> io::Result<()> {
        let status = Command::new(program).args(args).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("{} exited with {}", program, status)))
        }
    }
}

impl PowerControl for SystemPower {
    fn power_off(&mut self) -> io::Result<()> {
        SystemPower::run("shutdown", &["--poweroff", "now"])
    }

    fn reboot(&mut self) -> io::Result<()> {
        SystemPower::run("reboot", &[])
    }
}

pub fn perform(power: &mut impl PowerControl, action: PowerAction) {
    info!("{:?} requested from the panel", action);
    let result = match action {
        PowerAction::PowerOff => power.power_off(),
        PowerAction::Reboot => power.reboot(),
    };
    if let Err(e) = result {
        error!("{:?} failed: {}", action, e);
    }
}

/// Starts the thread that carries out power actions. It runs until every
/// sender is gone and then hands `power` back.
pub fn spawn_worker<P>(mut power: P) -> io::Result<(mpsc::Sender<PowerAction>, JoinHandle<P>)>
where
    P: PowerControl + Send + 'static,
{
    let (sender, requests) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("power-control".into())
        .spawn(move || {
            for action in requests {
                perform(&mut power, action);
            }
            power
        })?;
    Ok((sender, handle))
}

async fn relay(
    actions: &Receiver<'_, CriticalSectionRawMutex, PowerAction, CHANNEL_CAPACITY>,
    worker: &mpsc::Sender<PowerAction>,
) {
    let action = actions.receive().await;
    if worker.send(action).is_err() {
        error!("power worker is gone, dropping {:?}", action);
    }
}

#[embassy_executor::task]
pub async fn power_task(
    actions: Receiver<'static, CriticalSectionRawMutex, PowerAction, CHANNEL_CAPACITY>,
    worker: mpsc::Sender<PowerAction>,
) -> ! {
    loop {
        relay(&actions, &worker).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_executor::Executor;
    use embassy_sync::channel::Channel;
    use embassy_time::Timer;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Recorder {
        calls: Vec<PowerAction>,
        fail: bool,
    }

    impl Recorder {
        fn record(&mut self, action: PowerAction) -> io::Result<()> {
            self.calls.push(action);
            if self.fail {
                Err(io::Error::other("not permitted"))
            } else {
                Ok(())
            }
        }
    }

    impl PowerControl for Recorder {
        fn power_off(&mut self) -> io::Result<()> {
            self.record(PowerAction::PowerOff)
        }

        fn reboot(&mut self) -> io::Result<()> {
            self.record(PowerAction::Reboot)
        }
    }

    #[test]
    fn actions_reach_the_right_command() {
        let mut recorder = Recorder::default();
        perform(&mut recorder, PowerAction::Reboot);
        perform(&mut recorder, PowerAction::PowerOff);
        assert_eq!(recorder.calls, vec![PowerAction::Reboot, PowerAction::PowerOff]);
    }

    #[test]
    fn failures_are_not_fatal() {
        let mut recorder = Recorder {
            fail: true,
            ..Default::default()
        };
        perform(&mut recorder, PowerAction::PowerOff);
        assert_eq!(recorder.calls, vec![PowerAction::PowerOff]);
    }

    // Takes a second over every command, like a shutdown that hangs.
    struct Slow {
        finished: mpsc::Sender<PowerAction>,
    }

    impl Slow {
        fn finish(&mut self, action: PowerAction) -> io::Result<()> {
            thread::sleep(Duration::from_secs(1));
            let _ = self.finished.send(action);
            Ok(())
        }
    }

    impl PowerControl for Slow {
        fn power_off(&mut self) -> io::Result<()> {
            self.finish(PowerAction::PowerOff)
        }

        fn reboot(&mut self) -> io::Result<()> {
            self.finish(PowerAction::Reboot)
        }
    }

    static ACTIONS: Channel<CriticalSectionRawMutex, PowerAction, CHANNEL_CAPACITY> =
        Channel::new();

    #[embassy_executor::task]
    async fn ticker(ticks: mpsc::Sender<()>) {
        while ticks.send(()).is_ok() {
            Timer::after_millis(10).await;
        }
    }

    #[test]
    fn slow_commands_leave_the_executor_running() {
        let (finished, done) = mpsc::channel();
        let (worker, _) = spawn_worker(Slow { finished }).unwrap();
        let (ticks, ticked) = mpsc::channel();

        thread::spawn(move || {
            let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
            executor.run(|spawner| {
                spawner.must_spawn(power_task(ACTIONS.receiver(), worker));
                spawner.must_spawn(ticker(ticks));
            });
        });

        ticked.recv_timeout(Duration::from_secs(1)).unwrap();
        ACTIONS.try_send(PowerAction::PowerOff).unwrap();

        // The command is still running for most of this half second.
        let started = Instant::now();
        let mut count = 0;
        while started.elapsed() < Duration::from_millis(500) {
            if ticked.recv_timeout(Duration::from_millis(100)).is_ok() {
                count += 1;
            }
        }
        assert!(count >= 10, "only {} ticks while the command ran", count);

        let action = done.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(action, PowerAction::PowerOff);
    }
}
