// Deeper Thought for the PiDP-8: the front panel blinks like a busy PDP-8
// while the Pi underneath does next to nothing.

use std::process;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use embassy_executor::Spawner;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, signal::Signal};
use embassy_time::Timer;
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::SmallRng;

mod generator;
mod io;
mod panel;
mod power;
mod scanner;

use generator::PatternGenerator;
use io::Wiring;
use io::bcm2835::{self, Bcm2835Gpio};
use panel::Panel;
use power::{CHANNEL_CAPACITY, PowerAction, SystemPower, power_task};
use scanner::{MatrixScanner, ScanTiming};

#[derive(Parser, Debug)]
#[command(version, about = "Random blinkenlights for the PiDP-8 front panel")]
struct Args {
    /// How long each lamp row is lit per scan, in microseconds.
    #[arg(long, default_value_t = 300)]
    dwell_us: u64,

    /// SCHED_FIFO priority requested for the scanner thread.
    #[arg(long, default_value_t = 98)]
    rt_priority: i32,

    /// The panel is wired to leave the serial port on GPIO 14/15 free.
    #[arg(long)]
    serial_setup: bool,

    /// Peripheral base address in hex, instead of asking the device tree.
    #[arg(long, value_parser = parse_hex)]
    base_address: Option<u32>,

    /// Time for the scanner to read the switches before the first cycle.
    #[arg(long, default_value_t = 2000)]
    startup_delay_ms: u64,
}

fn parse_hex(value: &str) -> Result<u32, std::num::ParseIntError> {
    u32::from_str_radix(value.trim_start_matches("0x"), 16)
}

static POWER_ACTIONS: Channel<CriticalSectionRawMutex, PowerAction, CHANNEL_CAPACITY> =
    Channel::new();
static INTERRUPTED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let panel = Arc::new(Panel::new());
    let scanner = match start_scanner(&args, &panel) {
        Ok(scanner) => scanner,
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    };

    let worker = match power::spawn_worker(SystemPower) {
        Ok((worker, _)) => worker,
        Err(e) => {
            error!("failed to start the power worker: {}", e);
            stop_scanner(&panel, scanner);
            process::exit(1);
        }
    };
    if let Err(e) = spawner.spawn(power_task(POWER_ACTIONS.receiver(), worker)) {
        error!("failed to start the power task: {:?}", e);
        stop_scanner(&panel, scanner);
        process::exit(1);
    }

    Timer::after_millis(args.startup_delay_ms).await;

    let mut generator = PatternGenerator::new(SmallRng::from_entropy());
    generator::run(&mut generator, &panel, POWER_ACTIONS.sender(), &INTERRUPTED).await;

    // The scanner sees the same flag and finishes its current cycle.
    process::exit(exit_status(scanner.join()));
}

// `process::exit` skips destructors, so the GPIO block is unmapped here.
fn exit_status<P>(joined: std::thread::Result<P>) -> i32 {
    match joined {
        Ok(gpio) => {
            drop(gpio);
            0
        }
        Err(_) => {
            error!("error joining the matrix scanner");
            1
        }
    }
}

// Ends the scanner thread and unmaps the GPIO block.
fn stop_scanner(panel: &Panel, scanner: JoinHandle<Bcm2835Gpio>) {
    panel.terminate();
    exit_status(scanner.join());
}

fn start_scanner(args: &Args, panel: &Arc<Panel>) -> anyhow::Result<JoinHandle<Bcm2835Gpio>> {
    let interrupted = panel.clone();
    ctrlc::set_handler(move || {
        interrupted.terminate();
        INTERRUPTED.signal(());
    })
    .context("failed to install the interrupt handler")?;

    let base = args.base_address.unwrap_or_else(bcm2835::peripheral_base);
    let gpio = Bcm2835Gpio::map(base)
        .context("failed to map the physical GPIO registers into the virtual memory space")?;
    if gpio.address() == 0x2020_0000 {
        info!("RPi Plus detected");
    } else {
        info!("RPi 2 or later detected, GPIO at {:#010x}", gpio.address());
    }

    let wiring = if args.serial_setup {
        Wiring::SERIAL
    } else {
        Wiring::STANDARD
    };
    let timing = ScanTiming::new(Duration::from_micros(args.dwell_us));
    let scanner = MatrixScanner::new(gpio, wiring, timing, panel.clone());

    scanner::spawn(scanner, args.rt_priority).context("failed to start the matrix scanner thread")
}

#[cfg(test)]
mod tests {
    use super::exit_status;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    struct Mapping<'a>(&'a AtomicBool);

    impl Drop for Mapping<'_> {
        fn drop(&mut self) {
            self.0.store(true, Ordering::Relaxed);
        }
    }

    #[test]
    fn the_mapping_is_released_before_exit() {
        let released = AtomicBool::new(false);
        assert_eq!(exit_status(Ok(Mapping(&released))), 0);
        assert!(released.load(Ordering::Relaxed));
    }

    #[test]
    fn a_panicked_scanner_exits_with_failure() {
        let joined = thread::spawn(|| -> u32 { panic!("scanner died") }).join();
        assert_eq!(exit_status(joined), 1);
    }
}
