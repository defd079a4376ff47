/*
 * The matrix scanner.
 *
 * The panel has 8 rows of 12 lamps and 3 rows of 12 switches, all hanging off
 * the same 12 column lines. The scanner time-shares those columns: first it
 * lights each lamp row in turn (display phase), then it turns the columns
 * around into pulled-up inputs and grounds each switch row in turn to see
 * which switches are closed (scan phase). Then it starts over, until the
 * panel asks it to stop.
 *
 * Persistence of vision only works if every row gets about the same on-time,
 * so the scanner runs on its own thread and asks for real-time priority.
 * Without it the lamps flicker a bit more under load, nothing worse, so that
 * failure is just a warning.
 *
 * The scanner knows nothing about what the lamps mean. It copies words from
 * the panel's lamp rows onto the pins and copies pin levels into the
 * panel's switch rows.
 */

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::io::{Direction, PeripheralAccess, Pull, Wiring, bit};
use crate::panel::Panel;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ScanTiming {
    /// How long each lamp row is driven.
    pub dwell: Duration,
    /// Pause between lamp rows, against ghosting in the row drivers.
    pub row_gap: Duration,
    /// Time for a grounded switch row to pull the columns down.
    pub settle: Duration,
}

impl ScanTiming {
    pub fn new(dwell: Duration) -> Self {
        ScanTiming {
            dwell,
            row_gap: Duration::from_micros(10),
            settle: dwell / 100,
        }
    }
}

impl Default for ScanTiming {
    fn default() -> Self {
        ScanTiming::new(Duration::from_micros(300))
    }
}

pub struct MatrixScanner<P> {
    gpio: P,
    wiring: Wiring,
    timing: ScanTiming,
    panel: Arc<Panel>,
}

impl<P: PeripheralAccess> MatrixScanner<P> {
    pub fn new(gpio: P, wiring: Wiring, timing: ScanTiming, panel: Arc<Panel>) -> Self {
        MatrixScanner {
            gpio,
            wiring,
            timing,
            panel,
        }
    }

    pub fn run(mut self) -> P {
        self.prepare();
        debug!("front panel on");

        // Termination is only checked between full cycles.
        while !self.panel.terminated() {
            self.display();
            self.scan();
        }

        self.release();
        debug!("front panel off");
        self.gpio
    }

    /*
     * Everything starts out as an input. Lamp rows are preset low so they
     * come up dark when they are switched to output. The columns get their
     * pull-ups here once; they are only needed while scanning but do no harm
     * while the columns are outputs.
     */
    fn prepare(&mut self) {
        for &pin in &self.wiring.lamp_rows {
            self.gpio.set_direction(pin, Direction::Input);
            self.gpio.clear(bit(pin));
        }
        for &pin in self.wiring.columns.iter().chain(self.wiring.switch_rows.iter()) {
            self.gpio.set_direction(pin, Direction::Input);
        }

        self.gpio.set_pull(self.wiring.column_mask(), Pull::Up);
        self.gpio.set_pull(self.wiring.lamp_row_mask(), Pull::Float);
        self.gpio.set_pull(self.wiring.switch_row_mask(), Pull::Float);
    }

    pub fn display(&mut self) {
        for &pin in &self.wiring.columns {
            self.gpio.set_direction(pin, Direction::Output);
        }

        for (row, &row_pin) in self.wiring.lamp_rows.iter().enumerate() {
            let lamps = self.panel.lamp_row(row);

            // The column drivers are active-low: a lamp lights when its
            // column is pulled down while its row is high.
            let mut on = 0;
            let mut off = 0;
            for (column, &pin) in self.wiring.columns.iter().enumerate() {
                if lamps & (1 << column) != 0 {
                    on |= bit(pin);
                } else {
                    off |= bit(pin);
                }
            }
            self.gpio.set(off);
            self.gpio.clear(on);

            self.gpio.set_direction(row_pin, Direction::Input);
            self.gpio.set(bit(row_pin));
            self.gpio.set_direction(row_pin, Direction::Output);

            thread::sleep(self.timing.dwell);

            self.gpio.clear(bit(row_pin));
            self.gpio.set_direction(row_pin, Direction::Input);

            thread::sleep(self.timing.row_gap);
        }
    }

    pub fn scan(&mut self) {
        for &pin in &self.wiring.columns {
            self.gpio.set_direction(pin, Direction::Input);
        }

        for (row, &row_pin) in self.wiring.switch_rows.iter().enumerate() {
            // Ground this row so closed switches pull their column low
            // against the pull-up.
            self.gpio.set_direction(row_pin, Direction::Output);
            self.gpio.clear(bit(row_pin));

            thread::sleep(self.timing.settle);

            let mut levels = 0;
            for (column, &pin) in self.wiring.columns.iter().enumerate() {
                if self.gpio.read(pin) {
                    levels |= 1 << column;
                }
            }

            self.gpio.set_direction(row_pin, Direction::Input);
            self.panel.store_switch_row(row, levels);
        }
    }

    // Leave every line floating, as if the program had never run.
    fn release(&mut self) {
        for pin in self.wiring.all_pins() {
            self.gpio.set_direction(pin, Direction::Input);
        }
    }
}

pub fn spawn<P>(scanner: MatrixScanner<P>, rt_priority: i32) -> io::Result<JoinHandle<P>>
where
    P: PeripheralAccess + Send + 'static,
{
    thread::Builder::new()
        .name("matrix-scanner".into())
        .spawn(move || {
            request_realtime(rt_priority);
            scanner.run()
        })
}

fn request_realtime(priority: i32) {
    // SAFETY: sched_param is plain data, all-zero is a valid value.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;

    // SAFETY: adjusting the calling thread only.
    let result =
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if result != 0 {
        warn!(
            "failed to set real-time priority {}: {}",
            priority,
            io::Error::from_raw_os_error(result)
        );
    }
}
