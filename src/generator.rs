/*
 * The pattern generator.
 *
 * Once per cycle the generator reads the switches, picks a mode and a delay,
 * lets the mode repaint the lamps, sleeps, and then briefly blanks the
 * execute and instruction lamps so that they visibly blink even when they
 * come back on in the next cycle.
 *
 * The switch register sets the pace: its low six bits the longest delay, in
 * steps of 50ms, its high six bits how much random shortening is applied to
 * that delay. Either single-step toggle pauses the display.
 *
 * The stop and start keys double as power buttons, but only when held:
 * - stop held for 3 seconds ends the program, or powers the machine off if
 *   both single-step toggles are also down,
 * - start held for 3 seconds with both single-step toggles down reboots.
 *
 * In order to keep this module testable, all sleeping happens outside the
 * `PatternGenerator` state machine. `begin_cycle` does everything up to the
 * sleep, `end_cycle` everything after it; `run` strings them together with
 * timers.
 */

pub mod patterns;

use chrono::{Local, NaiveDateTime};
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use enum_ordinalize::Ordinalize;
use log::{debug, info};
use rand::Rng;

use crate::panel::Panel;
use crate::panel::layout::*;
use crate::power::{CHANNEL_CAPACITY, PowerAction};
use patterns::{Mode, Snake};

/// The instruction lamps are dark for this long at the end of every cycle.
pub const BLINK_GAP: Duration = Duration::from_millis(20);
pub const PAUSED_CYCLE: Duration = Duration::from_millis(250);
pub const CLOCK_CYCLE: Duration = Duration::from_millis(500);
pub const HOLD_TIME_MS: u64 = 3000;

const DELAY_STEP_US: u64 = 50_000;
const DELAY_FIELD: u32 = 0o77;
const JITTER_SHIFT: u32 = 6;
const JITTER_FIELD: u32 = 0o77;

/// The longest delay the switch register asks for, 50ms to 3.2s.
pub fn base_delay_us(register: u32) -> u64 {
    ((register & DELAY_FIELD) as u64 + 1) * DELAY_STEP_US
}

pub fn jitter_scale(register: u32) -> u64 {
    ((register >> JITTER_SHIFT) & JITTER_FIELD) as u64
}

/// Shortens `delay_us` by a random amount, up to all of it when the jitter
/// scale is at its maximum of 63.
pub fn jittered_us<R: Rng>(rng: &mut R, delay_us: u64, scale: u64) -> u64 {
    let jitter = rng.gen_range(0..delay_us) / 63 * scale;
    delay_us - jitter
}

/// What one cycle decided, before the generator goes to sleep.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Cycle {
    pub mode: Mode,
    pub paused: bool,
    /// The whole cycle time, blink gap included.
    pub sleep_time: Duration,
}

impl Cycle {
    /// How long to sleep before `end_cycle`; the blink gap takes the rest.
    pub fn sleep(&self) -> Duration {
        self.sleep_time
            .checked_sub(BLINK_GAP)
            .unwrap_or(Duration::from_ticks(0))
    }
}

/// Times how long a key has been held down. Fires once per press.
#[derive(Debug, Default)]
struct Hold {
    held_ms: u64,
    done: bool,
}

impl Hold {
    fn update(&mut self, pressed: bool, elapsed_ms: u64) -> bool {
        if !pressed {
            self.held_ms = 0;
            self.done = false;
            return false;
        }
        self.held_ms += elapsed_ms;
        !self.done && self.held_ms >= HOLD_TIME_MS
    }

    fn complete(&mut self) {
        self.done = true;
    }
}

// The bits of the key row that carry a key; the rest float.
fn keys_mask() -> u32 {
    KEYS.iter().fold(0, |mask, (_, key)| mask | key.row_bits())
}

// Switch values as last reported, so changes are logged once.
#[derive(Debug, Default)]
struct Reported {
    register: Option<u32>,
    step: Option<u32>,
    keys: Option<u32>,
}

pub struct PatternGenerator<R> {
    rng: R,
    snake: Snake,
    paused: bool,
    stop: Hold,
    start: Hold,
    delay_us: u64,
    jitter_scale: u64,
    reported: Reported,
}

impl<R: Rng> PatternGenerator<R> {
    pub fn new(rng: R) -> Self {
        PatternGenerator {
            rng,
            snake: Snake::new(),
            paused: false,
            stop: Hold::default(),
            start: Hold::default(),
            delay_us: 0,
            jitter_scale: 0,
            reported: Reported::default(),
        }
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn snake(&self) -> &Snake {
        &self.snake
    }

    /// The lamps a running machine shows before the first cycle.
    pub fn power_up(&self, panel: &Panel) {
        panel.light(ION, true);
        panel.light(FETCH, true);
        panel.light(EXECUTE, true);
        panel.light(RUN, true);
        panel.light(PAUSE, false);
        panel.light(JMP, true);
    }

    pub fn begin_cycle(&mut self, panel: &Panel, now: &NaiveDateTime) -> Cycle {
        panel.light(EXECUTE, true);

        let step = panel.switches(STEP);
        let mode = Mode::decode(step);
        let register = panel.switches(SWITCH_REGISTER);

        let sleep_time = if self.paused {
            PAUSED_CYCLE
        } else {
            self.delay_us = base_delay_us(register);
            self.jitter_scale = jitter_scale(register);
            let sleep_us = jittered_us(&mut self.rng, self.delay_us, self.jitter_scale);

            match self.render(mode, panel, now) {
                Some(fixed) => fixed,
                None => Duration::from_micros(sleep_us),
            }
        };

        self.report(panel, register, step, mode);

        Cycle {
            mode,
            paused: self.paused,
            sleep_time,
        }
    }

    // Returns the cycle time if the mode insists on one.
    fn render(&mut self, mode: Mode, panel: &Panel, now: &NaiveDateTime) -> Option<Duration> {
        match mode {
            Mode::Sleep => patterns::sleep(panel, &mut self.rng),
            Mode::Test => patterns::lamp_test(panel),
            Mode::Clock => {
                patterns::clock(panel, &mut self.rng, now);
                return Some(CLOCK_CYCLE);
            }
            Mode::Dim => patterns::dim(panel, &mut self.rng),
            Mode::Snake => self.snake.draw(panel, &mut self.rng),
            Mode::Normal | Mode::Spare2 | Mode::Spare4 => patterns::normal(panel, &mut self.rng),
        }
        None
    }

    fn report(&mut self, panel: &Panel, register: u32, step: u32, mode: Mode) {
        if self.reported.register != Some(register) {
            self.reported.register = Some(register);
            info!(
                "Register Switch: Value={}  delay={}  varietyMult={}",
                register, self.delay_us, self.jitter_scale
            );
        }

        if self.reported.step != Some(step) {
            self.reported.step = Some(step);
            info!(
                "Step Switch: Value={}  Mode={}  IF Value={}",
                step,
                mode.ordinal(),
                step & 0o7
            );
        }

        let keys = panel.switch_row(STOP.row()) & keys_mask();
        if self.reported.keys != Some(keys) {
            self.reported.keys = Some(keys);
            let held: Vec<&str> = KEYS
                .iter()
                .filter(|(_, key)| panel.asserted(*key))
                .map(|(name, _)| *name)
                .collect();
            info!("Keys: [{}]", held.join(", "));
        }
    }

    /// Called after sleeping for `cycle.sleep()`. Handles the hold gestures,
    /// updates pause and run, and blanks the instruction lamps for the blink
    /// gap that follows.
    pub fn end_cycle(&mut self, panel: &Panel, cycle: &Cycle) -> Option<PowerAction> {
        let elapsed_ms = (cycle.sleep() + BLINK_GAP).as_millis();
        let single_steps = panel.asserted(SINGLE_STEP) && panel.asserted(SINGLE_INSTRUCTION);
        let mut action = None;

        if self.stop.update(panel.asserted(STOP), elapsed_ms) {
            self.stop.complete();
            if single_steps {
                action = Some(PowerAction::PowerOff);
            } else {
                info!("stop held, exiting");
                panel.terminate();
            }
        }

        if self.start.update(panel.asserted(START), elapsed_ms) && single_steps {
            self.start.complete();
            action = Some(PowerAction::Reboot);
        }

        self.paused = panel.asserted(SINGLE_STEP) || panel.asserted(SINGLE_INSTRUCTION);
        panel.light(PAUSE, self.paused);
        panel.light(RUN, !self.paused);

        panel.light(EXECUTE, false);
        for operation in Operation::VARIANTS.iter().copied() {
            panel.light(operation.lamp(), false);
        }

        action
    }
}

/// Runs the generator until the panel is told to terminate. An interrupt
/// also raises `interrupted`, which cuts the current sleep short.
pub async fn run<R: Rng>(
    generator: &mut PatternGenerator<R>,
    panel: &Panel,
    power: Sender<'static, CriticalSectionRawMutex, PowerAction, CHANNEL_CAPACITY>,
    interrupted: &Signal<CriticalSectionRawMutex, ()>,
) {
    generator.power_up(panel);

    while !panel.terminated() {
        let cycle = generator.begin_cycle(panel, &Local::now().naive_local());
        debug!(
            "{:?} cycle of {}ms{}",
            cycle.mode,
            cycle.sleep_time.as_millis(),
            if cycle.paused { ", paused" } else { "" }
        );
        select(Timer::after(cycle.sleep()), interrupted.wait()).await;

        if let Some(action) = generator.end_cycle(panel, &cycle) {
            power.send(action).await;
        }
        Timer::after(BLINK_GAP).await;
    }
}
