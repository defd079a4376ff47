/*
 * What the lamps do in each mode.
 *
 * None of this computes anything. Each mode fills the lamp fields with
 * something that looks plausible from across the room: random numbers,
 * the time of day, or a snake crawling through the registers. The
 * instruction lamps flicker at rates that roughly match how often a real
 * program would execute each kind of instruction.
 */

use chrono::{Datelike, NaiveDateTime, Timelike};
use enum_ordinalize::Ordinalize;
use rand::Rng;

use crate::panel::Panel;
use crate::panel::layout::*;

/// The mode selected with the data field toggles. The codes come from the
/// panel's labelling; 2 and 4 are spare and behave like `Normal`.
#[derive(Ordinalize, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum Mode {
    Test = 0,
    Snake = 1,
    Spare2 = 2,
    Sleep = 3,
    Spare4 = 4,
    Dim = 5,
    Clock = 6,
    Normal = 7,
}

impl Mode {
    /// Decodes the mode from the step switch group, where it sits in the
    /// top three bits.
    pub fn decode(step: u32) -> Mode {
        Mode::from_ordinal(((step >> 3) & 0o7) as u8).unwrap_or(Mode::Normal)
    }
}

/// True with a probability of exactly `chance` out of `out_of`.
pub fn weighted_flag<R: Rng>(rng: &mut R, out_of: u32, chance: u32) -> bool {
    rng.gen_range(1..=out_of) <= chance
}

/// Per-lamp flicker rates for the instruction lamps, in percent.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Flicker {
    rates: [u32; Operation::VARIANT_COUNT],
}

impl Flicker {
    // Order: AND, TAD, ISZ, DCA, JMS, JMP, IOT, OPR.
    pub const QUIET: Flicker = Flicker {
        rates: [20, 2, 5, 5, 5, 15, 10, 10],
    };
    pub const STEADY: Flicker = Flicker {
        rates: [50, 5, 10, 10, 10, 30, 20, 20],
    };
    pub const BUSY: Flicker = Flicker {
        rates: [50, 10, 20, 20, 20, 60, 40, 40],
    };

    pub fn rate(&self, operation: Operation) -> u32 {
        self.rates[operation.ordinal()]
    }

    pub fn apply<R: Rng>(&self, panel: &Panel, rng: &mut R) {
        for operation in Operation::VARIANTS.iter().copied() {
            panel.light(operation.lamp(), weighted_flag(rng, 100, self.rate(operation)));
        }
    }
}

// The lamps no mode uses except the lamp test.
fn idle_indicators(panel: &Panel) {
    for lamp in [DEFER, WORD_COUNT, CURRENT_ADDRESS, BREAK] {
        panel.light(lamp, false);
    }
}

fn running_indicators(panel: &Panel) {
    idle_indicators(panel);
    panel.light(ION, true);
    panel.light(FETCH, true);
}

pub fn sleep<R: Rng>(panel: &Panel, rng: &mut R) {
    for field in NUMERIC_FIELDS {
        panel.store(field, 0);
    }
    Flicker::QUIET.apply(panel, rng);
    idle_indicators(panel);
    panel.light(LINK, false);
    panel.light(ION, false);
    panel.light(FETCH, false);
}

pub fn lamp_test(panel: &Panel) {
    for field in LAMP_FIELDS {
        panel.store(field, u32::MAX);
    }
}

pub fn clock<R: Rng>(panel: &Panel, rng: &mut R, now: &NaiveDateTime) {
    panel.store(PROGRAM_COUNTER, now.hour());
    panel.store(MEMORY_ADDRESS, now.minute());
    panel.store(MEMORY_BUFFER, now.second());
    panel.store(ACCUMULATOR, now.month());
    panel.store(MULTIPLIER_QUOTIENT, now.day());
    panel.store(STEP_COUNTER, 0);
    panel.store(DATA_FIELD, 0);
    panel.store(INSTRUCTION_FIELD, 0);
    running_indicators(panel);
    Flicker::STEADY.apply(panel, rng);
}

pub fn dim<R: Rng>(panel: &Panel, rng: &mut R) {
    for field in [PROGRAM_COUNTER, MEMORY_ADDRESS, MEMORY_BUFFER] {
        panel.store(field, rng.r#gen());
    }
    for field in [ACCUMULATOR, MULTIPLIER_QUOTIENT, STEP_COUNTER, DATA_FIELD, INSTRUCTION_FIELD] {
        panel.store(field, 0);
    }
    running_indicators(panel);
    Flicker::STEADY.apply(panel, rng);
}

pub fn normal<R: Rng>(panel: &Panel, rng: &mut R) {
    for field in NUMERIC_FIELDS {
        panel.store(field, rng.r#gen());
    }
    panel.light(LINK, weighted_flag(rng, 100, 20));
    running_indicators(panel);
    Flicker::BUSY.apply(panel, rng);
}

// Far enough left that the head has slid off the register.
const SNAKE_END: u32 = 0b111 << 11;

/*
 * A three-lamp snake that crawls left along one register, drops to the next
 * register and crawls back right, and so on, wrapping from the bottom
 * register to the top. It grows out of the right edge one lamp at a time
 * and slides out past the left edge.
 */
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Snake {
    register: usize,
    body: u32,
    rising: bool,
}

impl Snake {
    pub const fn new() -> Self {
        Snake {
            register: 0,
            body: 1,
            rising: true,
        }
    }

    /// Index into `REGISTERS` of the register the snake is in.
    pub fn register(&self) -> usize {
        self.register
    }

    pub fn body(&self) -> u32 {
        self.body
    }

    pub fn rising(&self) -> bool {
        self.rising
    }

    pub fn draw<R: Rng>(&mut self, panel: &Panel, rng: &mut R) {
        for (index, field) in REGISTERS.iter().enumerate() {
            panel.store(*field, if index == self.register { self.body } else { 0 });
        }
        self.advance();

        panel.store(STEP_COUNTER, 0);
        panel.store(DATA_FIELD, 0);
        panel.store(INSTRUCTION_FIELD, 0);
        panel.light(LINK, false);
        running_indicators(panel);
        Flicker::BUSY.apply(panel, rng);
    }

    fn advance(&mut self) {
        if self.rising && self.body < SNAKE_END {
            self.body <<= 1;
            if self.body < 0b111 {
                self.body += 1;
            }
        } else if !self.rising && self.body > 1 {
            self.body >>= 1;
        } else {
            self.rising = !self.rising;
            self.register = (self.register + 1) % REGISTERS.len();
        }
    }
}
