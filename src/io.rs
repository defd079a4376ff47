/*
 * The I/O module for the front panel.
 *
 * This module describes how the panel is wired to the GPIO header and
 * defines the handful of pin operations the matrix scanner needs. The
 * intention is for this module (and the register driver below it) to be the
 * only part of the program that is device-specific. Nothing else touches a
 * register address.
 */

pub mod bcm2835;

/// A GPIO line number, as printed on the SoC pinout.
pub type Pin = u8;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Pull {
    Float,
    Down,
    Up,
}

pub trait PeripheralAccess {
    fn set_direction(&mut self, pin: Pin, direction: Direction);

    /// Applies a pull resistor setting to every line in `pins` at once.
    fn set_pull(&mut self, pins: u32, pull: Pull);

    /// Drives the lines in `pins` high. Lines not in the mask are untouched.
    fn set(&mut self, pins: u32);

    /// Drives the lines in `pins` low. Lines not in the mask are untouched.
    fn clear(&mut self, pins: u32);

    fn read(&self, pin: Pin) -> bool;
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Wiring {
    pub lamp_rows: [Pin; 8],
    pub switch_rows: [Pin; 3],
    pub columns: [Pin; 12],
}

impl Wiring {
    pub const STANDARD: Wiring = Wiring {
        lamp_rows: [20, 21, 22, 23, 24, 25, 26, 27],
        switch_rows: [16, 17, 18],
        columns: [13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 15, 14],
    };

    // Boards modified to keep the serial port on 14 and 15 free.
    pub const SERIAL: Wiring = Wiring {
        lamp_rows: [20, 21, 22, 23, 24, 25, 26, 27],
        switch_rows: [16, 17, 18],
        columns: [13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2],
    };

    pub fn lamp_row_mask(&self) -> u32 {
        mask(&self.lamp_rows)
    }

    pub fn switch_row_mask(&self) -> u32 {
        mask(&self.switch_rows)
    }

    pub fn column_mask(&self) -> u32 {
        mask(&self.columns)
    }

    pub fn all_pins(&self) -> impl Iterator<Item = Pin> + '_ {
        self.lamp_rows
            .iter()
            .chain(self.switch_rows.iter())
            .chain(self.columns.iter())
            .copied()
    }
}

pub const fn bit(pin: Pin) -> u32 {
    1 << pin
}

fn mask(pins: &[Pin]) -> u32 {
    pins.iter().fold(0, |mask, &pin| mask | bit(pin))
}

/*
 * An in-memory stand-in for the GPIO block, used by the tests. It models the
 * panel electrically just enough: switch rows sink current through closed
 * switches into pulled-up columns, and lamp rows light the columns that are
 * driven low while the row is driven high.
 */
