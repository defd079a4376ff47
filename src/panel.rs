/*
 * The shared state of the front panel.
 *
 * The panel is owned by nobody in particular: the matrix scanner renders the
 * lamp rows and samples the switch rows, while the pattern generator decides
 * what the lamps should show and acts on the switches. The two never call
 * each other. All they share is this structure, handed to both at startup.
 *
 * Every row lives in its own atomic word. The lamp rows have exactly one
 * writer (the generator) and the switch rows have exactly one writer (the
 * scanner), so a plain load followed by a store is enough for the
 * read-modify-write of a field. Readers may see a row that is one update
 * behind, never a torn one.
 *
 * Values inside a row are addressed through a `Field`, a (row, shift, mask)
 * triple. The actual wiring of the panel is in the `layout` module.
 */

pub mod layout;

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub const LAMP_ROWS: usize = 8;
pub const SWITCH_ROWS: usize = 3;
pub const COLUMNS: usize = 12;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Field {
    row: usize,
    shift: u32,
    mask: u32,
}

impl Field {
    pub const fn new(row: usize, shift: u32, mask: u32) -> Self {
        Field { row, shift, mask }
    }

    // A single lamp or switch.
    pub const fn flag(row: usize, shift: u32) -> Self {
        Field::new(row, shift, 1)
    }

    pub const fn row(&self) -> usize {
        self.row
    }

    pub const fn mask(&self) -> u32 {
        self.mask
    }

    /// The bits this field occupies within its row.
    pub const fn row_bits(&self) -> u32 {
        self.mask << self.shift
    }

    pub const fn extract(&self, word: u32) -> u32 {
        (word >> self.shift) & self.mask
    }

    /// Replaces this field inside `word`, leaving every other bit alone.
    /// Values wider than the field are clamped by the mask.
    pub const fn insert(&self, word: u32, value: u32) -> u32 {
        (word & !self.row_bits()) | ((value & self.mask) << self.shift)
    }
}

pub struct Panel {
    lamps: [AtomicU32; LAMP_ROWS],
    switches: [AtomicU32; SWITCH_ROWS],
    terminate: AtomicBool,
}

impl Panel {
    pub const fn new() -> Self {
        Panel {
            lamps: [const { AtomicU32::new(0) }; LAMP_ROWS],
            switches: [const { AtomicU32::new(0) }; SWITCH_ROWS],
            terminate: AtomicBool::new(false),
        }
    }

    /*
     * Lamp side. Only the pattern generator writes these.
     */

    pub fn store(&self, field: Field, value: u32) {
        let row = &self.lamps[field.row];
        row.store(field.insert(row.load(Ordering::Relaxed), value), Ordering::Relaxed);
    }

    pub fn load(&self, field: Field) -> u32 {
        field.extract(self.lamps[field.row].load(Ordering::Relaxed))
    }

    pub fn light(&self, field: Field, on: bool) {
        self.store(field, on as u32);
    }

    pub fn lit(&self, field: Field) -> bool {
        self.load(field) != 0
    }

    pub fn lamp_row(&self, row: usize) -> u32 {
        self.lamps[row].load(Ordering::Relaxed)
    }

    /*
     * Switch side. Only the scanner writes these, and it writes raw pin
     * levels: a column reads high unless its switch pulls it to ground.
     */

    pub fn store_switch_row(&self, row: usize, levels: u32) {
        self.switches[row].store(levels, Ordering::Relaxed);
    }

    pub fn switch_row(&self, row: usize) -> u32 {
        self.switches[row].load(Ordering::Relaxed)
    }

    /// The raw value of a group of toggles, up = 1.
    pub fn switches(&self, field: Field) -> u32 {
        field.extract(self.switch_row(field.row))
    }

    /// Whether a control is asserted. The single-bit controls are wired so
    /// that asserting them grounds the column.
    pub fn asserted(&self, field: Field) -> bool {
        self.switches(field) == 0
    }

    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn terminated(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::layout::*;
    use super::*;

    #[test]
    fn store_then_load_is_masked() {
        let panel = Panel::new();
        for field in LAMP_FIELDS {
            for value in [0, 1, 5, 0o77, 0o777, 0o7777, 0xffff, u32::MAX] {
                panel.store(field, value);
                assert_eq!(panel.load(field), value & field.mask());
            }
        }
    }

    #[test]
    fn store_leaves_neighbours_alone() {
        let panel = Panel::new();
        panel.store(STEP_COUNTER, 0o177);
        panel.light(PAUSE, true);
        panel.light(CURRENT_ADDRESS, true);

        panel.store(RUN, u32::MAX);
        panel.light(PAUSE, false);

        assert_eq!(panel.load(STEP_COUNTER), 0o177);
        assert!(panel.lit(CURRENT_ADDRESS));
        assert!(panel.lit(RUN));
        assert!(!panel.lit(PAUSE));
    }

    #[test]
    fn lamp_fields_never_overlap_within_a_row() {
        for (i, a) in LAMP_FIELDS.iter().enumerate() {
            assert!(a.row() < LAMP_ROWS);
            assert_eq!(a.row_bits() & !((1 << COLUMNS) - 1), 0, "{:?} is too wide", a);
            for b in &LAMP_FIELDS[i + 1..] {
                if a.row() == b.row() {
                    assert_eq!(a.row_bits() & b.row_bits(), 0, "{:?} overlaps {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn switch_fields_never_overlap_within_a_row() {
        let mut fields = vec![SWITCH_REGISTER, STEP];
        fields.extend(KEYS.iter().map(|(_, field)| *field));
        for (i, a) in fields.iter().enumerate() {
            assert!(a.row() < SWITCH_ROWS);
            for b in &fields[i + 1..] {
                if a.row() == b.row() {
                    assert_eq!(a.row_bits() & b.row_bits(), 0, "{:?} overlaps {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn controls_are_asserted_when_grounded() {
        let panel = Panel::new();
        panel.store_switch_row(2, 0o7777);
        assert!(!panel.asserted(STOP));
        assert!(!panel.asserted(SINGLE_STEP));

        panel.store_switch_row(2, 0o7777 & !STOP.row_bits());
        assert!(panel.asserted(STOP));
        assert!(!panel.asserted(SINGLE_STEP));
    }

    #[test]
    fn switch_groups_read_raw() {
        let panel = Panel::new();
        panel.store_switch_row(1, 0o5300);
        assert_eq!(panel.switches(STEP), 0o53);
        panel.store_switch_row(0, 0o1234);
        assert_eq!(panel.switches(SWITCH_REGISTER), 0o1234);
    }
}
