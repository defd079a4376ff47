/*
 * Where everything is on the panel.
 *
 * These tables follow the physical wiring of the front panel kit. Which
 * switches read inverted and which mode codes are spare depend on that
 * wiring, so the tables are kept as they are rather than derived.
 */

use enum_ordinalize::Ordinalize;

use super::Field;

// Numeric registers, one lamp row each.
pub const PROGRAM_COUNTER: Field = Field::new(0, 0, 0o7777);
pub const MEMORY_ADDRESS: Field = Field::new(1, 0, 0o7777);
pub const MEMORY_BUFFER: Field = Field::new(2, 0, 0o7777);
pub const ACCUMULATOR: Field = Field::new(3, 0, 0o7777);
pub const MULTIPLIER_QUOTIENT: Field = Field::new(4, 0, 0o7777);

// Row 5: instruction and major state indicators.
pub const AND: Field = Field::flag(5, 11);
pub const TAD: Field = Field::flag(5, 10);
pub const ISZ: Field = Field::flag(5, 9);
pub const DCA: Field = Field::flag(5, 8);
pub const JMS: Field = Field::flag(5, 7);
pub const JMP: Field = Field::flag(5, 6);
pub const IOT: Field = Field::flag(5, 5);
pub const OPR: Field = Field::flag(5, 4);
pub const FETCH: Field = Field::flag(5, 3);
pub const EXECUTE: Field = Field::flag(5, 2);
pub const DEFER: Field = Field::flag(5, 1);
pub const WORD_COUNT: Field = Field::flag(5, 0);

// Row 6
pub const CURRENT_ADDRESS: Field = Field::flag(6, 11);
pub const BREAK: Field = Field::flag(6, 10);
pub const ION: Field = Field::flag(6, 9);
pub const PAUSE: Field = Field::flag(6, 8);
pub const RUN: Field = Field::flag(6, 7);
pub const STEP_COUNTER: Field = Field::new(6, 0, 0o177);

// Row 7
pub const DATA_FIELD: Field = Field::new(7, 9, 0o7);
pub const INSTRUCTION_FIELD: Field = Field::new(7, 6, 0o7);
pub const LINK: Field = Field::flag(7, 5);

/// The five registers that carry numbers, top to bottom.
pub const REGISTERS: [Field; 5] = [
    PROGRAM_COUNTER,
    MEMORY_ADDRESS,
    MEMORY_BUFFER,
    ACCUMULATOR,
    MULTIPLIER_QUOTIENT,
];

/// Every multi-bit lamp field.
pub const NUMERIC_FIELDS: [Field; 8] = [
    PROGRAM_COUNTER,
    MEMORY_ADDRESS,
    MEMORY_BUFFER,
    ACCUMULATOR,
    MULTIPLIER_QUOTIENT,
    STEP_COUNTER,
    DATA_FIELD,
    INSTRUCTION_FIELD,
];

pub const LAMP_FIELDS: [Field; 26] = [
    PROGRAM_COUNTER,
    MEMORY_ADDRESS,
    MEMORY_BUFFER,
    ACCUMULATOR,
    MULTIPLIER_QUOTIENT,
    AND,
    TAD,
    ISZ,
    DCA,
    JMS,
    JMP,
    IOT,
    OPR,
    FETCH,
    EXECUTE,
    DEFER,
    WORD_COUNT,
    CURRENT_ADDRESS,
    BREAK,
    ION,
    PAUSE,
    RUN,
    STEP_COUNTER,
    DATA_FIELD,
    INSTRUCTION_FIELD,
    LINK,
];

/// The eight instruction lamps in the left column of the status block.
#[derive(Ordinalize, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(usize)]
pub enum Operation {
    And,
    Tad,
    Isz,
    Dca,
    Jms,
    Jmp,
    Iot,
    Opr,
}

impl Operation {
    pub const fn lamp(self) -> Field {
        match self {
            Operation::And => AND,
            Operation::Tad => TAD,
            Operation::Isz => ISZ,
            Operation::Dca => DCA,
            Operation::Jms => JMS,
            Operation::Jmp => JMP,
            Operation::Iot => IOT,
            Operation::Opr => OPR,
        }
    }
}

// Switch row 0 is the switch register, row 1 carries the data field,
// instruction field and step toggles, row 2 the control keys.
pub const SWITCH_REGISTER: Field = Field::new(0, 0, 0o7777);
pub const STEP: Field = Field::new(1, 6, 0o77);

pub const SINGLE_INSTRUCTION: Field = Field::flag(2, 4);
pub const SINGLE_STEP: Field = Field::flag(2, 5);
pub const STOP: Field = Field::flag(2, 6);
pub const CONTINUE: Field = Field::flag(2, 7);
pub const EXAMINE: Field = Field::flag(2, 8);
pub const DEPOSIT: Field = Field::flag(2, 9);
pub const LOAD_ADDRESS: Field = Field::flag(2, 10);
pub const START: Field = Field::flag(2, 11);

/// The control keys, by their legend, for diagnostics.
pub const KEYS: [(&str, Field); 8] = [
    ("SING INST", SINGLE_INSTRUCTION),
    ("SING STEP", SINGLE_STEP),
    ("STOP", STOP),
    ("CONT", CONTINUE),
    ("EXAM", EXAMINE),
    ("DEP", DEPOSIT),
    ("LOAD ADD", LOAD_ADDRESS),
    ("START", START),
];
