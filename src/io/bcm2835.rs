/*
 * Register-level GPIO driver for the BCM2835 family.
 *
 * The GPIO block is mapped straight out of /dev/mem, which needs root. The
 * mapping is a one-time precondition of the whole program: if it fails there
 * is nothing to retry, so the error goes back to `main` and the process
 * exits.
 *
 * Register offsets are in 32-bit words, see the BCM2835 ARM Peripherals
 * datasheet, chapter 6.
 */

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::ptr;
use std::thread;
use std::time::Duration;

use log::debug;

use super::{Direction, PeripheralAccess, Pin, Pull};

const BLOCK_SIZE: usize = 4096;
const GPIO_OFFSET: u32 = 0x20_0000;

// Original Pi, Zero and the Plus models.
const LEGACY_PERIPHERAL_BASE: u32 = 0x2000_0000;
const DEVICE_TREE_RANGES: &str = "/proc/device-tree/soc/ranges";

const GPFSEL0: usize = 0;
const GPSET0: usize = 7;
const GPCLR0: usize = 10;
const GPLEV0: usize = 13;
const GPPUD: usize = 37;
const GPPUDCLK0: usize = 38;

// The pull-up/down control needs 150 cycles between steps.
const PULL_SETTLE: Duration = Duration::from_micros(1);

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("failed to open /dev/mem, try checking permissions")]
    Open(#[source] io::Error),
    #[error("failed to map the GPIO registers at {address:#010x}")]
    Map {
        address: u32,
        #[source]
        source: io::Error,
    },
}

/// Finds where the peripherals live on this board, using the device tree
/// the firmware hands to the kernel.
pub fn peripheral_base() -> u32 {
    // Older boards keep the base at offset 4, the Pi 4 moved it to 8.
    match read_ranges(4) {
        Ok(0) => read_ranges(8).unwrap_or(LEGACY_PERIPHERAL_BASE),
        Ok(address) => address,
        Err(error) => {
            debug!("no usable {}: {}", DEVICE_TREE_RANGES, error);
            LEGACY_PERIPHERAL_BASE
        }
    }
}

fn read_ranges(offset: u64) -> io::Result<u32> {
    let mut file = File::open(DEVICE_TREE_RANGES)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut word = [0u8; 4];
    file.read_exact(&mut word)?;
    Ok(u32::from_be_bytes(word))
}

pub fn gpio_address(peripheral_base: u32) -> u32 {
    peripheral_base + GPIO_OFFSET
}

pub struct Bcm2835Gpio {
    registers: *mut u32,
    address: u32,
}

// The mapping is handed to the scanner thread once and used only there.
unsafe impl Send for Bcm2835Gpio {}

impl Bcm2835Gpio {
    pub fn map(peripheral_base: u32) -> Result<Self, GpioError> {
        let address = gpio_address(peripheral_base);
        let mem = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")
            .map_err(GpioError::Open)?;

        // SAFETY: a fresh shared mapping of a device file; nothing else in
        // this process aliases it.
        let map = unsafe {
            libc::mmap(
                ptr::null_mut(),
                BLOCK_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                mem.as_raw_fd(),
                address as libc::off_t,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(GpioError::Map {
                address,
                source: io::Error::last_os_error(),
            });
        }

        // The mapping outlives the file descriptor, `mem` is closed here.
        Ok(Bcm2835Gpio {
            registers: map.cast(),
            address,
        })
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    fn read_register(&self, offset: usize) -> u32 {
        debug_assert!(offset * 4 < BLOCK_SIZE);
        // SAFETY: offset is within the mapped block.
        unsafe { self.registers.add(offset).read_volatile() }
    }

    fn write_register(&mut self, offset: usize, value: u32) {
        debug_assert!(offset * 4 < BLOCK_SIZE);
        // SAFETY: offset is within the mapped block.
        unsafe { self.registers.add(offset).write_volatile(value) }
    }
}

impl Drop for Bcm2835Gpio {
    fn drop(&mut self) {
        // SAFETY: unmapping exactly what `map` mapped.
        unsafe {
            libc::munmap(self.registers.cast(), BLOCK_SIZE);
        }
    }
}

// The GPPUD control codes.
fn pull_control(pull: Pull) -> u32 {
    match pull {
        Pull::Float => 0,
        Pull::Down => 1,
        Pull::Up => 2,
    }
}

impl PeripheralAccess for Bcm2835Gpio {
    fn set_direction(&mut self, pin: Pin, direction: Direction) {
        // Three function-select bits per pin, ten pins per register.
        let offset = GPFSEL0 + pin as usize / 10;
        let shift = (pin as u32 % 10) * 3;
        let mut select = self.read_register(offset) & !(0b111 << shift);
        if direction == Direction::Output {
            select |= 0b001 << shift;
        }
        self.write_register(offset, select);
    }

    fn set_pull(&mut self, pins: u32, pull: Pull) {
        self.write_register(GPPUD, pull_control(pull));
        thread::sleep(PULL_SETTLE);
        self.write_register(GPPUDCLK0, pins);
        thread::sleep(PULL_SETTLE);
        self.write_register(GPPUD, 0);
        thread::sleep(PULL_SETTLE);
        self.write_register(GPPUDCLK0, 0);
        thread::sleep(PULL_SETTLE);
    }

    fn set(&mut self, pins: u32) {
        self.write_register(GPSET0, pins);
    }

    fn clear(&mut self, pins: u32) {
        self.write_register(GPCLR0, pins);
    }

    fn read(&self, pin: Pin) -> bool {
        self.read_register(GPLEV0) & super::bit(pin) != 0
    }
}
