use super::{Gpio, PinMode};
use std::{
    fs::{File, OpenOptions},
    io,
    os::{fd::AsRawFd, raw::c_void},
    path::Path,
    ptr,
    sync::Arc,
};

/// Register word offsets.
const GPFSEL0: usize = 0;
const GPSET0: usize = 7;
const GPCLR0: usize = 10;
const GPLEV0: usize = 13;

struct Mapping {
    /// Kept open for the lifetime of the mapping.
    _file: File,
    regs: *mut u32,
    len: usize,
}

unsafe impl Sync for Mapping {}
unsafe impl Send for Mapping {}

impl Mapping {
    const LEN: usize = 0x1000;

    fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = Self::LEN;
        let regs = {
            let r = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    0,
                )
            };
            if r == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            r as *mut u32
        };
        Ok(Self {
            _file: file,
            regs,
            len,
        })
    }

    fn read(&self, offset: usize) -> u32 {
        debug_assert!(offset * 4 < self.len);
        unsafe { ptr::read_volatile(self.regs.add(offset)) }
    }
    fn write(&self, offset: usize, value: u32) {
        debug_assert!(offset * 4 < self.len);
        unsafe { ptr::write_volatile(self.regs.add(offset), value) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.regs as *mut c_void, self.len) };
    }
}

/// GPIO registers mapped from `/dev/gpiomem`.
#[derive(Clone)]
pub struct GpioMem {
    mapping: Arc<Mapping>,
}

impl GpioMem {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self {
            mapping: Arc::new(Mapping::new(path.as_ref())?),
        })
    }
}

impl Gpio for GpioMem {
    fn set_mode(&self, pin: u32, mode: PinMode) {
        let offset = GPFSEL0 + pin as usize / 10;
        let shift = (pin % 10) * 3;
        let bits = match mode {
            PinMode::Input => 0b000,
            PinMode::Output => 0b001,
        };
        let value = self.mapping.read(offset) & !(0b111 << shift) | (bits << shift);
        self.mapping.write(offset, value);
    }
    fn set(&self, mask: u32) {
        self.mapping.write(GPSET0, mask);
    }
    fn clear(&self, mask: u32) {
        self.mapping.write(GPCLR0, mask);
    }
    fn levels(&self) -> u32 {
        self.mapping.read(GPLEV0)
    }
}
