#[cfg(feature = "real")]
mod mem;
#[cfg(feature = "real")]
pub use mem::GpioMem;

use common::config::pins;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Access to the GPIO lines of the board.
pub trait Gpio: Clone + Send + 'static {
    fn set_mode(&self, pin: u32, mode: PinMode);
    /// Drives the output pins in `mask` high.
    fn set(&self, mask: u32);
    /// Drives the output pins in `mask` low.
    fn clear(&self, mask: u32);
    /// Levels of all pins.
    fn levels(&self) -> u32;
}

/// Configures the board pins and resets the clock.
pub fn setup<G: Gpio>(gpio: &G) {
    for pin in pins::DATA
        .into_iter()
        .chain([pins::TCO, pins::PI_OK, pins::FAIL])
    {
        gpio.set_mode(pin, PinMode::Input);
    }
    gpio.set_mode(pins::CLOCK, PinMode::Output);
    gpio.set_mode(pins::RESET, PinMode::Output);

    gpio.clear(pins::mask(pins::CLOCK));
    gpio.set(pins::mask(pins::RESET));
}
