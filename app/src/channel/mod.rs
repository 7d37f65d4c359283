use std::io;

/// Line-oriented transport of the control side-channel.
pub trait Channel: Send + 'static {
    /// Sends a single line. The line must end with `\n`.
    fn send_line(&mut self, line: &str) -> io::Result<()>;
    /// Receives a single line without the trailing `\n`.
    fn receive_line(&mut self) -> io::Result<String>;
}

#[cfg(feature = "real")]
mod tty;
#[cfg(feature = "real")]
pub use tty::Tty;
