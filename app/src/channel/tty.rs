use super::Channel;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::{fd::AsRawFd, unix::fs::OpenOptionsExt},
    path::Path,
    time::Duration,
};
use termios::Termios;

/// Serial tty in raw mode.
pub struct Tty {
    file: File,
    /// Received bytes not yet returned as a line.
    pending: Vec<u8>,
}

impl Tty {
    /// Opens the tty, `timeout` bounds a single read.
    pub fn open<P: AsRef<Path>>(path: P, timeout: Duration) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)?;
        {
            let fd = file.as_raw_fd();
            let mut tty = Termios::from_fd(fd)?;
            termios::cfmakeraw(&mut tty);
            tty.c_cc[termios::VMIN] = 0;
            tty.c_cc[termios::VTIME] = (timeout.as_millis() / 100).clamp(1, 255) as u8;
            termios::tcsetattr(fd, termios::TCSAFLUSH, &tty)?;
        }
        Ok(Self {
            file,
            pending: Vec::new(),
        })
    }

    fn take_line(&mut self) -> Option<io::Result<String>> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line = self.pending.drain(..=pos).take(pos).collect::<Vec<_>>();
        Some(String::from_utf8(line).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)))
    }
}

impl Channel for Tty {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        log::trace!("-> {:?}", line);
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }

    fn receive_line(&mut self) -> io::Result<String> {
        let mut buf = [0; 256];
        loop {
            if let Some(line) = self.take_line() {
                let line = line?;
                log::trace!("<- {:?}", line);
                break Ok(line);
            }
            match self.file.read(&mut buf)? {
                0 => break Err(io::ErrorKind::TimedOut.into()),
                n => self.pending.extend_from_slice(&buf[..n]),
            }
        }
    }
}
