//! Hidden PIN entry on the controlling terminal

use std::io::{self, BufRead, Read, Write};

use pinlock_core::SecretSource;
use zeroize::Zeroizing;

/// Longest line read from the terminal, newline included
const MAX_LINE: usize = 256;

/// Disables terminal echo on stdin until dropped
struct EchoGuard {
    original: Option<libc::termios>,
}

impl EchoGuard {
    fn disable() -> Self {
        let fd = libc::STDIN_FILENO;

        // SAFETY: isatty/tcgetattr/tcsetattr only read and write the termios we own
        let original = unsafe {
            if libc::isatty(fd) == 0 {
                None
            } else {
                let mut termios: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(fd, &mut termios) != 0 {
                    None
                } else {
                    let original = termios;
                    termios.c_lflag &= !libc::ECHO;
                    libc::tcsetattr(fd, libc::TCSAFLUSH, &termios);
                    Some(original)
                }
            }
        };

        Self { original }
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Some(original) = &self.original {
            // SAFETY: restores the attributes captured in disable()
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, original);
            }
        }
    }
}

/// Prompt on stderr and read one line from stdin with echo off
///
/// Returns `None` on end of input or a read error.
pub fn prompt_hidden(label: &str) -> Option<Zeroizing<String>> {
    let mut stderr = io::stderr();
    let _ = write!(stderr, "{}", label);
    let _ = stderr.flush();

    let line = {
        let _guard = EchoGuard::disable();
        read_secret_line(io::stdin().lock())
    };
    let _ = writeln!(stderr);

    line
}

/// Read one line into a buffer that is allocated once and never grows
///
/// Input past `MAX_LINE` bytes is left unread.
fn read_secret_line<R: BufRead>(reader: R) -> Option<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::with_capacity(MAX_LINE));

    match reader.take(MAX_LINE as u64).read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            while line.ends_with(['\n', '\r']) {
                line.pop();
            }
            Some(line)
        }
    }
}

/// Secret source backed by the terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl SecretSource for TerminalPrompt {
    fn next_secret(&mut self, prompt: &str) -> Option<Zeroizing<String>> {
        prompt_hidden(prompt)
    }
}
