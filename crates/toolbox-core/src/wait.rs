//! Waiting for the operator to end a recording.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use crossterm::tty::IsTty;
use signal_hook::consts::SIGINT;
use tracing::debug;

use crate::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Key,
    Timeout,
    Interrupted,
    EndOfInput,
}

/// SIGINT sets a flag instead of terminating while this guard lives.
struct InterruptGuard {
    flag: Arc<AtomicBool>,
    id: signal_hook::SigId,
}

impl InterruptGuard {
    fn install() -> Result<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        let id = signal_hook::flag::register(SIGINT, Arc::clone(&flag))?;
        Ok(Self { flag, id })
    }

    fn interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}

struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Block until a key is pressed, `duration` elapses, stdin closes or SIGINT
/// arrives. `prompt` goes to stderr.
pub fn wait_for_stop(prompt: &str, duration: Option<Duration>) -> Result<StopReason> {
    let guard = InterruptGuard::install()?;

    let reason = match duration {
        Some(d) => {
            eprintln!("Recording for {}s, press Ctrl-C to stop early...", d.as_secs());
            wait_timeout(&guard, d)
        }
        None => {
            eprint!("{}", prompt);
            let _ = io::stderr().flush();
            if io::stdin().is_tty() {
                wait_key(&guard)?
            } else {
                wait_line(&guard)
            }
        }
    };
    eprintln!();

    debug!(reason = ?reason, "wait finished");
    Ok(reason)
}

fn wait_timeout(guard: &InterruptGuard, duration: Duration) -> StopReason {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if guard.interrupted() {
            return StopReason::Interrupted;
        }
        thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
    StopReason::Timeout
}

fn wait_key(guard: &InterruptGuard) -> Result<StopReason> {
    let _raw = RawMode::enable()?;
    loop {
        if guard.interrupted() {
            return Ok(StopReason::Interrupted);
        }
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(StopReason::Key);
                }
            }
        }
    }
}

fn wait_line(guard: &InterruptGuard) -> StopReason {
    let (tx, rx) = mpsc::channel();
    // the reader thread is left behind if we stop on SIGINT
    thread::spawn(move || {
        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line).unwrap_or(0);
        let _ = tx.send(n);
    });

    loop {
        if guard.interrupted() {
            return StopReason::Interrupted;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(0) => return StopReason::EndOfInput,
            Ok(_) => return StopReason::Key,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return StopReason::EndOfInput,
        }
    }
}
