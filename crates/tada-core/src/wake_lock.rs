//! Best-effort wake lock.
//!
//! Keeping the machine awake is never required for correct timing; the
//! engine logs acquisition failures and carries on.

use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum WakeLockError {
    #[error("wake lock unavailable: {0}")]
    Unavailable(#[from] std::io::Error),
    #[error("inhibitor exited immediately ({0})")]
    Exited(std::process::ExitStatus),
}

/// How long a fresh inhibitor must stay up before it counts as held.
const SETTLE: Duration = Duration::from_millis(100);

pub trait WakeLock: Send + std::fmt::Debug {
    fn acquire(&mut self) -> Result<(), WakeLockError>;

    /// Idempotent.
    fn release(&mut self);
}

/// Never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWakeLock;

impl WakeLock for NoWakeLock {
    fn acquire(&mut self) -> Result<(), WakeLockError> {
        Ok(())
    }

    fn release(&mut self) {}
}

/// Holds a systemd idle/sleep inhibitor for as long as the lock is held.
///
/// The inhibitor lives as long as a `systemd-inhibit ... sleep infinity`
/// child process; releasing kills it.
#[derive(Debug)]
pub struct InhibitorLock {
    program: String,
    why: String,
    child: Option<Child>,
}

impl InhibitorLock {
    pub fn new(why: impl Into<String>) -> Self {
        Self {
            program: "systemd-inhibit".into(),
            why: why.into(),
            child: None,
        }
    }

    #[cfg(test)]
    fn with_program(mut self, program: &str) -> Self {
        self.program = program.into();
        self
    }

    pub fn is_held(&self) -> bool {
        self.child.is_some()
    }
}

impl WakeLock for InhibitorLock {
    fn acquire(&mut self) -> Result<(), WakeLockError> {
        if self.child.is_some() {
            return Ok(());
        }
        debug!("Attempting to acquire idle inhibitor");

        let mut child = Command::new(&self.program)
            .args([
                "--what=idle:sleep",
                "--who=tada",
                &format!("--why={}", self.why),
                "--mode=block",
                "sleep",
                "infinity",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Without logind the inhibitor fails right after spawning.
        let deadline = Instant::now() + SETTLE;
        while Instant::now() < deadline {
            if let Some(status) = child.try_wait()? {
                debug!("Idle inhibitor exited with {status}");
                return Err(WakeLockError::Exited(status));
            }
            thread::sleep(Duration::from_millis(10));
        }

        info!("Idle inhibitor acquired (pid {})", child.id());
        self.child = Some(child);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Already-exited children make kill fail, which is fine.
            let _ = child.kill();
            let _ = child.wait();
            info!("Idle inhibitor released");
        }
    }
}

impl Drop for InhibitorLock {
    fn drop(&mut self) {
        self.release();
    }
}
