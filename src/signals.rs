/// Deferred signal handling for the daemon loop.
///
/// Handlers only raise a flag. The loop looks at the flags between cycles
/// and while pausing, so no real work ever happens in signal context.
///
/// | signal            | action   |
/// |-------------------|----------|
/// | `SIGHUP`          | reload   |
/// | `SIGTERM`         | wake     |
/// | `SIGQUIT`/`SIGINT`| shutdown |
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Re-read the configuration, then update.
    Reload,
    /// Skip the rest of the pause and run a cycle now.
    Wake,
    Shutdown,
}

#[derive(Debug, Clone, Default)]
pub struct Signals {
    reload: Arc<AtomicBool>,
    wake: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the process signal handlers.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
        use signal_hook::flag;

        let signals = Self::new();
        flag::register(SIGHUP, Arc::clone(&signals.reload))?;
        flag::register(SIGTERM, Arc::clone(&signals.wake))?;
        flag::register(SIGQUIT, Arc::clone(&signals.shutdown))?;
        flag::register(SIGINT, Arc::clone(&signals.shutdown))?;
        log::debug!("signal handlers installed");
        Ok(signals)
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self::new())
    }

    /// Consume the most urgent pending action. Shutdown wins over reload,
    /// reload over wake; a reload implies a wake so that one is dropped.
    pub fn take(&self) -> Option<Action> {
        if self.shutdown.swap(false, Ordering::SeqCst) {
            return Some(Action::Shutdown);
        }
        if self.reload.swap(false, Ordering::SeqCst) {
            self.wake.store(false, Ordering::SeqCst);
            return Some(Action::Reload);
        }
        if self.wake.swap(false, Ordering::SeqCst) {
            return Some(Action::Wake);
        }
        None
    }

    /// Whether anything is waiting, without consuming it.
    pub fn pending(&self) -> bool {
        [&self.shutdown, &self.reload, &self.wake]
            .iter()
            .any(|flag| flag.load(Ordering::SeqCst))
    }

    /// Raise an action by hand, as a signal would.
    pub fn request(&self, action: Action) {
        let flag = match action {
            Action::Reload => &self.reload,
            Action::Wake => &self.wake,
            Action::Shutdown => &self.shutdown,
        };
        flag.store(true, Ordering::SeqCst);
    }
}
