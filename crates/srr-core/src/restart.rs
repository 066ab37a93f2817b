//! ---
//! srr_section: "03-orchestration-core"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Save/restore orchestration engine and fleet catalog."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Schedules the delayed host restart demanded by restored features.
///
/// The restart is a detached side effect: [`RestartArbiter::schedule`] must
/// only be called after the UI reply has been committed, and it never blocks
/// the caller. The actual host action is an injected hook; wiring it to the
/// operating system is the embedder's business.
#[derive(Clone)]
pub struct RestartArbiter {
    delay: Duration,
    hook: Arc<dyn Fn() + Send + Sync>,
}

impl RestartArbiter {
    /// Arbiter whose hook only logs; used when no host integration exists.
    pub fn new(delay: Duration) -> Self {
        Self::with_hook(
            delay,
            Arc::new(|| info!("host restart hook not wired, restart request dropped")),
        )
    }

    /// Arbiter invoking `hook` once the countdown elapses.
    pub fn with_hook(delay: Duration, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self { delay, hook }
    }

    /// Fire-and-forget: spawn the countdown thread and return immediately.
    pub fn schedule(&self) {
        let delay = self.delay;
        let hook = self.hook.clone();
        std::thread::spawn(move || {
            let mut remaining = delay.as_secs();
            while remaining > 0 {
                info!(seconds = remaining, "restarting host");
                std::thread::sleep(Duration::from_secs(1));
                remaining -= 1;
            }
            info!("restart");
            hook();
        });
    }
}

impl std::fmt::Debug for RestartArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartArbiter")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
