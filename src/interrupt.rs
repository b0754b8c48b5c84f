//! Human-in-the-loop suspension protocols.
//!
//! Two independent mechanisms share this module:
//!
//! 1. Operator interrupt — Ctrl+C sets an atomic flag; the orchestrator
//!    polls it only at page boundaries (never mid-page, so the store never
//!    sees a half-parsed page) and then asks the operator to skip the
//!    current query or quit the run.
//! 2. CAPTCHA-wait — the browser pass blocks indefinitely on an
//!    acknowledgment that the human solved the challenge, then re-issues
//!    the identical page fetch.
//!
//! Both prompts sit behind `OperatorPrompt` so tests drive the protocols
//! with scripted implementations instead of stdin.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// The operator's answer to an interrupt: drop the rest of the current
/// query, or stop the whole run (keeping everything gathered).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptChoice {
    Skip,
    Quit,
}

/// Abstract operator interaction boundary. Implementations block until the
/// human acts; neither call has a timeout.
pub trait OperatorPrompt: Send + Sync {
    /// Ternary break prompt (skip/quit).
    fn await_interrupt_choice(&self) -> InterruptChoice;

    /// Blocks until the operator confirms the CAPTCHA is solved. Returns
    /// false when no acknowledgment can ever arrive (no human attached),
    /// which ends the source pass instead of retrying the page.
    fn await_captcha_ack(&self) -> bool;
}

/// Interactive prompt on stdin/stderr. Falls back to quitting when no
/// terminal is attached, so an unattended run cannot hang on a prompt.
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn await_interrupt_choice(&self) -> InterruptChoice {
        if !atty::is(atty::Stream::Stdin) {
            return InterruptChoice::Quit;
        }
        eprintln!();
        eprintln!("Interrupted. Skip current query or quit?");
        eprint!("  s = skip to next  |  q = quit (save what we have)  > ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) if line.trim().eq_ignore_ascii_case("s") => InterruptChoice::Skip,
            _ => InterruptChoice::Quit,
        }
    }

    fn await_captcha_ack(&self) -> bool {
        if !atty::is(atty::Stream::Stdin) {
            warn!("no terminal attached; nobody can solve the CAPTCHA, ending this pass");
            return false;
        }
        eprintln!();
        eprintln!("CAPTCHA detected. Solve it in the browser window, then press ENTER here.");
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).is_ok()
    }
}

/// Owns the pending-interrupt flag and the operator prompts. Cloned
/// (via Arc) into every worker; the flag is the only cross-task state.
pub struct InterruptController {
    pending: Arc<AtomicBool>,
    prompt: Arc<dyn OperatorPrompt>,
}

impl InterruptController {
    pub fn new(prompt: Arc<dyn OperatorPrompt>) -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(false)),
            prompt,
        }
    }

    /// Route Ctrl+C into the pending flag. The handler does nothing but
    /// set the flag; all decisions happen cooperatively at page boundaries.
    pub fn install_ctrlc_handler(&self) -> anyhow::Result<()> {
        let pending = Arc::clone(&self.pending);
        ctrlc::set_handler(move || {
            pending.store(true, Ordering::SeqCst);
        })?;
        Ok(())
    }

    /// For tests and programmatic interruption.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Atomically claim a pending interrupt. Exactly one caller observes
    /// true per raised interrupt, so concurrent API workers never double-
    /// prompt for one Ctrl+C.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    /// Ask the operator how to proceed. Blocking prompt, run on the
    /// blocking pool so the runtime keeps servicing other workers.
    pub async fn resolve_interrupt(&self) -> InterruptChoice {
        let prompt = Arc::clone(&self.prompt);
        tokio::task::spawn_blocking(move || prompt.await_interrupt_choice())
            .await
            .unwrap_or(InterruptChoice::Quit)
    }

    /// Block until the operator acknowledges the solved CAPTCHA. False
    /// means no acknowledgment will ever come.
    pub async fn wait_for_captcha_ack(&self) -> bool {
        let prompt = Arc::clone(&self.prompt);
        tokio::task::spawn_blocking(move || prompt.await_captcha_ack())
            .await
            .unwrap_or(false)
    }
}
