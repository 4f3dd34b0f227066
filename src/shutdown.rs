use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Fatia máxima de cada espera, para notar a interrupção rapidamente.
const SLICE: Duration = Duration::from_millis(10);

/// Sinal de encerramento compartilhado entre o handler de Ctrl+C, o driver
/// e o relatório ao vivo.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configura handler para Ctrl+C (e SIGTERM).
    pub fn install(&self) -> Result<()> {
        let flag = Arc::clone(&self.flag);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("erro ao configurar handler de Ctrl+C")
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Dorme por `dur`, acordando antes se houver interrupção.
    /// Retorna `false` se foi interrompido.
    pub fn sleep(&self, dur: Duration) -> bool {
        // Sem prazo representável: espera só pela interrupção
        let until = Instant::now().checked_add(dur);
        loop {
            if self.is_triggered() {
                return false;
            }
            let remaining = match until {
                Some(until) => until.saturating_duration_since(Instant::now()),
                None => SLICE,
            };
            if remaining.is_zero() {
                return true;
            }
            std::thread::sleep(remaining.min(SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_completes() {
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(shutdown.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_interrupted_by_other_thread() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.trigger();
        });
        let start = Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_unbounded_sleep_still_interruptible() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.trigger();
        });
        assert!(!shutdown.sleep(Duration::MAX));
        handle.join().unwrap();
    }

    #[test]
    fn test_triggered_sleep_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert!(!shutdown.sleep(Duration::from_secs(30)));
    }
}
