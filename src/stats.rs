//! Estatísticas da execução.
//!
//! `Stats` é o único estado mutável compartilhado: o driver escreve, o
//! relatório ao vivo e o encerramento só leem, sempre via `snapshot()`.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Duration;

/// Contadores e RTTs da execução, protegidos por um único lock.
#[derive(Debug, Default)]
pub struct Stats {
    inner: RwLock<Snapshot>,
}

/// Cópia consistente dos contadores.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub sent: u64,
    pub received: u64,
    /// seq -> RTT, uma entrada por Echo Reply casado.
    pub measurements: BTreeMap<u64, Duration>,
}

/// Resumo final derivado de um `Snapshot`.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub sent: u64,
    pub received: u64,
    /// `None` quando nada foi enviado.
    pub loss_percent: Option<f64>,
    pub min: Option<Duration>,
    pub avg: Option<Duration>,
    pub max: Option<Duration>,
    pub jitter: Duration,
    pub bandwidth_mbps: Option<f64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zera tudo (início de execução).
    pub fn reset(&self) {
        *self.inner.write() = Snapshot::default();
    }

    /// Conta uma tentativa de envio, mesmo que o envio falhe depois.
    pub fn record_sent(&self) {
        self.inner.write().sent += 1;
    }

    /// Registra um Echo Reply casado. Cada seq só é gravado uma vez; uma
    /// segunda gravação é ignorada e retorna `false`.
    pub fn record_reply(&self, seq: u64, rtt: Duration) -> bool {
        let mut inner = self.inner.write();
        if inner.measurements.contains_key(&seq) || inner.received >= inner.sent {
            return false;
        }
        inner.measurements.insert(seq, rtt);
        inner.received += 1;
        true
    }

    pub fn sent(&self) -> u64 {
        self.inner.read().sent
    }

    pub fn has_measurement(&self, seq: u64) -> bool {
        self.inner.read().measurements.contains_key(&seq)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().clone()
    }
}

impl Snapshot {
    pub fn loss_percent(&self) -> Option<f64> {
        if self.sent == 0 {
            return None;
        }
        Some((self.sent - self.received) as f64 / self.sent as f64 * 100.0)
    }

    /// RTTs positivos, na ordem de iteração das medições.
    pub fn rtts(&self) -> Vec<Duration> {
        self.measurements
            .values()
            .copied()
            .filter(|rtt| !rtt.is_zero())
            .collect()
    }

    pub fn min_avg_max(&self) -> Option<(Duration, Duration, Duration)> {
        let rtts = self.rtts();
        let min = rtts.iter().min()?;
        let max = rtts.iter().max()?;
        let total: Duration = rtts.iter().sum();
        Some((*min, total / rtts.len() as u32, *max))
    }

    pub fn summary(&self, payload_size: usize, interval: Duration) -> Summary {
        let rtts = self.rtts();
        let stats = self.min_avg_max();
        Summary {
            sent: self.sent,
            received: self.received,
            loss_percent: self.loss_percent(),
            min: stats.map(|s| s.0),
            avg: stats.map(|s| s.1),
            max: stats.map(|s| s.2),
            jitter: jitter(&rtts),
            bandwidth_mbps: bandwidth_mbps(self.sent, payload_size, interval),
        }
    }
}

/// Média das diferenças absolutas entre RTTs consecutivos.
pub fn jitter(rtts: &[Duration]) -> Duration {
    if rtts.len() < 2 {
        return Duration::ZERO;
    }
    let total: Duration = rtts.windows(2).map(|w| w[1].abs_diff(w[0])).sum();
    total / (rtts.len() - 1) as u32
}

/// Taxa teórica de envio em Mbps (não é vazão medida).
pub fn bandwidth_mbps(sent: u64, payload_size: usize, interval: Duration) -> Option<f64> {
    if sent == 0 || interval.is_zero() {
        return None;
    }
    let total_bytes = (payload_size as u64 * sent) as f64;
    let total_time = interval.as_secs_f64() * sent as f64;
    Some(total_bytes / total_time * 8.0 / 1e6)
}
