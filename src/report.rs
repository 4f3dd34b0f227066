use crate::probe::Outcome;
use crate::shutdown::Shutdown;
use crate::stats::{Snapshot, Stats, Summary};
use anyhow::{Context, Result};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Cadência do relatório ao vivo.
pub const LIVE_INTERVAL: Duration = Duration::from_secs(10);

const BAR_SEGMENTS: usize = 20;

/// Ethernet (14) + IPv4 (20) + ICMP (8).
const FRAME_OVERHEAD: usize = 42;

/// RTT em milissegundos com três casas.
pub fn format_rtt(rtt: Duration) -> String {
    format!("{:.3}ms", rtt.as_secs_f64() * 1000.0)
}

/// RTT arredondado ao milissegundo (traceroute).
pub fn format_rtt_coarse(rtt: Duration) -> String {
    format!("{:.0}ms", rtt.as_secs_f64() * 1000.0)
}

/// Linha de feedback imediato de uma sondagem no modo ping.
pub fn ping_line(outcome: &Outcome, seq: u64) -> String {
    match *outcome {
        Outcome::Matched { rtt, from, bytes } => {
            let time = format_rtt(rtt);
            let time = if rtt < Duration::from_millis(1) {
                time.green()
            } else if rtt < Duration::from_millis(10) {
                time.yellow()
            } else {
                time.red()
            };
            format!(
                "{bytes} bytes from {}: icmp_seq={seq} time={time}",
                from.to_string().blue()
            )
        }
        Outcome::HopResponder { rtt, from } => format!(
            "From {}: icmp_seq={seq} Time to live exceeded ({})",
            from.to_string().cyan(),
            format_rtt(rtt).yellow()
        ),
        Outcome::Timeout => format!("Request timeout for icmp_seq={seq}").red().to_string(),
        Outcome::SendError => format!("{} icmp_seq={seq}", "send error".red()),
    }
}

/// Responsor e RTT de um salto no traceroute.
pub fn hop_text(outcome: &Outcome) -> String {
    match *outcome {
        Outcome::Matched { rtt, from, .. } => format!(
            "{} {}",
            from.to_string().green(),
            format_rtt_coarse(rtt).green()
        ),
        Outcome::HopResponder { rtt, from } => format!(
            "{} {}",
            from.to_string().cyan(),
            format_rtt_coarse(rtt).yellow()
        ),
        Outcome::Timeout | Outcome::SendError => "*".red().to_string(),
    }
}

/// Barra de progresso de 20 segmentos; só existe com contagem definida.
pub fn progress_bar(sent: u64, count: u64) -> Option<String> {
    if count == 0 {
        return None;
    }
    let pct = sent as f64 / count as f64 * 100.0;
    let bars = ((pct / 5.0) as usize).min(BAR_SEGMENTS);
    Some(format!(
        " [{}{}] {:.0}%",
        "█".repeat(bars),
        "░".repeat(BAR_SEGMENTS - bars),
        pct
    ))
}

pub fn live_line(snap: &Snapshot, count: u64) -> Option<String> {
    let loss = snap.loss_percent()?;
    let avg = snap
        .min_avg_max()
        .map(|(_, avg, _)| avg)
        .unwrap_or_default();
    Some(format!(
        "\r{} {}/{} pkts{} loss:{:.1}% rtt:{}",
        "LIVE".blue(),
        snap.sent,
        count,
        progress_bar(snap.sent, count).unwrap_or_default(),
        loss,
        format_rtt(avg).yellow()
    ))
}

/// Renderiza a linha ao vivo a cada `LIVE_INTERVAL` até o encerramento.
pub fn spawn_live(stats: Arc<Stats>, count: u64, shutdown: Shutdown) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while shutdown.sleep(LIVE_INTERVAL) {
            if let Some(line) = live_line(&stats.snapshot(), count) {
                let mut out = io::stdout();
                let _ = write!(out, "{line}").and_then(|()| out.flush());
            }
        }
    })
}

/// Estatísticas finais. Não imprime nada se nenhum pacote foi enviado.
pub fn print_summary<W: Write>(
    out: &mut W,
    summary: &Summary,
    verbose: bool,
    payload_size: usize,
) -> io::Result<()> {
    let Some(loss) = summary.loss_percent else {
        return Ok(());
    };

    writeln!(out, "\n{}", "--- ping statistics ---".magenta())?;
    writeln!(
        out,
        "{} transmitted, {} received, {} packet loss",
        summary.sent.to_string().blue(),
        summary.received.to_string().blue(),
        format!("{loss:.1}%").magenta()
    )?;

    let (Some(min), Some(avg), Some(max)) = (summary.min, summary.avg, summary.max) else {
        return Ok(());
    };
    writeln!(
        out,
        "round-trip min/avg/max = {}/{}/{}",
        format_rtt(min).green(),
        format_rtt(avg).yellow(),
        format_rtt(max).red()
    )?;

    if verbose {
        writeln!(out, "{} {}", " jitter:".yellow(), format_rtt(summary.jitter).yellow())?;
        if let Some(mbps) = summary.bandwidth_mbps {
            writeln!(out, "{} {mbps:.6} Mbps", " bandwidth:".blue())?;
        }
        writeln!(
            out,
            "{} {} bytes (ICMP data: {payload_size})",
            " frame size:".magenta(),
            payload_size + FRAME_OVERHEAD
        )?;
    }
    Ok(())
}

/// Formato persistido; RTTs em nanossegundos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packet_loss_percent: Option<f64>,
    pub min_rtt: u64,
    pub avg_rtt: u64,
    pub max_rtt: u64,
    pub measurements: Vec<JsonMeasurement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonMeasurement {
    pub seq: u64,
    pub rtt: u64,
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl From<&Snapshot> for JsonStats {
    fn from(snap: &Snapshot) -> Self {
        let (min, avg, max) = snap.min_avg_max().unwrap_or_default();
        Self {
            packets_sent: snap.sent,
            packets_received: snap.received,
            packet_loss_percent: snap.loss_percent(),
            min_rtt: nanos(min),
            avg_rtt: nanos(avg),
            max_rtt: nanos(max),
            measurements: snap
                .measurements
                .iter()
                .filter(|(_, rtt)| !rtt.is_zero())
                .map(|(&seq, &rtt)| JsonMeasurement { seq, rtt: nanos(rtt) })
                .collect(),
        }
    }
}

pub fn write_json(path: &Path, snap: &Snapshot) -> Result<()> {
    let data = serde_json::to_string_pretty(&JsonStats::from(snap))
        .context("falha ao serializar estatísticas")?;
    std::fs::write(path, data).with_context(|| format!("falha ao gravar {}", path.display()))?;
    tracing::debug!(path = %path.display(), "estatísticas gravadas");
    Ok(())
}
