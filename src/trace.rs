use crate::probe::{Outcome, Prober};
use crate::report;
use crate::shutdown::Shutdown;
use crate::socket::Channel;
use crossterm::style::Stylize;
use std::io::{self, Write};
use std::net::IpAddr;
use std::time::Duration;

/// Pausa fixa entre saltos (independe do intervalo do ping).
pub const HOP_PACING: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub ttl: u8,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub hops: Vec<Hop>,
    /// O próprio destino respondeu com Echo Reply.
    pub reached: bool,
}

/// Modo traceroute: TTL de 1 até `max_hops`, um Echo Request por salto.
///
/// `seq` é compartilhado com o modo ping e avança a cada salto.
#[allow(clippy::too_many_arguments)]
pub fn run<C: Channel, W: Write>(
    prober: &mut Prober,
    chan: &mut C,
    dst: IpAddr,
    host: &str,
    max_hops: u8,
    seq: &mut u64,
    shutdown: &Shutdown,
    out: &mut W,
) -> io::Result<Trace> {
    writeln!(
        out,
        "{} traceroute to {} ({}), {} hops max\n",
        "TRACE".magenta(),
        host,
        dst.to_string().blue(),
        max_hops
    )?;

    let mut trace = Trace::default();
    for ttl in 1..=max_hops {
        if shutdown.is_triggered() {
            tracing::debug!(ttl, "traceroute interrompido");
            break;
        }
        if let Err(e) = chan.set_ttl(ttl) {
            tracing::warn!(ttl, error = %e, "falha ao configurar TTL");
        }

        write!(out, "{ttl:2} ")?;
        let probe_seq = *seq;
        let outcome = prober.probe(chan, dst, probe_seq);
        *seq += 1;
        write!(out, "{}", report::hop_text(&outcome))?;
        trace.hops.push(Hop { ttl, outcome });

        // Se recebemos resposta do destino, terminamos
        if prober.stats().has_measurement(probe_seq) {
            writeln!(out, "{}", " DEST!".green())?;
            trace.reached = true;
            break;
        }

        writeln!(out)?;
        shutdown.sleep(HOP_PACING);
    }
    writeln!(out)?;
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeConfig;
    use crate::probe::tests::{DST, IDENT, echo_reply, time_exceeded, timed_out};
    use crate::socket::MockChannel;
    use crate::stats::Stats;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU8, Ordering};

    fn router(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    /// Rede simulada com o destino a `dest_hops` saltos.
    fn network(dest_hops: u8) -> MockChannel {
        let ttl = Arc::new(AtomicU8::new(0));
        let seq = Arc::new(AtomicU8::new(0));
        let mut chan = MockChannel::new();

        let set = Arc::clone(&ttl);
        chan.expect_set_ttl().returning(move |t| {
            set.store(t, Ordering::SeqCst);
            Ok(())
        });
        let sent = Arc::clone(&seq);
        chan.expect_send_to().returning(move |pkt, _| {
            sent.store(pkt[7], Ordering::SeqCst);
            Ok(pkt.len())
        });
        chan.expect_set_read_timeout().returning(|_| Ok(()));
        chan.expect_recv_from().returning(move |buf| {
            std::thread::sleep(Duration::from_micros(200));
            let hop = ttl.load(Ordering::SeqCst);
            let (pkt, from) = if hop >= dest_hops {
                (echo_reply(IDENT, u16::from(seq.load(Ordering::SeqCst)), 56), DST)
            } else {
                (time_exceeded(), router(hop))
            };
            buf[..pkt.len()].copy_from_slice(&pkt);
            Ok((pkt.len(), from))
        });
        chan
    }

    fn prober(stats: &Arc<Stats>) -> Prober {
        Prober::new(
            ProbeConfig::new(IDENT, Duration::from_millis(100), 56),
            Arc::clone(stats),
        )
    }

    #[test]
    fn test_stops_at_destination() -> anyhow::Result<()> {
        let stats = Arc::new(Stats::new());
        let mut seq = 1;
        let mut out = Vec::new();

        let trace = run(
            &mut prober(&stats),
            &mut network(3),
            DST,
            "example.net",
            3,
            &mut seq,
            &Shutdown::new(),
            &mut out,
        )?;

        assert!(trace.reached);
        assert_eq!(trace.hops.len(), 3);
        assert!(matches!(trace.hops[0].outcome, Outcome::HopResponder { from, .. } if from == router(1)));
        assert!(matches!(trace.hops[1].outcome, Outcome::HopResponder { from, .. } if from == router(2)));
        assert!(matches!(trace.hops[2].outcome, Outcome::Matched { from, .. } if from == DST));
        assert_eq!(seq, 4);

        // só o destino conta como recebido
        let snap = stats.snapshot();
        assert_eq!((snap.sent, snap.received), (3, 1));

        let out = String::from_utf8(out)?;
        assert!(out.contains("traceroute to example.net"));
        let hop_lines: Vec<_> = out.lines().skip(2).filter(|l| !l.is_empty()).collect();
        assert_eq!(hop_lines.len(), 3);
        assert!(hop_lines[0].starts_with(" 1 "));
        assert!(hop_lines[1].contains("10.0.0.2"));
        assert!(hop_lines[2].starts_with(" 3 "));
        assert!(hop_lines[2].contains("DEST!"));
        Ok(())
    }

    #[test]
    fn test_stops_at_ceiling() -> anyhow::Result<()> {
        let stats = Arc::new(Stats::new());
        let mut seq = 10;
        let mut out = Vec::new();

        let trace = run(
            &mut prober(&stats),
            &mut network(30),
            DST,
            "example.net",
            4,
            &mut seq,
            &Shutdown::new(),
            &mut out,
        )?;

        assert!(!trace.reached);
        assert_eq!(trace.hops.iter().map(|h| h.ttl).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(seq, 14);
        assert!(!String::from_utf8(out)?.contains("DEST!"));
        Ok(())
    }

    #[test]
    fn test_silent_hop_is_marked() -> anyhow::Result<()> {
        let stats = Arc::new(Stats::new());
        let mut chan = MockChannel::new();
        chan.expect_set_ttl().returning(|_| Ok(()));
        chan.expect_send_to().returning(|pkt, _| Ok(pkt.len()));
        chan.expect_set_read_timeout().returning(|_| Ok(()));
        chan.expect_recv_from().returning(timed_out);
        let mut seq = 1;
        let mut out = Vec::new();

        let trace = run(
            &mut prober(&stats),
            &mut chan,
            DST,
            "192.0.2.1",
            1,
            &mut seq,
            &Shutdown::new(),
            &mut out,
        )?;

        assert_eq!(trace.hops, vec![Hop { ttl: 1, outcome: Outcome::Timeout }]);
        assert!(String::from_utf8(out)?.contains(" 1 "));
        Ok(())
    }
}
