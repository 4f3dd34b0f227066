use crate::probe::Prober;
use crate::report;
use crate::shutdown::Shutdown;
use crate::socket::Channel;
use std::io::{self, Write};
use std::net::IpAddr;

/// Modo ping: sonda a cada intervalo até `count` envios (0 = infinito) ou
/// até a interrupção. Retorna o próximo `seq` livre.
pub fn run<C: Channel, W: Write>(
    prober: &mut Prober,
    chan: &mut C,
    dst: IpAddr,
    count: u64,
    mut seq: u64,
    shutdown: &Shutdown,
    out: &mut W,
) -> io::Result<u64> {
    let interval = prober.config().interval;

    while !shutdown.is_triggered() && !limit_reached(prober, count) {
        let outcome = prober.probe(chan, dst, seq);
        writeln!(out, "{}", report::ping_line(&outcome, seq))?;
        seq += 1;

        // Se tiver limite, não dorme depois do último
        if limit_reached(prober, count) {
            break;
        }
        shutdown.sleep(interval);
    }

    if shutdown.is_triggered() {
        tracing::debug!(seq, "ping interrompido");
    }
    Ok(seq)
}

fn limit_reached(prober: &Prober, count: u64) -> bool {
    count != 0 && prober.stats().sent() >= count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeConfig;
    use crate::probe::tests::{DST, IDENT, echo_reply, timed_out};
    use crate::socket::MockChannel;
    use crate::stats::Stats;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::time::Duration;

    /// Canal que responde cada Echo Request com RTT de `seq` ms.
    fn echoing_channel() -> MockChannel {
        let last_seq = Arc::new(AtomicU16::new(0));
        let mut chan = MockChannel::new();
        let sent = Arc::clone(&last_seq);
        chan.expect_send_to().returning(move |pkt, _| {
            sent.store(u16::from_be_bytes([pkt[6], pkt[7]]), Ordering::SeqCst);
            Ok(pkt.len())
        });
        chan.expect_set_read_timeout().returning(|_| Ok(()));
        chan.expect_recv_from().returning(move |buf| {
            let seq = last_seq.load(Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(u64::from(seq)));
            let pkt = echo_reply(IDENT, seq, 56);
            buf[..pkt.len()].copy_from_slice(&pkt);
            Ok((pkt.len(), DST))
        });
        chan
    }

    fn prober(stats: &Arc<Stats>) -> Prober {
        Prober::new(
            ProbeConfig::new(IDENT, Duration::from_millis(1), 56),
            Arc::clone(stats),
        )
    }

    #[test]
    fn test_count_limited_run() -> anyhow::Result<()> {
        let stats = Arc::new(Stats::new());
        let mut out = Vec::new();
        let next = run(
            &mut prober(&stats),
            &mut echoing_channel(),
            DST,
            5,
            1,
            &Shutdown::new(),
            &mut out,
        )?;

        assert_eq!(next, 6);
        let snap = stats.snapshot();
        assert_eq!((snap.sent, snap.received), (5, 5));
        assert_eq!(snap.measurements.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        let summary = snap.summary(56, Duration::from_millis(1));
        assert_eq!(summary.loss_percent, Some(0.0));
        assert!(summary.min.unwrap() >= Duration::from_millis(1));
        assert!(summary.max.unwrap() >= Duration::from_millis(5));
        assert!(summary.min < summary.max);

        let out = String::from_utf8(out)?;
        assert_eq!(out.lines().count(), 5);
        assert!(out.lines().all(|l| l.contains("56 bytes from")));
        Ok(())
    }

    #[test]
    fn test_timeouts_are_counted_as_loss() -> anyhow::Result<()> {
        let stats = Arc::new(Stats::new());
        let mut chan = MockChannel::new();
        chan.expect_send_to().returning(|pkt, _| Ok(pkt.len()));
        chan.expect_set_read_timeout().returning(|_| Ok(()));
        chan.expect_recv_from().returning(timed_out);
        let mut out = Vec::new();

        run(&mut prober(&stats), &mut chan, DST, 3, 1, &Shutdown::new(), &mut out)?;

        let snap = stats.snapshot();
        assert_eq!((snap.sent, snap.received), (3, 0));
        assert_eq!(snap.loss_percent(), Some(100.0));
        assert_eq!(String::from_utf8(out)?.matches("Request timeout").count(), 3);
        Ok(())
    }

    #[test]
    fn test_interrupt_stops_new_probes() -> anyhow::Result<()> {
        let stats = Arc::new(Stats::new());
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut chan = MockChannel::new();
        chan.expect_send_to().never();
        let mut out = Vec::new();

        let next = run(&mut prober(&stats), &mut chan, DST, 0, 1, &shutdown, &mut out)?;

        assert_eq!(next, 1);
        assert_eq!(stats.sent(), 0);
        Ok(())
    }

    #[test]
    fn test_interrupt_during_infinite_run() -> anyhow::Result<()> {
        let stats = Arc::new(Stats::new());
        let shutdown = Shutdown::new();
        let mut chan = MockChannel::new();
        let trigger = shutdown.clone();
        chan.expect_send_to().returning(move |pkt, _| {
            // interrompe no terceiro envio
            if u16::from_be_bytes([pkt[6], pkt[7]]) == 3 {
                trigger.trigger();
            }
            Ok(pkt.len())
        });
        chan.expect_set_read_timeout().returning(|_| Ok(()));
        chan.expect_recv_from().returning(timed_out);
        let mut out = Vec::new();

        let next = run(&mut prober(&stats), &mut chan, DST, 0, 1, &shutdown, &mut out)?;

        assert_eq!(next, 4);
        assert_eq!(stats.sent(), 3);
        Ok(())
    }
}
