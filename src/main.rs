// Tratamento de erros ergonômico
use anyhow::{Context, Result};

// Endereços e saída padrão
use std::io::{self, Write};
use std::net::IpAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing_subscriber::EnvFilter;

// Módulos locais
mod args;
mod icmp;
mod mtu;
mod ping;
mod probe;
mod report;
mod shutdown;
mod socket;
mod stats;
mod trace;

use args::PingArgs;
use probe::{ProbeConfig, Prober};
use shutdown::Shutdown;
use socket::{Channel, IcmpSocket};
use stats::Stats;

/// Programa principal: ping, traceroute ou descoberta de MTU.
/// Requer privilégios para sockets RAW (root/CAP_NET_RAW ou Administrador).
fn main() -> Result<()> {
    let args = args::parse()?;
    configure_logging(&args.log_filter);

    let dst = resolve(&args.host)?;
    let mut sock = IcmpSocket::open(dst)?;
    if !args.trace {
        sock.set_ttl(args.ttl).context("falha ao configurar TTL")?;
    }

    // Identificador: usa o PID do processo (comum em pings)
    let ident = icmp::identifier();
    let mut config = ProbeConfig::new(ident, args.interval, args.size);
    let mut out = io::stdout();

    if args.mtu_test {
        if let Some(mtu) = mtu::discover(IcmpSocket::open, dst, ident, &mut out)? {
            config.adopt_mtu(&mtu);
        }
    }

    let stats = Arc::new(Stats::new());
    stats.reset();

    let shutdown = Shutdown::new();
    shutdown.install()?;

    let live = (args.live && !args.trace)
        .then(|| report::spawn_live(Arc::clone(&stats), args.count, shutdown.clone()));

    tracing::debug!(%dst, ident, ?config, "iniciando");
    let mut prober = Prober::new(config, Arc::clone(&stats));
    let mut seq = 1u64;
    if args.trace {
        let trace = trace::run(
            &mut prober,
            &mut sock,
            dst,
            &args.host,
            args.ttl,
            &mut seq,
            &shutdown,
            &mut out,
        )?;
        for hop in &trace.hops {
            tracing::trace!(ttl = hop.ttl, outcome = ?hop.outcome, "salto");
        }
        tracing::debug!(hops = trace.hops.len(), reached = trace.reached, "traceroute concluído");
    } else {
        seq = ping::run(&mut prober, &mut sock, dst, args.count, seq, &shutdown, &mut out)?;
    }
    tracing::debug!(next_seq = seq, "sondagem encerrada");

    // Para o relatório ao vivo antes do resumo final
    shutdown.trigger();
    join_live(live);

    finish(&stats, &args, prober.config(), &mut out)
}

/// Aguarda o relatório ao vivo; retorna `false` se a thread entrou em pânico.
fn join_live(handle: Option<JoinHandle<()>>) -> bool {
    let Some(handle) = handle else {
        return true;
    };
    if handle.join().is_err() {
        tracing::warn!("thread de estatísticas ao vivo terminou com pânico");
        return false;
    }
    true
}

/// Caminho único de encerramento (fim normal ou Ctrl+C): resumo e JSON.
fn finish<W: Write>(stats: &Stats, args: &PingArgs, config: &ProbeConfig, out: &mut W) -> Result<()> {
    let snap = stats.snapshot();
    let summary = snap.summary(config.payload_size, config.interval);
    report::print_summary(out, &summary, args.verbose, config.payload_size)?;

    if let Some(path) = &args.output {
        match report::write_json(path, &snap) {
            Ok(()) => writeln!(out, "Statistics saved to {}", path.display())?,
            Err(e) => tracing::error!("{e:#}"),
        }
    }
    out.flush()?;
    Ok(())
}

/// Aceita IP literal ou nome; usa o primeiro endereço resolvido.
fn resolve(host: &str) -> Result<IpAddr> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(addr);
    }
    dns_lookup::lookup_host(host)
        .with_context(|| format!("erro ao resolver {host}"))?
        .into_iter()
        .next()
        .with_context(|| format!("nenhum endereço para {host}"))
}

fn configure_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .init();
}
