use crate::icmp::MAX_PAYLOAD;
use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Maior intervalo aceito entre envios.
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Ping ICMP com estatísticas, traceroute e descoberta de MTU
#[derive(Parser, Debug)]
#[command(name = "pingrs", version, about, long_about = None)]
#[command(after_help = "Exemplos:
  pingrs -c 10 -i 5ms 192.168.1.1
  pingrs -c 100 -i 1ms --live -v -o stats.json 8.8.8.8
  pingrs --trace -t 30 8.8.8.8
  pingrs -t 32 -s 1472 192.168.1.1")]
pub struct Args {
    /// Host de destino (IP ou nome)
    pub host: String,

    /// Para depois de COUNT pacotes (0 = infinito)
    #[arg(short = 'c', long, default_value_t = 0)]
    pub count: u64,

    /// Intervalo entre pacotes (mínimo 1ms)
    #[arg(short = 'i', long, default_value = "1s", value_parser = parse_duration)]
    pub interval: Duration,

    /// Grava as estatísticas em JSON
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Tamanho dos dados ICMP (máximo 1472)
    #[arg(short = 's', long, default_value_t = 56)]
    pub size: usize,

    /// TTL do IP (1-255)
    #[arg(short = 't', long, default_value_t = 64)]
    pub ttl: u16,

    /// Descobre o MTU automaticamente (jumbo frames)
    #[arg(long)]
    pub mtu_test: bool,

    /// Modo traceroute (TTL de 1 até -t)
    #[arg(long)]
    pub trace: bool,

    /// Estatísticas ao vivo a cada 10s
    #[arg(long)]
    pub live: bool,

    /// Estatísticas detalhadas (jitter, banda, quadro)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Filtro de log do tracing (RUST_LOG tem precedência)
    #[arg(long, default_value = "warn")]
    pub log_filter: String,
}

/// Configuração validada da execução.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingArgs {
    pub host: String,
    pub count: u64,
    pub interval: Duration,
    pub output: Option<PathBuf>,
    pub size: usize,
    pub ttl: u8,
    pub mtu_test: bool,
    pub trace: bool,
    pub live: bool,
    pub verbose: bool,
    pub log_filter: String,
}

impl TryFrom<Args> for PingArgs {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        if args.interval < Duration::from_millis(1) {
            bail!("intervalo deve ser >= 1ms");
        }
        if args.interval > MAX_INTERVAL {
            bail!("intervalo deve ser <= 1h");
        }
        if args.size > MAX_PAYLOAD {
            bail!("tamanho deve ser 0-{MAX_PAYLOAD} bytes");
        }
        let ttl = match u8::try_from(args.ttl) {
            Ok(ttl) if ttl >= 1 => ttl,
            _ => bail!("TTL deve ser 1-255"),
        };
        Ok(Self {
            host: args.host,
            count: args.count,
            interval: args.interval,
            output: args.output,
            size: args.size,
            ttl,
            mtu_test: args.mtu_test,
            trace: args.trace,
            live: args.live,
            verbose: args.verbose,
            log_filter: args.log_filter,
        })
    }
}

pub fn parse() -> Result<PingArgs> {
    PingArgs::try_from(Args::parse())
}

fn parse_duration(value: &str) -> Result<Duration> {
    Ok(humantime::parse_duration(value)?)
}
