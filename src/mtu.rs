//! Descoberta de MTU (suporte a jumbo frames).
//!
//! O sucesso de um tamanho é medido só pelo envio: se o sistema aceita
//! enviar 3/3 pacotes, o tamanho é considerado utilizável. Redes que aceitam
//! o envio e descartam ou fragmentam depois fazem o MTU parecer maior.

use crate::icmp::{self, Family, IP_ICMP_OVERHEAD, MAX_JUMBO_PAYLOAD};
use crate::socket::Channel;
use crossterm::style::Stylize;
use std::io::{self, Write};
use std::net::IpAddr;
use std::time::Duration;

/// Tamanhos de quadro testados, em ordem crescente.
pub const CANDIDATES: [usize; 3] = [1500, 9000, 12000];

pub const PROBES_PER_SIZE: usize = 3;

pub const PROBE_SPACING: Duration = Duration::from_millis(100);

/// Maior quadro que passou em todos os envios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mtu {
    pub frame: usize,
    pub payload: usize,
}

/// Testa `CANDIDATES` com um socket novo por tamanho.
pub fn discover<C, F, W>(open: F, dst: IpAddr, ident: u16, out: &mut W) -> io::Result<Option<Mtu>>
where
    C: Channel,
    F: FnMut(IpAddr) -> anyhow::Result<C>,
    W: Write,
{
    discover_sizes(&CANDIDATES, PROBE_SPACING, open, dst, ident, out)
}

pub fn discover_sizes<C, F, W>(
    candidates: &[usize],
    spacing: Duration,
    mut open: F,
    dst: IpAddr,
    ident: u16,
    out: &mut W,
) -> io::Result<Option<Mtu>>
where
    C: Channel,
    F: FnMut(IpAddr) -> anyhow::Result<C>,
    W: Write,
{
    writeln!(out, "{} Testing MTU...", "MTU".magenta())?;

    let mut best = None;
    for &frame in candidates {
        let payload = frame.saturating_sub(IP_ICMP_OVERHEAD);
        if payload > MAX_JUMBO_PAYLOAD {
            tracing::debug!(frame, "tamanho acima do limite do protocolo, ignorado");
            continue;
        }

        let mut chan = match open(dst) {
            Ok(chan) => chan,
            Err(e) => {
                tracing::warn!(frame, error = %e, "falha ao abrir socket para teste de MTU");
                continue;
            }
        };

        let ok = send_burst(&mut chan, dst, ident, payload, spacing);
        if ok == PROBES_PER_SIZE {
            best = Some(Mtu { frame, payload });
            writeln!(out, "  MTU {frame} OK")?;
        } else {
            writeln!(out, "  MTU {frame} FAILED ({ok}/{PROBES_PER_SIZE})")?;
            break;
        }
    }

    match best {
        Some(mtu) => writeln!(
            out,
            "{} Max MTU: {} bytes (size set to {})\n",
            "✓".blue(),
            mtu.frame,
            mtu.payload
        )?,
        None => writeln!(out, "{} No MTU discovered, using default\n", "!".yellow())?,
    }
    Ok(best)
}

/// Envia `PROBES_PER_SIZE` Echo Requests com seq=1 e conta os envios aceitos.
fn send_burst<C: Channel>(
    chan: &mut C,
    dst: IpAddr,
    ident: u16,
    payload: usize,
    spacing: Duration,
) -> usize {
    let mut ok = 0;
    for _ in 0..PROBES_PER_SIZE {
        let pkt = match icmp::build_echo_request(Family::from(dst), ident, 1, payload, MAX_JUMBO_PAYLOAD) {
            Ok(pkt) => pkt,
            Err(e) => {
                tracing::debug!(payload, error = %e, "falha ao montar pacote de teste");
                break;
            }
        };
        match chan.send_to(&pkt, dst) {
            Ok(_) => ok += 1,
            Err(e) => tracing::debug!(payload, error = %e, "envio de teste recusado"),
        }
        std::thread::sleep(spacing);
    }
    ok
}
