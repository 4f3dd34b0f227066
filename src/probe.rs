use crate::icmp::{self, Family, MAX_JUMBO_PAYLOAD, MAX_PAYLOAD, Reply};
use crate::mtu::Mtu;
use crate::socket::Channel;
use crate::stats::Stats;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Máximo de pacotes lidos por sondagem.
pub const MAX_RECV_ATTEMPTS: usize = 5;

/// O prazo de leitura é este múltiplo do intervalo de envio.
pub const DEADLINE_FACTOR: u32 = 10;

/// Abaixo disso a resposta é considerada um pacote antigo do buffer.
pub const MIN_PLAUSIBLE_RTT: Duration = Duration::from_micros(10);

/// Teto do prazo de leitura, para intervalos absurdos não estourarem `Instant`.
pub const MAX_READ_DEADLINE: Duration = Duration::from_secs(24 * 3600);

/// Buffer de recepção (cabe um datagrama IPv4 inteiro).
const RECV_BUF_SIZE: usize = 65536;

/// Configuração da execução, passada explicitamente ao ciclo de sondagem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub ident: u16,
    pub interval: Duration,
    pub payload_size: usize,
    pub payload_limit: usize,
}

impl ProbeConfig {
    pub fn new(ident: u16, interval: Duration, payload_size: usize) -> Self {
        Self {
            ident,
            interval,
            payload_size,
            payload_limit: MAX_PAYLOAD,
        }
    }

    /// Adota o payload recomendado pela descoberta de MTU.
    pub fn adopt_mtu(&mut self, mtu: &Mtu) {
        self.payload_size = mtu.payload;
        if mtu.payload > MAX_PAYLOAD {
            self.payload_limit = MAX_JUMBO_PAYLOAD;
        }
    }

    pub fn read_deadline(&self) -> Duration {
        self.interval
            .checked_mul(DEADLINE_FACTOR)
            .map_or(MAX_READ_DEADLINE, |d| d.min(MAX_READ_DEADLINE))
    }
}

/// Resultado de uma sondagem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Echo Reply com id e seq corretos.
    Matched { rtt: Duration, from: IpAddr, bytes: usize },
    /// Um roteador intermediário respondeu com Time Exceeded.
    HopResponder { rtt: Duration, from: IpAddr },
    Timeout,
    SendError,
}

/// Executa ciclos de envio e espera, registrando em `Stats`.
pub struct Prober {
    config: ProbeConfig,
    stats: Arc<Stats>,
    buf: Vec<u8>,
    /// Tempo decorrido desde o envio; substituível nos testes.
    elapsed: fn(Instant) -> Duration,
}

impl Prober {
    pub fn new(config: ProbeConfig, stats: Arc<Stats>) -> Self {
        Self {
            config,
            stats,
            buf: vec![0u8; RECV_BUF_SIZE],
            elapsed: |start: Instant| start.elapsed(),
        }
    }

    #[cfg(test)]
    fn with_elapsed(mut self, elapsed: fn(Instant) -> Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Envia um Echo Request com `seq` e aguarda a resposta correspondente.
    ///
    /// No fio vão os 16 bits baixos de `seq`.
    pub fn probe<C: Channel>(&mut self, chan: &mut C, dst: IpAddr, seq: u64) -> Outcome {
        let family = Family::from(dst);
        let wire_seq = seq as u16;

        let pkt = match icmp::build_echo_request(
            family,
            self.config.ident,
            wire_seq,
            self.config.payload_size,
            self.config.payload_limit,
        ) {
            Ok(pkt) => pkt,
            Err(e) => {
                tracing::warn!(seq, error = %e, "falha ao montar Echo Request");
                return Outcome::SendError;
            }
        };

        let wait = self.config.read_deadline();
        self.stats.record_sent();
        let start = Instant::now();
        let deadline = start + wait;

        if let Err(e) = chan.send_to(&pkt, dst) {
            tracing::warn!(seq, %dst, error = %e, "falha ao enviar");
            return Outcome::SendError;
        }

        // Toda leitura conta para o limite: malformados, alheios e
        // implausíveis também consomem uma tentativa.
        for attempt in 1..=MAX_RECV_ATTEMPTS {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if let Err(e) = chan.set_read_timeout(deadline - now) {
                tracing::warn!(seq, error = %e, "falha ao configurar timeout de leitura");
                break;
            }

            let (n, from) = match chan.recv_from(&mut self.buf) {
                Ok(res) => res,
                Err(e) if is_timeout(&e) => break,
                Err(e) => {
                    tracing::debug!(seq, error = %e, "erro na leitura");
                    break;
                }
            };

            let rtt = (self.elapsed)(start);
            if rtt < MIN_PLAUSIBLE_RTT {
                tracing::debug!(seq, attempt, ?rtt, "resposta implausível descartada");
                continue;
            }

            match icmp::parse_reply(&self.buf[..n], family) {
                Ok(Reply::TimeExceeded) => return Outcome::HopResponder { rtt, from },
                Ok(Reply::EchoReply { ident, seq: reply_seq, data_len })
                    if ident == self.config.ident && reply_seq == wire_seq =>
                {
                    if !self.stats.record_reply(seq, rtt) {
                        tracing::debug!(seq, "medição duplicada ignorada");
                    }
                    return Outcome::Matched {
                        rtt,
                        from,
                        bytes: data_len,
                    };
                }
                Ok(Reply::Other { icmp_type }) => {
                    tracing::debug!(seq, attempt, %from, icmp_type, "tipo ICMP ignorado");
                }
                Ok(reply) => tracing::debug!(seq, attempt, %from, ?reply, "pacote alheio descartado"),
                Err(e) => tracing::debug!(seq, attempt, %from, error = %e, "pacote malformado descartado"),
            }
        }

        Outcome::Timeout
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
