use std::net::IpAddr;
use thiserror::Error;

/// Tamanho do cabeçalho ICMP (type, code, checksum, identifier, sequence).
pub const ICMP_HEADER_SIZE: usize = 8;

/// Cabeçalho IPv4 (20) + ICMP (8).
pub const IP_ICMP_OVERHEAD: usize = 28;

/// Maior payload que cabe num quadro Ethernet de 1500 bytes.
pub const MAX_PAYLOAD: usize = 1500 - IP_ICMP_OVERHEAD;

/// Maior payload que um datagrama IPv4 comporta (usado só para jumbo frames).
pub const MAX_JUMBO_PAYLOAD: usize = 65535 - IP_ICMP_OVERHEAD;

const ICMPV4_ECHO_REPLY: u8 = 0;
const ICMPV4_ECHO_REQUEST: u8 = 8;
const ICMPV4_TIME_EXCEEDED: u8 = 11;
const ICMPV6_TIME_EXCEEDED: u8 = 3;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Família de endereço do destino.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl From<IpAddr> for Family {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum EncodeError {
    #[error("payload de {size} bytes excede o máximo de {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum ParseError {
    #[error("pacote truncado: {0} bytes")]
    Truncated(usize),
    #[error("cabeçalho IPv4 inválido (IHL={0})")]
    BadHeader(usize),
}

/// Resposta ICMP já classificada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    EchoReply { ident: u16, seq: u16, data_len: usize },
    /// O pacote original embutido não é decodificado.
    TimeExceeded,
    Other { icmp_type: u8 },
}

/// Identificador da sessão: usa o PID do processo (comum em pings).
pub fn identifier() -> u16 {
    (std::process::id() & 0xFFFF) as u16
}

/// Calcula o checksum ICMP (RFC 792 / RFC 1071).
pub fn checksum(mut data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    while data.len() >= 2 {
        sum = sum.wrapping_add(u16::from_be_bytes([data[0], data[1]]) as u32);
        data = &data[2..];
    }
    if !data.is_empty() {
        sum = sum.wrapping_add((data[0] as u32) << 8);
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Preenche o payload com `A..Z` repetido, para ser legível numa captura.
pub fn fill_pattern(payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = b'A' + (i % 26) as u8;
    }
}

/// Monta um Echo Request (ICMPv4 type=8 ou ICMPv6 type=128, code=0).
///
/// No IPv6 o checksum fica zerado: o kernel calcula com o pseudo-cabeçalho.
pub fn build_echo_request(
    family: Family,
    ident: u16,
    seq: u16,
    payload_size: usize,
    limit: usize,
) -> Result<Vec<u8>, EncodeError> {
    if payload_size > limit {
        return Err(EncodeError::PayloadTooLarge { size: payload_size, limit });
    }

    let mut pkt = vec![0u8; ICMP_HEADER_SIZE + payload_size];
    pkt[0] = match family {
        Family::V4 => ICMPV4_ECHO_REQUEST,
        Family::V6 => ICMPV6_ECHO_REQUEST,
    };

    // Identifier e Sequence (big-endian)
    pkt[4..6].copy_from_slice(&ident.to_be_bytes());
    pkt[6..8].copy_from_slice(&seq.to_be_bytes());
    fill_pattern(&mut pkt[ICMP_HEADER_SIZE..]);

    if family == Family::V4 {
        let csum = checksum(&pkt);
        pkt[2..4].copy_from_slice(&csum.to_be_bytes());
    }

    Ok(pkt)
}

/// Interpreta um pacote recebido do socket RAW.
///
/// Sockets RAW IPv4 entregam o cabeçalho IP junto; ele é pulado aqui.
pub fn parse_reply(buf: &[u8], family: Family) -> Result<Reply, ParseError> {
    let start = match family {
        Family::V4 if !buf.is_empty() && (buf[0] >> 4) == 4 => {
            let ihl = (buf[0] & 0x0F) as usize * 4;
            if ihl < 20 || ihl > buf.len() {
                return Err(ParseError::BadHeader(ihl));
            }
            ihl
        }
        _ => 0,
    };

    let icmp = &buf[start..];
    if icmp.len() < ICMP_HEADER_SIZE {
        return Err(ParseError::Truncated(icmp.len()));
    }

    let icmp_type = icmp[0];
    let reply = match (family, icmp_type) {
        (Family::V4, ICMPV4_ECHO_REPLY) | (Family::V6, ICMPV6_ECHO_REPLY) => Reply::EchoReply {
            ident: u16::from_be_bytes([icmp[4], icmp[5]]),
            seq: u16::from_be_bytes([icmp[6], icmp[7]]),
            data_len: icmp.len() - ICMP_HEADER_SIZE,
        },
        (Family::V4, ICMPV4_TIME_EXCEEDED) | (Family::V6, ICMPV6_TIME_EXCEEDED) => {
            Reply::TimeExceeded
        }
        _ => Reply::Other { icmp_type },
    };
    Ok(reply)
}
