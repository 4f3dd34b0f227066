// Criação e configuração de sockets de baixo nível
use anyhow::{Context, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
const SOCK_RAW: i32 = 3;

/// Canal bidirecional de pacotes ICMP.
///
/// Separado do socket real para que o ciclo de sondagem possa ser testado
/// com respostas sintéticas.
#[cfg_attr(test, mockall::automock)]
pub trait Channel {
    /// TTL (IPv4) ou hop limit (IPv6) dos próximos envios.
    fn set_ttl(&mut self, ttl: u8) -> io::Result<()>;
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
    fn send_to(&mut self, pkt: &[u8], dst: IpAddr) -> io::Result<usize>;
    /// Lê um pacote; timeout aparece como `WouldBlock` ou `TimedOut`.
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)>;
}

/// Socket ICMP RAW (IPv4 ou IPv6 conforme o destino).
#[derive(Debug)]
pub struct IcmpSocket {
    socket: Socket,
    ipv6: bool,
}

impl IcmpSocket {
    /// Abre o socket RAW adequado para a família de `dst`.
    ///
    /// Linux/macOS exigem root ou CAP_NET_RAW; Windows exige Administrador.
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    pub fn open(dst: IpAddr) -> Result<Self> {
        let (domain, protocol) = match dst {
            IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
            IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
        };
        // SOCK_RAW é 3 em Linux, macOS e Windows. Usamos o valor direto pois
        // Type::RAW só existe com a feature `all` do socket2.
        let socket = Socket::new(domain, Type::from(SOCK_RAW), Some(protocol)).with_context(|| {
            format!(
                "falha ao criar socket RAW para {dst} \
                 (Linux/macOS: rode como root ou com CAP_NET_RAW; Windows: como Administrador)"
            )
        })?;
        socket
            .set_nonblocking(false)
            .context("falha ao configurar socket bloqueante")?;
        tracing::debug!(%dst, "socket ICMP RAW aberto");
        Ok(Self {
            socket,
            ipv6: dst.is_ipv6(),
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    pub fn open(_dst: IpAddr) -> Result<Self> {
        anyhow::bail!("sistema operacional não suportado: {}", std::env::consts::OS)
    }
}

impl Channel for IcmpSocket {
    fn set_ttl(&mut self, ttl: u8) -> io::Result<()> {
        if self.ipv6 {
            self.socket.set_unicast_hops_v6(u32::from(ttl))
        } else {
            self.socket.set_ttl(u32::from(ttl))
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        // Duração zero desativaria o timeout
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
    }

    fn send_to(&mut self, pkt: &[u8], dst: IpAddr) -> io::Result<usize> {
        // Porta 0 é ignorada para ICMP
        let addr = SockAddr::from(SocketAddr::new(dst, 0));
        self.socket.send_to(pkt, &addr)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        // SAFETY: u8 e MaybeUninit<u8> têm o mesmo layout e recv_from só escreve
        // bytes inicializados no buffer.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        let (n, peer) = self.socket.recv_from(uninit)?;
        let peer = peer
            .as_socket()
            .map(|sa| sa.ip())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "endereço de origem inválido"))?;
        Ok((n, peer))
    }
}
