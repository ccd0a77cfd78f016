use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags, TcpPacket};
use pnet::transport::{tcp_packet_iter, transport_channel, TransportChannelType::Layer4, TransportProtocol::Ipv4};
use rand::Rng;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time;
use tracing::{debug, trace};

use crate::error::ProbeError;
use crate::netdetect;
use crate::types::{ProbeMethod, Verdict};

const TCP_HEADER_LEN: usize = 20;
const RAW_CHANNEL_BUFFER: usize = 4096;

/// Per-method wait bounds. Each probe gives up on its own after this long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub connect: Duration,
    pub raw: Duration,
    pub udp: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(1),
            raw: Duration::from_secs(2),
            udp: Duration::from_secs(2),
        }
    }
}

impl ProbeTimeouts {
    /// Same bound for every method.
    pub fn uniform(wait: Duration) -> Self {
        Self {
            connect: wait,
            raw: wait,
            udp: wait,
        }
    }

    pub fn for_method(&self, method: ProbeMethod) -> Duration {
        match method {
            ProbeMethod::Connect => self.connect,
            ProbeMethod::Udp => self.udp,
            ProbeMethod::Syn
            | ProbeMethod::Ack
            | ProbeMethod::Fin
            | ProbeMethod::Null
            | ProbeMethod::Xmas => self.raw,
        }
    }
}

/// What came back from a UDP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpOutcome {
    /// A datagram was received from the port.
    Reply,
    /// ICMP port unreachable (surfaced by the kernel as connection refused).
    PortUnreachable,
    /// Any other ICMP error reported on the socket.
    OtherIcmp,
    /// Nothing arrived before the timeout.
    Silence,
}

impl ProbeMethod {
    /// Flags carried by the hand-built segment, for raw TCP methods.
    pub fn tcp_flags(self) -> Option<u8> {
        match self {
            ProbeMethod::Syn => Some(TcpFlags::SYN),
            ProbeMethod::Ack => Some(TcpFlags::ACK),
            ProbeMethod::Fin => Some(TcpFlags::FIN),
            ProbeMethod::Null => Some(0),
            ProbeMethod::Xmas => Some(TcpFlags::FIN | TcpFlags::PSH | TcpFlags::URG),
            ProbeMethod::Connect | ProbeMethod::Udp => None,
        }
    }

    /// Classify the (single) TCP reply to a raw probe; `None` means silence.
    ///
    /// FIN, NULL and XMAS treat silence as open, and ACK treats a bare RST as
    /// open. A dropping firewall is therefore indistinguishable from an open
    /// port for those methods.
    pub fn classify_tcp_reply(self, reply_flags: Option<u8>) -> Verdict {
        match (self, reply_flags) {
            (ProbeMethod::Syn, Some(f)) if has(f, TcpFlags::SYN) && has(f, TcpFlags::ACK) => Verdict::Open,
            (ProbeMethod::Syn, Some(f)) if has(f, TcpFlags::RST) => Verdict::Closed,
            (ProbeMethod::Syn, Some(_)) => Verdict::Filtered,
            (ProbeMethod::Syn, None) => Verdict::Filtered,

            (ProbeMethod::Ack, Some(f)) if f == TcpFlags::RST => Verdict::Open,
            (ProbeMethod::Ack, Some(_)) => Verdict::Closed,
            (ProbeMethod::Ack, None) => Verdict::Filtered,

            (ProbeMethod::Fin | ProbeMethod::Null | ProbeMethod::Xmas, None) => Verdict::Open,
            (ProbeMethod::Fin | ProbeMethod::Null | ProbeMethod::Xmas, Some(_)) => Verdict::Closed,

            (ProbeMethod::Connect | ProbeMethod::Udp, _) => Verdict::Filtered,
        }
    }
}

fn has(flags: u8, bit: u8) -> bool {
    flags & bit != 0
}

/// Silence or an ICMP error other than port-unreachable counts as open.
pub fn classify_udp(outcome: UdpOutcome) -> Verdict {
    match outcome {
        UdpOutcome::Reply | UdpOutcome::OtherIcmp | UdpOutcome::Silence => Verdict::Open,
        UdpOutcome::PortUnreachable => Verdict::Closed,
    }
}

/// Performs one classification attempt against one port.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, addr: IpAddr, port: u16, method: ProbeMethod) -> Result<Verdict, ProbeError>;
}

/// Probes real sockets. Raw TCP methods need CAP_NET_RAW (or root).
#[derive(Debug, Clone, Default)]
pub struct NetworkProber {
    timeouts: ProbeTimeouts,
}

impl NetworkProber {
    pub fn new(timeouts: ProbeTimeouts) -> Self {
        Self { timeouts }
    }

    pub fn timeouts(&self) -> ProbeTimeouts {
        self.timeouts
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, addr: IpAddr, port: u16, method: ProbeMethod) -> Result<Verdict, ProbeError> {
        let wait = self.timeouts.for_method(method);
        match method {
            ProbeMethod::Connect => connect_probe(addr, port, wait).await,
            ProbeMethod::Udp => udp_probe(addr, port, wait).await,
            ProbeMethod::Syn
            | ProbeMethod::Ack
            | ProbeMethod::Fin
            | ProbeMethod::Null
            | ProbeMethod::Xmas => raw_tcp_probe(addr, port, method, wait).await,
        }
    }
}

async fn connect_probe(addr: IpAddr, port: u16, wait: Duration) -> Result<Verdict, ProbeError> {
    match time::timeout(wait, TcpStream::connect(SocketAddr::new(addr, port))).await {
        Ok(Ok(_stream)) => Ok(Verdict::Open),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => Ok(Verdict::Closed),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ProbeError::Timeout),
    }
}

async fn udp_probe(addr: IpAddr, port: u16, wait: Duration) -> Result<Verdict, ProbeError> {
    let bind: SocketAddr = match addr {
        IpAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        IpAddr::V6(_) => SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0)),
    };
    let socket = UdpSocket::bind(bind).await?;
    // Connecting lets the kernel report ICMP errors for this peer on recv.
    socket.connect(SocketAddr::new(addr, port)).await?;
    socket.send(&[]).await?;

    let mut buf = [0u8; 512];
    let outcome = match time::timeout(wait, socket.recv(&mut buf)).await {
        Ok(Ok(_)) => UdpOutcome::Reply,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => UdpOutcome::PortUnreachable,
        Ok(Err(e)) => {
            trace!(%addr, port, error = %e, "udp icmp error");
            UdpOutcome::OtherIcmp
        }
        Err(_) => UdpOutcome::Silence,
    };
    Ok(classify_udp(outcome))
}

async fn raw_tcp_probe(
    addr: IpAddr,
    port: u16,
    method: ProbeMethod,
    wait: Duration,
) -> Result<Verdict, ProbeError> {
    let IpAddr::V4(target) = addr else {
        return Err(ProbeError::Unsupported {
            method: method.as_str(),
            addr: addr.to_string(),
        });
    };
    let Some(flags) = method.tcp_flags() else {
        return Err(ProbeError::Unsupported {
            method: method.as_str(),
            addr: addr.to_string(),
        });
    };
    // pnet receive is blocking; keep it off the async workers.
    let reply = tokio::task::spawn_blocking(move || raw_tcp_exchange(target, port, flags, wait))
        .await
        .map_err(|e| ProbeError::Aborted(e.to_string()))??;
    Ok(method.classify_tcp_reply(reply))
}

/// Send one segment with `flags` and wait up to `wait` for the matching reply.
/// Returns the reply's flags, or `None` on silence.
fn raw_tcp_exchange(target: Ipv4Addr, port: u16, flags: u8, wait: Duration) -> Result<Option<u8>, ProbeError> {
    let source = netdetect::source_ipv4_for(target)?;
    let (mut tx, mut rx) = transport_channel(RAW_CHANNEL_BUFFER, Layer4(Ipv4(IpNextHeaderProtocols::Tcp)))
        .map_err(|e| ProbeError::RawSocket(e.to_string()))?;

    let mut rng = rand::thread_rng();
    let src_port: u16 = rng.gen_range(40_000..60_000);
    let seq: u32 = rng.gen();

    let mut buf = [0u8; TCP_HEADER_LEN];
    build_tcp_segment(&mut buf, source, target, src_port, port, flags, seq)?;
    let segment = TcpPacket::new(&buf).ok_or_else(|| ProbeError::Io("segment buffer too small".into()))?;
    tx.send_to(segment, IpAddr::V4(target))?;
    debug!(%target, port, src_port, flags, "raw segment sent");

    let deadline = Instant::now() + wait;
    let mut iter = tcp_packet_iter(&mut rx);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        match iter.next_with_timeout(remaining)? {
            Some((reply, from)) => {
                if from == IpAddr::V4(target) && reply.get_source() == port && reply.get_destination() == src_port {
                    return Ok(Some(reply.get_flags()));
                }
            }
            None => return Ok(None),
        }
    }
}

/// Fill `buf` with a 20-byte TCP header (no options) and its checksum.
pub fn build_tcp_segment(
    buf: &mut [u8],
    source: Ipv4Addr,
    dest: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    flags: u8,
    seq: u32,
) -> Result<(), ProbeError> {
    let mut seg = MutableTcpPacket::new(buf).ok_or_else(|| ProbeError::Io("segment buffer too small".into()))?;
    seg.set_source(src_port);
    seg.set_destination(dst_port);
    seg.set_sequence(seq);
    seg.set_acknowledgement(if has(flags, TcpFlags::ACK) { seq.wrapping_add(1) } else { 0 });
    seg.set_data_offset(5);
    seg.set_flags(flags);
    seg.set_window(1024);
    seg.set_urgent_ptr(0);
    seg.set_checksum(0);
    let checksum = tcp::ipv4_checksum(&seg.to_immutable(), &source, &dest);
    seg.set_checksum(checksum);
    Ok(())
}

/// Whether this process may open raw TCP sockets.
pub fn raw_sockets_available() -> bool {
    transport_channel(64, Layer4(Ipv4(IpNextHeaderProtocols::Tcp))).is_ok()
}
