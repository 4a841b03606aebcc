//! Network boundary: socket configuration and the byte interface the feed
//! consumer reads from.
//!
//! Only the receive side of multicast market data is implemented here.
//! Order entry over TCP stays outside the crate; its endpoint is still
//! described by a [`SocketConfig`].

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Socket parameters as they appear in configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SocketConfig {
    /// Address to bind or connect to; a multicast group for market data
    pub ip: String,
    /// Local interface address used for multicast membership
    pub iface: String,
    pub port: u16,
    pub is_udp: bool,
    pub is_listening: bool,
    pub needs_timestamp: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_owned(),
            iface: "0.0.0.0".to_owned(),
            port: 0,
            is_udp: true,
            is_listening: false,
            needs_timestamp: false,
        }
    }
}

impl SocketConfig {
    fn group(&self) -> Result<Ipv4Addr> {
        self.ip
            .parse()
            .map_err(|_| Error::config(format!("invalid socket address '{}'", self.ip)))
    }

    fn interface(&self) -> Result<Ipv4Addr> {
        self.iface
            .parse()
            .map_err(|_| Error::config(format!("invalid interface address '{}'", self.iface)))
    }
}

impl fmt::Display for SocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SocketCfg[ip:{} iface:{} port:{} is_udp:{} is_listening:{} needs_SO_timestamp:{}]",
            self.ip, self.iface, self.port, self.is_udp, self.is_listening, self.needs_timestamp
        )
    }
}

/// Non-blocking datagram source.
pub trait FeedSocket {
    /// Read whatever is available into `buf`. `Ok(0)` means nothing pending.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Start receiving the stream (e.g. join the multicast group).
    fn join(&mut self) -> io::Result<()>;

    /// Stop receiving the stream.
    fn leave(&mut self) -> io::Result<()>;
}

/// Multicast UDP receiver bound to the configured port.
#[derive(Debug)]
pub struct McastFeed {
    socket: UdpSocket,
    group: Ipv4Addr,
    interface: Ipv4Addr,
    joined: bool,
}

impl McastFeed {
    /// Bind a non-blocking UDP socket on `cfg.port`.
    ///
    /// Group membership is not taken until [`FeedSocket::join`].
    pub fn open(cfg: &SocketConfig) -> Result<Self> {
        if !cfg.is_udp {
            return Err(Error::config(format!("market data socket must be UDP: {cfg}")));
        }
        let group = cfg.group()?;
        let interface = cfg.interface()?;

        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.port)))?;
        socket.set_nonblocking(true)?;
        info!(%cfg, local = ?socket.local_addr().ok(), "opened market data socket");

        Ok(Self {
            socket,
            group,
            interface,
            joined: false,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl FeedSocket for McastFeed {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn join(&mut self) -> io::Result<()> {
        if self.joined || !self.group.is_multicast() {
            return Ok(());
        }
        self.socket.join_multicast_v4(&self.group, &self.interface)?;
        self.joined = true;
        debug!(group = %self.group, "joined multicast group");
        Ok(())
    }

    fn leave(&mut self) -> io::Result<()> {
        if !self.joined {
            return Ok(());
        }
        self.socket.leave_multicast_v4(&self.group, &self.interface)?;
        self.joined = false;
        debug!(group = %self.group, "left multicast group");
        Ok(())
    }
}
