//! Network interface enumeration
//!
//! Broadcast feedback needs one destination per IPv4 interface, addressed to
//! that interface's directed broadcast address. Enumeration sits behind
//! [`InterfaceSource`] so the broadcaster can be driven with a fixed list.

use std::net::Ipv4Addr;

use if_addrs::IfAddr;
use tracing::debug;

use crate::error::{Result, TransportError};

/// One IPv4 address bound to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub loopback: bool,
}

impl InterfaceAddr {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            ip,
            netmask,
            loopback: ip.is_loopback(),
        }
    }

    /// Directed broadcast address of this interface's subnet
    pub fn broadcast(&self) -> Ipv4Addr {
        directed_broadcast(self.ip, self.netmask)
    }
}

/// `ip | !netmask`
pub fn directed_broadcast(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

/// Source of the current interface list
pub trait InterfaceSource: Send + Sync {
    fn ipv4_interfaces(&self) -> Result<Vec<InterfaceAddr>>;
}

/// Interfaces reported by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn ipv4_interfaces(&self) -> Result<Vec<InterfaceAddr>> {
        let interfaces =
            if_addrs::get_if_addrs().map_err(|e| TransportError::Interfaces(e.to_string()))?;

        let addrs = interfaces
            .into_iter()
            .filter_map(|iface| {
                let loopback = iface.is_loopback();
                match iface.addr {
                    IfAddr::V4(v4) => Some(InterfaceAddr {
                        name: iface.name,
                        ip: v4.ip,
                        netmask: v4.netmask,
                        loopback,
                    }),
                    IfAddr::V6(_) => {
                        debug!("Skipping IPv6 address on {}", iface.name);
                        None
                    }
                }
            })
            .collect();

        Ok(addrs)
    }
}

/// A fixed interface list
impl InterfaceSource for Vec<InterfaceAddr> {
    fn ipv4_interfaces(&self) -> Result<Vec<InterfaceAddr>> {
        Ok(self.clone())
    }
}
