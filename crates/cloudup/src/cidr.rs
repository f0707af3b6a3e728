//! IPv4 CIDR arithmetic used by subnet and proxy defaulting

use crate::error::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in CIDR notation, stored with host bits cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Parse `a.b.c.d/n`, returning the address as written and its network
    pub fn parse_with_ip(s: &str) -> Result<(Ipv4Addr, Self)> {
        let (ip, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::invalid_cidr(s, "missing prefix length"))?;
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| Error::invalid_cidr(s, "invalid IPv4 address"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| Error::invalid_cidr(s, "invalid prefix length"))?;
        if prefix > 32 {
            return Err(Error::invalid_cidr(s, "prefix length above 32"));
        }

        let cidr = Self {
            network: u32::from(ip) & mask(prefix),
            prefix,
        };
        Ok((ip, cidr))
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & mask(self.prefix) == self.network
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        let shorter = self.prefix.min(other.prefix);
        self.network & mask(shorter) == other.network & mask(shorter)
    }

    /// Split into the `2^extra_bits` equal blocks, lowest first
    pub fn subdivide(&self, extra_bits: u8) -> Option<impl Iterator<Item = Self>> {
        if extra_bits >= 32 {
            return None;
        }
        let prefix = self.prefix.checked_add(extra_bits).filter(|p| *p <= 32)?;
        let network = self.network;
        let step = if prefix == 32 { 1 } else { 1u32 << (32 - prefix) };
        Some((0..1u32 << extra_bits).map(move |i| Self {
            network: network + i * step,
            prefix,
        }))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_ip(s).map(|(_, cidr)| cidr)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

/// The address after `ip`, which must still lie inside `cidr`
pub fn increment_ip(ip: Ipv4Addr, cidr: &str) -> Result<Ipv4Addr> {
    let network: Ipv4Cidr = cidr.parse()?;
    let next = u32::from(ip)
        .checked_add(1)
        .map(Ipv4Addr::from)
        .filter(|next| network.contains(*next));
    next.ok_or_else(|| Error::IpOverflow {
        cidr: cidr.to_string(),
    })
}
