//! IPv4 network blocks.
//!
//! Only what synthesis needs: parsing, overlap detection between
//! environments, and carving fixed-size subnetworks out of a block.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// An IPv4 CIDR block, normalized to its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Block {
    network: u32,
    prefix: u8,
}

impl Ipv4Block {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Option<Self> {
        if prefix > 32 {
            return None;
        }
        Some(Self {
            network: u32::from(addr) & mask(prefix),
            prefix,
        })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    fn last(&self) -> u32 {
        self.network | !mask(self.prefix)
    }

    /// Whether the two blocks share at least one address.
    pub fn overlaps(&self, other: &Ipv4Block) -> bool {
        self.network <= other.last() && other.network <= self.last()
    }

    /// The `index`-th subnetwork obtained by extending the prefix by `new_bits`.
    pub fn subnet(&self, new_bits: u8, index: u32) -> Option<Ipv4Block> {
        let prefix = self.prefix.checked_add(new_bits)?;
        if prefix > 32 || (new_bits < 32 && index >= 1u32 << new_bits) {
            return None;
        }
        let size = if prefix == 32 { 1 } else { 1u32 << (32 - prefix) };
        Some(Self {
            network: self.network + index * size,
            prefix,
        })
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

impl FromStr for Ipv4Block {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("'{}' is missing a prefix length", s))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|e| format!("'{}' is not an IPv4 address: {}", addr, e))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("'{}' is not a prefix length", prefix))?;
        Self::new(addr, prefix).ok_or_else(|| format!("prefix /{} is out of range", prefix))
    }
}

impl fmt::Display for Ipv4Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

impl Serialize for Ipv4Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_host_bits() {
        let block: Ipv4Block = "10.1.2.3/16".parse().unwrap();
        assert_eq!(block.to_string(), "10.1.0.0/16");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("10.0.0.0".parse::<Ipv4Block>().is_err());
        assert!("10.0.0/16".parse::<Ipv4Block>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Block>().is_err());
    }

    #[test]
    fn test_overlap() {
        let a: Ipv4Block = "10.0.0.0/16".parse().unwrap();
        let b: Ipv4Block = "10.0.128.0/17".parse().unwrap();
        let c: Ipv4Block = "10.1.0.0/16".parse().unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_subnet_carving() {
        let block: Ipv4Block = "10.0.0.0/16".parse().unwrap();
        assert_eq!(block.subnet(2, 0).unwrap().to_string(), "10.0.0.0/18");
        assert_eq!(block.subnet(2, 3).unwrap().to_string(), "10.0.192.0/18");
        assert!(block.subnet(2, 4).is_none());
    }
}
