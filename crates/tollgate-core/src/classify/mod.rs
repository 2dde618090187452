//! Frame classification: one raw IP frame in, one protocol fingerprint out.
//!
//! Pure transform with no side effects; the same bytes always yield the same
//! fingerprint. Decode failures are per-frame and the caller treats the
//! frame as denied.

mod dns;

pub use dns::first_query_name;

use std::net::IpAddr;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use crate::error::DecodeError;

/// Well-known DNS port; UDP traffic touching it is probed for a query name.
pub const DNS_PORT: u16 = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
    Icmp,
    /// Any other IP protocol, carrying the raw protocol number.
    Other(u8),
}

/// Decision-relevant summary of one frame.
///
/// Derived, ephemeral, never mutated after construction. Ports are `None`
/// for transports that have none; `dns_query` is the lower-cased first
/// question name of a UDP port-53 query, when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub ip: IpVersion,
    pub transport: Transport,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub dns_query: Option<String>,
}

/// Classify a raw IP frame as read from the virtual interface (no link-layer
/// header, per `IFF_NO_PI`).
pub fn classify(frame: &[u8]) -> std::result::Result<Fingerprint, DecodeError> {
    let first = frame.first().copied().ok_or(DecodeError::Empty)?;
    let version = first >> 4;
    if version != 4 && version != 6 {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let sliced =
        SlicedPacket::from_ip(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let (ip, src, dst, ip_proto) = match &sliced.net {
        Some(NetSlice::Ipv4(v4)) => {
            let header = v4.header();
            (
                IpVersion::V4,
                IpAddr::from(header.source_addr()),
                IpAddr::from(header.destination_addr()),
                header.protocol().0,
            )
        }
        Some(NetSlice::Ipv6(v6)) => {
            let header = v6.header();
            (
                IpVersion::V6,
                IpAddr::from(header.source_addr()),
                IpAddr::from(header.destination_addr()),
                header.next_header().0,
            )
        }
        _ => return Err(DecodeError::Malformed("missing ip layer".into())),
    };

    let mut fp = Fingerprint {
        ip,
        transport: Transport::Other(ip_proto),
        src,
        dst,
        src_port: None,
        dst_port: None,
        dns_query: None,
    };

    match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            fp.transport = Transport::Tcp;
            fp.src_port = Some(tcp.source_port());
            fp.dst_port = Some(tcp.destination_port());
        }
        Some(TransportSlice::Udp(udp)) => {
            let (sp, dp) = (udp.source_port(), udp.destination_port());
            fp.transport = Transport::Udp;
            fp.src_port = Some(sp);
            fp.dst_port = Some(dp);
            if sp == DNS_PORT || dp == DNS_PORT {
                // A payload that is not a DNS query simply yields no name;
                // it does not fail the classification.
                fp.dns_query = first_query_name(udp.payload());
            }
        }
        Some(TransportSlice::Icmpv4(_)) | Some(TransportSlice::Icmpv6(_)) => {
            fp.transport = Transport::Icmp;
        }
        _ => {}
    }

    Ok(fp)
}
