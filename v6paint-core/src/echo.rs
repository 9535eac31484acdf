//! The ICMPv6 echo request every sender transmits.
//!
//! The message is serialized once and shared read-only. The checksum is
//! left at zero: on raw `IPPROTO_ICMPV6` sockets the kernel computes it
//! over the pseudo-header.

use bytes::Bytes;
use etherparse::{IcmpEchoHeader, Icmpv6Header, Icmpv6Type};

/// An immutable, pre-serialized echo request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoTemplate {
    identifier: u16,
    sequence: u16,
    bytes: Bytes,
}

impl EchoTemplate {
    pub fn new(identifier: u16, sequence: u16, payload: &[u8]) -> Self {
        let header = Icmpv6Header::new(Icmpv6Type::EchoRequest(IcmpEchoHeader {
            id: identifier,
            seq: sequence,
        }));

        let mut buf = Vec::with_capacity(header.header_len() + payload.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(payload);

        Self {
            identifier,
            sequence,
            bytes: Bytes::from(buf),
        }
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Wire bytes, ready for `sendto`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for EchoTemplate {
    /// Identifier 0, sequence 0, no payload.
    fn default() -> Self {
        Self::new(0, 0, &[])
    }
}
