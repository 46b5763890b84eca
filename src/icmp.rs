//! Contains implementation for generating and parsing ICMP packets
//!
//! The ICMP protocol is specified in [RFC 792](https://www.rfc-editor.org/rfc/rfc792)

use pnet::packet::{
    icmp::{
        destination_unreachable::DestinationUnreachablePacket,
        echo_reply::EchoReplyPacket,
        echo_request::{EchoRequestPacket, MutableEchoRequestPacket},
        time_exceeded::TimeExceededPacket,
        IcmpPacket,
    },
    ip::IpNextHeaderProtocols,
    ipv4::Ipv4Packet,
    Packet,
};

use crate::error::{PingError, PingResult};

/// Length of the fixed ICMP header (type, code, checksum, rest-of-header).
pub const ICMP_HEADER_LEN: usize = 8;

/// Length of an IPv4 header without options; added back when reporting the
/// size of a reply since the transport strips it.
pub const IPV4_HEADER_LEN: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    DestinationUnreachable,
    EchoRequest,
    TimeExceeded,
    ParameterProblem,
    Unknown(u8),
}

impl From<u8> for IcmpType {
    fn from(value: u8) -> Self {
        match value {
            0 => IcmpType::EchoReply,
            3 => IcmpType::DestinationUnreachable,
            8 => IcmpType::EchoRequest,
            11 => IcmpType::TimeExceeded,
            12 => IcmpType::ParameterProblem,
            _ => IcmpType::Unknown(value),
        }
    }
}

impl From<IcmpType> for u8 {
    fn from(value: IcmpType) -> Self {
        match value {
            IcmpType::EchoReply => 0,
            IcmpType::DestinationUnreachable => 3,
            IcmpType::EchoRequest => 8,
            IcmpType::TimeExceeded => 11,
            IcmpType::ParameterProblem => 12,
            IcmpType::Unknown(x) => x,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IcmpCode {
    Zero,
    Unknown(u8),
}

impl From<u8> for IcmpCode {
    fn from(value: u8) -> Self {
        match value {
            0 => IcmpCode::Zero,
            _ => IcmpCode::Unknown(value),
        }
    }
}

impl From<IcmpCode> for u8 {
    fn from(value: IcmpCode) -> Self {
        match value {
            IcmpCode::Zero => 0,
            IcmpCode::Unknown(x) => x,
        }
    }
}

/// An ICMP echo message, request or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpEcho {
    ty: IcmpType,
    code: IcmpCode,
    id: u16,
    seq: u16,
    payload: Vec<u8>,
}

impl IcmpEcho {
    pub fn new(ty: IcmpType, id: u16, seq: u16, payload: &[u8]) -> Self {
        IcmpEcho {
            ty,
            code: IcmpCode::Zero,
            id,
            seq,
            payload: payload.to_vec(),
        }
    }

    pub fn request(id: u16, seq: u16, payload: &[u8]) -> Self {
        Self::new(IcmpType::EchoRequest, id, seq, payload)
    }

    pub fn ty(&self) -> IcmpType {
        self.ty
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn seq(&self) -> u16 {
        self.seq
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the message on the wire, header included.
    pub fn wire_len(&self) -> usize {
        ICMP_HEADER_LEN + self.payload.len()
    }

    /// Serializes the message and fills in the checksum.
    ///
    /// Requests and replies share a layout, so both go through the request
    /// packet type.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_len()];
        if let Some(mut echo) = MutableEchoRequestPacket::new(&mut buf) {
            echo.set_icmp_type(pnet::packet::icmp::IcmpType(self.ty.into()));
            echo.set_icmp_code(pnet::packet::icmp::IcmpCode(self.code.into()));
            echo.set_identifier(self.id);
            echo.set_sequence_number(self.seq);
            echo.set_payload(&self.payload);
            let csum = pnet::util::checksum(echo.packet(), 1);
            echo.set_checksum(csum);
        }
        buf
    }
}

/// Any ICMP message a raw socket may hand back to a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcmpMessage {
    Echo(IcmpEcho),
    /// An ICMP error: destination unreachable, time exceeded or parameter
    /// problem.
    Error {
        ty: IcmpType,
        code: IcmpCode,
        /// Identifier and sequence of the echo request quoted in the body, if
        /// the quoted datagram was an ICMP echo request.
        quoted: Option<(u16, u16)>,
    },
    Other {
        ty: IcmpType,
        code: IcmpCode,
        body: Vec<u8>,
    },
}

fn malformed(what: &str, len: usize) -> PingError {
    PingError::Malformed(format!("{} bytes is too short for {}", len, what))
}

impl IcmpMessage {
    /// Parses an ICMP message with the IP header already stripped.
    pub fn parse(buf: &[u8]) -> PingResult<Self> {
        let packet = IcmpPacket::new(buf).ok_or_else(|| malformed("an ICMP header", buf.len()))?;
        let ty = IcmpType::from(packet.get_icmp_type().0);
        let code = IcmpCode::from(packet.get_icmp_code().0);

        match ty {
            IcmpType::EchoReply => {
                let reply =
                    EchoReplyPacket::new(buf).ok_or_else(|| malformed("an echo reply", buf.len()))?;
                Ok(IcmpMessage::Echo(IcmpEcho {
                    ty,
                    code,
                    id: reply.get_identifier(),
                    seq: reply.get_sequence_number(),
                    payload: reply.payload().to_vec(),
                }))
            }
            IcmpType::EchoRequest => {
                let request = EchoRequestPacket::new(buf)
                    .ok_or_else(|| malformed("an echo request", buf.len()))?;
                Ok(IcmpMessage::Echo(IcmpEcho {
                    ty,
                    code,
                    id: request.get_identifier(),
                    seq: request.get_sequence_number(),
                    payload: request.payload().to_vec(),
                }))
            }
            IcmpType::DestinationUnreachable => {
                let unreachable = DestinationUnreachablePacket::new(buf)
                    .ok_or_else(|| malformed("a destination unreachable", buf.len()))?;
                Ok(IcmpMessage::Error {
                    ty,
                    code,
                    quoted: quoted_echo(unreachable.payload()),
                })
            }
            IcmpType::TimeExceeded => {
                let exceeded = TimeExceededPacket::new(buf)
                    .ok_or_else(|| malformed("a time exceeded", buf.len()))?;
                Ok(IcmpMessage::Error {
                    ty,
                    code,
                    quoted: quoted_echo(exceeded.payload()),
                })
            }
            // pointer, then 3 unused bytes ahead of the quoted datagram
            IcmpType::ParameterProblem => Ok(IcmpMessage::Error {
                ty,
                code,
                quoted: packet.payload().get(4..).and_then(quoted_echo),
            }),
            IcmpType::Unknown(_) => Ok(IcmpMessage::Other {
                ty,
                code,
                body: packet.payload().to_vec(),
            }),
        }
    }
}

/// Extracts identifier and sequence from the original datagram quoted in an
/// ICMP error: the original IPv4 header followed by its first 8 payload bytes.
fn quoted_echo(data: &[u8]) -> Option<(u16, u16)> {
    let ip = Ipv4Packet::new(data)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    let header_len = ip.get_header_length() as usize * 4;
    let echo = EchoRequestPacket::new(data.get(header_len..)?)?;
    if IcmpType::from(echo.get_icmp_type().0) != IcmpType::EchoRequest {
        return None;
    }
    Some((echo.get_identifier(), echo.get_sequence_number()))
}

/// Builds an ICMP error of type `ty` quoting `request` behind a minimal IPv4
/// header, the way a router would.
#[cfg(test)]
pub(crate) fn quoting_error(ty: u8, code: u8, request: &[u8]) -> Vec<u8> {
    use pnet::packet::ipv4::MutableIpv4Packet;

    let mut ip = vec![0u8; IPV4_HEADER_LEN];
    if let Some(mut header) = MutableIpv4Packet::new(&mut ip) {
        header.set_version(4);
        header.set_header_length(5);
        header.set_total_length((IPV4_HEADER_LEN + request.len()) as u16);
        header.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    }
    let mut msg = vec![ty, code, 0, 0, 0, 0, 0, 0];
    msg.extend_from_slice(&ip);
    msg.extend_from_slice(&request[..ICMP_HEADER_LEN]);
    msg
}
