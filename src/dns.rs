//! DNS message parsing and construction.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::CodecError;

const HEADER_LEN: usize = 12;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const MAX_POINTER_HOPS: usize = 32;

const FLAG_QR: u16 = 0x8000;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;
const RCODE_MASK: u16 = 0x000F;

pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_CNAME: u16 = 5;
pub const TYPE_SOA: u16 = 6;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_MX: u16 = 15;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_SRV: u16 = 33;
pub const CLASS_IN: u16 = 1;

/// TTL handed out with sinkholed answers.
pub const BLOCKED_TTL: u32 = 7200;

/// Lowercase a domain and terminate it with the root separator.
pub fn canonical_domain(domain: &str) -> String {
    let domain = domain.trim();
    let mut canonical = domain.to_ascii_lowercase();
    if !canonical.ends_with('.') {
        canonical.push('.');
    }
    canonical
}

/// The subset of the DNS header the proxy cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DnsHeader {
    pub id: u16,
    pub response: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: u8,
}

impl DnsHeader {
    fn from_wire(id: u16, flags: u16) -> Self {
        Self {
            id,
            response: flags & FLAG_QR != 0,
            recursion_desired: flags & FLAG_RD != 0,
            recursion_available: flags & FLAG_RA != 0,
            rcode: (flags & RCODE_MASK) as u8,
        }
    }

    fn flags(&self) -> u16 {
        let mut flags = self.rcode as u16 & RCODE_MASK;
        if self.response {
            flags |= FLAG_QR;
        }
        if self.recursion_desired {
            flags |= FLAG_RD;
        }
        if self.recursion_available {
            flags |= FLAG_RA;
        }
        flags
    }

    /// Header of a successful response carrying the given id.
    fn answer(id: u16) -> Self {
        Self {
            id,
            response: true,
            recursion_desired: true,
            recursion_available: true,
            rcode: 0,
        }
    }
}

/// A DNS question section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    /// Fully qualified name, always ending in `.`.
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    /// Build an `IN` class question, adding the trailing dot if missing.
    pub fn new(name: &str, qtype: u16) -> Self {
        let mut name = name.to_string();
        if !name.ends_with('.') {
            name.push('.');
        }
        Self {
            name,
            qtype,
            qclass: CLASS_IN,
        }
    }
}

/// Type specific payload of a resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    /// Target of a CNAME, NS or PTR record, decompressed.
    Name(String),
    Mx {
        preference: u16,
        exchange: String,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    /// Any other record type, kept verbatim. Only types whose data never
    /// holds compressed names end up here.
    Raw(Vec<u8>),
}

impl RecordData {
    fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            RecordData::A(addr) => Ok(addr.octets().to_vec()),
            RecordData::Aaaa(addr) => Ok(addr.octets().to_vec()),
            RecordData::Name(name) => {
                let mut buf = Vec::with_capacity(name.len() + 2);
                encode_name(&mut buf, name)?;
                Ok(buf)
            }
            RecordData::Mx {
                preference,
                exchange,
            } => {
                let mut buf = preference.to_be_bytes().to_vec();
                encode_name(&mut buf, exchange)?;
                Ok(buf)
            }
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                let mut buf = Vec::with_capacity(target.len() + 8);
                buf.extend_from_slice(&priority.to_be_bytes());
                buf.extend_from_slice(&weight.to_be_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
                encode_name(&mut buf, target)?;
                Ok(buf)
            }
            RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                let mut buf = Vec::with_capacity(mname.len() + rname.len() + 24);
                encode_name(&mut buf, mname)?;
                encode_name(&mut buf, rname)?;
                for value in [serial, refresh, retry, expire, minimum] {
                    buf.extend_from_slice(&value.to_be_bytes());
                }
                Ok(buf)
            }
            RecordData::Raw(bytes) => Ok(bytes.clone()),
        }
    }
}

/// A DNS resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: String,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub data: RecordData,
}

impl DnsRecord {
    /// An `IN A` record.
    pub fn a(name: &str, ttl: u32, addr: Ipv4Addr) -> Self {
        Self {
            name: DnsQuestion::new(name, TYPE_A).name,
            rtype: TYPE_A,
            class: CLASS_IN,
            ttl,
            data: RecordData::A(addr),
        }
    }
}

/// A DNS message with exactly one question.
///
/// Authority and additional sections are not modelled; they are skipped on
/// decode and never written on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub header: DnsHeader,
    pub question: DnsQuestion,
    pub answers: Vec<DnsRecord>,
}

impl DnsMessage {
    /// A plain recursive query for `question`.
    pub fn query(id: u16, question: DnsQuestion) -> Self {
        Self {
            header: DnsHeader {
                id,
                recursion_desired: true,
                ..DnsHeader::default()
            },
            question,
            answers: Vec::new(),
        }
    }

    /// Response carrying `records` for `question`, stamped with the caller's id.
    pub fn answer(id: u16, question: DnsQuestion, records: Vec<DnsRecord>) -> Self {
        Self {
            header: DnsHeader::answer(id),
            question,
            answers: records,
        }
    }

    /// Sinkhole response: one null address answer with a long TTL.
    ///
    /// AAAA questions get `::`, every other question gets `A 0.0.0.0`.
    pub fn mock_answer(id: u16, question: DnsQuestion) -> Self {
        let record = if question.qtype == TYPE_AAAA {
            DnsRecord {
                name: question.name.clone(),
                rtype: TYPE_AAAA,
                class: question.qclass,
                ttl: BLOCKED_TTL,
                data: RecordData::Aaaa(Ipv6Addr::UNSPECIFIED),
            }
        } else {
            DnsRecord {
                name: question.name.clone(),
                rtype: TYPE_A,
                class: question.qclass,
                ttl: BLOCKED_TTL,
                data: RecordData::A(Ipv4Addr::UNSPECIFIED),
            }
        };

        Self::answer(id, question, vec![record])
    }

    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// The queried name as it appeared on the wire (with trailing dot).
    pub fn domain(&self) -> &str {
        &self.question.name
    }

    /// Cache key for the question: `<canonical name>:<type>:<class>`.
    pub fn question_key(&self) -> String {
        format!(
            "{}:{}:{}",
            canonical_domain(&self.question.name),
            self.question.qtype,
            self.question.qclass
        )
    }

    /// Longest TTL among the answers, 0 when there are none.
    pub fn effective_ttl(&self) -> u32 {
        self.answers.iter().map(|r| r.ttl).max().unwrap_or(0)
    }

    /// Addresses carried by A and AAAA answers.
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.answers.iter().filter_map(|r| match r.data {
            RecordData::A(addr) => Some(IpAddr::V4(addr)),
            RecordData::Aaaa(addr) => Some(IpAddr::V6(addr)),
            _ => None,
        })
    }

    /// Parse a DNS message from raw bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Malformed("packet shorter than header"));
        }

        let id = read_u16(buf, 0)?;
        let flags = read_u16(buf, 2)?;
        let qdcount = read_u16(buf, 4)?;
        let ancount = read_u16(buf, 6)? as usize;

        if qdcount == 0 {
            return Err(CodecError::Malformed("no question"));
        }

        // Only the first question is kept, the rest are skipped
        let mut pos = HEADER_LEN;
        let mut question = None;
        for _ in 0..qdcount {
            let (name, next) = read_name(buf, pos)?;
            let qtype = read_u16(buf, next)?;
            let qclass = read_u16(buf, next + 2)?;
            pos = next + 4;
            if question.is_none() {
                question = Some(DnsQuestion {
                    name,
                    qtype,
                    qclass,
                });
            }
        }
        let Some(question) = question else {
            return Err(CodecError::Malformed("no question"));
        };

        let mut answers = Vec::with_capacity(ancount.min(16));
        for _ in 0..ancount {
            let (record, next) = read_record(buf, pos)?;
            answers.push(record);
            pos = next;
        }

        Ok(Self {
            header: DnsHeader::from_wire(id, flags),
            question,
            answers,
        })
    }

    /// Encode the message to wire format bytes. Names are never compressed.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(512);
        let ancount =
            u16::try_from(self.answers.len()).map_err(|_| CodecError::TooManyRecords)?;

        // Header
        buf.extend_from_slice(&self.header.id.to_be_bytes());
        buf.extend_from_slice(&self.header.flags().to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
        buf.extend_from_slice(&ancount.to_be_bytes());
        buf.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
        buf.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

        // Question
        encode_name(&mut buf, &self.question.name)?;
        buf.extend_from_slice(&self.question.qtype.to_be_bytes());
        buf.extend_from_slice(&self.question.qclass.to_be_bytes());

        // Answers
        for record in &self.answers {
            encode_name(&mut buf, &record.name)?;
            buf.extend_from_slice(&record.rtype.to_be_bytes());
            buf.extend_from_slice(&record.class.to_be_bytes());
            buf.extend_from_slice(&record.ttl.to_be_bytes());

            let rdata = record.data.to_wire()?;
            let rdlength =
                u16::try_from(rdata.len()).map_err(|_| CodecError::RecordDataTooLong)?;
            buf.extend_from_slice(&rdlength.to_be_bytes());
            buf.extend_from_slice(&rdata);
        }

        Ok(buf)
    }
}

fn read_u16(buf: &[u8], pos: usize) -> Result<u16, CodecError> {
    buf.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(CodecError::Malformed("truncated field"))
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32, CodecError> {
    buf.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(CodecError::Malformed("truncated field"))
}

/// Read a possibly compressed name starting at `start`.
///
/// Returns the dotted name and the offset right after the name in the
/// original stream (after the first pointer, if any).
fn read_name(buf: &[u8], start: usize) -> Result<(String, usize), CodecError> {
    let mut name = String::new();
    let mut pos = start;
    let mut end = None;
    let mut hops = 0;
    let mut wire_len = 1;

    loop {
        let len = *buf
            .get(pos)
            .ok_or(CodecError::Malformed("name runs past end of packet"))? as usize;

        match len & 0xC0 {
            0x00 if len == 0 => {
                if name.is_empty() {
                    name.push('.');
                }
                return Ok((name, end.unwrap_or(pos + 1)));
            }
            0x00 => {
                let label = buf
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(CodecError::Malformed("label runs past end of packet"))?;
                wire_len += len + 1;
                if wire_len > MAX_NAME_LEN {
                    return Err(CodecError::Malformed("name exceeds 255 bytes"));
                }
                let label = std::str::from_utf8(label)
                    .map_err(|_| CodecError::Malformed("label is not valid UTF-8"))?;
                name.push_str(label);
                name.push('.');
                pos += 1 + len;
            }
            0xC0 => {
                let low = *buf
                    .get(pos + 1)
                    .ok_or(CodecError::Malformed("pointer runs past end of packet"))?;
                let target = ((len & 0x3F) << 8) | low as usize;
                if end.is_none() {
                    end = Some(pos + 2);
                }
                // Pointers must go strictly backwards
                hops += 1;
                if hops > MAX_POINTER_HOPS || target >= pos {
                    return Err(CodecError::Malformed("invalid compression pointer"));
                }
                pos = target;
            }
            _ => return Err(CodecError::Malformed("unsupported label type")),
        }
    }
}

fn read_record(buf: &[u8], start: usize) -> Result<(DnsRecord, usize), CodecError> {
    let (name, pos) = read_name(buf, start)?;
    let rtype = read_u16(buf, pos)?;
    let class = read_u16(buf, pos + 2)?;
    let ttl = read_u32(buf, pos + 4)?;
    let rdlength = read_u16(buf, pos + 8)? as usize;

    let rdata_start = pos + 10;
    let rdata_end = rdata_start + rdlength;
    let rdata = buf
        .get(rdata_start..rdata_end)
        .ok_or(CodecError::Malformed("record data runs past end of packet"))?;

    let data = match rtype {
        TYPE_A => {
            let octets: [u8; 4] = rdata
                .try_into()
                .map_err(|_| CodecError::Malformed("A record is not 4 bytes"))?;
            RecordData::A(Ipv4Addr::from(octets))
        }
        TYPE_AAAA => {
            let octets: [u8; 16] = rdata
                .try_into()
                .map_err(|_| CodecError::Malformed("AAAA record is not 16 bytes"))?;
            RecordData::Aaaa(Ipv6Addr::from(octets))
        }
        TYPE_CNAME | TYPE_NS | TYPE_PTR => {
            let (target, target_end) = read_name(buf, rdata_start)?;
            expect_rdata_end(target_end, rdata_end)?;
            RecordData::Name(target)
        }
        TYPE_MX => {
            let preference = read_u16(buf, rdata_start)?;
            let (exchange, end) = read_name(buf, rdata_start + 2)?;
            expect_rdata_end(end, rdata_end)?;
            RecordData::Mx {
                preference,
                exchange,
            }
        }
        TYPE_SRV => {
            let (target, end) = read_name(buf, rdata_start + 6)?;
            expect_rdata_end(end, rdata_end)?;
            RecordData::Srv {
                priority: read_u16(buf, rdata_start)?,
                weight: read_u16(buf, rdata_start + 2)?,
                port: read_u16(buf, rdata_start + 4)?,
                target,
            }
        }
        TYPE_SOA => {
            let (mname, next) = read_name(buf, rdata_start)?;
            let (rname, next) = read_name(buf, next)?;
            expect_rdata_end(next + 20, rdata_end)?;
            RecordData::Soa {
                mname,
                rname,
                serial: read_u32(buf, next)?,
                refresh: read_u32(buf, next + 4)?,
                retry: read_u32(buf, next + 8)?,
                expire: read_u32(buf, next + 12)?,
                minimum: read_u32(buf, next + 16)?,
            }
        }
        _ => RecordData::Raw(rdata.to_vec()),
    };

    Ok((
        DnsRecord {
            name,
            rtype,
            class,
            ttl,
            data,
        },
        rdata_end,
    ))
}

fn expect_rdata_end(end: usize, rdata_end: usize) -> Result<(), CodecError> {
    if end != rdata_end {
        return Err(CodecError::Malformed("record data length mismatch"));
    }
    Ok(())
}

fn encode_name(buf: &mut Vec<u8>, name: &str) -> Result<(), CodecError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        buf.push(0);
        return Ok(());
    }

    let mut wire_len = 1;
    for label in name.split('.') {
        if label.is_empty() {
            return Err(CodecError::EmptyLabel);
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(CodecError::LabelTooLong);
        }
        wire_len += label.len() + 1;
        if wire_len > MAX_NAME_LEN {
            return Err(CodecError::NameTooLong);
        }
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);

    Ok(())
}
