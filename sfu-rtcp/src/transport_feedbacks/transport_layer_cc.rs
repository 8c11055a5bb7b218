//! Transport-wide congestion control feedback,
//! draft-holmer-rmcat-transport-wide-cc-extensions-01, format version 15.
//!
//! Wire shape grounded on the fields actually produced by
//! `rtc-interceptor::twcc::recorder::Feedback`/`Chunk`: a base sequence
//! number, a run of 2-byte packet-status chunks (run-length or status
//! vector, 1- or 2-bit symbol width), and a trailing run of small (1 byte)
//! or large (2 byte) receive deltas in 250us units.

use bytes::BytesMut;
use sfu_shared::error::{Error, Result};
use sfu_shared::marshal::{Marshal, MarshalSize, Unmarshal};
use sfu_shared::ByteReader;

use crate::header::{self, Header, FMT_TWCC, PT_RTPFB};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolTypeTcc {
    PacketNotReceived,
    PacketReceivedSmallDelta,
    PacketReceivedLargeDelta,
    /// Reserved by the draft; round-trips opaquely, never constructed by
    /// this core's own feedback builder.
    Reserved,
}

impl SymbolTypeTcc {
    fn from_bits(v: u8) -> Self {
        match v & 0x3 {
            0 => SymbolTypeTcc::PacketNotReceived,
            1 => SymbolTypeTcc::PacketReceivedSmallDelta,
            2 => SymbolTypeTcc::PacketReceivedLargeDelta,
            _ => SymbolTypeTcc::Reserved,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            SymbolTypeTcc::PacketNotReceived => 0,
            SymbolTypeTcc::PacketReceivedSmallDelta => 1,
            SymbolTypeTcc::PacketReceivedLargeDelta => 2,
            SymbolTypeTcc::Reserved => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSizeTypeTcc {
    OneBit,
    TwoBit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChunkTypeTcc {
    RunLengthChunk,
    StatusVectorChunk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLengthChunk {
    pub type_tcc: StatusChunkTypeTcc,
    pub packet_status_symbol: SymbolTypeTcc,
    pub run_length: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusVectorChunk {
    pub type_tcc: StatusChunkTypeTcc,
    pub symbol_size: SymbolSizeTypeTcc,
    pub symbol_list: Vec<SymbolTypeTcc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketStatusChunk {
    RunLengthChunk(RunLengthChunk),
    StatusVectorChunk(StatusVectorChunk),
}

impl PacketStatusChunk {
    fn encode(&self) -> u16 {
        match self {
            PacketStatusChunk::RunLengthChunk(c) => {
                ((c.packet_status_symbol.to_bits() as u16) << 13) | (c.run_length & 0x1FFF)
            }
            PacketStatusChunk::StatusVectorChunk(c) => {
                let mut word = 1u16 << 15;
                match c.symbol_size {
                    SymbolSizeTypeTcc::OneBit => {
                        word |= (c.symbol_list.len() as u16 & 0x3FFF) | 0; // S bit = 0
                        let mut bits = 0u16;
                        for (i, s) in c.symbol_list.iter().enumerate().take(14) {
                            if matches!(s, SymbolTypeTcc::PacketReceivedSmallDelta) {
                                bits |= 1 << (13 - i);
                            }
                        }
                        word = (1u16 << 15) | bits;
                    }
                    SymbolSizeTypeTcc::TwoBit => {
                        word |= 1 << 14; // S bit = 1
                        for (i, s) in c.symbol_list.iter().enumerate().take(7) {
                            word |= (s.to_bits() as u16) << (12 - i * 2);
                        }
                    }
                }
                word
            }
        }
    }

    fn decode(word: u16) -> PacketStatusChunk {
        if word & 0x8000 == 0 {
            PacketStatusChunk::RunLengthChunk(RunLengthChunk {
                type_tcc: StatusChunkTypeTcc::RunLengthChunk,
                packet_status_symbol: SymbolTypeTcc::from_bits(((word >> 13) & 0x3) as u8),
                run_length: word & 0x1FFF,
            })
        } else if word & 0x4000 == 0 {
            let mut symbol_list = Vec::with_capacity(14);
            for i in 0..14 {
                let bit = (word >> (13 - i)) & 0x1;
                symbol_list.push(if bit == 1 {
                    SymbolTypeTcc::PacketReceivedSmallDelta
                } else {
                    SymbolTypeTcc::PacketNotReceived
                });
            }
            PacketStatusChunk::StatusVectorChunk(StatusVectorChunk {
                type_tcc: StatusChunkTypeTcc::StatusVectorChunk,
                symbol_size: SymbolSizeTypeTcc::OneBit,
                symbol_list,
            })
        } else {
            let mut symbol_list = Vec::with_capacity(7);
            for i in 0..7 {
                let bits = (word >> (12 - i * 2)) & 0x3;
                symbol_list.push(SymbolTypeTcc::from_bits(bits as u8));
            }
            PacketStatusChunk::StatusVectorChunk(StatusVectorChunk {
                type_tcc: StatusChunkTypeTcc::StatusVectorChunk,
                symbol_size: SymbolSizeTypeTcc::TwoBit,
                symbol_list,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvDelta {
    pub type_tcc_packet: SymbolTypeTcc,
    /// Delta in microseconds, already rounded to a multiple of 250us.
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportLayerCc {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub base_sequence_number: u16,
    pub packet_status_count: u16,
    /// Reference time in 64ms units, truncated to 24 bits on the wire.
    pub reference_time: u32,
    pub fb_pkt_count: u8,
    pub packet_chunks: Vec<PacketStatusChunk>,
    pub recv_deltas: Vec<RecvDelta>,
}

impl Default for SymbolTypeTcc {
    fn default() -> Self {
        SymbolTypeTcc::PacketNotReceived
    }
}

impl Default for StatusChunkTypeTcc {
    fn default() -> Self {
        StatusChunkTypeTcc::RunLengthChunk
    }
}

impl MarshalSize for TransportLayerCc {
    fn marshal_size(&self) -> usize {
        let deltas_len: usize = self
            .recv_deltas
            .iter()
            .map(|d| match d.type_tcc_packet {
                SymbolTypeTcc::PacketReceivedLargeDelta => 2,
                _ => 1,
            })
            .sum();
        let raw = header::HEADER_LENGTH + 12 + self.packet_chunks.len() * 2 + deltas_len;
        raw.div_ceil(4) * 4
    }
}

impl Marshal for TransportLayerCc {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let body_len = self.marshal_size() - header::HEADER_LENGTH;
        let header = Header {
            padding: false,
            count: FMT_TWCC,
            packet_type: PT_RTPFB,
            length: header::length_field_for(body_len),
        };
        header.marshal_to(buf)?;
        buf.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        buf.extend_from_slice(&self.media_ssrc.to_be_bytes());
        buf.extend_from_slice(&self.base_sequence_number.to_be_bytes());
        buf.extend_from_slice(&self.packet_status_count.to_be_bytes());
        let ref_and_count = ((self.reference_time & 0x00FF_FFFF) << 8) | self.fb_pkt_count as u32;
        buf.extend_from_slice(&ref_and_count.to_be_bytes());
        for chunk in &self.packet_chunks {
            buf.extend_from_slice(&chunk.encode().to_be_bytes());
        }
        for delta in &self.recv_deltas {
            match delta.type_tcc_packet {
                SymbolTypeTcc::PacketReceivedLargeDelta => {
                    let scaled = (delta.delta / 250) as i16;
                    buf.extend_from_slice(&scaled.to_be_bytes());
                }
                _ => {
                    let scaled = (delta.delta / 250) as u8;
                    buf.extend_from_slice(&[scaled]);
                }
            }
        }
        while (buf.len() - start) % 4 != 0 {
            buf.extend_from_slice(&[0]);
        }
        Ok(buf.len() - start)
    }
}

impl Unmarshal for TransportLayerCc {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(buf)?;
        if header.packet_type != PT_RTPFB || header.count != FMT_TWCC {
            return Err(Error::ErrUnknownRtcpType(header.packet_type));
        }
        let total_len = (header.length as usize + 1) * 4;
        let mut r = ByteReader::new(&buf[header::HEADER_LENGTH..total_len]);
        let sender_ssrc = r.read_u32()?;
        let media_ssrc = r.read_u32()?;
        let base_sequence_number = r.read_u16()?;
        let packet_status_count = r.read_u16()?;
        let ref_and_count = r.read_u32()?;
        let reference_time = ref_and_count >> 8;
        let fb_pkt_count = (ref_and_count & 0xFF) as u8;

        let mut packet_chunks = Vec::new();
        let mut symbols_decoded = 0usize;
        while symbols_decoded < packet_status_count as usize {
            let word = r.read_u16()?;
            let chunk = PacketStatusChunk::decode(word);
            symbols_decoded += match &chunk {
                PacketStatusChunk::RunLengthChunk(c) => c.run_length as usize,
                PacketStatusChunk::StatusVectorChunk(c) => c.symbol_list.len(),
            };
            packet_chunks.push(chunk);
        }

        let mut recv_deltas = Vec::new();
        let mut remaining = packet_status_count as usize;
        'chunks: for chunk in &packet_chunks {
            match chunk {
                PacketStatusChunk::RunLengthChunk(c) => {
                    let n = (c.run_length as usize).min(remaining);
                    for _ in 0..n {
                        match c.packet_status_symbol {
                            SymbolTypeTcc::PacketReceivedSmallDelta => {
                                recv_deltas.push(RecvDelta {
                                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                                    delta: r.read_u8()? as i64 * 250,
                                });
                            }
                            SymbolTypeTcc::PacketReceivedLargeDelta => {
                                let v = r.read_u16()? as i16;
                                recv_deltas.push(RecvDelta {
                                    type_tcc_packet: SymbolTypeTcc::PacketReceivedLargeDelta,
                                    delta: v as i64 * 250,
                                });
                            }
                            _ => {}
                        }
                    }
                    remaining -= n;
                }
                PacketStatusChunk::StatusVectorChunk(c) => {
                    for s in &c.symbol_list {
                        if remaining == 0 {
                            break 'chunks;
                        }
                        match s {
                            SymbolTypeTcc::PacketReceivedSmallDelta => {
                                recv_deltas.push(RecvDelta {
                                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                                    delta: r.read_u8()? as i64 * 250,
                                });
                            }
                            SymbolTypeTcc::PacketReceivedLargeDelta => {
                                let v = r.read_u16()? as i16;
                                recv_deltas.push(RecvDelta {
                                    type_tcc_packet: SymbolTypeTcc::PacketReceivedLargeDelta,
                                    delta: v as i64 * 250,
                                });
                            }
                            _ => {}
                        }
                        remaining -= 1;
                    }
                }
            }
        }

        Ok(TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            packet_chunks,
            recv_deltas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_run_length_chunk_all_received() {
        let pkt = TransportLayerCc {
            sender_ssrc: 1,
            media_ssrc: 2,
            base_sequence_number: 10,
            packet_status_count: 3,
            reference_time: 12345,
            fb_pkt_count: 7,
            packet_chunks: vec![PacketStatusChunk::RunLengthChunk(RunLengthChunk {
                type_tcc: StatusChunkTypeTcc::RunLengthChunk,
                packet_status_symbol: SymbolTypeTcc::PacketReceivedSmallDelta,
                run_length: 3,
            })],
            recv_deltas: vec![
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                    delta: 250,
                },
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                    delta: 500,
                },
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                    delta: 0,
                },
            ],
        };
        let bytes = pkt.marshal().unwrap();
        assert_eq!(bytes.len() % 4, 0);
        let parsed = TransportLayerCc::unmarshal(&bytes).unwrap();
        assert_eq!(parsed, pkt);
    }

    #[test]
    fn round_trips_status_vector_chunk_with_gap_and_large_delta() {
        let pkt = TransportLayerCc {
            sender_ssrc: 9,
            media_ssrc: 10,
            base_sequence_number: 0,
            packet_status_count: 3,
            reference_time: 1,
            fb_pkt_count: 0,
            packet_chunks: vec![PacketStatusChunk::StatusVectorChunk(StatusVectorChunk {
                type_tcc: StatusChunkTypeTcc::StatusVectorChunk,
                symbol_size: SymbolSizeTypeTcc::TwoBit,
                symbol_list: vec![
                    SymbolTypeTcc::PacketNotReceived,
                    SymbolTypeTcc::PacketReceivedSmallDelta,
                    SymbolTypeTcc::PacketReceivedLargeDelta,
                ],
            })],
            recv_deltas: vec![
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                    delta: 1000,
                },
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedLargeDelta,
                    delta: 20000,
                },
            ],
        };
        let bytes = pkt.marshal().unwrap();
        let parsed = TransportLayerCc::unmarshal(&bytes).unwrap();
        assert_eq!(parsed, pkt);
    }
}
