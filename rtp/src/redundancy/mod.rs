
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

const BLOCK_HEADER_LENGTH: usize = 4;
const PRIMARY_HEADER_LENGTH: usize = 1;
const FOLLOW_BIT: u8 = 0x80;
const MAX_TIMESTAMP_OFFSET: u16 = 0x3FFF;
const MAX_BLOCK_LENGTH: usize = 0x3FF;

/// RedundantBlock is one encoding carried in an RFC 2198 payload.
/// The primary block always has a zero timestamp offset.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct RedundantBlock {
    pub payload_type: u8,
    /// how far this block's timestamp lies before the RTP header timestamp
    pub timestamp_offset: u16,
    pub data: Bytes,
}

/// decode_redundant splits an RFC 2198 payload into its secondary blocks,
/// oldest first, and the primary block.
pub fn decode_redundant(payload: &Bytes) -> Result<(Vec<RedundantBlock>, RedundantBlock)> {
    /*
     *  0                   1                   2                   3
     *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
     * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
     * |F|   block PT  |  timestamp offset         |   block length    |
     * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
     * |0|   block PT  |
     * +-+-+-+-+-+-+-+-+
     */
    let mut headers = vec![];
    let mut offset = 0;
    loop {
        if offset >= payload.len() {
            return Err(Error::ErrRedundancyHeaderTruncated);
        }
        let b0 = payload[offset];
        if b0 & FOLLOW_BIT == 0 {
            offset += PRIMARY_HEADER_LENGTH;
            break;
        }
        if offset + BLOCK_HEADER_LENGTH > payload.len() {
            return Err(Error::ErrRedundancyHeaderTruncated);
        }
        let ts_len = u32::from_be_bytes([
            0,
            payload[offset + 1],
            payload[offset + 2],
            payload[offset + 3],
        ]);
        headers.push((
            b0 & !FOLLOW_BIT,
            (ts_len >> 10) as u16,
            (ts_len & MAX_BLOCK_LENGTH as u32) as usize,
        ));
        offset += BLOCK_HEADER_LENGTH;
    }
    let primary_pt = payload[offset - 1] & !FOLLOW_BIT;

    let mut secondary = Vec::with_capacity(headers.len());
    for (payload_type, timestamp_offset, length) in headers {
        let remaining = payload.len() - offset;
        if length > remaining {
            return Err(Error::ErrRedundancyBlockTooLong(length, remaining));
        }
        secondary.push(RedundantBlock {
            payload_type,
            timestamp_offset,
            data: payload.slice(offset..offset + length),
        });
        offset += length;
    }

    let primary = RedundantBlock {
        payload_type: primary_pt,
        timestamp_offset: 0,
        data: payload.slice(offset..),
    };

    Ok((secondary, primary))
}

/// encode_redundant builds an RFC 2198 payload. Secondary blocks are written
/// oldest first, followed by the primary encoding.
pub fn encode_redundant(secondary: &[RedundantBlock], primary: &RedundantBlock) -> Result<Bytes> {
    let size = secondary
        .iter()
        .map(|b| BLOCK_HEADER_LENGTH + b.data.len())
        .sum::<usize>()
        + PRIMARY_HEADER_LENGTH
        + primary.data.len();
    let mut buf = BytesMut::with_capacity(size);

    for b in secondary {
        if b.timestamp_offset > MAX_TIMESTAMP_OFFSET {
            return Err(Error::ErrRedundancyTimestampOffset);
        }
        if b.data.len() > MAX_BLOCK_LENGTH {
            return Err(Error::ErrRedundancyBlockSize);
        }
        buf.put_u8(FOLLOW_BIT | (b.payload_type & !FOLLOW_BIT));
        let ts_len = ((b.timestamp_offset as u32) << 10) | b.data.len() as u32;
        buf.put_u8((ts_len >> 16) as u8);
        buf.put_u16(ts_len as u16);
    }
    buf.put_u8(primary.payload_type & !FOLLOW_BIT);

    for b in secondary {
        buf.extend_from_slice(&b.data);
    }
    buf.extend_from_slice(&primary.data);

    Ok(buf.freeze())
}
