//! Header encoding capability
//!
//! The core does not implement HPACK itself; it owns only the table-size
//! negotiation contract and hands raw header blocks to a [`HeaderCodec`].
//! [`HpackCodec`] backs the trait with the `hpack` crate.

use crate::error::{Error, ErrorCode, Result};

/// A single header field as a name/value byte pair
pub type Header = (Vec<u8>, Vec<u8>);

/// External header encoding/decoding capability
///
/// Implementations are stateful: HPACK dynamic tables persist across calls,
/// so one codec instance must serve exactly one connection, encode for one
/// direction and decode for the other.
pub trait HeaderCodec {
    /// Encode a header set into a contiguous block
    ///
    /// `max_table_size` is the peer-advertised HEADER_TABLE_SIZE the encoder
    /// must stay within.
    fn encode(&mut self, headers: &[Header], max_table_size: u32) -> Result<Vec<u8>>;

    /// Decode a complete header block
    ///
    /// `max_header_list_size` bounds the decoded set (sum of name, value and
    /// 32 bytes of overhead per field, RFC 7540 Section 10.5.1);
    /// `max_table_size` is our advertised HEADER_TABLE_SIZE.
    fn decode(
        &mut self,
        block: &[u8],
        max_header_list_size: u32,
        max_table_size: u32,
    ) -> Result<Vec<Header>>;
}

/// Default [`HeaderCodec`] backed by the `hpack` crate
pub struct HpackCodec {
    encoder: hpack::Encoder<'static>,
    decoder: hpack::Decoder<'static>,
    decoder_table_size: u32,
}

impl HpackCodec {
    /// Create a codec with default table sizes
    pub fn new() -> Self {
        HpackCodec {
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(),
            decoder_table_size: crate::DEFAULT_HEADER_TABLE_SIZE,
        }
    }
}

impl Default for HpackCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCodec for HpackCodec {
    fn encode(&mut self, headers: &[Header], _max_table_size: u32) -> Result<Vec<u8>> {
        // The bundled encoder keeps its dynamic table within the protocol
        // default, which every peer must accept before SETTINGS exchange.
        let tuples: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|(name, value)| (name.as_slice(), value.as_slice()))
            .collect();
        let mut block = Vec::new();
        self.encoder
            .encode_into(tuples, &mut block)
            .map_err(|e| Error::HeaderCodec {
                code: ErrorCode::CompressionError,
                message: format!("HPACK encode error: {:?}", e),
            })?;
        Ok(block)
    }

    fn decode(
        &mut self,
        block: &[u8],
        max_header_list_size: u32,
        max_table_size: u32,
    ) -> Result<Vec<Header>> {
        if max_table_size != self.decoder_table_size {
            self.decoder.set_max_table_size(max_table_size as usize);
            self.decoder_table_size = max_table_size;
        }

        let headers = self.decoder.decode(block).map_err(|e| Error::HeaderCodec {
            code: ErrorCode::CompressionError,
            message: format!("HPACK decode error: {:?}", e),
        })?;

        // 32 bytes of per-field overhead per RFC 7540 Section 6.5.2
        let list_size: u64 = headers
            .iter()
            .map(|(name, value)| name.len() as u64 + value.len() as u64 + 32)
            .sum();
        if list_size > max_header_list_size as u64 {
            return Err(Error::HeaderCodec {
                code: ErrorCode::EnhanceYourCalm,
                message: format!(
                    "header list size {} exceeds limit {}",
                    list_size, max_header_list_size
                ),
            });
        }

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_headers() -> Vec<Header> {
        vec![
            (b":method".to_vec(), b"GET".to_vec()),
            (b":path".to_vec(), b"/index.html".to_vec()),
            (b":scheme".to_vec(), b"https".to_vec()),
            (b"accept".to_vec(), b"*/*".to_vec()),
        ]
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut codec = HpackCodec::new();
        let headers = sample_headers();

        let block = codec
            .encode(&headers, crate::DEFAULT_HEADER_TABLE_SIZE)
            .unwrap();
        assert!(!block.is_empty());

        let decoded = codec
            .decode(&block, u32::MAX, crate::DEFAULT_HEADER_TABLE_SIZE)
            .unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn test_header_list_size_limit() {
        let mut codec = HpackCodec::new();
        let headers = sample_headers();
        let block = codec
            .encode(&headers, crate::DEFAULT_HEADER_TABLE_SIZE)
            .unwrap();

        let err = codec
            .decode(&block, 16, crate::DEFAULT_HEADER_TABLE_SIZE)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::EnhanceYourCalm);
    }
}
