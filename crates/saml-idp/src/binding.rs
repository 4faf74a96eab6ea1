use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use samael::metadata::{HTTP_POST_BINDING, HTTP_REDIRECT_BINDING};
use std::io::{Read, Write};

const MAX_ENCODED_REDIRECT: usize = 128 * 1024;
const MAX_ENCODED_POST: usize = 512 * 1024;
const MAX_INFLATED: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Redirect,
    Post,
}

impl Binding {
    pub fn uri(self) -> &'static str {
        match self {
            Binding::Redirect => HTTP_REDIRECT_BINDING,
            Binding::Post => HTTP_POST_BINDING,
        }
    }

    pub fn decode(self, encoded: &str) -> Result<String> {
        match self {
            Binding::Redirect => decode_redirect(encoded),
            Binding::Post => decode_post(encoded),
        }
    }

    pub fn encode(self, xml: &str) -> Result<String> {
        match self {
            Binding::Redirect => encode_redirect(xml),
            Binding::Post => Ok(encode_post(xml)),
        }
    }
}

/// Decodes HTTP-Redirect binding: base64 -> raw DEFLATE decompress -> XML string.
///
/// The payload is a zlib stream with its 2 byte header and 4 byte Adler-32
/// trailer removed, which is exactly what a raw inflater expects.
pub fn decode_redirect(encoded: &str) -> Result<String> {
    if encoded.len() > MAX_ENCODED_REDIRECT {
        return Err(Error::Decode(format!(
            "encoded request exceeds {MAX_ENCODED_REDIRECT} bytes"
        )));
    }
    let compressed = decode_base64(encoded)?;

    let mut decoder = DeflateDecoder::new(&compressed[..]).take(MAX_INFLATED + 1);
    let mut xml = String::new();
    decoder
        .read_to_string(&mut xml)
        .map_err(|e| Error::Decode(format!("deflate decompress failed: {e}")))?;

    if xml.len() as u64 > MAX_INFLATED {
        return Err(Error::Decode(format!(
            "inflated request exceeds {MAX_INFLATED} bytes"
        )));
    }

    Ok(xml)
}

/// Decodes HTTP-POST binding: base64 -> XML string (no compression).
pub fn decode_post(encoded: &str) -> Result<String> {
    if encoded.len() > MAX_ENCODED_POST {
        return Err(Error::Decode(format!(
            "encoded request exceeds {MAX_ENCODED_POST} bytes"
        )));
    }
    let bytes = decode_base64(encoded)?;

    String::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {e}")))
}

pub fn encode_redirect(xml: &str) -> Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(xml.as_bytes())
        .and_then(|_| encoder.finish())
        .map(|compressed| STANDARD.encode(compressed))
        .map_err(|e| Error::Decode(format!("deflate compress failed: {e}")))
}

pub fn encode_post(xml: &str) -> String {
    STANDARD.encode(xml.as_bytes())
}

/// Standard base64 that tolerates the line breaks MIME encoders insert.
pub(crate) fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|e| Error::Decode(format!("base64 decode failed: {e}")))
}
