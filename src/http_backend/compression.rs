//! Request body compression.

use std::{
    borrow::Cow,
    io::{self, Write},
};

use flate2::{Compression, write::GzEncoder};

use super::config::Encoding;

/// Bodies larger than this are gzipped when [`Encoding::Gzip`] is selected.
pub const GZIP_THRESHOLD: usize = 30 * 1024;

/// Encoded request body plus its `Content-Encoding`, if any.
pub struct Body<'a> {
    pub bytes: Cow<'a, [u8]>,
    pub content_encoding: Option<&'static str>,
}

/// Prepare `data` for the wire according to `encoding`.
pub fn encode_body(data: &[u8], encoding: Encoding) -> io::Result<Body<'_>> {
    if encoding == Encoding::Identity || data.len() <= GZIP_THRESHOLD {
        return Ok(Body {
            bytes: Cow::Borrowed(data),
            content_encoding: None,
        });
    }
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    Ok(Body {
        bytes: Cow::Owned(encoder.finish()?),
        content_encoding: Some("gzip"),
    })
}
