//! Incremental decoding of a single gzip member.
//!
//! Record files are concatenations of gzip members, one record each. The
//! decoder takes bytes as they arrive, stops at the end of the first member,
//! and verifies the trailer so a short read is never mistaken for a record.

use flate2::{Crc, Decompress, FlushDecompress, Status};

const MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const FIXED_HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = 8;
const OUTPUT_CHUNK: usize = 32 * 1024;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemberError {
    #[error("not a gzip member")]
    BadMagic,

    #[error("unsupported compression method {0}")]
    UnsupportedMethod(u8),

    #[error("corrupt deflate stream: {0}")]
    Corrupt(String),

    #[error("CRC mismatch: trailer {expected:08x}, data {actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("size mismatch: trailer {expected}, data {actual}")]
    SizeMismatch { expected: u32, actual: u32 },

    #[error("stream ended inside the gzip {0}")]
    Truncated(&'static str),

    #[error("decompressed record exceeds {0} bytes")]
    TooLarge(usize),
}

/// Whether `prefix` starts like a gzip member.
pub fn is_gzip(prefix: &[u8]) -> bool {
    prefix.starts_with(&MAGIC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Body,
    Trailer,
    Done,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Header => "header",
            Stage::Body => "body",
            Stage::Trailer => "trailer",
            Stage::Done => "end",
        }
    }
}

/// Push decoder for one gzip member.
pub struct MemberDecoder {
    stage: Stage,
    pending: Vec<u8>,
    inflater: Decompress,
    crc: Crc,
    output: Vec<u8>,
    limit: usize,
    consumed: usize,
}

impl MemberDecoder {
    /// `limit` caps the decompressed size.
    pub fn new(limit: usize) -> Self {
        Self {
            stage: Stage::Header,
            pending: Vec::new(),
            inflater: Decompress::new(false),
            crc: Crc::new(),
            output: Vec::new(),
            limit,
            consumed: 0,
        }
    }

    /// Feed the next bytes. Bytes past the end of the member are ignored.
    pub fn feed(&mut self, input: &[u8]) -> Result<(), MemberError> {
        if self.stage == Stage::Done {
            return Ok(());
        }
        self.pending.extend_from_slice(input);

        loop {
            let progressed = match self.stage {
                Stage::Header => self.read_header()?,
                Stage::Body => self.inflate()?,
                Stage::Trailer => self.read_trailer()?,
                Stage::Done => return Ok(()),
            };
            if !progressed {
                return Ok(());
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Compressed bytes that belong to the member so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// The decompressed member, provided its trailer was seen and verified.
    pub fn finish(self) -> Result<Vec<u8>, MemberError> {
        match self.stage {
            Stage::Done => Ok(self.output),
            stage => Err(MemberError::Truncated(stage.name())),
        }
    }

    fn advance(&mut self, n: usize) {
        self.pending.drain(..n);
        self.consumed += n;
    }

    fn read_header(&mut self) -> Result<bool, MemberError> {
        let Some(len) = header_len(&self.pending)? else {
            return Ok(false);
        };
        self.advance(len);
        self.stage = Stage::Body;
        Ok(true)
    }

    fn inflate(&mut self) -> Result<bool, MemberError> {
        let mut buf = vec![0u8; OUTPUT_CHUNK];
        let mut progressed = false;

        loop {
            let (in_before, out_before) = (self.inflater.total_in(), self.inflater.total_out());
            let status = self
                .inflater
                .decompress(&self.pending, &mut buf, FlushDecompress::None)
                .map_err(|e| MemberError::Corrupt(e.to_string()))?;
            let used = (self.inflater.total_in() - in_before) as usize;
            let produced = (self.inflater.total_out() - out_before) as usize;

            if self.output.len() + produced > self.limit {
                return Err(MemberError::TooLarge(self.limit));
            }
            self.crc.update(&buf[..produced]);
            self.output.extend_from_slice(&buf[..produced]);
            self.advance(used);

            if status == Status::StreamEnd {
                self.stage = Stage::Trailer;
                return Ok(true);
            }
            if used == 0 && produced == 0 {
                return Ok(progressed);
            }
            progressed = true;
        }
    }

    fn read_trailer(&mut self) -> Result<bool, MemberError> {
        if self.pending.len() < TRAILER_LEN {
            return Ok(false);
        }

        let expected_crc = u32::from_le_bytes([self.pending[0], self.pending[1], self.pending[2], self.pending[3]]);
        let expected_size = u32::from_le_bytes([self.pending[4], self.pending[5], self.pending[6], self.pending[7]]);

        if expected_crc != self.crc.sum() {
            return Err(MemberError::CrcMismatch { expected: expected_crc, actual: self.crc.sum() });
        }
        if expected_size != self.crc.amount() {
            return Err(MemberError::SizeMismatch { expected: expected_size, actual: self.crc.amount() });
        }

        self.advance(TRAILER_LEN);
        self.stage = Stage::Done;
        Ok(false)
    }
}

/// Length of the member header at the start of `buf`, or None if incomplete.
fn header_len(buf: &[u8]) -> Result<Option<usize>, MemberError> {
    if buf.len() < FIXED_HEADER_LEN {
        if !MAGIC.starts_with(&buf[..buf.len().min(2)]) {
            return Err(MemberError::BadMagic);
        }
        return Ok(None);
    }
    if !is_gzip(buf) {
        return Err(MemberError::BadMagic);
    }
    if buf[2] != METHOD_DEFLATE {
        return Err(MemberError::UnsupportedMethod(buf[2]));
    }

    let flags = buf[3];
    let mut pos = FIXED_HEADER_LEN;

    if flags & FEXTRA != 0 {
        let Some(len_bytes) = buf.get(pos..pos + 2) else {
            return Ok(None);
        };
        pos += 2 + usize::from(u16::from_le_bytes([len_bytes[0], len_bytes[1]]));
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            let Some(nul) = buf.get(pos..).and_then(|rest| rest.iter().position(|b| *b == 0)) else {
                return Ok(None);
            };
            pos += nul + 1;
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }

    Ok((buf.len() >= pos).then_some(pos))
}
