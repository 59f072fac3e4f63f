//! Raw signal codec
//!
//! The pipeline treats compression as opaque: [`SignalCodec::compress`]
//! splits a sample sequence into chunks of at most `chunk_size` samples and
//! returns one compressed blob per chunk plus the sample count of each.
//!
//! [`DeflateCodec`] is the codec shipped with the crate. Each chunk is delta
//! encoded, zig-zag mapped, written as LEB128 varints, then zlib compressed.
//! Nanopore signal moves slowly between samples so the deltas are small and
//! most samples fit in a single varint byte before compression.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// Default number of samples per signal chunk
pub const DEFAULT_SIGNAL_CHUNK_SIZE: usize = 102_400;

/// Compressed signal chunks and the sample count of each
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedSignal {
    pub chunks: Vec<Vec<u8>>,
    pub chunk_lengths: Vec<u32>,
}

impl CompressedSignal {
    /// Total raw samples across all chunks
    pub fn sample_count(&self) -> u64 {
        self.chunk_lengths.iter().map(|&n| n as u64).sum()
    }

    /// Total compressed bytes across all chunks
    pub fn byte_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

/// Chunked signal compression
pub trait SignalCodec: Send + Sync {
    /// Compress `samples` into chunks of at most `chunk_size` samples
    fn compress(&self, samples: &[i16], chunk_size: usize) -> io::Result<CompressedSignal>;

    /// Decompress one chunk holding `sample_count` samples
    fn decompress_chunk(&self, chunk: &[u8], sample_count: usize) -> io::Result<Vec<i16>>;
}

/// Delta / zig-zag / varint / zlib codec
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    level: Compression,
}

impl DeflateCodec {
    /// Create a codec with the given zlib level (0-9)
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl SignalCodec for DeflateCodec {
    fn compress(&self, samples: &[i16], chunk_size: usize) -> io::Result<CompressedSignal> {
        let chunk_size = chunk_size.max(1);
        let mut signal = CompressedSignal::default();

        for chunk in samples.chunks(chunk_size) {
            let mut encoded = Vec::with_capacity(chunk.len() + chunk.len() / 4);
            let mut previous = 0i32;
            for &sample in chunk {
                let delta = sample as i32 - previous;
                previous = sample as i32;
                write_varint(&mut encoded, zigzag(delta));
            }

            let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
            encoder.write_all(&encoded)?;
            signal.chunks.push(encoder.finish()?);
            signal.chunk_lengths.push(chunk.len() as u32);
        }

        Ok(signal)
    }

    fn decompress_chunk(&self, chunk: &[u8], sample_count: usize) -> io::Result<Vec<i16>> {
        let mut encoded = Vec::new();
        ZlibDecoder::new(chunk).read_to_end(&mut encoded)?;

        let mut samples = Vec::with_capacity(sample_count);
        let mut previous = 0i32;
        let mut pos = 0;
        while samples.len() < sample_count {
            let (value, used) = read_varint(&encoded[pos..]).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "truncated signal chunk")
            })?;
            pos += used;
            previous += unzigzag(value);
            samples.push(previous as i16);
        }

        Ok(samples)
    }
}

fn zigzag(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn unzigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn write_varint(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for (i, &byte) in bytes.iter().enumerate().take(5) {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}
