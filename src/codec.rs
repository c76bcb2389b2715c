use crate::error::{ConvertError, DecodeError};
use crate::track::{Part, TrackData, is_checkpoint_ordered, is_start_ordered};
use flate2::Compression;
use flate2::write::{DeflateDecoder, DeflateEncoder};
use std::io::Write;

/// Literal prefix of every share code.
pub const SHARE_CODE_PREFIX: &str = "PolyTrack1";

/// The restricted share-code alphabet. Symbol values are indices into this
/// table; indices 32 and 33 can never be emitted (see `encode_alphabet`) and
/// are rejected on decode.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

// Compressor dependency
// -----------------------------------------------------------------------------

/// DEFLATE collaborator, injected so the codec carries no ambient global
/// state. In-memory deflate cannot fail; inflate fails on corrupt input.
pub trait Compressor {
    fn deflate(&self, bytes: &[u8]) -> Vec<u8>;
    fn inflate(&self, bytes: &[u8]) -> Result<Vec<u8>, String>;
}

/// Default binding: raw DEFLATE at level 9.
pub struct Flate2Compressor;

impl Compressor for Flate2Compressor {
    fn deflate(&self, bytes: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::new(9));
        enc.write_all(bytes)
            .and_then(|_| enc.finish())
            .expect("deflate into memory")
    }

    fn inflate(&self, bytes: &[u8]) -> Result<Vec<u8>, String> {
        let mut dec = DeflateDecoder::new(Vec::new());
        dec.write_all(bytes)
            .and_then(|_| dec.finish())
            .map_err(|e| e.to_string())
    }
}

// Variable-width bit packing
// -----------------------------------------------------------------------------
// Bits are addressed LSB-first within each byte: bit i of the stream is
// `byte[i / 8] >> (i % 8) & 1`. Reads past the end are zero.

fn read_bits(data: &[u8], pos: usize, n: usize) -> u8 {
    let mut v = 0u8;
    for i in 0..n {
        let bit_pos = pos + i;
        let byte = bit_pos / 8;
        if byte < data.len() {
            v |= ((data[byte] >> (bit_pos % 8)) & 1) << i;
        }
    }
    v
}

struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bit_len: 0,
        }
    }

    fn write(&mut self, v: u8, n: usize) {
        for i in 0..n {
            let byte = self.bit_len / 8;
            if byte == self.bytes.len() {
                self.bytes.push(0);
            }
            if (v >> i) & 1 != 0 {
                self.bytes[byte] |= 1 << (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    /// Whole bytes only; trailing sub-byte padding bits are dropped, which
    /// undoes the encoder's zero padding exactly.
    fn into_bytes(mut self) -> Vec<u8> {
        self.bytes.truncate(self.bit_len / 8);
        self.bytes
    }
}

/// Encode bytes into the restricted alphabet with the asymmetric 5/6-bit
/// scheme: read 6 bits; if any of bits 1-4 (mask 0x1E) is set, the symbol
/// keeps all 6 and the cursor advances 6, otherwise only the low 5 bits are
/// kept and the cursor advances 5.
fn encode_alphabet(data: &[u8]) -> String {
    let total_bits = data.len() * 8;
    let mut out = String::with_capacity(total_bits / 5 + 1);
    let mut pos = 0usize;
    while pos < total_bits {
        let v = read_bits(data, pos, 6);
        if v & 0x1E != 0 {
            out.push(ALPHABET[v as usize] as char);
            pos += 6;
        } else {
            out.push(ALPHABET[(v & 0x1F) as usize] as char);
            pos += 5;
        }
    }
    out
}

/// Invert `encode_alphabet`. A symbol with any of bits 1-4 set contributes 6
/// bits; symbols 0 and 1 contribute 5; anything else (including alphabet
/// indices 32/33) cannot have been emitted and is malformed.
fn decode_alphabet(data: &[u8], pos_offset: usize) -> Result<Vec<u8>, DecodeError> {
    let mut bits = BitWriter::new();
    for (i, &b) in data.iter().enumerate() {
        let v = ALPHABET.iter().position(|&a| a == b).ok_or(DecodeError::BadSymbol {
            ch: b as char,
            pos: pos_offset + i,
        })? as u8;

        if v & 0x1E != 0 {
            bits.write(v, 6);
        } else if v <= 1 {
            bits.write(v, 5);
        } else {
            return Err(DecodeError::BadSymbol {
                ch: b as char,
                pos: pos_offset + i,
            });
        }
    }
    Ok(bits.into_bytes())
}

// Wire payload
// -----------------------------------------------------------------------------

fn byte_width(max_delta: u32) -> u8 {
    match max_delta {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

fn push_len_prefixed(out: &mut Vec<u8>, text: &str) {
    // Cap at 255 bytes without splitting a UTF-8 character.
    let mut end = text.len().min(255);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let bytes = &text.as_bytes()[..end];
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

fn push_unsigned(out: &mut Vec<u8>, v: u32, width: u8) {
    for i in 0..width {
        out.push((v >> (8 * i)) as u8);
    }
}

fn serialize_track(track: &TrackData) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();

    push_len_prefixed(&mut out, &track.name);
    push_len_prefixed(&mut out, &track.author);

    let parts: Vec<&Part> = track.parts_by_block.values().flatten().collect();
    let min_of = |f: fn(&Part) -> i32| parts.iter().map(|&p| f(p)).min().unwrap_or(0);
    let (min_x, min_y, min_z) = (min_of(|p| p.x), min_of(|p| p.y), min_of(|p| p.z));

    let max_delta = |f: fn(&Part) -> i32, min: i32| {
        parts
            .iter()
            .map(|&p| (f(p) as i64 - min as i64) as u32)
            .max()
            .unwrap_or(0)
    };
    let wx = byte_width(max_delta(|p| p.x, min_x));
    let wy = byte_width(max_delta(|p| p.y, min_y));
    let wz = byte_width(max_delta(|p| p.z, min_z));

    out.push(track.environment_id);
    out.push(track.color_rep);
    out.extend_from_slice(&min_x.to_le_bytes());
    out.extend_from_slice(&min_y.to_le_bytes());
    out.extend_from_slice(&min_z.to_le_bytes());
    out.push((wx - 1) | ((wy - 1) << 2) | ((wz - 1) << 4));

    // BTreeMap iteration is ascending block type, which is the wire order.
    for (&block, block_parts) in &track.parts_by_block {
        out.push(block);
        out.extend_from_slice(&(block_parts.len() as u32).to_le_bytes());
        for p in block_parts {
            push_unsigned(&mut out, (p.x as i64 - min_x as i64) as u32, wx);
            push_unsigned(&mut out, (p.y as i64 - min_y as i64) as u32, wy);
            push_unsigned(&mut out, (p.z as i64 - min_z as i64) as u32, wz);
            out.push(p.rotation);
            out.push(p.rotation_axis);
            out.push(p.color);
            if is_checkpoint_ordered(block) {
                out.extend_from_slice(&p.checkpoint_order.unwrap_or(0).to_le_bytes());
            }
            if is_start_ordered(block) {
                out.extend_from_slice(&p.start_order.unwrap_or(0).to_le_bytes());
            }
        }
    }

    out
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated { what });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    fn read_u16_le(&mut self, what: &'static str) -> Result<u16, DecodeError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32_le(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32_le(&mut self, what: &'static str) -> Result<i32, DecodeError> {
        Ok(self.read_u32_le(what)? as i32)
    }

    fn read_unsigned(&mut self, width: u8, what: &'static str) -> Result<u32, DecodeError> {
        let b = self.take(width as usize, what)?;
        let mut v = 0u32;
        for (i, &byte) in b.iter().enumerate() {
            v |= (byte as u32) << (8 * i);
        }
        Ok(v)
    }

    fn read_str(&mut self, what: &'static str) -> Result<String, DecodeError> {
        let len = self.read_u8(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::Malformed {
            what,
            reason: "not valid UTF-8".to_string(),
        })
    }
}

fn deserialize_track(bytes: &[u8]) -> Result<TrackData, DecodeError> {
    let mut r = ByteReader::new(bytes);

    let name = r.read_str("track name")?;
    let author = r.read_str("author name")?;

    let environment_id = r.read_u8("header")?;
    if environment_id > 3 {
        return Err(DecodeError::Malformed {
            what: "header",
            reason: format!("environment id {environment_id} out of range"),
        });
    }
    let color_rep = r.read_u8("header")?;
    let min_x = r.read_i32_le("header")?;
    let min_y = r.read_i32_le("header")?;
    let min_z = r.read_i32_le("header")?;

    let widths = r.read_u8("header")?;
    if widths & 0xC0 != 0 {
        return Err(DecodeError::Malformed {
            what: "header",
            reason: "unused axis-width bits set".to_string(),
        });
    }
    let wx = (widths & 0x03) + 1;
    let wy = ((widths >> 2) & 0x03) + 1;
    let wz = ((widths >> 4) & 0x03) + 1;

    let mut track = TrackData {
        name,
        author,
        environment_id,
        color_rep,
        ..TrackData::default()
    };

    let mut last_block: Option<u8> = None;
    while r.remaining() > 0 {
        let block = r.read_u8("body")?;
        if let Some(last) = last_block {
            if block <= last {
                return Err(DecodeError::Malformed {
                    what: "body",
                    reason: format!("block type {block} after {last}; types must ascend"),
                });
            }
        }
        last_block = Some(block);

        let count = r.read_u32_le("body")? as usize;
        let part_size = (wx + wy + wz) as usize
            + 3
            + if is_checkpoint_ordered(block) { 2 } else { 0 }
            + if is_start_ordered(block) { 4 } else { 0 };
        if count.saturating_mul(part_size) > r.remaining() {
            return Err(DecodeError::Malformed {
                what: "body",
                reason: format!("part count {count} exceeds remaining payload"),
            });
        }

        for _ in 0..count {
            let dx = r.read_unsigned(wx, "part")?;
            let dy = r.read_unsigned(wy, "part")?;
            let dz = r.read_unsigned(wz, "part")?;
            let rotation = r.read_u8("part")?;
            let rotation_axis = r.read_u8("part")?;
            let color = r.read_u8("part")?;
            let checkpoint_order = if is_checkpoint_ordered(block) {
                Some(r.read_u16_le("part")?)
            } else {
                None
            };
            let start_order = if is_start_ordered(block) {
                Some(r.read_u32_le("part")?)
            } else {
                None
            };

            track.push_part(
                block,
                Part {
                    x: (min_x as i64 + dx as i64) as i32,
                    y: (min_y as i64 + dy as i64) as i32,
                    z: (min_z as i64 + dz as i64) as i32,
                    rotation,
                    rotation_axis,
                    color,
                    checkpoint_order,
                    start_order,
                },
            );
        }
    }

    Ok(track)
}

// Share codec
// -----------------------------------------------------------------------------

/// Encoder/decoder for the "PolyTrack1" share-code wire format.
pub struct ShareCodec {
    compressor: Box<dyn Compressor>,
}

impl ShareCodec {
    pub fn new(compressor: Box<dyn Compressor>) -> Self {
        Self { compressor }
    }

    /// The default flate2 binding.
    pub fn with_flate2() -> Self {
        Self::new(Box::new(Flate2Compressor))
    }

    /// Serialize, double-compress, and double-encode the track.
    ///
    /// Identical `TrackData` always yields an identical string: the payload
    /// layout, deflate level, and alphabet scheme have no nondeterminism.
    pub fn encode(&self, track: &TrackData) -> String {
        let payload = serialize_track(track);
        let pass1 = encode_alphabet(&self.compressor.deflate(&payload));
        let pass2 = encode_alphabet(&self.compressor.deflate(pass1.as_bytes()));
        format!("{SHARE_CODE_PREFIX}{pass2}")
    }

    /// Invert `encode` exactly. Never panics on malformed input: every
    /// failure path reports a structured [`DecodeError`].
    pub fn decode(&self, code: &str) -> Result<TrackData, DecodeError> {
        let body = code
            .strip_prefix(SHARE_CODE_PREFIX)
            .ok_or(DecodeError::BadPrefix)?;

        let outer = decode_alphabet(body.as_bytes(), SHARE_CODE_PREFIX.len())?;
        let pass1 = self
            .compressor
            .inflate(&outer)
            .map_err(DecodeError::Inflate)?;

        let inner = decode_alphabet(&pass1, 0)?;
        let payload = self
            .compressor
            .inflate(&inner)
            .map_err(DecodeError::Inflate)?;

        deserialize_track(&payload)
    }

    /// Defensive validation for untrusted share codes: decode fully and
    /// report only the part count.
    pub fn validate(&self, code: &str) -> Result<usize, DecodeError> {
        Ok(self.decode(code)?.part_count())
    }

    /// Strict pre-emit check: refuse to encode parts outside the reference
    /// palette.
    pub fn encode_strict(&self, track: &TrackData) -> Result<String, ConvertError> {
        if let Some(block) = track.off_palette_block() {
            return Err(ConvertError::InvariantViolation {
                what: format!("block type {block} outside the reference palette"),
            });
        }
        Ok(self.encode(track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{BLOCK_FINISH_MARKER, BLOCK_ROAD, BLOCK_START, BLOCK_TURN_LEFT};

    fn codec() -> ShareCodec {
        ShareCodec::with_flate2()
    }

    fn part(x: i32, y: i32, z: i32, rotation: u8) -> Part {
        Part {
            x,
            y,
            z,
            rotation,
            rotation_axis: 0,
            color: 0,
            checkpoint_order: None,
            start_order: None,
        }
    }

    // Alphabet layer
    // -------------------------------------------------------------------------

    #[test]
    fn alphabet_round_trips_byte_vectors() {
        let vectors: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![1],
            vec![0xFF],
            vec![0x00, 0x00, 0x00],
            vec![0xAA, 0x55, 0xAA, 0x55],
            (0..=255).collect(),
            vec![0xFF; 7],
        ];

        for v in vectors {
            let encoded = encode_alphabet(&v);
            let decoded = decode_alphabet(encoded.as_bytes(), 0).unwrap();
            assert_eq!(decoded, v, "round trip failed for {v:?}");
        }
    }

    #[test]
    fn alphabet_emits_only_alphabet_characters() {
        let encoded = encode_alphabet(&(0..=255).collect::<Vec<u8>>());
        for ch in encoded.bytes() {
            assert!(ALPHABET.contains(&ch), "unexpected char {}", ch as char);
        }
    }

    #[test]
    fn unreachable_symbols_are_rejected() {
        // Indices 32 ('g') and 33 ('h') have zero middle bits but value > 1:
        // the encoder can never produce them.
        assert!(matches!(
            decode_alphabet(b"g", 0),
            Err(DecodeError::BadSymbol { ch: 'g', pos: 0 })
        ));
        assert!(matches!(
            decode_alphabet(b"h", 0),
            Err(DecodeError::BadSymbol { ch: 'h', pos: 0 })
        ));
        assert!(matches!(
            decode_alphabet(b"A!", 3),
            Err(DecodeError::BadSymbol { ch: '!', pos: 4 })
        ));
    }

    // Full codec
    // -------------------------------------------------------------------------

    #[test]
    fn single_start_part_round_trips_exactly() {
        let mut track = TrackData::default();
        track.push_part(
            BLOCK_START,
            Part {
                start_order: Some(0),
                ..part(0, 0, 0, 0)
            },
        );

        let code = codec().encode(&track);
        assert!(code.starts_with(SHARE_CODE_PREFIX));

        let decoded = codec().decode(&code).unwrap();
        assert_eq!(decoded.part_count(), 1);
        let p = &decoded.parts_by_block[&BLOCK_START][0];
        assert_eq!((p.x, p.y, p.z), (0, 0, 0));
        assert_eq!(p.rotation, 0);
        assert_eq!(p.start_order, Some(0));
        assert_eq!(p.checkpoint_order, None);
    }

    #[test]
    fn mixed_track_round_trips_every_field() {
        let mut track = TrackData {
            name: "loop of the year".to_string(),
            author: "img2track".to_string(),
            environment_id: 2,
            color_rep: 7,
            ..TrackData::default()
        };
        // Negative coordinates and a spread wide enough to force a 2-byte
        // x axis and keep 1-byte y.
        track.push_part(BLOCK_ROAD, part(-120, 0, 44, 1));
        track.push_part(BLOCK_ROAD, part(400, 4, -8, 3));
        track.push_part(BLOCK_TURN_LEFT, part(0, 0, 0, 2));
        track.push_part(
            BLOCK_START,
            Part {
                start_order: Some(0),
                ..part(-4, 0, -4, 1)
            },
        );
        track.push_part(
            BLOCK_FINISH_MARKER,
            Part {
                checkpoint_order: Some(3),
                color: 5,
                ..part(96, 0, 12, 0)
            },
        );

        let decoded = codec().decode(&codec().encode(&track)).unwrap();
        assert_eq!(decoded, track);
    }

    #[test]
    fn encoding_is_byte_stable() {
        let mut track = TrackData::default();
        for i in 0..40 {
            track.push_part(BLOCK_ROAD, part(i * 4, 0, (i % 5) * 4, (i % 4) as u8));
        }
        assert_eq!(codec().encode(&track), codec().encode(&track));
    }

    #[test]
    fn wide_coordinates_use_wider_axes() {
        let mut track = TrackData::default();
        track.push_part(BLOCK_ROAD, part(0, 0, 0, 0));
        track.push_part(BLOCK_ROAD, part(100_000, 70_000_000, 2, 0));

        let decoded = codec().decode(&codec().encode(&track)).unwrap();
        assert_eq!(decoded.parts_by_block[&BLOCK_ROAD][1].x, 100_000);
        assert_eq!(decoded.parts_by_block[&BLOCK_ROAD][1].y, 70_000_000);
    }

    #[test]
    fn name_and_author_are_capped_at_255_bytes() {
        let track = TrackData {
            name: "x".repeat(300),
            author: "y".repeat(256),
            ..TrackData::default()
        };
        let decoded = codec().decode(&codec().encode(&track)).unwrap();
        assert_eq!(decoded.name.len(), 255);
        assert_eq!(decoded.author.len(), 255);
    }

    #[test]
    fn strict_encode_rejects_off_palette_blocks() {
        let mut track = TrackData::default();
        track.push_part(42, part(0, 0, 0, 0));
        assert!(matches!(
            codec().encode_strict(&track),
            Err(ConvertError::InvariantViolation { .. })
        ));
    }

    // Hostile input: decode must return errors, never panic.
    // -------------------------------------------------------------------------

    #[test]
    fn missing_prefix_is_rejected() {
        assert_eq!(codec().decode("NotATrack"), Err(DecodeError::BadPrefix));
        assert_eq!(codec().decode(""), Err(DecodeError::BadPrefix));
    }

    #[test]
    fn bad_characters_are_rejected_with_position() {
        let err = codec().decode("PolyTrack1AB C").unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadSymbol {
                ch: ' ',
                pos: 12
            }
        );
    }

    #[test]
    fn truncated_codes_error_out() {
        let mut track = TrackData::default();
        for i in 0..20 {
            track.push_part(BLOCK_ROAD, part(i, 0, i * 2, 0));
        }
        let code = codec().encode(&track);

        for cut in [SHARE_CODE_PREFIX.len() + 1, code.len() / 2, code.len() - 3] {
            let result = codec().decode(&code[..cut]);
            assert!(result.is_err(), "truncation at {cut} should fail");
        }
    }

    #[test]
    fn garbage_alphabet_strings_fail_structurally() {
        for garbage in ["PolyTrack1AAAA", "PolyTrack1zzzzzzzz", "PolyTrack1B"] {
            match codec().decode(garbage) {
                Err(_) => {}
                Ok(track) => {
                    // A tiny accidental success must still be a valid track.
                    assert_eq!(track.part_count(), 0);
                }
            }
        }
    }

    #[test]
    fn empty_track_round_trips() {
        let track = TrackData::default();
        let decoded = codec().decode(&codec().encode(&track)).unwrap();
        assert_eq!(decoded, track);
    }
}
