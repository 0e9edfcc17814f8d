//! Wire primitives shared by the legacy ping and the query protocol.

use std::io::{self, ErrorKind, Read};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

/// Fixed-width integers as they appear on the wire.
pub trait WireInt: Sized + Copy {
    /// Encoded size in bytes.
    const WIDTH: usize;

    fn read_from<B: ByteOrder>(data: &mut impl Read) -> io::Result<Self>;

    /// Writes the value into the first `WIDTH` bytes of `out`.
    fn put<B: ByteOrder>(&self, out: &mut [u8]);
}

impl WireInt for u8 {
    const WIDTH: usize = 1;

    fn read_from<B: ByteOrder>(data: &mut impl Read) -> io::Result<Self> {
        data.read_u8()
    }

    fn put<B: ByteOrder>(&self, out: &mut [u8]) {
        out[0] = *self;
    }
}

impl WireInt for i8 {
    const WIDTH: usize = 1;

    fn read_from<B: ByteOrder>(data: &mut impl Read) -> io::Result<Self> {
        data.read_i8()
    }

    fn put<B: ByteOrder>(&self, out: &mut [u8]) {
        out[0] = *self as u8;
    }
}

macro_rules! wire_int {
    ($ty:ty, $width:expr, $read:ident, $write:ident) => {
        impl WireInt for $ty {
            const WIDTH: usize = $width;

            fn read_from<B: ByteOrder>(data: &mut impl Read) -> io::Result<Self> {
                data.$read::<B>()
            }

            fn put<B: ByteOrder>(&self, out: &mut [u8]) {
                B::$write(out, *self)
            }
        }
    };
}

wire_int!(u16, 2, read_u16, write_u16);
wire_int!(i16, 2, read_i16, write_i16);
wire_int!(u32, 4, read_u32, write_u32);
wire_int!(i32, 4, read_i32, write_i32);

/// Appends `value` to `buf` in byte order `B`.
pub fn pack<B: ByteOrder, T: WireInt>(buf: &mut Vec<u8>, value: T) {
    let start = buf.len();
    buf.resize(start + T::WIDTH, 0);
    value.put::<B>(&mut buf[start..]);
}

/// Reads a `T` from the front of `bytes`.
pub fn unpack<B: ByteOrder, T: WireInt>(mut bytes: &[u8]) -> io::Result<T> {
    T::read_from::<B>(&mut bytes)
}

/// Encodes `s` as a big-endian u16 count of UTF-16 code units followed by the
/// code units themselves, big-endian. Fails with `InvalidInput` when `s` has
/// more code units than the prefix can count.
pub fn encode_length_prefixed_wide_string(s: &str) -> io::Result<Vec<u8>> {
    let units = s.encode_utf16().collect::<Vec<_>>();
    let count = u16::try_from(units.len()).map_err(|_| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("string of {} code units does not fit a u16 prefix", units.len()),
        )
    })?;
    let mut out = Vec::with_capacity(2 + units.len() * 2);
    pack::<BigEndian, u16>(&mut out, count);
    for unit in units {
        pack::<BigEndian, u16>(&mut out, unit);
    }
    Ok(out)
}

/// Decodes UTF-16BE bytes. A dangling odd byte is ignored and NUL padding is
/// stripped so the result is safe to hand to ordinary string code.
pub fn decode_wide_string(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(BigEndian::read_u16)
        .collect::<Vec<_>>();

    String::from_utf16_lossy(&units)
        .chars()
        .filter(|c| *c != '\0')
        .collect()
}

/// Splits a UTF-16BE buffer on aligned `00 00` code units.
pub fn split_wide_nul(bytes: &[u8]) -> Vec<&[u8]> {
    let mut tokens = vec![];
    let mut start = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == 0 && bytes[i + 1] == 0 {
            tokens.push(&bytes[start..i]);
            start = i + 2;
        }
        i += 2;
    }
    tokens.push(&bytes[start..]);
    tokens
}

/// Reads one NUL-terminated string; invalid UTF-8 is replaced.
pub fn read_null_terminated_string(reader: &mut impl Read) -> io::Result<String> {
    let mut string = vec![];
    loop {
        match reader.read_u8()? {
            0x00 => break,
            byte => string.push(byte),
        }
    }
    Ok(String::from_utf8_lossy(&string).into_owned())
}

/// Reads exactly `count` NUL-terminated strings, in order. Fails with
/// `UnexpectedEof` if the stream runs dry first.
pub fn read_null_terminated_strings(reader: &mut impl Read, count: usize) -> io::Result<Vec<String>> {
    (0..count).map(|_| read_null_terminated_string(reader)).collect()
}

/// Separates the key/value section of a full stat from its player list.
pub const PLAYER_SECTION_SENTINEL: [u8; 12] = [
    0x00, 0x00, 0x01, b'p', b'l', b'a', b'y', b'e', b'r', b'_', 0x00, 0x00,
];

/// Upper bound on a framed full stat message.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Collects a full stat body byte by byte until the message is complete.
///
/// The body has no length field. The key/value section ends at
/// [`PLAYER_SECTION_SENTINEL`] and the player list ends with an empty name, so
/// the message is complete at the first doubled NUL that finishes after the
/// sentinel. Counting every doubled NUL instead would stop early whenever a
/// value is empty (`plugins` usually is).
#[derive(Debug, Default)]
pub struct ResponseFramer {
    buffer: Vec<u8>,
    sentinel_end: Option<usize>,
    complete: bool,
}

impl ResponseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte; returns true once the message is complete. Bytes pushed
    /// after completion are ignored.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.complete {
            return true;
        }
        self.buffer.push(byte);

        match self.sentinel_end {
            None => {
                if self.buffer.ends_with(&PLAYER_SECTION_SENTINEL) {
                    self.sentinel_end = Some(self.buffer.len());
                }
            }
            Some(end) => {
                if self.buffer.len() > end && self.buffer.ends_with(&[0x00, 0x00]) {
                    self.complete = true;
                }
            }
        }
        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Pulls bytes from `reader` until the message is complete.
    pub fn read_from(mut self, reader: &mut impl Read) -> io::Result<Self> {
        while !self.complete {
            if self.buffer.len() >= MAX_FRAME_LEN {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    "full stat exceeds maximum frame length",
                ));
            }
            let byte = reader.read_u8()?;
            self.push(byte);
        }
        Ok(self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Splits a framed body at the first [`PLAYER_SECTION_SENTINEL`] into the
/// key/value section and the player section. The sentinel itself belongs to
/// neither.
pub fn split_sections(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let at = raw
        .windows(PLAYER_SECTION_SENTINEL.len())
        .position(|w| w == PLAYER_SECTION_SENTINEL)?;
    Some((&raw[..at], &raw[at + PLAYER_SECTION_SENTINEL.len()..]))
}

#[cfg(test)]
mod tests {
    use byteorder::LittleEndian;

    use super::*;

    #[test]
    fn wide_string_has_char_count_prefix() {
        let encoded = encode_length_prefixed_wide_string("MC|PingHost").unwrap();
        assert_eq!(&encoded[..2], &[0x00, 0x0B]);
        assert_eq!(&encoded[2..6], &[0x00, b'M', 0x00, b'C']);
        assert_eq!(encoded.len(), 2 + 11 * 2);

        // length counts code units, not bytes
        let encoded = encode_length_prefixed_wide_string("§").unwrap();
        assert_eq!(encoded, vec![0x00, 0x01, 0x00, 0xA7]);
    }

    #[test]
    fn wide_string_longer_than_prefix_is_rejected() {
        let long = "a".repeat(u16::MAX as usize + 1);
        let err = encode_length_prefixed_wide_string(&long).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let longest = "a".repeat(u16::MAX as usize);
        let encoded = encode_length_prefixed_wide_string(&longest).unwrap();
        assert_eq!(&encoded[..2], &[0xFF, 0xFF]);
    }

    #[test]
    fn pack_appends_in_byte_order() {
        let mut buf = vec![0xAA];
        pack::<BigEndian, u32>(&mut buf, 0x0102_0304);
        pack::<LittleEndian, u16>(&mut buf, 25565);
        pack::<BigEndian, i8>(&mut buf, -1);
        pack::<LittleEndian, i32>(&mut buf, -2);
        assert_eq!(
            buf,
            vec![0xAA, 1, 2, 3, 4, 0xDD, 0x63, 0xFF, 0xFE, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn decode_strips_padding() {
        assert_eq!(decode_wide_string(&[0x00, b'h', 0x00, 0x00, 0x00, b'i']), "hi");
        assert_eq!(decode_wide_string(&[0x00, 0xA7, 0x00, b'1', 0x42]), "§1");
        assert_eq!(decode_wide_string(&[]), "");
    }

    #[test]
    fn split_on_aligned_wide_nul() {
        // U+0100 is 01 00, which must not be mistaken for half a separator
        let bytes = [0x01, 0x00, 0x00, b'a', 0x00, 0x00, 0x00, b'b'];
        let tokens = split_wide_nul(&bytes);
        assert_eq!(tokens, vec![&bytes[..4], &bytes[6..]]);

        assert_eq!(split_wide_nul(&[]), vec![b"" as &[u8]]);
    }

    #[test]
    fn reads_counted_strings() {
        let mut data: &[u8] = b"A Server\0SMP\0\0rest";
        let strings = read_null_terminated_strings(&mut data, 3).unwrap();
        assert_eq!(strings, vec!["A Server", "SMP", ""]);
        assert_eq!(data, b"rest");
    }

    #[test]
    fn counted_strings_fail_on_eof() {
        let mut data: &[u8] = b"one\0two";
        let err = read_null_terminated_strings(&mut data, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn integers_in_both_orders() {
        let mut buf = vec![];
        pack::<BigEndian, u16>(&mut buf, 25565);
        pack::<LittleEndian, u16>(&mut buf, 25565);
        pack::<BigEndian, i32>(&mut buf, -2);
        pack::<LittleEndian, u32>(&mut buf, 0x0102_0304);
        pack::<BigEndian, i8>(&mut buf, -1);
        assert_eq!(
            buf,
            vec![0x63, 0xDD, 0xDD, 0x63, 0xFF, 0xFF, 0xFF, 0xFE, 0x04, 0x03, 0x02, 0x01, 0xFF]
        );

        assert_eq!(unpack::<LittleEndian, u16>(&[0xDD, 0x63]).unwrap(), 25565);
        assert_eq!(unpack::<BigEndian, i16>(&[0xFF, 0xFE]).unwrap(), -2);
        assert_eq!(unpack::<BigEndian, u32>(&[0, 0, 0, 9]).unwrap(), 9);
        assert_eq!(unpack::<LittleEndian, u8>(&[7]).unwrap(), 7);
        assert!(unpack::<BigEndian, u32>(&[0, 0]).is_err());
    }

    fn frame(bytes: &[u8]) -> ResponseFramer {
        let mut reader = bytes;
        ResponseFramer::new().read_from(&mut reader).unwrap()
    }

    #[test]
    fn framer_stops_after_player_list() {
        let body = b"hostname\0A Server\0plugins\0\0map\0world\0\0\x01player_\0\0Alice\0Bob\0\0trailing";
        let framed = frame(body);
        assert!(framed.is_complete());
        assert!(framed.as_bytes().ends_with(b"Bob\0\0"));
    }

    #[test]
    fn framer_handles_empty_player_list() {
        let body = b"map\0world\0\0\x01player_\0\0\0junk";
        let framed = frame(body);
        assert!(framed.as_bytes().ends_with(b"player_\0\0\0"));
    }

    #[test]
    fn framer_needs_more_without_terminator() {
        let mut reader: &[u8] = b"map\0world\0\0\x01player_\0\0Alice\0";
        let err = ResponseFramer::new().read_from(&mut reader).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn sections_rejoin_to_original() {
        let body = b"hostname\0A Server\0version\01.8.9\0\0\x01player_\0\0Alice\0Bob\0\0".to_vec();
        let (kv, players) = split_sections(&body).unwrap();
        assert_eq!(kv, b"hostname\0A Server\0version\01.8.9");
        assert_eq!(players, b"Alice\0Bob\0\0");

        let mut rejoined = kv.to_vec();
        rejoined.extend_from_slice(&PLAYER_SECTION_SENTINEL);
        rejoined.extend_from_slice(players);
        assert_eq!(rejoined, body);

        assert!(split_sections(b"no players here").is_none());
    }
}
