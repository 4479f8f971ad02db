//! Archives laid out the way other producers write them, built byte by byte.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

use zipstream::{CompressionMethod, ZipError, ZipReader};

const DEFLATED: u16 = 8;
const STORED: u16 = 0;

#[derive(Clone, Copy, PartialEq)]
enum Descriptor {
    None,
    Signed,
    Unsigned,
}

struct RawEntry<'a> {
    name: &'a [u8],
    method: u16,
    data: &'a [u8],
    extra: &'a [u8],
    descriptor: Descriptor,
}

impl<'a> RawEntry<'a> {
    fn new(name: &'a str, method: u16, data: &'a [u8]) -> Self {
        Self {
            name: name.as_bytes(),
            method,
            data,
            extra: &[],
            descriptor: Descriptor::None,
        }
    }

    fn deferred(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = descriptor;
        self
    }
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Local headers, data and descriptors, then a central directory and end record.
fn archive(entries: &[RawEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let offset = out.len() as u32;
        let payload = if entry.method == DEFLATED {
            deflate(entry.data)
        } else {
            entry.data.to_vec()
        };
        let crc = crc32fast::hash(entry.data);
        let deferred = entry.descriptor != Descriptor::None;
        let flags: u16 = if deferred { 0x0008 } else { 0 };
        let (h_crc, h_csize, h_size) = if deferred {
            (0, 0, 0)
        } else {
            (crc, payload.len() as u32, entry.data.len() as u32)
        };

        out.write_u32::<LittleEndian>(0x0403_4b50).unwrap();
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(flags).unwrap();
        out.write_u16::<LittleEndian>(entry.method).unwrap();
        out.write_u16::<LittleEndian>(0x6000).unwrap(); // 12:00:00
        out.write_u16::<LittleEndian>((44 << 9) | (6 << 5) | 15).unwrap(); // 2024-06-15
        out.write_u32::<LittleEndian>(h_crc).unwrap();
        out.write_u32::<LittleEndian>(h_csize).unwrap();
        out.write_u32::<LittleEndian>(h_size).unwrap();
        out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(entry.extra.len() as u16).unwrap();
        out.extend_from_slice(entry.name);
        out.extend_from_slice(entry.extra);
        out.extend_from_slice(&payload);

        if deferred {
            if entry.descriptor == Descriptor::Signed {
                out.write_u32::<LittleEndian>(0x0807_4b50).unwrap();
            }
            out.write_u32::<LittleEndian>(crc).unwrap();
            out.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
        }

        central.write_u32::<LittleEndian>(0x0201_4b50).unwrap();
        central.write_u16::<LittleEndian>(0x031e).unwrap();
        central.write_u16::<LittleEndian>(20).unwrap();
        central.write_u16::<LittleEndian>(flags).unwrap();
        central.write_u16::<LittleEndian>(entry.method).unwrap();
        central.write_u16::<LittleEndian>(0x6000).unwrap();
        central.write_u16::<LittleEndian>((44 << 9) | (6 << 5) | 15).unwrap();
        central.write_u32::<LittleEndian>(crc).unwrap();
        central.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        central.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
        central.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u16::<LittleEndian>(0).unwrap();
        central.write_u32::<LittleEndian>(0o100644 << 16).unwrap();
        central.write_u32::<LittleEndian>(offset).unwrap();
        central.extend_from_slice(entry.name);
    }

    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.write_u32::<LittleEndian>(0x0605_4b50).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(entries.len() as u16).unwrap();
    out.write_u16::<LittleEndian>(entries.len() as u16).unwrap();
    out.write_u32::<LittleEndian>(central.len() as u32).unwrap();
    out.write_u32::<LittleEndian>(cd_offset).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out
}

fn read_all_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut reader = ZipReader::new(bytes);
    let mut out = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        out.push((entry.name, reader.read_all().unwrap()));
    }
    out
}

#[test]
fn stored_with_sizes_upfront() {
    let bytes = archive(&[
        RawEntry::new("readme.txt", STORED, b"plain text, stored"),
        RawEntry::new("docs/", STORED, b""),
        RawEntry::new("docs/a.md", STORED, b"# heading\n"),
    ]);

    let mut reader = ZipReader::new(&bytes[..]);
    let first = reader.next_entry().unwrap().unwrap();
    assert_eq!(first.name, "readme.txt");
    assert_eq!(first.method, Some(CompressionMethod::Stored));
    assert_eq!(first.size, Some(18));
    assert_eq!(first.crc, Some(crc32fast::hash(b"plain text, stored")));
    assert_eq!(first.mod_date(), (2024, 6, 15));
    assert_eq!(first.mod_time(), (12, 0, 0));
    assert_eq!(reader.read_all().unwrap(), b"plain text, stored");

    let dir = reader.next_entry().unwrap().unwrap();
    assert!(dir.is_directory());
    assert!(reader.read_all().unwrap().is_empty());

    reader.next_entry().unwrap().unwrap();
    assert_eq!(reader.read_all().unwrap(), b"# heading\n");
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn deflated_with_sizes_upfront() {
    let text = b"deflated by someone else ".repeat(40);
    let bytes = archive(&[RawEntry::new("t.txt", DEFLATED, &text)]);

    let mut reader = ZipReader::new(&bytes[..]);
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.size, Some(text.len() as u64));
    assert!(entry.compressed_size.unwrap() < text.len() as u64);
    assert_eq!(reader.read_all().unwrap(), text);
}

#[test]
fn deflated_with_signed_descriptor() {
    let a = b"first deferred entry".repeat(10);
    let b: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let bytes = archive(&[
        RawEntry::new("a", DEFLATED, &a).deferred(Descriptor::Signed),
        RawEntry::new("b", DEFLATED, &b).deferred(Descriptor::Signed),
    ]);

    let mut reader = ZipReader::new(&bytes[..]);
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.size, None);
    assert_eq!(entry.crc, None);
    assert_eq!(reader.read_all().unwrap(), a);

    let updated = reader.entry().unwrap();
    assert_eq!(updated.size, Some(a.len() as u64));
    assert_eq!(updated.crc, Some(crc32fast::hash(&a)));
    assert_eq!(updated.compressed_size, Some(deflate(&a).len() as u64));

    reader.next_entry().unwrap().unwrap();
    assert_eq!(reader.read_all().unwrap(), b);
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn deflated_with_unsigned_descriptor() {
    let a = b"no signature before my descriptor".to_vec();
    let bytes = archive(&[
        RawEntry::new("a", DEFLATED, &a).deferred(Descriptor::Unsigned),
        RawEntry::new("b", STORED, b"after"),
    ]);

    assert_eq!(
        read_all_entries(&bytes),
        vec![("a".to_string(), a), ("b".to_string(), b"after".to_vec())]
    );
}

#[test]
fn skipping_deferred_entries_finds_the_next_header() {
    let big: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 251) as u8).collect();
    let bytes = archive(&[
        RawEntry::new("big", DEFLATED, &big).deferred(Descriptor::Unsigned),
        RawEntry::new("last", DEFLATED, b"last entry").deferred(Descriptor::Signed),
    ]);

    let mut reader = ZipReader::new(&bytes[..]);
    reader.next_entry().unwrap().unwrap();
    let last = reader.next_entry().unwrap().unwrap();
    assert_eq!(last.name, "last");
    assert_eq!(reader.read_all().unwrap(), b"last entry");
}

#[test]
fn stored_with_signed_descriptor() {
    let bytes = archive(&[
        RawEntry::new("one", STORED, b"stored, sizes deferred").deferred(Descriptor::Signed),
        RawEntry::new("two", STORED, b"second one").deferred(Descriptor::Signed),
        RawEntry::new("three", DEFLATED, b"and a deflated one"),
    ]);

    assert_eq!(
        read_all_entries(&bytes),
        vec![
            ("one".to_string(), b"stored, sizes deferred".to_vec()),
            ("two".to_string(), b"second one".to_vec()),
            ("three".to_string(), b"and a deflated one".to_vec()),
        ]
    );
}

#[test]
fn stored_with_unsigned_descriptor_is_corrupt() {
    let bytes = archive(&[
        RawEntry::new("one", STORED, b"cannot be delimited").deferred(Descriptor::Unsigned),
    ]);

    let mut reader = ZipReader::new(&bytes[..]);
    reader.next_entry().unwrap().unwrap();
    assert!(matches!(
        reader.read_all(),
        Err(ZipError::CorruptArchive(_))
    ));
}

#[test]
fn extra_field_and_non_utf8_name() {
    let mut entry = RawEntry::new("", STORED, b"data");
    entry.name = b"caf\xe9.txt";
    entry.extra = &[0x55, 0x54, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
    let bytes = archive(&[entry]);

    let mut reader = ZipReader::new(&bytes[..]);
    let read = reader.next_entry().unwrap().unwrap();
    assert_eq!(read.name, "caf\u{FFFD}.txt");
    assert_eq!(read.extra.as_deref(), Some(&[0x55, 0x54, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00][..]));
    assert_eq!(reader.read_all().unwrap(), b"data");
}

#[test]
fn truncated_deflate_stream_is_corrupt() {
    let text = b"this stream gets cut short ".repeat(100);
    let bytes = archive(&[RawEntry::new("cut", DEFLATED, &text)]);
    let compressed_len = deflate(&text).len();
    let cut = 30 + 3 + compressed_len / 2;

    let mut reader = ZipReader::new(&bytes[..cut]);
    reader.next_entry().unwrap().unwrap();
    assert!(matches!(
        reader.read_all(),
        Err(ZipError::CorruptArchive(_))
    ));
}

#[test]
fn truncated_stored_data_is_corrupt() {
    let bytes = archive(&[RawEntry::new("cut", STORED, b"0123456789")]);

    let mut reader = ZipReader::new(&bytes[..30 + 3 + 4]);
    reader.next_entry().unwrap().unwrap();
    assert!(matches!(
        reader.read_all(),
        Err(ZipError::CorruptArchive(_))
    ));
}

#[test]
fn unsupported_method_is_reported() {
    let bytes = archive(&[RawEntry::new("bz", 12, b"not really bzip2")]);

    let mut reader = ZipReader::new(&bytes[..]);
    assert!(matches!(
        reader.next_entry(),
        Err(ZipError::UnsupportedMethod(12))
    ));
}

#[test]
fn failures_surface_through_io_read() {
    let mut bytes = archive(&[RawEntry::new("s", STORED, b"checked")]);
    bytes[30 + 1] ^= 0x20;

    let mut reader = ZipReader::new(&bytes[..]);
    reader.next_entry().unwrap().unwrap();
    let mut out = Vec::new();
    let err = std::io::Read::read_to_end(&mut reader, &mut out).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
