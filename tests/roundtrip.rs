//! Archives written by `ZipWriter` and read back by `ZipReader`.

use std::io::{Cursor, Read};

use zipstream::zip::{EndOfCentralDirectory, Result};
use zipstream::{CompressionMethod, ZipEntry, ZipError, ZipReader, ZipWriter};

/// Deterministic pseudo-random bytes (64-bit LCG).
fn pseudo_random(len: usize, mut seed: u64) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (seed >> 33) as u8
        })
        .collect()
}

fn entry_with(name: &str, method: CompressionMethod, data: &[u8]) -> ZipEntry {
    match method {
        CompressionMethod::Stored => ZipEntry::stored(name, data),
        _ => {
            let mut entry = ZipEntry::new(name);
            entry.method = Some(method);
            entry
        }
    }
}

fn write_archive(entries: &[(&str, CompressionMethod, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Vec::new());
    for (name, method, data) in entries {
        writer.put_next_entry(entry_with(name, *method, data)).unwrap();
        writer.write_data(data).unwrap();
        writer.close_entry().unwrap();
    }
    writer.into_inner().unwrap()
}

/// Read every entry as (entry metadata after its data, content).
fn read_archive(bytes: &[u8]) -> Result<Vec<(ZipEntry, Vec<u8>)>> {
    let mut reader = ZipReader::new(bytes);
    let mut out = Vec::new();
    while reader.next_entry()?.is_some() {
        let data = reader.read_all()?;
        let entry = reader.entry().cloned().unwrap();
        out.push((entry, data));
    }
    reader.close();
    Ok(out)
}

#[test]
fn hello_world() {
    let mut writer = ZipWriter::new(Vec::new());
    writer.put_next_entry(ZipEntry::new("hello.txt")).unwrap();
    writer.write_data(b"Hello, World!").unwrap();
    writer.close_entry().unwrap();
    writer.finish().unwrap();
    let bytes = writer.into_inner().unwrap();

    let entries = read_archive(&bytes).unwrap();
    assert_eq!(entries.len(), 1);
    let (entry, data) = &entries[0];
    assert_eq!(entry.name, "hello.txt");
    assert_eq!(entry.method, Some(CompressionMethod::Deflated));
    assert_eq!(data, b"Hello, World!");
    assert_eq!(entry.size, Some(13));
    assert_eq!(entry.crc, Some(crc32fast::hash(b"Hello, World!")));
}

#[test]
fn empty_archive_has_no_entries() {
    let mut writer = ZipWriter::new(Vec::new());
    writer.finish().unwrap();
    let bytes = writer.into_inner().unwrap();

    let mut reader = ZipReader::new(&bytes[..]);
    assert!(reader.next_entry().unwrap().is_none());
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.available(), 0);
}

#[test]
fn directory_then_file() {
    let mut writer = ZipWriter::new(Vec::new());
    writer.put_next_entry(ZipEntry::new("mydir/")).unwrap();
    writer.close_entry().unwrap();
    writer.put_next_entry(ZipEntry::new("mydir/file.txt")).unwrap();
    writer.write_data(b"Inside directory").unwrap();
    let bytes = writer.into_inner().unwrap();

    let entries = read_archive(&bytes).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0.name, "mydir/");
    assert!(entries[0].0.is_directory());
    assert!(entries[0].1.is_empty());
    assert_eq!(entries[1].0.name, "mydir/file.txt");
    assert!(!entries[1].0.is_directory());
    assert_eq!(entries[1].1, b"Inside directory");
}

#[test]
fn large_pseudo_random_entry() {
    let data = pseudo_random(100_000, 42);
    let bytes = write_archive(&[("random.bin", CompressionMethod::Deflated, data.as_slice())]);

    let entries = read_archive(&bytes).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, data);
    assert_eq!(entries[0].0.crc, Some(crc32fast::hash(&data)));
}

#[test]
fn mixed_entries_round_trip_in_order() {
    let text = b"the quick brown fox jumps over the lazy dog\n".repeat(50);
    let binary: Vec<u8> = (0..=255).collect();
    let random = pseudo_random(10_000, 7);
    let input: Vec<(&str, CompressionMethod, &[u8])> = vec![
        ("a.txt", CompressionMethod::Deflated, text.as_slice()),
        ("b.bin", CompressionMethod::Stored, binary.as_slice()),
        ("empty", CompressionMethod::Deflated, b"".as_slice()),
        ("empty-stored", CompressionMethod::Stored, b"".as_slice()),
        ("nested/dir/c.dat", CompressionMethod::Deflated, random.as_slice()),
        ("ünïcode.txt", CompressionMethod::Stored, "héllo".as_bytes()),
    ];
    let bytes = write_archive(&input);

    let output = read_archive(&bytes).unwrap();
    assert_eq!(output.len(), input.len());
    for ((name, method, data), (entry, read)) in input.iter().zip(&output) {
        assert_eq!(entry.name, *name);
        assert_eq!(entry.method, Some(*method));
        assert_eq!(read.as_slice(), *data);
        assert_eq!(entry.size, Some(data.len() as u64));
        // CRC recomputed from what came back equals what the writer declared
        assert_eq!(entry.crc, Some(crc32fast::hash(read)));
    }
}

#[test]
fn stored_and_deflated_decode_identically() {
    let data = pseudo_random(5_000, 3)
        .into_iter()
        .map(|b| b % 16)
        .collect::<Vec<u8>>();
    let stored = write_archive(&[("x", CompressionMethod::Stored, data.as_slice())]);
    let deflated = write_archive(&[("x", CompressionMethod::Deflated, data.as_slice())]);
    assert!(deflated.len() < stored.len());

    let stored = read_archive(&stored).unwrap();
    let deflated = read_archive(&deflated).unwrap();
    assert_eq!(stored[0].1, data);
    assert_eq!(deflated[0].1, data);
}

#[test]
fn every_compression_level_round_trips() {
    let data = b"level test data, level test data, level test data".repeat(20);
    for level in -1..=9 {
        let mut writer = ZipWriter::new(Vec::new());
        writer.set_level(level).unwrap();
        writer.put_next_entry(ZipEntry::new("l.txt")).unwrap();
        writer.write_data(&data).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(read_archive(&bytes).unwrap()[0].1, data, "level {}", level);
    }
}

#[test]
fn finish_and_close_twice_leave_one_trailer() {
    let mut out = Vec::new();
    {
        let mut writer = ZipWriter::new(&mut out);
        writer.put_next_entry(ZipEntry::new("a")).unwrap();
        writer.write_data(b"aaa").unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }

    let eocd = EndOfCentralDirectory::from_bytes(&out[out.len() - EndOfCentralDirectory::SIZE..])
        .unwrap();
    assert_eq!(eocd.total_entries, 1);
    assert_eq!(
        eocd.cd_offset as usize + eocd.cd_size as usize + EndOfCentralDirectory::SIZE,
        out.len()
    );
    assert_eq!(read_archive(&out).unwrap().len(), 1);
}

#[test]
fn put_next_entry_closes_the_open_entry() {
    let explicit = {
        let mut writer = ZipWriter::new(Vec::new());
        writer.put_next_entry(ZipEntry::new("one")).unwrap();
        writer.write_data(b"first").unwrap();
        writer.close_entry().unwrap();
        writer.put_next_entry(ZipEntry::new("two")).unwrap();
        writer.write_data(b"second").unwrap();
        writer.close_entry().unwrap();
        writer.into_inner().unwrap()
    };
    let implicit = {
        let mut writer = ZipWriter::new(Vec::new());
        writer.put_next_entry(ZipEntry::new("one")).unwrap();
        writer.write_data(b"first").unwrap();
        writer.put_next_entry(ZipEntry::new("two")).unwrap();
        writer.write_data(b"second").unwrap();
        writer.into_inner().unwrap()
    };
    assert_eq!(explicit, implicit);
}

#[test]
fn entries_can_be_skipped_unread() {
    let big = pseudo_random(50_000, 9);
    let bytes = write_archive(&[
        ("skip-deflated", CompressionMethod::Deflated, big.as_slice()),
        ("skip-stored", CompressionMethod::Stored, big.as_slice()),
        ("wanted", CompressionMethod::Deflated, b"found me".as_slice()),
    ]);

    let mut reader = ZipReader::new(&bytes[..]);
    let first = reader.next_entry().unwrap().unwrap();
    assert_eq!(first.name, "skip-deflated");
    // Partially read, then move on
    let mut buf = [0u8; 100];
    reader.read_data(&mut buf).unwrap();
    reader.next_entry().unwrap().unwrap();
    let wanted = reader.next_entry().unwrap().unwrap();
    assert_eq!(wanted.name, "wanted");
    assert_eq!(reader.read_all().unwrap(), b"found me");
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn single_byte_reads_through_io_read() {
    let data = pseudo_random(3_000, 11);
    let bytes = write_archive(&[
        ("a", CompressionMethod::Deflated, data.as_slice()),
        ("b", CompressionMethod::Stored, b"tail".as_slice()),
    ]);

    let mut reader = ZipReader::new(Cursor::new(bytes));
    reader.next_entry().unwrap().unwrap();
    let mut back = Vec::new();
    let mut byte = [0u8; 1];
    while reader.read(&mut byte).unwrap() == 1 {
        back.push(byte[0]);
    }
    assert_eq!(back, data);
    assert_eq!(reader.available(), 0);

    reader.next_entry().unwrap().unwrap();
    let mut rest = String::new();
    reader.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "tail");
}

#[test]
fn corrupted_data_fails_crc_check() {
    let data = b"some stored content that will be damaged".to_vec();
    let mut bytes = write_archive(&[("s.txt", CompressionMethod::Stored, data.as_slice())]);
    // Local header is 30 bytes plus the 5-byte name
    bytes[35 + 3] ^= 0xFF;

    let mut reader = ZipReader::new(&bytes[..]);
    reader.next_entry().unwrap().unwrap();
    assert!(matches!(
        reader.read_all(),
        Err(ZipError::CrcMismatch { .. })
    ));
}

#[test]
fn comments_and_timestamps_are_written() {
    let mut entry = ZipEntry::new("dated.txt");
    entry.set_mod_datetime(2024, 2, 29, 13, 37, 42);
    let mut writer = ZipWriter::new(Vec::new());
    writer.set_comment("built by a test").unwrap();
    writer.put_next_entry(entry).unwrap();
    writer.write_data(b"x").unwrap();
    let bytes = writer.into_inner().unwrap();

    assert!(bytes.ends_with(b"built by a test"));
    let entries = read_archive(&bytes).unwrap();
    assert_eq!(entries[0].0.mod_date(), (2024, 2, 29));
    assert_eq!(entries[0].0.mod_time(), (13, 37, 42));
}

#[test]
fn unknown_time_is_the_dos_epoch() {
    let bytes = write_archive(&[("t", CompressionMethod::Deflated, b"t".as_slice())]);
    let entries = read_archive(&bytes).unwrap();
    assert_eq!(entries[0].0.mod_date(), (1980, 1, 1));
    assert_eq!(entries[0].0.mod_time(), (0, 0, 0));
}
