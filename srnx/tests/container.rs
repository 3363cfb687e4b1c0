//! Container fixtures: hand built chunks against the reader, and
//! writer output structure.

use srnx::leb128::{write_sleb128, write_uleb128};
use srnx::prelude::*;
use srnx::soc::Error;

fn hdr(content: &str, label: &str) -> String {
    format!("{:<60}{}\n", content, label)
}

fn v3_header_text() -> String {
    let mut text = String::new();
    text += &hdr(
        "     3.04           OBSERVATION DATA    M",
        "RINEX VERSION / TYPE",
    );
    text += &hdr("G    2 C1C L1C", "SYS / # / OBS TYPES");
    text += &hdr("", "END OF HEADER");
    text
}

fn chunk(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(tag);
    write_uleb128(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

/// A minimal digestless container: SRNX, RHDR, EPOC, one satellite
/// with one observed code.
fn build_fixture(data_block: &[u8], n_values: u64, n_epochs: u64) -> Vec<u8> {
    let mut out = Vec::new();

    let mut srnx = Vec::new();
    write_uleb128(&mut srnx, 1); // major
    write_uleb128(&mut srnx, 0); // minor
    write_uleb128(&mut srnx, 0); // no chunk digest
    write_uleb128(&mut srnx, 0); // no file digest
    chunk(&mut out, b"SRNX", &srnx);

    chunk(&mut out, b"RHDR", v3_header_text().as_bytes());

    let mut epoc = Vec::new();
    write_uleb128(&mut epoc, n_epochs);
    write_sleb128(&mut epoc, -30);
    write_uleb128(&mut epoc, n_epochs - 1);
    write_uleb128(&mut epoc, 20200101);
    write_uleb128(&mut epoc, 1_200_000_000_000);
    chunk(&mut out, b"EPOC", &epoc);

    // SOCD payload: name, count, empty indicator blocks, data block
    let mut socd = Vec::new();
    socd.extend_from_slice(b"G01\0C1C\0");
    write_uleb128(&mut socd, n_values - 1);
    write_uleb128(&mut socd, 0); // lli runs
    write_uleb128(&mut socd, 0); // ssi runs
    write_uleb128(&mut socd, data_block.len() as u64);
    socd.extend_from_slice(data_block);

    // SATE payload: name, offsets (C1C observed, L1C absent), presence
    let mut sate = Vec::new();
    sate.extend_from_slice(b"G01\0");
    let mut socd_offset = 0i64;
    // iterate the chunk length to its fixed point
    for _ in 0..4 {
        let mut probe = Vec::new();
        write_sleb128(&mut probe, socd_offset);
        write_sleb128(&mut probe, 0);
        let payload_len = 4 + probe.len() + 3;
        let mut len_field = Vec::new();
        write_uleb128(&mut len_field, payload_len as u64);
        socd_offset = (4 + len_field.len() + payload_len) as i64;
    }
    write_sleb128(&mut sate, socd_offset);
    write_sleb128(&mut sate, 0);
    write_uleb128(&mut sate, 0); // one presence run
    write_uleb128(&mut sate, 0); // gap 0
    write_uleb128(&mut sate, n_values - 1);
    chunk(&mut out, b"SATE", &sate);
    chunk(&mut out, b"SOCD", &socd);

    out
}

#[test]
fn zero_run_block_repeats_the_initial_value() {
    // first order, state 1000, five zero residuals
    let mut data = Vec::new();
    write_uleb128(&mut data, 1); // schema: order 1, no scale
    write_sleb128(&mut data, 1000);
    data.push(0xfe);
    write_uleb128(&mut data, 4);

    let container = build_fixture(&data, 5, 5);
    let reader = SocReader::from_bytes(container).unwrap();
    let mut obs = reader.open_obs(SvName::new(b'G', 1), &"C1C".parse().unwrap()).unwrap();
    let mut values = Vec::new();
    while let Some(value) = obs.read_value().unwrap() {
        values.push(value);
    }
    assert_eq!(values, vec![1000; 5]);

    let (lli, ssi) = obs.read_indicators().unwrap();
    assert_eq!(lli, vec![b' '; 5]);
    assert_eq!(ssi, vec![b' '; 5]);
}

#[test]
fn scaled_matrix_block_integrates() {
    // order 1 with explicit scale 2 (stored 2000): eight single bit
    // residuals of -1 decode to -2, -4, ..., -16
    let mut data = Vec::new();
    write_uleb128(&mut data, 9); // schema: order 1, scaled
    write_uleb128(&mut data, 2000);
    write_sleb128(&mut data, 0);
    data.push(0x00); // 8 by 1 bit matrix
    data.push(0xff);

    let container = build_fixture(&data, 8, 8);
    let reader = SocReader::from_bytes(container).unwrap();
    let mut obs = reader.open_obs(SvName::new(b'G', 1), &"C1C".parse().unwrap()).unwrap();
    assert_eq!(obs.scale_x1000(), 2000);
    let mut values = Vec::new();
    while let Some(value) = obs.read_value().unwrap() {
        values.push(value);
    }
    assert_eq!(values, vec![-2, -4, -6, -8, -10, -12, -14, -16]);
}

#[test]
fn sleb_block_and_presence_runs() {
    let mut data = Vec::new();
    write_uleb128(&mut data, 0); // order 0, raw values
    data.push(0xff);
    write_uleb128(&mut data, 2);
    for value in [21_000_000_100i64, 0, -5000] {
        write_sleb128(&mut data, value);
    }

    let container = build_fixture(&data, 3, 3);
    let reader = SocReader::from_bytes(container).unwrap();

    let sv = SvName::new(b'G', 1);
    let runs = reader.presence(sv, 0).unwrap();
    assert_eq!(runs, vec![(0, 3)]);
    assert!(matches!(reader.presence(sv, 1), Err(Error::UnknownCode)));

    let mut obs = reader.open_obs_by_index(sv, 0).unwrap();
    assert_eq!(obs.n_values(), 3);
    assert_eq!(obs.read_value().unwrap(), Some(21_000_000_100));
    assert_eq!(obs.read_value().unwrap(), Some(0));
    assert_eq!(obs.read_value().unwrap(), Some(-5000));
    assert_eq!(obs.read_value().unwrap(), None);
}

#[test]
fn epochs_and_lookup_errors() {
    let mut data = Vec::new();
    write_uleb128(&mut data, 0);
    data.push(0xff);
    write_uleb128(&mut data, 0);
    write_sleb128(&mut data, 7000);

    let container = build_fixture(&data, 1, 3);
    let reader = SocReader::from_bytes(container).unwrap();
    assert_eq!(reader.version(), (1, 0));

    let epochs = reader.epochs().unwrap();
    assert_eq!(epochs.len(), 3);
    assert_eq!(epochs[0].hh_mm, 1200);
    assert_eq!(epochs[0].sec_e7, 0);
    assert_eq!(epochs[1].sec_e7, 300_000_000);
    assert_eq!(epochs[2].hh_mm, 1201);
    assert_eq!(epochs[2].sec_e7, 0);

    assert_eq!(reader.satellites().unwrap(), vec![SvName::new(b'G', 1)]);
    assert!(matches!(
        reader.open_obs(SvName::new(b'X', 1), &"C1C".parse().unwrap()),
        Err(Error::UnknownSystem)
    ));
    assert!(matches!(
        reader.open_obs(SvName::new(b'G', 1), &"C9X".parse().unwrap()),
        Err(Error::UnknownCode)
    ));
    assert!(matches!(
        reader.open_obs(SvName::new(b'G', 9), &"C1C".parse().unwrap()),
        Err(Error::UnknownSatellite)
    ));
    // declared but never observed
    assert!(matches!(
        reader.open_obs(SvName::new(b'G', 1), &"L1C".parse().unwrap()),
        Err(Error::UnknownCode)
    ));
    assert!(reader.events().next().is_none());
}

#[test]
fn bad_magic_and_major() {
    assert!(matches!(
        SocReader::from_bytes(b"JUNK".to_vec()),
        Err(Error::NotSrnx)
    ));

    let mut out = Vec::new();
    let mut srnx = Vec::new();
    write_uleb128(&mut srnx, 2); // future major
    write_uleb128(&mut srnx, 0);
    write_uleb128(&mut srnx, 0);
    write_uleb128(&mut srnx, 0);
    chunk(&mut out, b"SRNX", &srnx);
    chunk(&mut out, b"RHDR", v3_header_text().as_bytes());
    assert!(matches!(SocReader::from_bytes(out), Err(Error::BadMajor)));
}

#[test]
fn reserved_block_header_is_corrupt() {
    let mut data = Vec::new();
    write_uleb128(&mut data, 0);
    data.push(0x7f); // 64 column matrix: reserved
    let container = build_fixture(&data, 1, 1);
    let reader = SocReader::from_bytes(container).unwrap();
    let mut obs = reader
        .open_obs(SvName::new(b'G', 1), &"C1C".parse().unwrap())
        .unwrap();
    assert!(matches!(obs.read_value(), Err(Error::Corrupt)));
}

#[test]
fn writer_layout_and_digests() {
    let header = parse_header(&v3_header_text());
    let mut writer = SocWriter::new(
        &header,
        WriterOptions {
            chunk_digest: DigestId::Crc32c,
            file_digest: DigestId::Sha256,
        },
    );
    let epoch = Epoch {
        yyyy_mm_dd: 20200101,
        hh_mm: 1200,
        sec_e7: 0,
        ..Default::default()
    };
    let index = writer.append_epoch(epoch).unwrap();
    writer
        .append_signal(SvName::new(b'G', 1), 0, index, 23_619_095_450, b' ', b'8')
        .unwrap();
    writer.append_event(b"EVENT BODY\n");
    let bytes = writer.finish();

    assert_eq!(&bytes[0..4], b"SRNX");
    let reader = SocReader::from_bytes(bytes).unwrap();
    reader.verify().unwrap();
    assert_eq!(reader.chunk_digest(), DigestId::Crc32c);
    assert_eq!(reader.file_digest(), DigestId::Sha256);
    assert_eq!(reader.header_text(), v3_header_text());
    assert_eq!(reader.epochs().unwrap().len(), 1);
    assert_eq!(reader.satellites().unwrap(), vec![SvName::new(b'G', 1)]);

    let events: Vec<_> = reader.events().map(Result::unwrap).collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].epoch_index, 1);
    assert_eq!(events[0].text, b"EVENT BODY\n");

    let mut obs = reader
        .open_obs(SvName::new(b'G', 1), &"C1C".parse().unwrap())
        .unwrap();
    assert_eq!(obs.read_value().unwrap(), Some(23_619_095_450));
    assert_eq!(obs.read_value().unwrap(), None);
    let (lli, ssi) = obs.read_indicators().unwrap();
    assert_eq!(lli, vec![b' ']);
    assert_eq!(ssi, vec![b'8']);
}

#[test]
fn corrupted_byte_fails_verification() {
    let header = parse_header(&v3_header_text());
    let mut writer = SocWriter::new(&header, WriterOptions::default());
    let index = writer
        .append_epoch(Epoch {
            yyyy_mm_dd: 20200101,
            hh_mm: 1200,
            sec_e7: 0,
            ..Default::default()
        })
        .unwrap();
    writer
        .append_signal(SvName::new(b'G', 1), 0, index, 1000, b' ', b' ')
        .unwrap();
    let mut bytes = writer.finish();
    let target = bytes.len() / 2;
    bytes[target] ^= 0x40;
    if let Ok(reader) = SocReader::from_bytes(bytes) {
        assert!(reader.verify().is_err());
    }
}

/// Parses a header from raw text through the text parser.
fn parse_header(text: &str) -> Header {
    use srnx::observation::ObsParser;
    use srnx::stream::BufferedStream;
    use std::io::Cursor;
    let parser = ObsParser::new(BufferedStream::new(Cursor::new(text.as_bytes().to_vec())))
        .expect("header should parse");
    parser.header().clone()
}
