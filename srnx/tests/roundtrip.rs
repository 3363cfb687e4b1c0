//! End to end: observation text through the container and back.

use std::collections::BTreeMap;
use std::io::Cursor;

use srnx::observation::{ObsParser, ReadStatus};
use srnx::prelude::*;
use srnx::stream::BufferedStream;

fn hdr(content: &str, label: &str) -> String {
    format!("{:<60}{}\n", content, label)
}

/// A 3.04 file: three systems' worth of codes, three epochs crossing a
/// minute boundary, a special event, signal gaps and a scaled stream.
fn v3_file() -> String {
    let mut text = String::new();
    text += &hdr(
        "     3.04           OBSERVATION DATA    M",
        "RINEX VERSION / TYPE",
    );
    text += &hdr("G    3 C1C L1C S1C", "SYS / # / OBS TYPES");
    text += &hdr("R    2 C1C L1C", "SYS / # / OBS TYPES");
    text += &hdr("", "END OF HEADER");

    // 12:59:30
    text += "> 2020 06 01 12 59 30.0000000  0  3       -.000000123456\n";
    text += "G01";
    text += "  23619095.450  ";
    text += " 124458652.18215";
    text += "        45.000\n";
    text += "G07";
    text += "  20041484.818  \n";
    text += "R05";
    text += "  21000000.100  ";
    text += " 112300500.75019\n";

    // event between epochs
    text += "> 2020 06 01 12 59 45.0000000  4  2\n";
    text += "NEW STATION INFORMATION\n";
    text += "FOLLOWS ON THESE LINES\n";

    // 13:00:00, G07 gone, G01 drops S1C
    text += "> 2020 06 01 13 00  0.0000000  0  2       -.000000123400\n";
    text += "G01";
    text += "  23619097.450  ";
    text += " 124458659.28215\n";
    text += "R05";
    text += "  21000004.100  ";
    text += " 112300510.75029\n";

    // 13:00:30, G07 back
    text += "> 2020 06 01 13 00 30.0000000  0  3\n";
    text += "G01";
    text += "  23619099.450  ";
    text += " 124458666.38215";
    text += "        47.000\n";
    text += "G07";
    text += "  20041488.818  \n";
    text += "R05";
    text += "  21000008.100  ";
    text += " 112300520.75039\n";

    text
}

type SignalKey = (String, String);
type Tuple = (usize, i64, u8, u8);

/// Every (epoch index, value, lli, ssi) tuple per signal, straight
/// from the text parser.
fn tuples_from_text(text: &str) -> (Vec<Epoch>, BTreeMap<SignalKey, Vec<Tuple>>) {
    let stream = BufferedStream::new(Cursor::new(text.as_bytes().to_vec()));
    let mut parser = ObsParser::new(stream).unwrap();
    let mut epochs = Vec::new();
    let mut tuples: BTreeMap<SignalKey, Vec<Tuple>> = BTreeMap::new();
    while parser.read().unwrap() == ReadStatus::Record {
        let record = parser.record();
        if record.is_event() {
            continue;
        }
        let epoch_index = epochs.len();
        epochs.push(record.epoch);
        for signal in record.signals() {
            tuples
                .entry((signal.sv.to_string(), signal.code.to_string()))
                .or_default()
                .push((epoch_index, signal.value, signal.lli, signal.ssi));
        }
    }
    (epochs, tuples)
}

fn encode(text: &str, options: WriterOptions) -> Vec<u8> {
    let stream = BufferedStream::new(Cursor::new(text.as_bytes().to_vec()));
    let mut parser = ObsParser::new(stream).unwrap();
    let mut writer = SocWriter::new(parser.header(), options);
    while parser.read().unwrap() == ReadStatus::Record {
        writer.append(&parser.record()).unwrap();
    }
    writer.finish()
}

/// Every (epoch index, value, lli, ssi) tuple per signal, from a
/// container.
fn tuples_from_container(
    reader: &SocReader,
) -> (Vec<Epoch>, BTreeMap<SignalKey, Vec<Tuple>>) {
    let epochs = reader.epochs().unwrap();
    let mut tuples: BTreeMap<SignalKey, Vec<Tuple>> = BTreeMap::new();
    for sv in reader.satellites().unwrap() {
        let codes = reader.header().codes(sv.system).to_vec();
        for (code_index, code) in codes.iter().enumerate() {
            let runs = match reader.presence(sv, code_index) {
                Ok(runs) => runs,
                Err(_) => continue,
            };
            let mut obs = reader.open_obs_by_index(sv, code_index).unwrap();
            let (lli, ssi) = obs.read_indicators().unwrap();
            let total: u64 = runs.iter().map(|&(_, count)| count).sum();
            assert_eq!(obs.n_values(), total);

            let mut nn = 0;
            let entry = tuples.entry((sv.to_string(), code.to_string())).or_default();
            for (first, count) in runs {
                for tick in 0..count {
                    let value = obs.read_value().unwrap().expect("stream too short");
                    entry.push(((first + tick) as usize, value, lli[nn], ssi[nn]));
                    nn += 1;
                }
            }
            assert_eq!(obs.read_value().unwrap(), None);
        }
    }
    (epochs, tuples)
}

#[test]
fn text_to_container_preserves_all_tuples() {
    let text = v3_file();
    let (text_epochs, text_tuples) = tuples_from_text(&text);
    let container = encode(&text, WriterOptions::default());
    let reader = SocReader::from_bytes(container).unwrap();
    reader.verify().unwrap();

    let (soc_epochs, soc_tuples) = tuples_from_container(&reader);
    assert_eq!(soc_epochs.len(), text_epochs.len());
    for (stored, parsed) in soc_epochs.iter().zip(&text_epochs) {
        assert_eq!(stored.yyyy_mm_dd, parsed.yyyy_mm_dd);
        assert_eq!(stored.hh_mm, parsed.hh_mm);
        assert_eq!(stored.sec_e7, parsed.sec_e7);
        assert_eq!(stored.clock_offset_e12, parsed.clock_offset_e12);
    }
    assert_eq!(soc_tuples, text_tuples);

    // the event survives with its position
    let events: Vec<_> = reader.events().map(Result::unwrap).collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].epoch_index, 1);
    assert_eq!(
        events[0].text,
        b"NEW STATION INFORMATION\nFOLLOWS ON THESE LINES\n"
    );
}

#[test]
fn reencoding_decoder_output_is_bit_exact() {
    let options = WriterOptions::default();
    let container = encode(&v3_file(), options);
    let reader = SocReader::from_bytes(container.clone()).unwrap();

    // drive a fresh writer purely from the decoder's outputs
    let mut writer = SocWriter::new(reader.header(), options);
    let epochs = reader.epochs().unwrap();
    let mut events = reader.events().map(Result::unwrap).peekable();
    for (epoch_index, epoch) in epochs.iter().enumerate() {
        while events
            .peek()
            .is_some_and(|e| e.epoch_index == epoch_index as u64)
        {
            writer.append_event(events.next().unwrap().text);
        }
        writer.append_epoch(*epoch).unwrap();
    }
    for event in events {
        writer.append_event(event.text);
    }

    for sv in reader.satellites().unwrap() {
        let n_obs = reader.header().n_obs(sv.system);
        for code_index in 0..n_obs {
            let runs = match reader.presence(sv, code_index) {
                Ok(runs) => runs,
                Err(_) => continue,
            };
            let mut obs = reader.open_obs_by_index(sv, code_index).unwrap();
            let (lli, ssi) = obs.read_indicators().unwrap();
            let mut nn = 0;
            for (first, count) in runs {
                for tick in 0..count {
                    let value = obs.read_value().unwrap().unwrap();
                    writer
                        .append_signal(sv, code_index, first + tick, value, lli[nn], ssi[nn])
                        .unwrap();
                    nn += 1;
                }
            }
        }
    }

    assert_eq!(writer.finish(), container);
}

#[test]
fn v2_text_roundtrip() {
    let mut text = String::new();
    text += &hdr(
        "     2.11           OBSERVATION DATA    M (MIXED)",
        "RINEX VERSION / TYPE",
    );
    text += &hdr("     2    C1    L1", "# / TYPES OF OBSERV");
    text += &hdr("", "END OF HEADER");
    text += " 05  1 15  3 16 12.0000000  0  2G05R12\n";
    text += "  23619095.450  ";
    text += " 124458652.182\n";
    text += "  21000000.100\n";
    text += " 05  1 15  3 16 42.0000000  0  2G05R12\n";
    text += "  23619096.450  ";
    text += " 124458653.182\n";
    text += "  21000001.100\n";

    let (text_epochs, text_tuples) = tuples_from_text(&text);
    assert_eq!(text_epochs.len(), 2);
    assert_eq!(text_tuples.len(), 3);

    let container = encode(
        &text,
        WriterOptions {
            chunk_digest: DigestId::Sha256,
            file_digest: DigestId::None,
        },
    );
    let reader = SocReader::from_bytes(container).unwrap();
    reader.verify().unwrap();
    let (_, soc_tuples) = tuples_from_container(&reader);
    assert_eq!(soc_tuples, text_tuples);

    // the shared 2.x table answers for every mixed system
    assert_eq!(reader.header().n_obs(b'G'), 2);
    assert_eq!(reader.header().n_obs(b'R'), 2);
}

#[test]
fn scaled_stream_selects_a_scale() {
    // all values share a divisor of 500 (in thousandths)
    let mut text = String::new();
    text += &hdr(
        "     3.04           OBSERVATION DATA    M",
        "RINEX VERSION / TYPE",
    );
    text += &hdr("G    1 C1C", "SYS / # / OBS TYPES");
    text += &hdr("", "END OF HEADER");
    for ii in 0..6 {
        text += &format!("> 2020 06 01 12 00 {:2}.0000000  0  1\n", ii * 5);
        text += &format!("G01{:>14.3}\n", (ii as f64) * 12.5);
    }

    let container = encode(&text, WriterOptions::default());
    let reader = SocReader::from_bytes(container).unwrap();
    let mut obs = reader
        .open_obs(SvName::new(b'G', 1), &"C1C".parse().unwrap())
        .unwrap();
    assert_eq!(obs.scale_x1000(), 12_500_000);
    for ii in 0..6 {
        assert_eq!(obs.read_value().unwrap(), Some(ii * 12_500));
    }
    assert_eq!(obs.read_value().unwrap(), None);
}
