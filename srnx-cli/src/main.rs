//! Inspection tools: scan observation files, report declared
//! observation counts, describe containers.

use std::fs::File;
use std::io::{self, Stdin};
use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};
use itertools::Itertools;

use srnx::observation::{ObsParser, ReadStatus};
use srnx::soc::SocReader;
use srnx::stream::{BufferedStream, MmapStream, Stream};

fn cli() -> Command {
    let files = Arg::new("files")
        .value_name("FILE")
        .num_args(1..)
        .required(true);
    Command::new("srnx-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("RINEX observation and Succinct RINEX inspection tools")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            Arg::new("stdio")
                .long("stdio")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Read through buffered I/O instead of a memory map"),
        )
        .subcommand(
            Command::new("scan")
                .about("Walk every record of observation files and summarize them")
                .arg(files.clone())
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(ArgAction::SetTrue)
                        .help("Print one line per epoch"),
                ),
        )
        .subcommand(
            Command::new("n-obs")
                .about("Report declared observation counts per satellite system")
                .arg(files.clone()),
        )
        .subcommand(
            Command::new("info")
                .about("Describe a Succinct RINEX container")
                .arg(files),
        )
}

/// Stream selection: memory map by default, buffered I/O on request,
/// standard input for `-`.
enum AnyStream {
    Mmap(MmapStream),
    File(BufferedStream<File>),
    Stdin(BufferedStream<Stdin>),
}

impl AnyStream {
    fn open(file: &str, use_stdio: bool) -> io::Result<Self> {
        if file == "-" {
            Ok(Self::Stdin(BufferedStream::stdin()))
        } else if use_stdio {
            Ok(Self::File(BufferedStream::open(file)?))
        } else {
            Ok(Self::Mmap(MmapStream::open(file)?))
        }
    }
}

impl Stream for AnyStream {
    fn advance(&mut self, req_size: usize, step: usize) -> io::Result<()> {
        match self {
            Self::Mmap(s) => s.advance(req_size, step),
            Self::File(s) => s.advance(req_size, step),
            Self::Stdin(s) => s.advance(req_size, step),
        }
    }

    fn buffer(&self) -> &[u8] {
        match self {
            Self::Mmap(s) => s.buffer(),
            Self::File(s) => s.buffer(),
            Self::Stdin(s) => s.buffer(),
        }
    }

    fn size(&self) -> usize {
        match self {
            Self::Mmap(s) => s.size(),
            Self::File(s) => s.size(),
            Self::Stdin(s) => s.size(),
        }
    }
}

fn scan(stream: AnyStream, filename: &str, verbose: bool) -> Result<(), String> {
    let mut parser = ObsParser::new(stream).map_err(|e| format!("open failed: {}", e))?;
    let mut records = 0u64;
    let mut max_obs = 0usize;
    let mut max_sats = 0i32;
    loop {
        match parser.read() {
            Ok(ReadStatus::Record) => {},
            Ok(ReadStatus::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "read failed: {} (line {})",
                    e,
                    parser.error_line()
                ))
            },
        }
        records += 1;
        let record = parser.record();
        if record.is_event() {
            continue;
        }
        let n_obs = record.values().len();
        max_obs = max_obs.max(n_obs);
        max_sats = max_sats.max(record.epoch.n_sats);
        if verbose {
            println!(
                "{:08} {:04} {:9} {:2} {:3}",
                record.epoch.yyyy_mm_dd,
                record.epoch.hh_mm,
                record.epoch.sec_e7,
                record.epoch.n_sats,
                n_obs
            );
        }
    }
    println!(
        "{}: {} records, max {} observations from {} satellites",
        filename, records, max_obs, max_sats
    );
    Ok(())
}

fn n_obs(stream: AnyStream, filename: &str, maxima: &mut [usize; 32]) -> Result<(), String> {
    let parser = ObsParser::new(stream).map_err(|e| format!("open failed: {}", e))?;
    let header = parser.header();
    let line = header
        .systems()
        .iter()
        .map(|entry| format!("{}: {}", char::from(entry.system), entry.codes.len()))
        .join(", ");
    println!("{} ({}): {}", filename, header.version(), line);
    for entry in header.systems() {
        let slot = usize::from(entry.system & 31);
        maxima[slot] = maxima[slot].max(entry.codes.len());
    }
    Ok(())
}

fn info(filename: &str) -> Result<(), String> {
    let reader = SocReader::open(filename).map_err(|e| format!("open failed: {}", e))?;
    let (major, minor) = reader.version();
    println!("{}: SRNX {}.{}", filename, major, minor);
    println!(
        "  digests: chunk {:?}, file {:?}",
        reader.chunk_digest(),
        reader.file_digest()
    );
    reader
        .verify()
        .map_err(|e| format!("verify failed: {}", e))?;

    match reader.epochs() {
        Ok(epochs) if !epochs.is_empty() => {
            println!(
                "  {} epochs, {} .. {}",
                epochs.len(),
                epochs[0],
                epochs[epochs.len() - 1]
            );
        },
        _ => println!("  no epochs"),
    }

    let events = reader.events().count();
    if events > 0 {
        println!("  {} special events", events);
    }

    let satellites = reader
        .satellites()
        .map_err(|e| format!("satellites failed: {}", e))?;
    for sv in satellites {
        let codes = reader.header().codes(sv.system).to_vec();
        let signals = codes
            .iter()
            .enumerate()
            .filter_map(|(idx, code)| {
                let total: u64 = reader
                    .presence(sv, idx)
                    .ok()?
                    .iter()
                    .map(|&(_, count)| count)
                    .sum();
                Some(format!("{} x{}", code, total))
            })
            .join(", ");
        println!("  {}: {}", sv, signals);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let matches = cli().get_matches();
    let (name, sub) = matches.subcommand().expect("subcommand required");
    let use_stdio = matches.get_flag("stdio");

    let files: Vec<&String> = sub.get_many("files").unwrap().collect();
    let mut failed = false;
    let mut maxima = [0usize; 32];

    for file in &files {
        let result = match name {
            "info" => info(file),
            _ => match AnyStream::open(file, use_stdio) {
                Err(e) => Err(format!("open failed: {}", e)),
                Ok(stream) if name == "scan" => {
                    scan(stream, file, sub.get_flag("verbose"))
                },
                Ok(stream) => n_obs(stream, file, &mut maxima),
            },
        };
        if let Err(message) = result {
            eprintln!("{}: {}", file, message);
            failed = true;
        }
    }

    if name == "n-obs" && files.len() > 1 {
        let line = maxima
            .iter()
            .enumerate()
            .filter(|&(slot, &count)| slot > 0 && count > 0)
            .map(|(slot, count)| format!("{}: {}", char::from(b'@' + slot as u8), count))
            .join(", ");
        println!("maxima: {}", line);
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
