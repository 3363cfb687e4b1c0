//! RINEX observation text to Succinct RINEX converter.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};
use log::debug;

use srnx::observation::{ObsParser, ReadStatus};
use srnx::soc::{DigestId, SocWriter, WriterOptions};
use srnx::stream::{BufferedStream, MmapStream, Stream};

fn cli() -> Command {
    Command::new("rnx2srnx")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Converts RINEX observation files to Succinct RINEX")
        .arg_required_else_help(true)
        .arg(
            Arg::new("files")
                .value_name("FILE")
                .num_args(1..)
                .required(true)
                .help("Input RINEX observation file(s); \"-\" reads standard input"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file name (single input only)"),
        )
        .arg(
            Arg::new("stdio")
                .long("stdio")
                .action(ArgAction::SetTrue)
                .help("Read through buffered I/O instead of a memory map"),
        )
        .arg(
            Arg::new("digest")
                .long("digest")
                .value_parser(["none", "crc32c", "sha256"])
                .default_value("crc32c")
                .help("Chunk and file digest algorithm"),
        )
}

fn digest_id(name: &str) -> DigestId {
    match name {
        "none" => DigestId::None,
        "sha256" => DigestId::Sha256,
        _ => DigestId::Crc32c,
    }
}

/// `name.rnx` and `name.##o` inputs swap their suffix for `.srnx`;
/// anything else just gains it.
fn output_name(input: &str) -> PathBuf {
    let bytes = input.as_bytes();
    let rinex_like = bytes.len() >= 5
        && bytes[bytes.len() - 4] == b'.'
        && (input.ends_with("rnx")
            || (bytes[bytes.len() - 1] == b'o'
                && bytes[bytes.len() - 2].is_ascii_digit()
                && bytes[bytes.len() - 3].is_ascii_digit()));
    if rinex_like {
        PathBuf::from(format!("{}.srnx", &input[..input.len() - 4]))
    } else {
        PathBuf::from(format!("{}.srnx", input))
    }
}

fn convert<S: Stream>(stream: S, options: WriterOptions) -> Result<Vec<u8>, String> {
    let mut parser =
        ObsParser::new(stream).map_err(|e| format!("open failed: {}", e))?;
    let mut writer = SocWriter::new(parser.header(), options);
    loop {
        match parser.read() {
            Ok(ReadStatus::Record) => writer
                .append(&parser.record())
                .map_err(|e| format!("append failed: {}", e))?,
            Ok(ReadStatus::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "read failed: {} (line {})",
                    e,
                    parser.error_line()
                ))
            },
        }
    }
    Ok(writer.finish())
}

fn run(input: &str, output: &Path, use_stdio: bool, options: WriterOptions) -> Result<(), String> {
    let encoded = if input == "-" {
        convert(BufferedStream::stdin(), options)?
    } else if use_stdio {
        let stream = BufferedStream::open(input).map_err(|e| format!("open failed: {}", e))?;
        convert(stream, options)?
    } else {
        let stream = MmapStream::open(input).map_err(|e| format!("open failed: {}", e))?;
        convert(stream, options)?
    };
    debug!("{}: {} bytes", output.display(), encoded.len());
    std::fs::write(output, encoded).map_err(|e| format!("write failed: {}", e))
}

fn main() -> ExitCode {
    env_logger::init();
    let matches = cli().get_matches();

    let files: Vec<&String> = matches.get_many("files").unwrap().collect();
    let output = matches.get_one::<String>("output");
    if output.is_some() && files.len() > 1 {
        eprintln!("--output requires a single input file");
        return ExitCode::FAILURE;
    }
    let options = WriterOptions {
        chunk_digest: digest_id(matches.get_one::<String>("digest").unwrap()),
        file_digest: digest_id(matches.get_one::<String>("digest").unwrap()),
    };
    let use_stdio = matches.get_flag("stdio");

    let mut failed = false;
    for input in files {
        let target = match output {
            Some(name) => PathBuf::from(name),
            None if input == "-" => PathBuf::from("stdin.srnx"),
            None => output_name(input),
        };
        if let Err(message) = run(input, &target, use_stdio, options) {
            eprintln!("{}: {}", input, message);
            failed = true;
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod test {
    use super::output_name;
    use std::path::PathBuf;

    #[test]
    fn output_names() {
        assert_eq!(
            output_name("site0010.20o.rnx"),
            PathBuf::from("site0010.20o.srnx")
        );
        assert_eq!(output_name("brux0010.21o"), PathBuf::from("brux0010.srnx"));
        assert_eq!(output_name("weird.dat"), PathBuf::from("weird.dat.srnx"));
    }
}
