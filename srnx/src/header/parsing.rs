//! Header block parsing.

use log::debug;

use crate::fields::parse_uint;
use crate::observable::ObsCode;
use crate::observation::Error;

use super::{Header, SystemCodes, Version};

const RINEX_VERSION_TYPE: &str = "RINEX VERSION / TYPE";
const END_OF_HEADER: &str = "END OF HEADER";
const TYPES_OF_OBSERV: &str = "# / TYPES OF OBSERV";
const SYS_OBS_TYPES: &str = "SYS / # / OBS TYPES";

fn memmem(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Locates the END OF HEADER line in the raw stream window and returns
/// the number of bytes through its terminator.
fn find_end_of_header(raw: &[u8]) -> Result<usize, Error> {
    let label = END_OF_HEADER.as_bytes();
    let mut ofs = 0;
    loop {
        let pos = ofs + memmem(&raw[ofs..], label).ok_or(Error::BadFormat)?;
        if pos < 61 {
            return Err(Error::BadFormat);
        }
        if raw[pos - 61] != b'\n' {
            // label text occurring off the label columns
            ofs = pos + 1;
            continue;
        }

        // only blanks may follow, within the 80 column line limit
        let mut ii = pos + label.len();
        while ii - pos < 21 && raw.get(ii) == Some(&b' ') {
            ii += 1;
        }
        match raw.get(ii) {
            Some(b'\n') => return Ok(ii + 1),
            Some(b'\r') if raw.get(ii + 1) == Some(&b'\n') => return Ok(ii + 2),
            Some(b'\r') => return Ok(ii + 1),
            _ => {
                ofs = pos + 1;
            },
        }
    }
}

/// Copies the header, replacing every terminator (CR, LF, CRLF) with a
/// single LF and trimming trailing blanks from each line. Lines must be
/// 61 to 80 bytes before their terminator.
fn normalize(raw: &[u8]) -> Result<String, Error> {
    let mut out: Vec<u8> = Vec::with_capacity(raw.len());
    let mut line_start = 0;
    let mut ii = 0;
    while ii < raw.len() {
        match raw[ii] {
            b'\n' | b'\r' => {
                if raw[ii] == b'\r' && raw.get(ii + 1) == Some(&b'\n') {
                    ii += 1;
                }
                ii += 1;
                let line_len = out.len() - line_start;
                if !(61..=80).contains(&line_len) {
                    return Err(Error::BadFormat);
                }
                while out.len() > line_start && out.last() == Some(&b' ') {
                    out.pop();
                }
                out.push(b'\n');
                line_start = out.len();
            },
            b => {
                out.push(b);
                ii += 1;
            },
        }
    }
    if line_start != out.len() {
        return Err(Error::BadFormat);
    }
    String::from_utf8(out).map_err(|_| Error::BadFormat)
}

/// Parses the header found at the start of `window`, returning it along
/// with the number of raw bytes it occupied (including the END OF
/// HEADER terminator).
pub(crate) fn parse(window: &[u8]) -> Result<(Header, usize), Error> {
    if window.len() < 80 || &window[60..80] != RINEX_VERSION_TYPE.as_bytes() {
        return Err(Error::BadFormat);
    }
    if window[20] != b'O' {
        return Err(Error::NotObservation);
    }
    let consumed = find_end_of_header(window)?;
    let text = normalize(&window[..consumed])?;
    let header = from_text(text)?;
    Ok((header, consumed))
}

/// Rebuilds a [Header] from already normalized text, as stored in a
/// container's RHDR chunk.
pub(crate) fn parse_rhdr(text: &str) -> Result<Header, Error> {
    let first = text.lines().next().ok_or(Error::BadFormat)?;
    if first.len() < 60 + RINEX_VERSION_TYPE.len() || &first[60..] != RINEX_VERSION_TYPE {
        return Err(Error::BadFormat);
    }
    from_text(text.to_string())
}

fn from_text(text: String) -> Result<Header, Error> {
    let version = detect_version(&text)?;
    let (systems, index) = if version.major == 2 {
        parse_v2_tables(&text)?
    } else {
        parse_v3_tables(&text)?
    };
    debug!("header: version {}, {} system table(s)", version, systems.len());
    Ok(Header {
        version,
        text,
        systems,
        index,
    })
}

type Tables = (Vec<SystemCodes>, [u8; 32]);

fn declare(tables: &mut Tables, letters: &[u8], entry: SystemCodes) {
    tables.0.push(entry);
    let pos = tables.0.len() as u8;
    for &letter in letters {
        tables.1[usize::from(letter & 31)] = pos;
    }
}

fn detect_version(text: &str) -> Result<Version, Error> {
    let line = text.lines().next().ok_or(Error::BadFormat)?;
    let major = match &line.as_bytes()[0..7] {
        b"     2." => 2,
        b"     3." => 3,
        _ => return Err(Error::UnknownVersion),
    };
    let minor = parse_uint(&line.as_bytes()[7..9]).unwrap_or(0) as u8;
    Ok(Version { major, minor })
}

/// 2.x: one `# / TYPES OF OBSERV` table shared by every system the
/// file declares at column 40 of the version line.
fn parse_v2_tables(text: &str) -> Result<Tables, Error> {
    let mut tables = (Vec::new(), [0; 32]);
    let lines: Vec<&str> = text.lines().collect();
    let attribution = lines[0].as_bytes().get(40).copied().unwrap_or(b' ');
    if !b" GRSEM".contains(&attribution) {
        return Err(Error::BadFormat);
    }

    let start = lines
        .iter()
        .position(|l| is_label(l, TYPES_OF_OBSERV))
        .ok_or(Error::BadFormat)?;
    let n_obs = parse_uint(&lines[start].as_bytes()[0..6]).map_err(|_| Error::BadFormat)?;
    if n_obs < 1 {
        return Err(Error::BadFormat);
    }

    let mut codes = Vec::with_capacity(n_obs as usize);
    let mut line_no = start;
    while codes.len() < n_obs as usize {
        let line = lines.get(line_no).copied().unwrap_or("");
        if line_no > start && !is_label(line, TYPES_OF_OBSERV) {
            return Err(Error::BadFormat);
        }
        for jj in 0..9 {
            if codes.len() == n_obs as usize {
                break;
            }
            codes.push(code_at(line.as_bytes(), 10 + 6 * jj, 2));
        }
        line_no += 1;
    }

    let letters: &[u8] = match attribution {
        b'M' => b" GRSE",
        b' ' => b" G",
        _ => std::slice::from_ref(&attribution),
    };
    declare(
        &mut tables,
        letters,
        SystemCodes {
            system: attribution,
            codes,
        },
    );
    Ok(tables)
}

/// 3.x: repeated `SYS / # / OBS TYPES` lines, one table per system,
/// continuation lines blank at column 0.
fn parse_v3_tables(text: &str) -> Result<Tables, Error> {
    let mut tables = (Vec::new(), [0; 32]);
    let lines: Vec<&str> = text.lines().collect();
    let mut line_no = lines
        .iter()
        .position(|l| is_label(l, SYS_OBS_TYPES))
        .ok_or(Error::BadFormat)?;

    while line_no < lines.len() && is_label(lines[line_no], SYS_OBS_TYPES) {
        let mut bytes = lines[line_no].as_bytes();
        let system = bytes[0];
        if system == b' ' {
            return Err(Error::BadFormat);
        }
        let n_obs = parse_uint(&bytes[3..6]).map_err(|_| Error::BadFormat)?;
        if n_obs < 1 {
            return Err(Error::BadFormat);
        }

        let mut codes = Vec::with_capacity(n_obs as usize);
        while codes.len() < n_obs as usize {
            for jj in 0..13 {
                if codes.len() == n_obs as usize {
                    break;
                }
                codes.push(code_at(bytes, 7 + 4 * jj, 3));
            }
            if codes.len() < n_obs as usize {
                line_no += 1;
                let line = lines.get(line_no).copied().unwrap_or("");
                if !is_label(line, SYS_OBS_TYPES) || !line.starts_with(' ') {
                    return Err(Error::BadFormat);
                }
                bytes = line.as_bytes();
            }
        }

        declare(&mut tables, &[system], SystemCodes { system, codes });
        line_no += 1;
    }
    Ok(tables)
}

fn is_label(line: &str, label: &str) -> bool {
    line.len() == 60 + label.len() && &line[60..] == label
}

fn code_at(line: &[u8], ofs: usize, width: usize) -> ObsCode {
    if ofs >= line.len() {
        return ObsCode::default();
    }
    ObsCode::from_slice(&line[ofs..line.len().min(ofs + width)])
}
