//! Succinct RINEX observation toolkit.
//!
//! This library reads GNSS observation data from RINEX 2.x / 3.x text
//! files through a streaming, buffer oriented parser, and transcodes
//! the per signal observation streams to and from a compact chunked
//! binary container.
//!
//! The three layers interlock:
//! - [observation::ObsParser] demultiplexes observation text into per
//!   signal integer and indicator streams, one record per `read()`;
//! - [soc::SocWriter] accumulates those streams and lays out the
//!   container; [soc::SocReader] walks a container and serves epochs,
//!   events and per signal streams back;
//! - [transpose] is the bit matrix kernel under the residual codec.
//!
//! ```no_run
//! use srnx::observation::{ObsParser, ReadStatus};
//! use srnx::soc::{SocWriter, WriterOptions};
//! use srnx::stream::MmapStream;
//!
//! fn convert(input: &str, output: &str) -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = MmapStream::open(input)?;
//!     let mut parser = ObsParser::new(stream)?;
//!     let mut writer = SocWriter::new(parser.header(), WriterOptions::default());
//!     while parser.read()? == ReadStatus::Record {
//!         writer.append(&parser.record())?;
//!     }
//!     std::fs::write(output, writer.finish())?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod epoch;
pub mod fields;
pub mod header;
pub mod leb128;
pub mod observable;
pub mod observation;
pub mod soc;
pub mod stream;
pub mod sv;
pub mod transpose;

pub mod prelude {
    pub use crate::epoch::{Epoch, EpochFlag};
    pub use crate::header::{Header, Version};
    pub use crate::observable::ObsCode;
    pub use crate::observation::{ObsParser, ReadStatus, Record};
    pub use crate::soc::{DigestId, ObsReader, SocReader, SocWriter, WriterOptions};
    pub use crate::stream::{BufferedStream, MmapStream, Stream};
    pub use crate::sv::SvName;
}
