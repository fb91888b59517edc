#![warn(deprecated_in_future)]
#![warn(future_incompatible)]
#![warn(missing_copy_implementations)]
#![warn(missing_docs)]
#![warn(nonstandard_style)]
#![warn(rust_2018_compatibility)]
#![warn(rust_2018_idioms)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused)]

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::redundant_else)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::wildcard_imports)]

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

#![deny(unsafe_code)]


//! The DNS crate is the protocol half of the library: messages, records,
//! and names, in their wire, presentation, and JSON formats. It never
//! touches a socket; bytes go in and come out, and the resolver crate
//! decides where they travel.


mod types;
pub use self::types::*;

mod name;
pub use self::name::{Name, NameError, MAX_NAME_SIZE, MAX_LABEL_SIZE};

mod bitmap;
pub use self::bitmap::TypeBitmap;

mod wire;
pub use self::wire::{Compressor, WireError, MandatedLength};

mod message;
pub use self::message::Message;

mod transcript;
pub use self::transcript::{TranscriptError, record_from_line, zone_records};

pub mod record;
