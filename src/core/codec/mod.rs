#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Codecs: byte/base64 conversion and the signal-packet envelope.

pub mod bytes;
pub mod envelope;
