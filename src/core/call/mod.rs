#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Call control: the transport capability seam, local media contract,
//! quality ladder, diagnostics log, and the session state machine.

pub mod controller;
pub mod diagnostics;
pub mod media;
pub mod quality;
pub mod transport;
