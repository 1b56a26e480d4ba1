//! Router construction, one module per surface.

pub mod api;
pub mod media;
pub mod telephony;
