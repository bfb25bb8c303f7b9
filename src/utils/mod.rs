//! Serde helpers shared by the data model.

pub mod bytes_base64;
pub mod time;
