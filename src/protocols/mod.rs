//! The wire protocols powerpush speaks. Only the output side has one: raw
//! records arrive as JSON objects and need no protocol module of their own.

pub mod remote_write;
