//! powerpush scrapes energy and power readings from local sources and ships
//! them to a time-series store over Prometheus remote-write.
//!
//! The pipeline has three stages, each on its own thread:
//!
//!  * a `source::Collector` takes one reading per scrape interval and offers
//!    it onto the raw queue,
//!  * the `filter::Normalizer` turns raw records of any known shape into
//!    canonical samples and offers them onto the processed queue,
//!  * the `sink::RemoteWrite` pusher drains the processed queue on a fixed
//!    cycle, groups samples into series and delivers them, keeping failed
//!    batches in a bounded retry backlog.
//!
//! Queues are bounded and never block for long; a full queue drops and counts.
//! Nothing is persisted, a restart starts empty.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod constants;
pub mod filter;
pub mod http;
pub mod metric;
pub mod mpsc;
pub mod protocols;
pub mod server;
pub mod sink;
pub mod source;
pub mod thread;
pub mod time;
pub mod util;
