#![allow(unknown_lints)]

#[macro_use]
extern crate log;

use chrono::Utc;
use powerpush::filter::{FILTER_DROPPED_RECORDS, FILTER_RECORDS, FILTER_SAMPLES,
                        FILTER_SKIPPED_READINGS};
use powerpush::mpsc::QUEUE_DROPS;
use powerpush::server::Pipeline;
use powerpush::sink::{RemoteWrite, BACKLOG_EVICTED_SAMPLES, SINK_DELIVERED_SAMPLES,
                      SINK_PUSH_FAILURE, SINK_PUSH_SUCCESS};
use powerpush::source::{SOURCE_RECORDS, SOURCE_SCRAPE_ERRORS};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    let args = match powerpush::config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("powerpush: {}", e);
            process::exit(1);
        }
    };

    let level = match args.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // Must happen before any thread is spawned so every thread inherits the
    // blocked signal mask.
    let signal =
        chan_signal::notify(&[chan_signal::Signal::INT, chan_signal::Signal::TERM]);

    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply();
    if let Err(e) = logger {
        eprintln!("powerpush: could not set up logging: {}", e);
        process::exit(1);
    }

    info!("powerpush - {}", args.version);
    info!(
        "pushing to {} every {:?}, scraping every {:?}",
        args.remote_write_url, args.push_interval, args.scrape_interval
    );

    let pipeline = match Pipeline::start(&args, args.collector.clone().build()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("could not start pipeline threads: {}", e);
            process::exit(1);
        }
    };

    let signalled = Arc::new(AtomicBool::new(false));
    {
        let stop = pipeline.stop();
        let signalled = Arc::clone(&signalled);
        let spawned = std::thread::Builder::new()
            .name("signal".to_string())
            .spawn(move || {
                if let Some(sig) = signal.recv() {
                    info!("received {:?}; shutting down", sig);
                    signalled.store(true, Ordering::Release);
                    stop.set();
                }
            });
        if let Err(e) = spawned {
            error!("could not start signal handler: {}", e);
            pipeline.supervisor.shutdown();
            process::exit(1);
        }
    }

    let mut pusher =
        RemoteWrite::http(&args.remote_write_url, args.request_timeout, args.remote_write());
    pipeline.push_with(&mut pusher);

    info!(
        "scraped {} records ({} scrape errors); normalized {} into {} samples \
         ({} records dropped, {} readings skipped); {} queue drops",
        SOURCE_RECORDS.load(Ordering::Relaxed),
        SOURCE_SCRAPE_ERRORS.load(Ordering::Relaxed),
        FILTER_RECORDS.load(Ordering::Relaxed),
        FILTER_SAMPLES.load(Ordering::Relaxed),
        FILTER_DROPPED_RECORDS.load(Ordering::Relaxed),
        FILTER_SKIPPED_READINGS.load(Ordering::Relaxed),
        QUEUE_DROPS.load(Ordering::Relaxed),
    );
    info!(
        "pushed {} samples in {} requests; {} failed requests; {} samples evicted from backlog",
        SINK_DELIVERED_SAMPLES.load(Ordering::Relaxed),
        SINK_PUSH_SUCCESS.load(Ordering::Relaxed),
        SINK_PUSH_FAILURE.load(Ordering::Relaxed),
        BACKLOG_EVICTED_SAMPLES.load(Ordering::Relaxed),
    );

    if !signalled.load(Ordering::Acquire) {
        error!("pipeline stopped without a shutdown signal");
        process::exit(1);
    }
}
