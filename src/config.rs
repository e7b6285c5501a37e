//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that
//! the server can consume and use as configuration data.

use crate::filter::NormalizerConfig;
use crate::sink::RemoteWriteConfig;
use crate::source::{Collector, Command, CommandConfig, Null};
use clap::{App, Arg};
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::time::Duration;
use url::Url;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

/// Why the configuration could not be read.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Io {
        /// Path of the file.
        path: String,
        /// The underlying error.
        err: io::Error,
    },
    /// The config file is not valid TOML.
    Toml(toml::de::Error),
    /// A key holds a value that cannot be used.
    InvalidValue {
        /// The offending key, dotted for nested tables.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::Io { ref path, ref err } => {
                write!(f, "could not read config file {}: {}", path, err)
            }
            ConfigError::Toml(ref e) => write!(f, "could not parse config file: {}", e),
            ConfigError::InvalidValue { ref key, ref reason } => {
                write!(f, "invalid value for {}: {}", key, reason)
            }
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            ConfigError::Io { ref err, .. } => Some(err),
            ConfigError::Toml(ref e) => Some(e),
            ConfigError::InvalidValue { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> ConfigError {
        ConfigError::Toml(e)
    }
}

fn invalid<K, R>(key: K, reason: R) -> ConfigError
where
    K: Into<String>,
    R: Into<String>,
{
    ConfigError::InvalidValue {
        key: key.into(),
        reason: reason.into(),
    }
}

/// Which collector feeds the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum CollectorConfig {
    /// See `source::Null`.
    Null,
    /// See `source::Command`.
    Command(CommandConfig),
}

impl Default for CollectorConfig {
    fn default() -> CollectorConfig {
        CollectorConfig::Null
    }
}

impl CollectorConfig {
    /// Build the configured collector.
    pub fn build(self) -> Box<dyn Collector + Send> {
        match self {
            CollectorConfig::Null => Box::new(Null::new()),
            CollectorConfig::Command(config) => Box::new(Command::new(config)),
        }
    }
}

/// Big configuration struct for the powerpush executable
///
/// This struct is what we construct from parsing the configuration. Every
/// field has a default, an empty config file runs the pipeline with the null
/// collector against the default endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Args {
    /// How often the collector scrapes.
    pub scrape_interval: Duration,
    /// Length of one push cycle.
    pub push_interval: Duration,
    /// Capacity of the collector to normalizer queue.
    pub raw_queue_capacity: usize,
    /// Capacity of the normalizer to pusher queue.
    pub processed_queue_capacity: usize,
    /// Most failed batches kept for retry.
    pub max_retry_batches: usize,
    /// The remote-write endpoint.
    pub remote_write_url: String,
    /// Bound on every push request.
    pub request_timeout: Duration,
    /// Normalizer policy, metric names and service label included.
    pub normalizer: NormalizerConfig,
    /// The collector to run.
    pub collector: CollectorConfig,
    /// The verbosity setting. The higher the value the more chatty powerpush
    /// gets.
    pub verbose: u64,
    /// Version string. This is set automatically.
    pub version: String,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            scrape_interval: Duration::from_millis(100),
            push_interval: Duration::from_secs(4),
            raw_queue_capacity: 1000,
            processed_queue_capacity: 1000,
            max_retry_batches: 5,
            remote_write_url: "http://prometheus:9090/api/v1/write".to_string(),
            request_timeout: Duration::from_secs(5),
            normalizer: NormalizerConfig::default(),
            collector: CollectorConfig::default(),
            verbose: 0,
            version: VERSION.unwrap_or("unknown").to_string(),
        }
    }
}

impl Args {
    /// The pusher's share of the configuration.
    pub fn remote_write(&self) -> RemoteWriteConfig {
        RemoteWriteConfig {
            push_interval: self.push_interval,
            max_retry_batches: self.max_retry_batches,
        }
    }
}

/// Parse argv.
///
/// This function will read the environment arguments and construct an
/// `Args`. Without `--config` every default applies. See `powerpush --help`
/// for more information.
pub fn parse_args() -> Result<Args, ConfigError> {
    let args = App::new("powerpush")
        .version(VERSION.unwrap_or("unknown"))
        .about("scrapes energy and power readings and ships them over prometheus remote-write")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .help("The config file to feed in.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .get_matches();

    let verb = args.occurrences_of("verbose");

    match args.value_of("config-file") {
        Some(filename) => {
            let mut buffer = String::new();
            File::open(filename)
                .and_then(|mut fp| fp.read_to_string(&mut buffer))
                .map_err(|err| ConfigError::Io {
                    path: filename.to_string(),
                    err,
                })?;
            parse_config_file(&buffer, verb)
        }
        None => {
            let mut args = Args::default();
            args.verbose = verb;
            Ok(args)
        }
    }
}

fn seconds(value: &toml::Value, key: &str) -> Result<Duration, ConfigError> {
    let secs = match *value {
        toml::Value::Integer(i) => i as f64,
        toml::Value::Float(f) => f,
        _ => return Err(invalid(key, "must be a number of seconds")),
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(key, "must be a positive number of seconds"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(key, e.to_string()))
}

fn count(value: &toml::Value, key: &str, min: i64) -> Result<usize, ConfigError> {
    match value.as_integer() {
        Some(i) if i >= min => Ok(i as usize),
        Some(_) => Err(invalid(key, format!("must be at least {}", min))),
        None => Err(invalid(key, "must be an integer")),
    }
}

fn string(value: &toml::Value, key: &str) -> Result<String, ConfigError> {
    match value.as_str() {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        Some(_) => Err(invalid(key, "must not be empty")),
        None => Err(invalid(key, "must be a string")),
    }
}

fn endpoint(value: &toml::Value, key: &str) -> Result<String, ConfigError> {
    let raw = string(value, key)?;
    let url = Url::parse(&raw).map_err(|e| invalid(key, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(raw),
        other => Err(invalid(key, format!("unsupported scheme {:?}", other))),
    }
}

fn collector(value: &toml::Value) -> Result<CollectorConfig, ConfigError> {
    let kind = match value.get("kind") {
        Some(k) => string(k, "collector.kind")?,
        None => return Err(invalid("collector.kind", "must be set")),
    };
    match kind.as_str() {
        "null" => Ok(CollectorConfig::Null),
        "command" => {
            let argv = value
                .get("command")
                .and_then(|c| c.as_array())
                .ok_or_else(|| invalid("collector.command", "must be an array of strings"))?;
            let mut argv = argv
                .iter()
                .map(|a| string(a, "collector.command"))
                .collect::<Result<Vec<String>, ConfigError>>()?
                .into_iter();
            match argv.next() {
                Some(program) => Ok(CollectorConfig::Command(CommandConfig {
                    program,
                    args: argv.collect(),
                })),
                None => Err(invalid("collector.command", "must name a program")),
            }
        }
        other => Err(invalid(
            "collector.kind",
            format!("unknown collector {:?}", other),
        )),
    }
}

/// Parse the powerpush configuration file.
///
/// Keys are optional, anything left out keeps its default. Durations are in
/// seconds and may be fractional.
pub fn parse_config_file(buffer: &str, verbosity: u64) -> Result<Args, ConfigError> {
    let mut args = Args::default();
    let value: toml::Value = toml::from_str(buffer)?;

    args.verbose = verbosity;

    if let Some(v) = value.get("scrape-interval") {
        args.scrape_interval = seconds(v, "scrape-interval")?;
    }
    if let Some(v) = value.get("push-interval") {
        args.push_interval = seconds(v, "push-interval")?;
    }
    if let Some(v) = value.get("request-timeout") {
        args.request_timeout = seconds(v, "request-timeout")?;
    }
    if let Some(v) = value.get("raw-queue-capacity") {
        args.raw_queue_capacity = count(v, "raw-queue-capacity", 1)?;
    }
    if let Some(v) = value.get("processed-queue-capacity") {
        args.processed_queue_capacity = count(v, "processed-queue-capacity", 1)?;
    }
    if let Some(v) = value.get("max-retry-batches") {
        args.max_retry_batches = count(v, "max-retry-batches", 0)?;
    }
    if let Some(v) = value.get("remote-write-url") {
        args.remote_write_url = endpoint(v, "remote-write-url")?;
    }

    if let Some(tbl) = value.get("normalizer") {
        args.normalizer = tbl
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| invalid("normalizer", e.to_string()))?;
    }
    if let Some(v) = value.get("default-metric") {
        args.normalizer.default_metric = string(v, "default-metric")?;
    }
    if let Some(v) = value.get("service-label") {
        args.normalizer.service_label = string(v, "service-label")?;
    }

    if let Some(tbl) = value.get("collector") {
        args.collector = collector(tbl)?;
    }

    Ok(args)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::TotalPower;

    #[test]
    fn config_file_empty_is_defaults() {
        let args = parse_config_file("", 2).unwrap();
        let mut expected = Args::default();
        expected.verbose = 2;
        assert_eq!(expected, args);
        assert_eq!(Duration::from_millis(100), args.scrape_interval);
        assert_eq!(Duration::from_secs(4), args.push_interval);
        assert_eq!(1000, args.raw_queue_capacity);
        assert_eq!(1000, args.processed_queue_capacity);
        assert_eq!(5, args.max_retry_batches);
        assert_eq!("http://prometheus:9090/api/v1/write", args.remote_write_url);
        assert_eq!(Duration::from_secs(5), args.request_timeout);
        assert_eq!(CollectorConfig::Null, args.collector);
    }

    #[test]
    fn config_file_top_level_keys() {
        let config = r#"
scrape-interval = 0.25
push-interval = 10
raw-queue-capacity = 16
processed-queue-capacity = 32
max-retry-batches = 0
remote-write-url = "https://tsdb.example.com/api/v1/write"
request-timeout = 1.5
default-metric = "energy_uj"
service-label = "cpu-pyjoules"
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(Duration::from_millis(250), args.scrape_interval);
        assert_eq!(Duration::from_secs(10), args.push_interval);
        assert_eq!(16, args.raw_queue_capacity);
        assert_eq!(32, args.processed_queue_capacity);
        assert_eq!(0, args.max_retry_batches);
        assert_eq!("https://tsdb.example.com/api/v1/write", args.remote_write_url);
        assert_eq!(Duration::from_millis(1500), args.request_timeout);
        assert_eq!("energy_uj", args.normalizer.default_metric);
        assert_eq!("cpu-pyjoules", args.normalizer.service_label);
        assert_eq!(
            RemoteWriteConfig {
                push_interval: Duration::from_secs(10),
                max_retry_batches: 0,
            },
            args.remote_write()
        );
    }

    #[test]
    fn config_file_normalizer_section() {
        let config = r#"
service-label = "agx-orin"

[normalizer]
duration-metric = "pyjoules_remote_write_duration_s"
service-label = "ignored"

[normalizer.total-power]
mode = "computed"
exclude = ["VDDQ_VDD2_1V8AO"]
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(
            Some("pyjoules_remote_write_duration_s".to_string()),
            args.normalizer.duration_metric
        );
        assert_eq!("agx-orin", args.normalizer.service_label);
        assert_eq!(
            TotalPower::Computed {
                exclude: vec!["VDDQ_VDD2_1V8AO".to_string()],
            },
            args.normalizer.total_power
        );
    }

    #[test]
    fn config_file_command_collector() {
        let config = r#"
[collector]
kind = "command"
command = ["/usr/local/bin/read-rails", "--json"]
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(
            CollectorConfig::Command(CommandConfig {
                program: "/usr/local/bin/read-rails".to_string(),
                args: vec!["--json".to_string()],
            }),
            args.collector
        );
    }

    #[test]
    fn config_file_rejects_bad_values() {
        let cases = vec![
            ("scrape-interval = 0", "scrape-interval"),
            ("push-interval = \"soon\"", "push-interval"),
            ("push-interval = 1e20", "push-interval"),
            ("request-timeout = 1e300", "request-timeout"),
            ("raw-queue-capacity = 0", "raw-queue-capacity"),
            ("max-retry-batches = -1", "max-retry-batches"),
            ("remote-write-url = \"not a url\"", "remote-write-url"),
            ("remote-write-url = \"ftp://host/write\"", "remote-write-url"),
            ("default-metric = \"\"", "default-metric"),
            ("[normalizer]\nbogus = 1", "normalizer"),
            ("[collector]\nkind = \"sysfs\"", "collector.kind"),
            ("[collector]\nkind = \"command\"\ncommand = []", "collector.command"),
            ("[collector]\nkind = \"command\"", "collector.command"),
            ("[collector]\ncommand = [\"x\"]", "collector.kind"),
        ];
        for (config, expected_key) in cases {
            match parse_config_file(config, 0) {
                Err(ConfigError::InvalidValue { key, .. }) => {
                    assert_eq!(expected_key, key, "config: {}", config)
                }
                other => panic!("config {:?} gave {:?}", config, other),
            }
        }
    }

    #[test]
    fn config_file_not_toml() {
        match parse_config_file("scrape-interval = = 1", 0) {
            Err(ConfigError::Toml(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
