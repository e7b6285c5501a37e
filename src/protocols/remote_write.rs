//! Prometheus remote-write, version 0.1.0.
//!
//! The request body is a protobuf `WriteRequest` compressed with snappy's
//! block format. Only the four messages remote-write 0.1.0 needs are covered:
//!
//! ```text
//! WriteRequest { repeated TimeSeries timeseries = 1; }
//! TimeSeries   { repeated Label labels = 1; repeated Sample samples = 2; }
//! Label        { string name = 1; string value = 2; }
//! Sample       { double value = 1; int64 timestamp = 2; }
//! ```
//!
//! Messages are written field by field onto a `CodedOutputStream` rather than
//! through generated code. Every field is written, defaults included.

use crate::metric::SeriesBatch;
use protobuf::wire_format::WireType;
use protobuf::{CodedInputStream, CodedOutputStream, ProtobufError};
use std::error;
use std::fmt;

/// Failures encoding or decoding a remote-write body.
#[derive(Debug)]
pub enum WireError {
    /// The protobuf stream could not be written or read.
    Protobuf(ProtobufError),
    /// Snappy compression or decompression failed.
    Snappy(snap::Error),
    /// A field number / wire type pair the message does not define.
    UnexpectedField {
        /// The message being decoded.
        message: &'static str,
        /// The offending field number.
        field: u32,
    },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            WireError::Protobuf(ref e) => write!(f, "protobuf: {}", e),
            WireError::Snappy(ref e) => write!(f, "snappy: {}", e),
            WireError::UnexpectedField { message, field } => {
                write!(f, "unexpected field {} in {}", field, message)
            }
        }
    }
}

impl error::Error for WireError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            WireError::Protobuf(ref e) => Some(e),
            WireError::Snappy(ref e) => Some(e),
            WireError::UnexpectedField { .. } => None,
        }
    }
}

impl From<ProtobufError> for WireError {
    fn from(e: ProtobufError) -> WireError {
        WireError::Protobuf(e)
    }
}

impl From<snap::Error> for WireError {
    fn from(e: snap::Error) -> WireError {
        WireError::Snappy(e)
    }
}

/// A remote-write request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteRequest {
    /// The series carried by this request.
    pub timeseries: Vec<TimeSeries>,
}

/// One series and its samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeries {
    /// Labels, `__name__` first.
    pub labels: Vec<Label>,
    /// Samples in arrival order.
    pub samples: Vec<Sample>,
}

/// A label pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

/// A single value at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sample {
    /// The value.
    pub value: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

fn varint_size(mut v: u64) -> u32 {
    let mut size = 1;
    while v >= 0x80 {
        v >>= 7;
        size += 1;
    }
    size
}

// All field numbers used here are below 16, their tags take one byte.
fn bytes_field_size(len: u32) -> u32 {
    1 + varint_size(u64::from(len)) + len
}

impl Label {
    fn compute_size(&self) -> u32 {
        bytes_field_size(self.name.len() as u32) + bytes_field_size(self.value.len() as u32)
    }

    fn write_to(&self, os: &mut CodedOutputStream) -> Result<(), WireError> {
        os.write_string(1, &self.name)?;
        os.write_string(2, &self.value)?;
        Ok(())
    }

    fn parse(bytes: &[u8]) -> Result<Label, WireError> {
        let mut is = CodedInputStream::from_bytes(bytes);
        let mut label = Label::default();
        while !is.eof()? {
            match is.read_tag_unpack()? {
                (1, WireType::WireTypeLengthDelimited) => label.name = is.read_string()?,
                (2, WireType::WireTypeLengthDelimited) => label.value = is.read_string()?,
                (field, _) => {
                    return Err(WireError::UnexpectedField {
                        message: "Label",
                        field,
                    })
                }
            }
        }
        Ok(label)
    }
}

impl Sample {
    fn compute_size(&self) -> u32 {
        (1 + 8) + (1 + varint_size(self.timestamp as u64))
    }

    fn write_to(&self, os: &mut CodedOutputStream) -> Result<(), WireError> {
        os.write_double(1, self.value)?;
        os.write_int64(2, self.timestamp)?;
        Ok(())
    }

    fn parse(bytes: &[u8]) -> Result<Sample, WireError> {
        let mut is = CodedInputStream::from_bytes(bytes);
        let mut sample = Sample::default();
        while !is.eof()? {
            match is.read_tag_unpack()? {
                (1, WireType::WireTypeFixed64) => sample.value = is.read_double()?,
                (2, WireType::WireTypeVarint) => sample.timestamp = is.read_int64()?,
                (field, _) => {
                    return Err(WireError::UnexpectedField {
                        message: "Sample",
                        field,
                    })
                }
            }
        }
        Ok(sample)
    }
}

impl TimeSeries {
    fn compute_size(&self) -> u32 {
        let labels: u32 = self
            .labels
            .iter()
            .map(|l| bytes_field_size(l.compute_size()))
            .sum();
        let samples: u32 = self
            .samples
            .iter()
            .map(|s| bytes_field_size(s.compute_size()))
            .sum();
        labels + samples
    }

    fn write_to(&self, os: &mut CodedOutputStream) -> Result<(), WireError> {
        for label in &self.labels {
            os.write_tag(1, WireType::WireTypeLengthDelimited)?;
            os.write_raw_varint32(label.compute_size())?;
            label.write_to(os)?;
        }
        for sample in &self.samples {
            os.write_tag(2, WireType::WireTypeLengthDelimited)?;
            os.write_raw_varint32(sample.compute_size())?;
            sample.write_to(os)?;
        }
        Ok(())
    }

    fn parse(bytes: &[u8]) -> Result<TimeSeries, WireError> {
        let mut is = CodedInputStream::from_bytes(bytes);
        let mut series = TimeSeries::default();
        while !is.eof()? {
            match is.read_tag_unpack()? {
                (1, WireType::WireTypeLengthDelimited) => {
                    let buf = is.read_bytes()?;
                    series.labels.push(Label::parse(&buf)?);
                }
                (2, WireType::WireTypeLengthDelimited) => {
                    let buf = is.read_bytes()?;
                    series.samples.push(Sample::parse(&buf)?);
                }
                (field, _) => {
                    return Err(WireError::UnexpectedField {
                        message: "TimeSeries",
                        field,
                    })
                }
            }
        }
        Ok(series)
    }

    /// Value of the label called `name`, if present.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }
}

impl WriteRequest {
    /// Build the request for a grouped batch. Series keep the batch's order
    /// and each series' labels are `__name__` followed by the rest in key
    /// order.
    pub fn from_batch(batch: &SeriesBatch) -> WriteRequest {
        let timeseries = batch
            .iter()
            .map(|&(ref key, ref points)| TimeSeries {
                labels: key
                    .pairs()
                    .iter()
                    .map(|&(ref name, ref value)| Label {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                samples: points
                    .iter()
                    .map(|p| Sample {
                        value: p.value,
                        timestamp: p.timestamp_ms,
                    })
                    .collect(),
            })
            .collect();
        WriteRequest { timeseries }
    }

    /// Total samples over every series.
    pub fn sample_count(&self) -> usize {
        self.timeseries.iter().map(|ts| ts.samples.len()).sum()
    }

    /// Serialized size in bytes.
    pub fn compute_size(&self) -> u32 {
        self.timeseries
            .iter()
            .map(|ts| bytes_field_size(ts.compute_size()))
            .sum()
    }

    /// Serialize to protobuf bytes, uncompressed.
    pub fn write_to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(self.compute_size() as usize);
        {
            let mut os = CodedOutputStream::vec(&mut buf);
            for ts in &self.timeseries {
                os.write_tag(1, WireType::WireTypeLengthDelimited)?;
                os.write_raw_varint32(ts.compute_size())?;
                ts.write_to(&mut os)?;
            }
            os.flush()?;
        }
        Ok(buf)
    }

    /// Parse uncompressed protobuf bytes.
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<WriteRequest, WireError> {
        let mut is = CodedInputStream::from_bytes(bytes);
        let mut req = WriteRequest::default();
        while !is.eof()? {
            match is.read_tag_unpack()? {
                (1, WireType::WireTypeLengthDelimited) => {
                    let buf = is.read_bytes()?;
                    req.timeseries.push(TimeSeries::parse(&buf)?);
                }
                (field, _) => {
                    return Err(WireError::UnexpectedField {
                        message: "WriteRequest",
                        field,
                    })
                }
            }
        }
        Ok(req)
    }

    /// Serialize and snappy-compress, ready to POST.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        compress(&self.write_to_bytes()?)
    }

    /// Decompress and parse a body as it arrives over HTTP.
    pub fn decode(body: &[u8]) -> Result<WriteRequest, WireError> {
        WriteRequest::parse_from_bytes(&decompress(body)?)
    }
}

/// Snappy block-format compression.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, WireError> {
    Ok(snap::raw::Encoder::new().compress_vec(bytes)?)
}

/// Snappy block-format decompression.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, WireError> {
    Ok(snap::raw::Decoder::new().decompress_vec(bytes)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metric::{Labels, Sample as MetricSample, SeriesBatch};

    fn rail(metric: &str, component: &str, value: f64, ts: i64) -> MetricSample {
        let labels: Labels = vec![("component", component), ("source", "agx-orin")]
            .into_iter()
            .collect();
        MetricSample::with_labels(metric, labels, value, ts).unwrap()
    }

    #[test]
    fn label_bytes_match_protobuf_layout() {
        let req = WriteRequest {
            timeseries: vec![TimeSeries {
                labels: vec![Label {
                    name: "a".into(),
                    value: "b".into(),
                }],
                samples: vec![Sample {
                    value: 1.0,
                    timestamp: 1,
                }],
            }],
        };
        let bytes = req.write_to_bytes().unwrap();
        let expected: Vec<u8> = vec![
            0x0a, 0x15, // timeseries, 21 bytes
            0x0a, 0x06, 0x0a, 0x01, b'a', 0x12, 0x01, b'b', // label
            0x12, 0x0b, 0x09, 0, 0, 0, 0, 0, 0, 0xf0, 0x3f, 0x10, 0x01, // sample
        ];
        assert_eq!(expected, bytes);
        assert_eq!(bytes.len() as u32, req.compute_size());
    }

    #[test]
    fn request_from_batch_has_name_label_first() {
        let samples = vec![
            rail("agx_orin_power_watts", "GPU", 10.0, 1_735_689_600_000),
            rail("agx_orin_power_watts", "GPU", 11.0, 1_735_689_600_100),
            rail("agx_orin_voltage_volts", "GPU", 5.0, 1_735_689_600_000),
        ];
        let batch = SeriesBatch::from_samples(&samples);
        let req = WriteRequest::from_batch(&batch);

        assert_eq!(2, req.timeseries.len());
        assert_eq!(3, req.sample_count());
        let names: Vec<&str> = req.timeseries[0]
            .labels
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(vec!["__name__", "component", "source"], names);
        assert_eq!(Some("agx_orin_power_watts"), req.timeseries[0].label("__name__"));
        assert_eq!(
            vec![
                Sample { value: 10.0, timestamp: 1_735_689_600_000 },
                Sample { value: 11.0, timestamp: 1_735_689_600_100 },
            ],
            req.timeseries[0].samples
        );
    }

    #[test]
    fn encoded_body_decodes_to_same_request() {
        let samples = vec![
            rail("power", "CPU", 3.5, 42),
            rail("power", "total", 0.0, 0),
            rail("current", "CPU", -0.25, 1_762_678_050_123),
        ];
        let req = WriteRequest::from_batch(&SeriesBatch::from_samples(&samples));
        let body = req.encode().unwrap();
        assert_eq!(req, WriteRequest::decode(&body).unwrap());
    }

    #[test]
    fn empty_request_is_empty_body() {
        let req = WriteRequest::default();
        assert!(req.write_to_bytes().unwrap().is_empty());
        assert_eq!(req, WriteRequest::decode(&req.encode().unwrap()).unwrap());
    }

    #[test]
    fn unknown_field_is_an_error() {
        // field 3, varint 1
        let bytes = vec![0x18, 0x01];
        match WriteRequest::parse_from_bytes(&bytes) {
            Err(WireError::UnexpectedField { message, field }) => {
                assert_eq!("WriteRequest", message);
                assert_eq!(3, field);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn garbage_is_not_snappy() {
        assert!(decompress(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).is_err());
    }
}
