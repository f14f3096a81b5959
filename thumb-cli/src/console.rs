//! One-shot conversion: a single input fanned out to up to ten outputs.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use thumb_blob::{MultipartUploadSink, S3MultipartStore, S3Settings, UploadRules};
use thumb_core::{ByteStream, FileSink, ThumbConfigSnapshot, ThumbError, ThumbResult, WriterSink};
use thumb_pipeline::{FanOut, FanOutput, THUMBNAIL_CONTENT_TYPE};

use crate::options::ConsoleArgs;

type Input = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    Url(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputTarget {
    Stdout,
    S3 { bucket: String, key: String },
    File(PathBuf),
}

impl InputSource {
    fn parse(value: &str) -> ThumbResult<Self> {
        if value.starts_with("s3://") {
            return Err(ThumbError::input("Input cannot be an S3 URL"));
        }
        if is_std_stream(value, "stdin") {
            return Ok(Self::Stdin);
        }
        if is_web_url(value) {
            return Ok(Self::Url(value.to_string()));
        }
        Ok(Self::File(PathBuf::from(value)))
    }
}

impl OutputTarget {
    fn parse(value: &str) -> ThumbResult<Self> {
        if is_web_url(value) {
            return Err(ThumbError::input("Output cannot be a Web URL"));
        }
        if is_std_stream(value, "stdout") {
            return Ok(Self::Stdout);
        }
        if let Some(rest) = value.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .filter(|(bucket, key)| is_bucket_name(bucket) && !key.is_empty())
                .ok_or_else(|| ThumbError::input(format!("Invalid S3 URL \"{value}\"")))?;
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(Self::File(PathBuf::from(value)))
    }
}

fn is_std_stream(value: &str, name: &str) -> bool {
    value == "-" || value.eq_ignore_ascii_case(name)
}

fn is_web_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    ["http://", "https://", "ftp://", "ftps://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// S3 bucket naming: 3 to 63 lowercase letters, digits or hyphens,
/// alphanumeric at both ends, without the reserved prefix and suffix.
fn is_bucket_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    (3..=63).contains(&bytes.len())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
        && !name.starts_with("xn--")
        && !name.ends_with("-s3alias")
}

pub async fn run(args: ConsoleArgs, config: ThumbConfigSnapshot) -> Result<()> {
    let source = InputSource::parse(&args.input)?;
    let targets = args
        .outputs
        .iter()
        .map(|value| OutputTarget::parse(value))
        .collect::<ThumbResult<Vec<_>>>()?;

    let input = open_input(&source).await?;
    let outputs = open_outputs(targets, &config).await?;

    let written = FanOut::from_config(&config).run(input, outputs).await?;
    tracing::info!(bytes = written, "thumbnail written");
    Ok(())
}

async fn open_input(source: &InputSource) -> Result<Input> {
    match source {
        InputSource::Stdin => {
            tracing::info!("input from stdin");
            Ok(Box::new(tokio::io::stdin()))
        }
        InputSource::File(path) => {
            tracing::info!(path = %path.display(), "input from file");
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|err| ThumbError::input_with(format!("Unable to open {}", path.display()), err))?;
            Ok(Box::new(file))
        }
        InputSource::Url(url) => {
            if !url.to_ascii_lowercase().starts_with("http") {
                return Err(ThumbError::config(format!("Unsupported input URL scheme: {url}")).into());
            }
            tracing::info!(%url, "input from web URL");
            let response = reqwest::get(url.as_str())
                .await
                .and_then(reqwest::Response::error_for_status)
                .with_context(|| format!("Unable to fetch {url}"))?;
            let body: ByteStream = Box::pin(response.bytes_stream().map_err(io::Error::other));
            Ok(Box::new(StreamReader::new(body)))
        }
    }
}

async fn open_outputs(targets: Vec<OutputTarget>, config: &ThumbConfigSnapshot) -> Result<Vec<FanOutput>> {
    let rules = UploadRules::from_config(config);
    let mut s3: Option<S3MultipartStore> = None;
    let mut outputs = Vec::with_capacity(targets.len());

    for target in targets {
        let output = match target {
            OutputTarget::Stdout => {
                tracing::info!("output to stdout");
                FanOutput::sink(WriterSink::new("stdout", tokio::io::stdout()))
            }
            OutputTarget::File(path) => {
                tracing::info!(path = %path.display(), "output to file");
                FanOutput::sink(FileSink::create(&path).await?)
            }
            OutputTarget::S3 { bucket, key } => {
                let base = match s3.take() {
                    Some(store) => store,
                    None => {
                        let settings = S3Settings::from_config(config);
                        if let Some(url) = settings.service_url.as_deref() {
                            tracing::info!(service_url = %url, "using custom S3 endpoint");
                        }
                        S3MultipartStore::new(S3MultipartStore::client(&settings).await, bucket.as_str())
                    }
                };
                tracing::info!(%bucket, %key, "output to S3");
                let store = Arc::new(base.with_bucket(bucket.as_str()));
                s3 = Some(base);
                let sink = MultipartUploadSink::new(store, key, &rules, Some(THUMBNAIL_CONTENT_TYPE.to_string()))?;
                FanOutput::upload(sink)
            }
        };
        outputs.push(output);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_kinds() {
        assert_eq!(InputSource::parse("-").unwrap(), InputSource::Stdin);
        assert_eq!(InputSource::parse("STDIN").unwrap(), InputSource::Stdin);
        assert_eq!(
            InputSource::parse("https://example.com/cat.png").unwrap(),
            InputSource::Url("https://example.com/cat.png".to_string())
        );
        assert_eq!(
            InputSource::parse("photos/cat.png").unwrap(),
            InputSource::File(PathBuf::from("photos/cat.png"))
        );
    }

    #[test]
    fn s3_input_is_rejected() {
        let err = InputSource::parse("s3://photos/cat.png").unwrap_err();
        assert_eq!(err.to_string(), "Input cannot be an S3 URL");
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn output_kinds() {
        assert_eq!(OutputTarget::parse("stdout").unwrap(), OutputTarget::Stdout);
        assert_eq!(OutputTarget::parse("-").unwrap(), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::parse("s3://my-photos/thumbs/cat.jpg").unwrap(),
            OutputTarget::S3 {
                bucket: "my-photos".to_string(),
                key: "thumbs/cat.jpg".to_string(),
            }
        );
        assert_eq!(
            OutputTarget::parse("cat_thumb.jpg").unwrap(),
            OutputTarget::File(PathBuf::from("cat_thumb.jpg"))
        );
    }

    #[test]
    fn web_url_output_is_rejected() {
        for value in ["http://example.com/out.jpg", "FTP://example.com/out.jpg"] {
            let err = OutputTarget::parse(value).unwrap_err();
            assert_eq!(err.to_string(), "Output cannot be a Web URL");
        }
    }

    #[test]
    fn malformed_s3_outputs_are_rejected() {
        for value in ["s3://Photos/cat.jpg", "s3://ab/cat.jpg", "s3://photos", "s3://photos/", "s3://-photos/x"] {
            assert!(OutputTarget::parse(value).is_err(), "{value}");
        }
        assert!(OutputTarget::parse("s3://xn--photos/x").is_err());
        assert!(OutputTarget::parse("s3://photos-s3alias/x").is_err());
    }

    #[tokio::test]
    async fn missing_input_file_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = InputSource::File(dir.path().join("absent.png"));
        let err = open_input(&source).await.err().unwrap();
        let thumb = err.downcast_ref::<ThumbError>().unwrap();
        assert_eq!(thumb.code(), 400);
    }

    #[tokio::test]
    async fn file_outputs_are_opened_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let targets = vec![
            OutputTarget::File(dir.path().join("a.jpg")),
            OutputTarget::Stdout,
            OutputTarget::File(dir.path().join("b.jpg")),
        ];
        let outputs = open_outputs(targets, &ThumbConfigSnapshot::default()).await.unwrap();
        let names: Vec<_> = outputs.iter().map(FanOutput::name).collect();
        assert!(names[0].ends_with("a.jpg"));
        assert_eq!(names[1], "stdout");
        assert!(names[2].ends_with("b.jpg"));
    }
}
