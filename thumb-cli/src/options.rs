use clap::{Args, Parser, Subcommand};
use thumb_core::{ThumbConfig, ThumbConfigSnapshot, ENV_PREFIX};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";

/// Generate JPEG thumbnails with an external converter, streaming the
/// original and the thumbnail to object storage.
#[derive(Parser, Debug)]
#[command(name = "generate-thumbnail")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command. Unset flags fall back to `THUMB__*`
/// environment variables, then to built-in defaults.
#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// S3 API endpoint (path-style addressing is used when set)
    #[arg(long, global = true)]
    pub s3_service_url: Option<String>,

    /// Maximum thumbnail width [default: 200]
    #[arg(long, global = true)]
    pub max_thumbnail_width: Option<u32>,

    /// Maximum thumbnail height [default: 200]
    #[arg(long, global = true)]
    pub max_thumbnail_height: Option<u32>,

    /// Path to the ImageMagick convert utility [default: convert]
    #[arg(long, global = true)]
    pub convert_path: Option<String>,

    /// Multipart upload part size in bytes [default: 5242880]
    #[arg(long, global = true)]
    pub part_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch the HTTP conversion service
    Server(ServerArgs),

    /// Convert one input into one or more outputs
    Console(ConsoleArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Bucket receiving originals and thumbnails
    #[arg(long)]
    pub s3_bucket_name: Option<String>,

    /// Address to listen on [default: 127.0.0.1:5000]
    #[arg(long)]
    pub listen: Option<String>,

    /// Public base URL used in X-Fullsize / X-Thumbnail
    #[arg(long)]
    pub s3_public_endpoint: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    /// File name, web URL, or "stdin" / "-"
    pub input: String,

    /// File name, s3://bucket/key, or "stdout" / "-"
    #[arg(required = true, num_args = 1..=10)]
    pub outputs: Vec<String>,
}

impl Cli {
    /// Defaults, then the process environment, then flags.
    pub fn config(&self) -> ThumbConfigSnapshot {
        let mut config = ThumbConfig::new();
        config.load_env(ENV_PREFIX);
        self.apply(&mut config);
        config.snapshot()
    }

    fn apply(&self, config: &mut ThumbConfig) {
        let common = &self.common;
        config.set_opt("s3.service_url", common.s3_service_url.clone());
        config.set_opt("filter.max_width", common.max_thumbnail_width.map(|v| v.to_string()));
        config.set_opt("filter.max_height", common.max_thumbnail_height.map(|v| v.to_string()));
        config.set_opt("filter.convert_path", common.convert_path.clone());
        config.set_opt("upload.part_size", common.part_size.map(|v| v.to_string()));

        if let Command::Server(server) = &self.command {
            config.set_opt("s3.bucket", server.s3_bucket_name.clone());
            config.set_opt("s3.public_endpoint", server.s3_public_endpoint.clone());
            config.set_opt("http.listen", server.listen.clone());
        }
        config.set_default("http.listen", DEFAULT_LISTEN);
    }
}
