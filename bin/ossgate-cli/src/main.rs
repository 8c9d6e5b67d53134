//! ossgate CLI - sign direct-upload forms and check upload callbacks
//!
//! Credentials and defaults come from a TOML config file; flags override it.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use http::{HeaderMap, HeaderValue};
use ossgate_auth::verifier::{AUTHORIZATION_HEADER, PUB_KEY_URL_HEADER};
use ossgate_auth::{
    AccountContext, CallbackVerifier, DirectUploadSigner, InboundRequest, StaticKeyFetcher,
    UploadConfig,
};
use ossgate_common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ossgate-cli")]
#[command(about = "Direct-upload signing and callback verification")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/ossgate/ossgate.toml")]
    config: PathBuf,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a signed upload form as JSON
    Authorize {
        /// Key prefix uploads must start with
        #[arg(long)]
        dir: Option<String>,
        /// Policy lifetime in seconds
        #[arg(long)]
        expire: Option<i64>,
        /// Maximum object size in bytes
        #[arg(long)]
        max_size: Option<i64>,
        /// Callback URL
        #[arg(long)]
        callback_url: Option<String>,
        /// Custom callback variable (repeatable)
        #[arg(long = "custom", value_parser = parse_key_val)]
        custom: Vec<(String, String)>,
        /// System callback field override, e.g. filename='${object}' (repeatable)
        #[arg(long = "system", value_parser = parse_key_val)]
        system: Vec<(String, String)>,
        /// Pin the bucket in the policy
        #[arg(long, default_value_t = false)]
        bind_bucket: bool,
    },
    /// Verify a captured upload callback
    Verify {
        /// Raw request target (path and query)
        #[arg(long)]
        uri: String,
        /// File holding the raw request body
        #[arg(long)]
        body_file: PathBuf,
        /// Value of the Authorization header
        #[arg(long)]
        authorization: String,
        /// Value of the x-oss-pub-key-url header
        #[arg(long)]
        pub_key_url: String,
        /// Use this PEM public key instead of downloading it
        #[arg(long)]
        public_key_file: Option<PathBuf>,
    },
    /// Print the public URL of an object
    Url {
        /// Object key
        key: String,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Commands::Authorize {
            dir,
            expire,
            max_size,
            callback_url,
            custom,
            system,
            bind_bucket,
        } => {
            config.account.validate()?;
            let mut upload = UploadConfig::from(&config.upload);
            if let Some(dir) = dir {
                upload.key_prefix = dir;
            }
            if let Some(expire) = expire {
                upload.expire_seconds = expire;
            }
            if let Some(max_size) = max_size {
                upload.max_content_length = max_size;
            }
            if let Some(callback_url) = callback_url {
                upload.callback_url = callback_url;
            }
            upload.bind_bucket |= bind_bucket;
            upload.system_field_overrides.extend(system);
            upload.custom_fields.extend(custom);

            let signer = DirectUploadSigner::new(Arc::new(AccountContext::from(&config.account)));
            let form = signer.authorize(&upload)?;
            info!("signed upload form for {}", form.host);
            println!("{}", serde_json::to_string_pretty(&form)?);
        }
        Commands::Verify {
            uri,
            body_file,
            authorization,
            pub_key_url,
            public_key_file,
        } => {
            let body = std::fs::read(&body_file)
                .with_context(|| format!("failed to read {}", body_file.display()))?;

            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION_HEADER, HeaderValue::from_str(&authorization)?);
            headers.insert(PUB_KEY_URL_HEADER, HeaderValue::from_str(&pub_key_url)?);
            let request = InboundRequest::new(headers, uri, body);

            let verifier = match public_key_file {
                Some(path) => {
                    let pem = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    CallbackVerifier::new(Arc::new(StaticKeyFetcher::new(pem)))
                        .with_trusted_key_url_prefixes(Vec::new())
                }
                None => CallbackVerifier::from_config(&config.verifier)?,
            };

            match verifier.verify(&request).await {
                Ok(fields) => println!("{}", serde_json::to_string_pretty(&fields)?),
                Err(rejection) => {
                    println!("{}", serde_json::to_string_pretty(&rejection)?);
                    bail!("callback rejected: {rejection}");
                }
            }
        }
        Commands::Url { key } => {
            let account = AccountContext::from(&config.account);
            println!("{}", account.object_url(&key));
        }
    }

    Ok(())
}
