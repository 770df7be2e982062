use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, fmt, path::PathBuf};

const DEFAULT_PORT: u16 = 5005;
const DEFAULT_MAX_BODY_MB: usize = 50;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub static_dir: Option<PathBuf>,
    pub max_body_bytes: usize,
    pub storage: StorageSettings,
}

/// Which backend keeps the image bytes.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Cloudinary,
    S3,
    Firebase,
}

/// Digest used for Cloudinary request signatures. Accounts default to SHA-1.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Local => "local",
            StorageBackend::Cloudinary => "cloudinary",
            StorageBackend::S3 => "s3",
            StorageBackend::Firebase => "firebase",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything any storage backend might need. Credentials stay optional here;
/// the backend reports what is missing when it is built.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub local: LocalSettings,
    pub cloudinary: CloudinarySettings,
    pub s3: S3Settings,
    pub firebase: FirebaseSettings,
}

#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub uploads_dir: PathBuf,
    /// Base URL that served `/uploads/...` references are built from.
    pub public_url: String,
}

#[derive(Clone, Default)]
pub struct CloudinarySettings {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub folder: String,
    pub signature_algorithm: SignatureAlgorithm,
}

#[derive(Clone, Default)]
pub struct S3Settings {
    pub bucket: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub prefix: String,
    /// Path-style endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint: Option<String>,
}

/// Firebase Storage is a Google Cloud Storage bucket reached with a service
/// account; either the key JSON itself or a path to it is accepted.
#[derive(Clone, Default)]
pub struct FirebaseSettings {
    pub bucket: Option<String>,
    pub service_account_key: Option<String>,
    pub service_account_path: Option<PathBuf>,
    pub prefix: String,
}

impl fmt::Debug for CloudinarySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinarySettings")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &redacted(&self.api_secret))
            .field("folder", &self.folder)
            .field("signature_algorithm", &self.signature_algorithm)
            .finish()
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl fmt::Debug for FirebaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseSettings")
            .field("bucket", &self.bucket)
            .field("service_account_key", &redacted(&self.service_account_key))
            .field("service_account_path", &self.service_account_path)
            .field("prefix", &self.prefix)
            .finish()
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Personal photo gallery API")]
pub struct Args {
    /// Host to bind to (overrides GALLERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GALLERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for locally stored uploads (overrides GALLERY_UPLOADS_DIR)
    #[arg(long)]
    pub uploads_dir: Option<PathBuf>,

    /// Base URL used in local upload references (overrides GALLERY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Storage backend (overrides GALLERY_STORAGE, otherwise auto-detected)
    #[arg(long, value_enum)]
    pub storage: Option<StorageBackend>,

    /// Comma-separated allowed CORS origins, `*` for any (overrides GALLERY_CORS_ORIGINS)
    #[arg(long)]
    pub cors_origins: Option<String>,

    /// Directory with a built front end to serve (overrides GALLERY_STATIC_DIR)
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Request body limit in MiB (overrides GALLERY_MAX_BODY_MB)
    #[arg(long)]
    pub max_body_mb: Option<usize>,

    /// Dotenv file loaded before reading the environment
    #[arg(long, default_value = ".env.local")]
    pub env_file: PathBuf,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        match dotenvy::from_path(&args.env_file) {
            Ok(()) => tracing::info!("Loaded environment from {}", args.env_file.display()),
            Err(err) if err.not_found() => {
                tracing::debug!("No env file at {}", args.env_file.display())
            }
            Err(err) => {
                return Err(err).with_context(|| format!("loading {}", args.env_file.display()));
            }
        }

        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Merge parsed args over values looked up with `env`, then defaults.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let port = match args.port {
            Some(port) => port,
            None => match env("GALLERY_PORT") {
                Some(value) => value
                    .parse::<u16>()
                    .with_context(|| format!("parsing GALLERY_PORT value `{}`", value))?,
                None => DEFAULT_PORT,
            },
        };

        let max_body_mb = match args.max_body_mb {
            Some(mb) => mb,
            None => match env("GALLERY_MAX_BODY_MB") {
                Some(value) => value
                    .parse::<usize>()
                    .with_context(|| format!("parsing GALLERY_MAX_BODY_MB value `{}`", value))?,
                None => DEFAULT_MAX_BODY_MB,
            },
        };

        let cors_origins = args
            .cors_origins
            .or_else(|| env("GALLERY_CORS_ORIGINS"))
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        let local = LocalSettings {
            uploads_dir: args
                .uploads_dir
                .or_else(|| env("GALLERY_UPLOADS_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./public/uploads")),
            public_url: args
                .public_url
                .or_else(|| env("GALLERY_PUBLIC_URL"))
                .unwrap_or_else(|| format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_string(),
        };

        let cloudinary = CloudinarySettings {
            cloud_name: env("CLOUDINARY_CLOUD_NAME"),
            api_key: env("CLOUDINARY_API_KEY"),
            api_secret: env("CLOUDINARY_API_SECRET"),
            folder: env("CLOUDINARY_FOLDER").unwrap_or_else(|| "gallery".into()),
            signature_algorithm: match env("CLOUDINARY_SIGNATURE_ALGORITHM") {
                Some(value) => SignatureAlgorithm::from_str(&value, true).map_err(|err| {
                    anyhow!(
                        "parsing CLOUDINARY_SIGNATURE_ALGORITHM value `{}`: {}",
                        value,
                        err
                    )
                })?,
                None => SignatureAlgorithm::default(),
            },
        };

        let s3 = S3Settings {
            bucket: env("AWS_S3_BUCKET"),
            region: env("AWS_REGION").unwrap_or_else(|| "us-east-1".into()),
            access_key_id: env("AWS_ACCESS_KEY_ID"),
            secret_access_key: env("AWS_SECRET_ACCESS_KEY"),
            prefix: env("AWS_S3_PREFIX").unwrap_or_else(|| "gallery".into()),
            endpoint: env("AWS_S3_ENDPOINT"),
        };

        let firebase = FirebaseSettings {
            bucket: env("FIREBASE_STORAGE_BUCKET"),
            service_account_key: env("FIREBASE_SERVICE_ACCOUNT_KEY"),
            service_account_path: env("FIREBASE_SERVICE_ACCOUNT_PATH").map(PathBuf::from),
            prefix: env("FIREBASE_STORAGE_PREFIX").unwrap_or_else(|| "gallery".into()),
        };

        let backend = match args.storage {
            Some(backend) => backend,
            None => match env("GALLERY_STORAGE") {
                Some(value) => StorageBackend::from_str(&value, true)
                    .map_err(|err| anyhow!("parsing GALLERY_STORAGE value `{}`: {}", value, err))?,
                None if cloudinary.cloud_name.is_some() => StorageBackend::Cloudinary,
                None if s3.bucket.is_some() => StorageBackend::S3,
                None if firebase.bucket.is_some() => StorageBackend::Firebase,
                None => StorageBackend::Local,
            },
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| env("GALLERY_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port,
            cors_origins,
            static_dir: args
                .static_dir
                .or_else(|| env("GALLERY_STATIC_DIR").map(PathBuf::from)),
            max_body_bytes: max_body_mb * 1024 * 1024,
            storage: StorageSettings {
                backend,
                local,
                cloudinary,
                s3,
                firebase,
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
