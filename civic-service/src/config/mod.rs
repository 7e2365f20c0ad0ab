use civic_core::config as core_config;
use civic_core::error::AppError;
use std::env;

/// Service configuration, resolved from the environment exactly once at
/// startup. In production every required value must be set explicitly;
/// in development missing values fall back to local defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub jwt: JwtConfig,
    pub smtp: Option<SmtpConfig>,
    pub frontend_url: String,
    pub backend_url: String,
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
    pub storage: Option<StorageConfig>,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn is_prod(&self) -> bool {
        *self == Environment::Prod
    }
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub signup_attempts: u32,
    pub signup_window_seconds: u64,
    pub verify_attempts: u32,
    pub verify_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment.is_prod();

        let backend_url = get_env(
            "BACKEND_URL",
            Some(&format!("http://localhost:{}", common.port)),
            is_prod,
        )?;
        let backend_url = backend_url.trim_end_matches('/').to_string();

        let frontend_url = get_env("FRONTEND_URL", Some("http://localhost:5173"), is_prod)?
            .trim_end_matches('/')
            .to_string();

        let config = AppConfig {
            common,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("civic-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("civic"), is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", Some("dev-only-signing-secret"), is_prod)?,
                expiry_hours: get_env("JWT_EXPIRY_HOURS", Some("24"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
            },
            smtp: optional_section(&["SMTP_HOST", "SMTP_USERNAME", "SMTP_PASSWORD"], || {
                SmtpConfig {
                    host: env_or_empty("SMTP_HOST"),
                    username: env_or_empty("SMTP_USERNAME"),
                    password: env_or_empty("SMTP_PASSWORD"),
                    from_address: env::var("SMTP_FROM")
                        .unwrap_or_else(|_| env_or_empty("SMTP_USERNAME")),
                }
            }),
            frontend_url,
            backend_url,
            google: optional_section(&["GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"], || {
                OAuthClientConfig {
                    client_id: env_or_empty("GOOGLE_CLIENT_ID"),
                    client_secret: env_or_empty("GOOGLE_CLIENT_SECRET"),
                }
            }),
            github: optional_section(&["GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET"], || {
                OAuthClientConfig {
                    client_id: env_or_empty("GITHUB_CLIENT_ID"),
                    client_secret: env_or_empty("GITHUB_CLIENT_SECRET"),
                }
            }),
            storage: optional_section(
                &["CLOUDINARY_CLOUD_NAME", "CLOUDINARY_API_KEY", "CLOUDINARY_API_SECRET"],
                || StorageConfig {
                    cloud_name: env_or_empty("CLOUDINARY_CLOUD_NAME"),
                    api_key: env_or_empty("CLOUDINARY_API_KEY"),
                    api_secret: env_or_empty("CLOUDINARY_API_SECRET"),
                    folder: env::var("CLOUDINARY_FOLDER")
                        .unwrap_or_else(|_| "civic_issues".to_string()),
                },
            ),
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:5173"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: get_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
                login_window_seconds: get_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(900),
                signup_attempts: get_env("RATE_LIMIT_SIGNUP_ATTEMPTS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                signup_window_seconds: get_env(
                    "RATE_LIMIT_SIGNUP_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(3600),
                verify_attempts: get_env("RATE_LIMIT_VERIFY_ATTEMPTS", Some("20"), is_prod)?
                    .parse()
                    .unwrap_or(20),
                verify_window_seconds: get_env(
                    "RATE_LIMIT_VERIFY_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(3600),
                global_ip_limit: get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?
                    .parse()
                    .unwrap_or(100),
                global_ip_window_seconds: get_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.expiry_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_EXPIRY_HOURS must be positive"
            )));
        }

        if self.environment.is_prod() {
            if self.jwt.secret == "dev-only-signing-secret" {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be set in production"
                )));
            }

            // Production aborts signup when the OTP email cannot be sent,
            // so a mail transport has to exist.
            if self.smtp.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "SMTP_HOST, SMTP_USERNAME and SMTP_PASSWORD are required in production"
                )));
            }

            if self.storage.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Cloudinary storage credentials are required in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::warn!(
                    "Swagger is publicly accessible in production - consider disabling it"
                );
            }
        } else {
            if self.storage.is_none() {
                tracing::warn!("Image storage not configured; issue uploads will fail");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// A section is present only when every one of its key variables is set.
fn optional_section<T>(keys: &[&str], build: impl FnOnce() -> T) -> Option<T> {
    if keys.iter().all(|k| env::var(k).is_ok()) {
        Some(build())
    } else {
        None
    }
}

fn env_or_empty(key: &str) -> String {
    env::var(key).unwrap_or_default()
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
