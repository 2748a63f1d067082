use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Tunable work factor for password hashing plus the size of minted secrets.
/// Kept in config so the cost can be raised without touching the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct CryptoConfig {
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    pub token_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub crypto: CryptoConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "coincall".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "coincall-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let crypto = CryptoConfig {
            argon2_memory_kib: std::env::var("ARGON2_MEMORY_KIB")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(19 * 1024),
            argon2_iterations: std::env::var("ARGON2_ITERATIONS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(2),
            argon2_parallelism: std::env::var("ARGON2_PARALLELISM")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(1),
            token_bytes: std::env::var("TOKEN_BYTES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(20),
        };
        Ok(Self {
            database_url,
            jwt,
            crypto,
        })
    }
}
