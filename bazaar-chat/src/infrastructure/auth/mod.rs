//! 认证基础设施：口令哈希与会话令牌
//!
//! 口令使用 PBKDF2-HMAC-SHA256，编码为 `pbkdf2_sha256$迭代数$盐$摘要`
//! （盐与摘要为十六进制）。会话令牌是 HMAC 签名的 JWT。

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use bazaar_core::error::{ChatError, Result};

type HmacSha256 = Hmac<Sha256>;

const HASH_SCHEME: &str = "pbkdf2_sha256";

/// PBKDF2 第一块（dkLen = 32 正好一块）
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(password).expect("hmac accepts any key size");
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u = mac.finalize().into_bytes();
    let mut result = u;

    for _ in 1..iterations {
        let mut mac = HmacSha256::new_from_slice(password).expect("hmac accepts any key size");
        mac.update(&u);
        u = mac.finalize().into_bytes();
        for (acc, byte) in result.iter_mut().zip(u.iter()) {
            *acc ^= byte;
        }
    }
    result.into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// 口令哈希器
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(310_000)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn hash(&self, password: &str) -> String {
        // v4 UUID 的 16 字节随机数作为盐
        let salt = *Uuid::new_v4().as_bytes();
        let digest = pbkdf2_sha256(password.as_bytes(), &salt, self.iterations);
        format!(
            "{HASH_SCHEME}${}${}${}",
            self.iterations,
            hex::encode(salt),
            hex::encode(digest)
        )
    }

    /// 校验口令；编码串损坏时视为不匹配
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let mut parts = encoded.split('$');
        let (Some(scheme), Some(iterations), Some(salt), Some(digest), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };
        if scheme != HASH_SCHEME {
            return false;
        }
        let Ok(iterations) = iterations.parse::<u32>() else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(digest)) else {
            return false;
        };
        let actual = pbkdf2_sha256(password.as_bytes(), &salt, iterations.max(1));
        constant_time_eq(&actual, &expected)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// 会话令牌编解码器
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    pub fn issue(&self, user_id: i64, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl_seconds,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .context("failed to sign session token")?;
        Ok(token)
    }

    /// 校验令牌并取出用户 id；任何失败都归为未认证
    pub fn verify(&self, token: &str) -> Result<i64> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| ChatError::Unauthorized)?;
        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| ChatError::Unauthorized)
    }

    /// 从 `Authorization: Bearer <token>` 的值里取用户 id
    pub fn verify_bearer(&self, header_value: &str) -> Result<i64> {
        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or(ChatError::Unauthorized)?;
        self.verify(token.trim())
    }

    pub fn ensure_nonempty_secret(secret: &str) -> Result<()> {
        if secret.is_empty() {
            return Err(ChatError::Internal(anyhow!("token secret must not be empty")));
        }
        Ok(())
    }
}
