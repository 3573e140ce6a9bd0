//! 令牌校验
//!
//! 令牌的签发与解析不在本服务范围内，网关只通过 `TokenVerifier` 询问令牌是否有效。

use std::collections::HashSet;

use crate::core::error::{AppResult, ConduitError};
use crate::models::AuthConfig;

pub const MISSING_TOKEN: &str = "Missing authentication token";
pub const INVALID_TOKEN: &str = "Invalid or expired JWT token";

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: Option<&str>) -> AppResult<()>;
}

/// 基于静态令牌列表的校验器
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashSet<String>,
    required: bool,
}

impl StaticTokenVerifier {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            required: true,
        }
    }

    /// 不校验令牌
    pub fn disabled() -> Self {
        Self {
            tokens: HashSet::new(),
            required: false,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        if config.required {
            Self::new(config.tokens.iter().cloned())
        } else {
            Self::disabled()
        }
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: Option<&str>) -> AppResult<()> {
        if !self.required {
            return Ok(());
        }

        match token.map(str::trim).filter(|t| !t.is_empty()) {
            None => Err(ConduitError::Unauthorized(MISSING_TOKEN.to_string())),
            Some(token) if self.tokens.contains(token) => Ok(()),
            Some(_) => {
                tracing::debug!("令牌校验失败");
                Err(ConduitError::Unauthorized(INVALID_TOKEN.to_string()))
            }
        }
    }
}
