use std::fmt;
use std::path::{Path, PathBuf};

use gist_sync::TokenSource;
use tracing::debug;

use crate::Result;

pub const TOKEN_ENV_VAR: &str = "GITHUB_GIST_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLocation {
    Environment(String),
    File(PathBuf),
    NotConfigured,
}

impl fmt::Display for TokenLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenLocation::Environment(var) => write!(f, "environment variable {var}"),
            TokenLocation::File(path) => write!(f, "file {}", path.display()),
            TokenLocation::NotConfigured => f.write_str("not configured"),
        }
    }
}

/// Looks up the access token in the environment first, then in a file in
/// the config dir.
#[derive(Debug, Clone)]
pub struct TokenManager {
    env_var: String,
    token_path: PathBuf,
}

impl TokenManager {
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self::with_env_var(TOKEN_ENV_VAR, token_path)
    }

    pub fn with_env_var(env_var: impl Into<String>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            env_var: env_var.into(),
            token_path: token_path.into(),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    fn env_token(&self) -> Option<String> {
        std::env::var(&self.env_var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn file_token(&self) -> Option<String> {
        std::fs::read_to_string(&self.token_path)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn set_token(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(crate::AppError::InvalidInput("token is empty".to_string()));
        }
        if let Some(parent) = self.token_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.token_path, token)?;
        restrict_permissions(&self.token_path)?;
        debug!(path = %self.token_path.display(), "stored token");
        Ok(())
    }

    /// Removes the stored token file. Returns false when there was none.
    pub fn delete_token(&self) -> Result<bool> {
        match std::fs::remove_file(&self.token_path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn location(&self) -> TokenLocation {
        if self.env_token().is_some() {
            TokenLocation::Environment(self.env_var.clone())
        } else if self.file_token().is_some() {
            TokenLocation::File(self.token_path.clone())
        } else {
            TokenLocation::NotConfigured
        }
    }
}

impl TokenSource for TokenManager {
    fn get_token(&self) -> Option<String> {
        self.env_token().or_else(|| self.file_token())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
