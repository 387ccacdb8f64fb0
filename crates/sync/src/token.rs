use crate::error::{Result, SyncError};

/// Supplies the access token for the remote backend.
pub trait TokenSource {
    fn get_token(&self) -> Option<String>;
}

impl<T: TokenSource + ?Sized> TokenSource for &T {
    fn get_token(&self) -> Option<String> {
        (**self).get_token()
    }
}

/// A fixed token, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }
}

impl TokenSource for StaticToken {
    fn get_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Resolves a non-blank token or fails before any network call is made.
pub fn require_token(source: &dyn TokenSource) -> Result<String> {
    match source.get_token() {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(SyncError::Token(
            "no access token configured; set GITHUB_GIST_TOKEN or store a token first"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_is_rejected() {
        let err = require_token(&StaticToken::new("   ")).expect_err("blank token");
        assert!(matches!(err, SyncError::Token(_)));
        assert!(require_token(&StaticToken::default()).is_err());
    }

    #[test]
    fn token_is_trimmed() {
        let token = require_token(&StaticToken::new(" ghp_abc\n")).expect("token");
        assert_eq!(token, "ghp_abc");
    }
}
