//! Header-based authentication for HTTP connectors.

use reqwest::RequestBuilder;
use serde::Deserialize;

/// How an HTTP connector authenticates. Secrets are redacted in `Debug`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum HttpAuth {
    /// `{header}: {api_key}`
    ApiKey { header: String, api_key: String },
    /// `Authorization: Bearer {token}`
    Bearer { token: String },
    /// `Authorization: {scheme} {token}`
    Token {
        token: String,
        #[serde(default = "default_token_scheme")]
        scheme: String,
    },
}

fn default_token_scheme() -> String {
    "Token".to_string()
}

impl std::fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpAuth::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("api_key", &"***")
                .finish(),
            HttpAuth::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
            HttpAuth::Token { scheme, .. } => f
                .debug_struct("Token")
                .field("scheme", scheme)
                .field("token", &"***")
                .finish(),
        }
    }
}

impl HttpAuth {
    pub fn api_key(header: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpAuth::ApiKey {
            header: header.into(),
            api_key: api_key.into(),
        }
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            HttpAuth::ApiKey { header, api_key } => vec![(header.clone(), api_key.clone())],
            HttpAuth::Bearer { token } => {
                vec![("Authorization".to_string(), format!("Bearer {}", token))]
            }
            HttpAuth::Token { token, scheme } => {
                vec![("Authorization".to_string(), format!("{} {}", scheme, token))]
            }
        }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        self.headers()
            .into_iter()
            .fold(request, |req, (name, value)| req.header(name, value))
    }
}
