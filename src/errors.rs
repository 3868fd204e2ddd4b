use hyper::StatusCode;
use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    /// Required configuration is missing at the point of use, e.g. an OAuth2
    /// backend with no token endpoint.
    Config(String),
    ReferrerRejected(String),
    EmptyParameters,
    InvalidUri(String),
    /// Network failure reaching a backend or token endpoint.
    Upstream(String),
    TokenParse(String),
    BodyRead(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ReferrerRejected(_) => StatusCode::BAD_REQUEST,
            Self::EmptyParameters => StatusCode::BAD_REQUEST,
            Self::InvalidUri(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::TokenParse(_) => StatusCode::BAD_GATEWAY,
            Self::BodyRead(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::ReferrerRejected(referrer) => {
                write!(f, "Referrer {} is not allowed.", referrer)
            }
            Self::EmptyParameters => {
                write!(f, "This proxy does not support empty parameters.")
            }
            Self::InvalidUri(e) => write!(f, "Invalid URI: {}", e),
            Self::Upstream(e) => write!(f, "Upstream request failed: {}", e),
            Self::TokenParse(e) => write!(f, "Token response could not be parsed: {}", e),
            Self::BodyRead(e) => write!(f, "Request body could not be read: {}", e),
        }
    }
}

impl warp::reject::Reject for ProxyError {}
