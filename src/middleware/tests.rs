#[cfg(test)]
mod tests {
    use crate::errors::ProxyError;
    use crate::middleware::{
        authorization_header, build_proxy_request, parse_expires_in, relay_response,
    };
    use crate::models::AuthMode;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use hyper::header::{HeaderMap, CONTENT_TYPE, TRANSFER_ENCODING};
    use hyper::{Body, Method, Response, Uri};
    use serde_json::json;

    fn target() -> Uri {
        "http://www.arcgisserver.com/aswa/rest/services/service1"
            .parse()
            .unwrap()
    }

    #[test]
    fn host_is_rewritten_to_target_authority() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "proxy.local:3030".parse().unwrap());
        headers.insert("x-custom", "kept".parse().unwrap());

        let req =
            build_proxy_request(Method::GET, &headers, Bytes::new(), &target(), None).unwrap();

        assert_eq!(req.headers()["host"], "www.arcgisserver.com");
        assert_eq!(req.headers()["x-custom"], "kept");
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri(), &target());
    }

    #[test]
    fn framing_headers_are_not_copied() {
        let mut headers = HeaderMap::new();
        headers.insert(TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert("content-length", "11".parse().unwrap());

        let req = build_proxy_request(
            Method::POST,
            &headers,
            Bytes::from("hello world"),
            &target(),
            None,
        )
        .unwrap();

        assert!(req.headers().get(TRANSFER_ENCODING).is_none());
        assert!(req.headers().get("content-length").is_none());
    }

    #[test]
    fn target_without_authority_is_rejected() {
        let relative: Uri = "/rest/services".parse().unwrap();
        let err = build_proxy_request(Method::GET, &HeaderMap::new(), Bytes::new(), &relative, None)
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidUri(_)));
    }

    #[tokio::test]
    async fn token_is_merged_into_json_body_and_method_forced_to_post() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());

        let req = build_proxy_request(
            Method::GET,
            &headers,
            Bytes::from(r#"{"where":"1=1"}"#),
            &target(),
            Some("asd34rf"),
        )
        .unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.headers()[CONTENT_TYPE], "application/json");

        let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
        let content: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(content, json!({"where": "1=1", "f": "json", "token": "asd34rf"}));
    }

    #[tokio::test]
    async fn token_with_empty_json_body_builds_an_object() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());

        let req = build_proxy_request(Method::POST, &headers, Bytes::new(), &target(), Some("tok"))
            .unwrap();
        let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
        let content: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(content, json!({"f": "json", "token": "tok"}));
    }

    #[test]
    fn token_with_unparsable_json_body_is_a_body_error() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());

        let err = build_proxy_request(
            Method::POST,
            &headers,
            Bytes::from("{not json"),
            &target(),
            Some("tok"),
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::BodyRead(_)));
    }

    #[tokio::test]
    async fn token_is_appended_to_form_body() {
        let req = build_proxy_request(
            Method::POST,
            &HeaderMap::new(),
            Bytes::from("where=1%3D1"),
            &target(),
            Some("asd34rf"),
        )
        .unwrap();

        assert_eq!(req.headers()[CONTENT_TYPE], "application/x-www-form-urlencoded");
        let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
        assert_eq!(body, Bytes::from("where=1%3D1&f=json&token=asd34rf"));
    }

    #[tokio::test]
    async fn token_with_empty_body_creates_a_form_body() {
        let req =
            build_proxy_request(Method::GET, &HeaderMap::new(), Bytes::new(), &target(), Some("tok"))
                .unwrap();

        assert_eq!(req.method(), Method::POST);
        let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
        assert_eq!(body, Bytes::from("f=json&token=tok"));
    }

    #[tokio::test]
    async fn without_token_body_and_method_pass_through() {
        let req = build_proxy_request(
            Method::PUT,
            &HeaderMap::new(),
            Bytes::from("payload"),
            &target(),
            None,
        )
        .unwrap();

        assert_eq!(req.method(), Method::PUT);
        let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
        assert_eq!(body, Bytes::from("payload"));
    }

    #[test]
    fn user_credentials_become_a_basic_header() {
        let mode = AuthMode::UserCredential {
            username: "jdoe@jdoe.com".to_string(),
            password: "pword123".to_string(),
        };
        let value = authorization_header(&mode).unwrap();
        let expected = format!("Basic {}", STANDARD.encode("jdoe@jdoe.com:pword123"));
        assert_eq!(value.to_str().unwrap(), expected);
    }

    #[test]
    fn domain_credentials_use_domain_qualified_user() {
        let mode = AuthMode::DomainCredential {
            domain: "TestDomain".to_string(),
            username: "jdoe".to_string(),
            password: "123".to_string(),
        };
        let value = authorization_header(&mode).unwrap();
        let expected = format!("Basic {}", STANDARD.encode("TestDomain\\jdoe:123"));
        assert_eq!(value.to_str().unwrap(), expected);
    }

    #[test]
    fn ambient_modes_carry_no_credential_header() {
        assert!(authorization_header(&AuthMode::ProcessIdentity).is_none());
        assert!(authorization_header(&AuthMode::Anonymous).is_none());
        assert!(authorization_header(&AuthMode::OAuth2Client).is_none());
    }

    #[tokio::test]
    async fn relay_strips_transfer_encoding_and_keeps_the_rest() {
        let upstream = Response::builder()
            .status(203)
            .header(TRANSFER_ENCODING, "chunked")
            .header("content-type", "application/json")
            .header("x-backend", "aswa")
            .body(Body::from(r#"{"ok":true}"#))
            .unwrap();

        let relayed = relay_response(upstream);
        assert_eq!(relayed.status(), 203);
        assert!(relayed.headers().get(TRANSFER_ENCODING).is_none());
        assert_eq!(relayed.headers()["content-type"], "application/json");
        assert_eq!(relayed.headers()["x-backend"], "aswa");

        let body = hyper::body::to_bytes(relayed.into_body()).await.unwrap();
        assert_eq!(body, Bytes::from(r#"{"ok":true}"#));
    }

    #[test]
    fn expires_in_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_expires_in(&json!({"expires_in": 1200})), Some(1200));
        assert_eq!(parse_expires_in(&json!({"expires_in": "9999999"})), Some(9999999));
        assert_eq!(parse_expires_in(&json!({"expires_in": "soon"})), None);
        assert_eq!(parse_expires_in(&json!({"access_token": "x"})), None);
    }
}
