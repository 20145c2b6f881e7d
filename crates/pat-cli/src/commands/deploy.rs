//! `deploy` subcommands.

use crate::settings::Settings;
use common::secret::ExposeSecret;
use common::token_exchange::ExchangeClient;
use std::io::Write;
use std::path::Path;

/// Exchange the stored PAT for an access token and print it.
///
/// The access token is printed in full: showing it is the point of the
/// command.
pub async fn test(
    settings_path: &Path,
    settings: &Settings,
    client: &ExchangeClient,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> anyhow::Result<()> {
    let missing = settings.missing_exchange_settings();
    if !missing.is_empty() {
        anyhow::bail!(
            "Missing required settings: {}\n\
             Add the PAT with 'pat-cli pat add <TOKEN>' and the logto settings to {}",
            missing.join(", "),
            settings_path.display()
        );
    }

    let request = settings.exchange_request()?;
    writeln!(
        err,
        "Requesting access token from {}",
        request.token_endpoint()
    )?;

    let response = client.exchange(&request).await?;

    writeln!(out, "Successfully obtained access token:")?;
    writeln!(out, "access_token: {}", response.access_token.expose_secret())?;
    writeln!(out, "issued_token_type: {}", response.issued_token_type)?;
    writeln!(out, "token_type: {}", response.token_type)?;
    writeln!(out, "expires_in: {}", response.expires_in)?;
    if let Some(scope) = &response.scope {
        writeln!(out, "scope: {scope}")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::settings::{ClientAuthMode, LogtoSettings};
    use common::token_exchange::ExchangeError;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(tenant_url: &str) -> Settings {
        Settings {
            pat: Some("pat_123".to_string()),
            logto: LogtoSettings {
                tenant_url: Some(tenant_url.to_string()),
                client_id: Some("cli".to_string()),
                ..LogtoSettings::default()
            },
            ..Settings::default()
        }
    }

    struct Output {
        out: Vec<u8>,
        err: Vec<u8>,
    }

    impl Output {
        fn new() -> Self {
            Self {
                out: Vec::new(),
                err: Vec::new(),
            }
        }

        fn stdout(&self) -> String {
            String::from_utf8(self.out.clone()).unwrap()
        }

        fn stderr(&self) -> String {
            String::from_utf8(self.err.clone()).unwrap()
        }
    }

    async fn run(settings: &Settings, output: &mut Output) -> anyhow::Result<()> {
        let client = ExchangeClient::new().unwrap();
        test(
            Path::new("/tmp/settings.yaml"),
            settings,
            &client,
            &mut output.out,
            &mut output.err,
        )
        .await
    }

    #[tokio::test]
    async fn test_prints_issued_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oidc/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "issued-access-token",
                "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "read:generic_data"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut output = Output::new();
        run(&settings_for(&server.uri()), &mut output).await.unwrap();

        assert!(output.stderr().contains(&format!(
            "Requesting access token from {}/oidc/token",
            server.uri()
        )));
        let stdout = output.stdout();
        assert!(stdout.contains("access_token: issued-access-token"));
        assert!(stdout.contains("expires_in: 3600"));
        assert!(stdout.contains("scope: read:generic_data"));
    }

    #[tokio::test]
    async fn test_rejection_reports_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oidc/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error":"invalid_grant","error_description":"PAT expired"}"#),
            )
            .mount(&server)
            .await;

        let mut output = Output::new();
        let err = run(&settings_for(&server.uri()), &mut output)
            .await
            .unwrap_err();

        match err.downcast_ref::<ExchangeError>() {
            Some(ExchangeError::Status { status, body }) => {
                assert_eq!(*status, 400);
                assert!(body.contains("PAT expired"));
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
        assert!(err.to_string().contains("400"));
        assert!(output.stdout().is_empty());
    }

    #[tokio::test]
    async fn test_missing_settings_make_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut settings = settings_for(&server.uri());
        settings.pat = None;
        settings.logto.client_id = Some(String::new());

        let mut output = Output::new();
        let err = run(&settings, &mut output).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("pat, logto.client_id"));
        assert!(message.contains("pat-cli pat add"));
        assert!(output.stderr().is_empty());
    }

    #[tokio::test]
    async fn test_basic_client_auth_sends_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oidc/token"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "t",
                "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
                "token_type": "Bearer",
                "expires_in": 60
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = settings_for(&server.uri());
        settings.logto.client_auth = Some(ClientAuthMode::Basic);
        settings.logto.client_secret = Some("s3cret".to_string());

        let mut output = Output::new();
        run(&settings, &mut output).await.unwrap();

        assert!(!output.stdout().contains("scope:"));
    }
}
