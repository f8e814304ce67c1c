use std::io::ErrorKind;

use crate::config::GithubConfig;
use crate::error::{InboxError, Result};

/// Scope the notification queries and mutations need
pub const REQUIRED_SCOPE: &str = "notifications";

/// Run the token command (`gh auth token` by default) and capture stdout.
fn cli_token(command: &str) -> Result<String> {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(InboxError::ToolingUnavailable);
    };

    let output = match std::process::Command::new(program).args(parts).output() {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(InboxError::ToolingUnavailable),
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        tracing::debug!(
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "token command failed"
        );
        return Err(InboxError::AuthRequired);
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(InboxError::AuthRequired);
    }
    Ok(token)
}

/// Find a token, trying in order:
/// 1. The env var named in config (GITHUB_TOKEN)
/// 2. The token command (gh auth token)
pub fn load_token(config: &GithubConfig) -> Result<String> {
    if let Some(env_var) = &config.token_env {
        if let Ok(token) = std::env::var(env_var) {
            if !token.is_empty() {
                return Ok(token);
            }
        }
    }

    match &config.token_command {
        Some(command) => cli_token(command),
        None => Err(InboxError::AuthRequired),
    }
}

/// Judge the `X-OAuth-Scopes` header. Fine-grained tokens send no header and pass.
fn check_scopes(header: Option<&str>) -> Result<()> {
    let Some(header) = header else {
        return Ok(());
    };
    let granted = header.split(',').map(str::trim).any(|s| s == REQUIRED_SCOPE);
    if granted {
        Ok(())
    } else {
        Err(InboxError::MissingScope(REQUIRED_SCOPE.to_string()))
    }
}

/// Confirm the token is valid and carries the notifications scope.
pub async fn verify_token(token: &str, api_url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/user", api_url.trim_end_matches('/')))
        .header("Authorization", format!("Bearer {}", token))
        .header("User-Agent", "prinbox")
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .map_err(|e| InboxError::RemoteProtocol(e.to_string()))?;

    if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(InboxError::AuthRequired);
    }
    if !resp.status().is_success() {
        return Err(InboxError::RemoteProtocol(format!(
            "GET /user returned {}",
            resp.status()
        )));
    }

    let scopes = resp
        .headers()
        .get("x-oauth-scopes")
        .and_then(|v| v.to_str().ok());
    check_scopes(scopes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_header_must_list_notifications() {
        assert!(check_scopes(Some("repo, notifications, read:org")).is_ok());
        assert!(matches!(
            check_scopes(Some("repo, read:org")),
            Err(InboxError::MissingScope(s)) if s == "notifications"
        ));
    }

    #[test]
    fn scope_prefix_is_not_enough() {
        assert!(check_scopes(Some("notifications:extra")).is_err());
    }

    #[test]
    fn absent_scopes_header_passes() {
        assert!(check_scopes(None).is_ok());
    }

    #[test]
    fn missing_binary_is_tooling_unavailable() {
        let result = cli_token("prinbox-definitely-not-installed auth token");
        assert!(matches!(result, Err(InboxError::ToolingUnavailable)));
    }

    #[test]
    fn failing_command_is_auth_required() {
        assert!(matches!(cli_token("false"), Err(InboxError::AuthRequired)));
    }

    #[test]
    fn empty_output_is_auth_required() {
        assert!(matches!(cli_token("true"), Err(InboxError::AuthRequired)));
    }

    #[test]
    fn command_output_is_trimmed() {
        assert_eq!(cli_token("echo gho_abc").unwrap(), "gho_abc");
    }

    #[test]
    fn env_var_wins_over_command() {
        let config = GithubConfig {
            token_env: Some("PRINBOX_TEST_TOKEN_ENV".into()),
            token_command: Some("false".into()),
            api_url: String::new(),
        };
        std::env::set_var("PRINBOX_TEST_TOKEN_ENV", "from-env");
        assert_eq!(load_token(&config).unwrap(), "from-env");
        std::env::remove_var("PRINBOX_TEST_TOKEN_ENV");
        assert!(matches!(load_token(&config), Err(InboxError::AuthRequired)));
    }
}
