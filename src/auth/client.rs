//! Client for the external authentication collaborator.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
    #[serde(rename = "userId")]
    user_id: Option<String>,
    email: Option<String>,
    reason: Option<String>,
}

/// Result of a verify round trip. A transport failure is an `Err`, not an
/// outcome: the caller maps it to 500, never 401.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Valid { user_id: String, email: String },
    Invalid { reason: String },
}

#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn verify(&self, token: &str) -> Result<VerifyOutcome> {
        let url = format!("{}/verify", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&VerifyRequest { token })
            .send()
            .await
            .context("POST auth verify")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("auth service returned {status}");
        }

        let body: VerifyResponse = resp.json().await.context("parse auth verify response")?;
        if body.valid {
            let user_id = body
                .user_id
                .filter(|v| !v.is_empty())
                .context("auth service omitted userId on a valid token")?;
            Ok(VerifyOutcome::Valid {
                user_id,
                email: body.email.unwrap_or_default(),
            })
        } else {
            Ok(VerifyOutcome::Invalid {
                reason: body
                    .reason
                    .unwrap_or_else(|| "token rejected".to_string()),
            })
        }
    }
}
