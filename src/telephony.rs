use crate::config::TelephonyConfig;
use crate::error::CallError;

/// REST client for a TwiML-style outbound telephony provider.
pub struct TelephonyClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
}

impl TelephonyClient {
    pub fn new(config: &TelephonyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        }
    }

    /// Instruct the provider to dial `to` from `from`. On answer the provider
    /// fetches `control_url` and follows its instruction to open the media
    /// WebSocket. Returns the provider's call SID.
    pub async fn place_outbound(
        &self,
        to: &str,
        from: &str,
        control_url: &str,
        timeout_seconds: u64,
    ) -> Result<String, CallError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls.json",
            self.account_sid
        );

        let timeout = timeout_seconds.to_string();
        let params = [
            ("To", to),
            ("From", from),
            ("Url", control_url),
            ("Timeout", timeout.as_str()),
        ];

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| CallError::ProviderError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::ProviderError(format!("{status}: {body}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CallError::ProviderError(e.to_string()))?;

        let call_sid = body["sid"]
            .as_str()
            .ok_or_else(|| CallError::ProviderError("response missing 'sid'".to_string()))?
            .to_string();

        tracing::info!(to, call_sid = %call_sid, "Outbound call placed");
        Ok(call_sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_carries_configured_credentials() {
        let config = TelephonyConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15550000000".to_string(),
            to_number: "+15550000001".to_string(),
        };
        let client = TelephonyClient::new(&config);
        assert_eq!(client.account_sid, "AC123");
        assert_eq!(client.auth_token, "secret");
    }
}
