//! [`Ledger`] over the registry service's REST API.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::time::Duration;
use use_delegation_sdk::{
    CapabilityId, CapabilityState, Ledger, LedgerError, PrincipalId, SignatureStatus,
    SignedOperation, TxSignature,
};

use crate::api::{AirdropReq, BalanceResponse, ErrorResponse, SignatureResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedger {
    pub fn new(base_url: &str) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Checks `/health` and returns the registry's current slot.
    pub async fn health(&self) -> Result<u64, LedgerError> {
        let resp = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(transport)?;
        let body: serde_json::Value = ok_json(resp).await?;
        body["slot"]
            .as_u64()
            .ok_or_else(|| LedgerError::Transport("health response has no slot".into()))
    }
}

fn transport(e: reqwest::Error) -> LedgerError {
    LedgerError::Transport(e.to_string())
}

/// Turn a non-success response into a typed error, keeping registry
/// rejections intact.
async fn error_from(resp: Response) -> LedgerError {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(ErrorResponse {
            rejection: Some(rejection),
            ..
        }) => LedgerError::Rejected(rejection),
        Ok(body) => LedgerError::Transport(format!("{status}: {}", body.error)),
        Err(_) => LedgerError::Transport(format!("unexpected status {status}")),
    }
}

async fn ok_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, LedgerError> {
    if !resp.status().is_success() {
        return Err(error_from(resp).await);
    }
    resp.json::<T>().await.map_err(transport)
}

/// Like [`ok_json`] but maps 404 to `None`.
async fn optional_json<T: serde::de::DeserializeOwned>(
    resp: Response,
) -> Result<Option<T>, LedgerError> {
    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    ok_json(resp).await.map(Some)
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn request_airdrop(
        &self,
        recipient: &PrincipalId,
        amount: u64,
    ) -> Result<TxSignature, LedgerError> {
        let resp = self
            .client
            .post(self.url("/airdrop"))
            .json(&AirdropReq {
                recipient: *recipient,
                amount,
            })
            .send()
            .await
            .map_err(transport)?;
        let body: SignatureResponse = ok_json(resp).await?;
        Ok(body.signature)
    }

    async fn send_transaction(&self, tx: &SignedOperation) -> Result<TxSignature, LedgerError> {
        let resp = self
            .client
            .post(self.url("/transactions"))
            .json(tx)
            .send()
            .await
            .map_err(transport)?;
        let body: SignatureResponse = ok_json(resp).await?;
        Ok(body.signature)
    }

    async fn signature_status(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        let resp = self
            .client
            .get(self.url(&format!("/transactions/{signature}")))
            .send()
            .await
            .map_err(transport)?;
        optional_json(resp).await
    }

    async fn get_balance(&self, who: &PrincipalId) -> Result<u64, LedgerError> {
        let resp = self
            .client
            .get(self.url(&format!("/accounts/{who}")))
            .send()
            .await
            .map_err(transport)?;
        let body: BalanceResponse = ok_json(resp).await?;
        Ok(body.balance)
    }

    async fn get_slot(&self) -> Result<u64, LedgerError> {
        self.health().await
    }

    async fn get_capability(
        &self,
        id: &CapabilityId,
    ) -> Result<Option<CapabilityState>, LedgerError> {
        let resp = self
            .client
            .get(self.url(&format!("/capabilities/{id}")))
            .send()
            .await
            .map_err(transport)?;
        optional_json(resp).await
    }
}
