//! A [`PaymentGateway`] for the Flutterwave v3 REST API.
//!
//! Two calls are used:
//! * `GET /transactions/{id}/verify` is the authoritative record of a transaction.
//! * `POST /payments` creates a hosted payment page and returns its link.
//!
//! Flutterwave quotes amounts in naira, as JSON numbers. They are converted to [`Kobo`] through their decimal text so
//! that no floating point arithmetic is involved; an amount with more than two decimal places is rejected.
use std::{str::FromStr, sync::Arc};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use settlement_common::Kobo;
use settlement_engine::{
    db_types::OrderId,
    traits::{GatewayError, GatewayTransaction, PaymentGateway, PaymentIntent, PaymentLink},
};

use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct FlutterwaveGateway {
    config: GatewayConfig,
    client: Arc<Client>,
}

/// Flutterwave wraps every response in the same envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    id: Value,
    status: String,
    tx_ref: Option<String>,
    amount: Option<Value>,
    currency: Option<String>,
    #[serde(default)]
    meta: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PaymentLinkData {
    link: String,
}

impl FlutterwaveGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        if config.secret_key.is_empty() {
            return Err(GatewayError::NotConfigured("No gateway secret key has been set".into()));
        }
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.secret_key.reveal()))
            .map_err(|e| GatewayError::NotConfigured(format!("The gateway secret key is not a valid header. {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::NotConfigured(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unreachable(format!("{status}: {message}")));
        }
        let envelope =
            response.json::<Envelope<T>>().await.map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if !status.is_success() || envelope.status != "success" {
            return Err(GatewayError::Rejected(format!("{status}: {}", envelope.message)));
        }
        envelope.data.ok_or_else(|| GatewayError::InvalidResponse("The response did not contain any data".into()))
    }
}

impl PaymentGateway for FlutterwaveGateway {
    async fn verify_transaction(&self, transaction_id: &str) -> Result<GatewayTransaction, GatewayError> {
        let url = self.url(&format!("/transactions/{}/verify", transaction_id.trim()));
        trace!("🔄️ Verifying transaction {transaction_id} with the gateway");
        let response = self.client.get(url).send().await.map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::TransactionNotFound(transaction_id.to_string()));
        }
        let data = Self::read_envelope::<TransactionData>(response).await?;
        let transaction = transaction_from_data(data)?;
        debug!("🔄️ Gateway reports transaction {transaction_id} as {}", transaction.status);
        Ok(transaction)
    }

    async fn initialize_payment(&self, intent: &PaymentIntent) -> Result<PaymentLink, GatewayError> {
        let body = json!({
            "tx_ref": intent.tx_ref,
            "amount": intent.amount.to_major_string(),
            "currency": intent.currency,
            "redirect_url": self.config.redirect_url,
            "customer": {
                "name": intent.shipping_address.full_name,
                "phonenumber": intent.shipping_address.phone,
            },
            "meta": {
                "order_id": intent.order_id.as_str(),
                "buyer_id": intent.buyer_id,
            },
        });
        trace!("🔄️ Initializing payment {} for order {}", intent.tx_ref, intent.order_id);
        let response = self
            .client
            .post(self.url("/payments"))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        let data = Self::read_envelope::<PaymentLinkData>(response).await?;
        Ok(PaymentLink { redirect_link: data.link })
    }
}

fn transaction_from_data(data: TransactionData) -> Result<GatewayTransaction, GatewayError> {
    let transaction_id = match data.id {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s,
        other => return Err(GatewayError::InvalidResponse(format!("Unexpected transaction id: {other}"))),
    };
    let amount = match data.amount {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(parse_amount(&n.to_string())?),
        Some(Value::String(s)) => Some(parse_amount(&s)?),
        Some(other) => return Err(GatewayError::InvalidResponse(format!("Unexpected amount: {other}"))),
    };
    let order_id = data
        .meta
        .as_ref()
        .and_then(|m| m.get("order_id"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .map(OrderId::from);
    Ok(GatewayTransaction {
        transaction_id,
        status: data.status,
        tx_ref: data.tx_ref,
        amount,
        currency: data.currency,
        order_id,
    })
}

fn parse_amount(s: &str) -> Result<Kobo, GatewayError> {
    Kobo::from_str(s).map_err(|e| GatewayError::InvalidResponse(format!("Invalid amount {s}. {e}")))
}
