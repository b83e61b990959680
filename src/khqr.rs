//! KHQR payload construction and Bakong settlement queries.
//!
//! A payload is an EMV-Co TLV string: two-digit tag, two-digit length, value,
//! terminated by a CRC-16/CCITT checksum over everything including the CRC
//! tag and length themselves.

use md5::{Digest as _, Md5};
use serde::Deserialize;

use crate::config::BakongConfig;

// Top-level EMV tags.
const TAG_PAYLOAD_FORMAT: &str = "00";
const TAG_POI_METHOD: &str = "01";
const TAG_MERCHANT_ACCOUNT: &str = "29";
const TAG_MCC: &str = "52";
const TAG_CURRENCY: &str = "53";
const TAG_AMOUNT: &str = "54";
const TAG_COUNTRY: &str = "58";
const TAG_MERCHANT_NAME: &str = "59";
const TAG_MERCHANT_CITY: &str = "60";
const TAG_ADDITIONAL_DATA: &str = "62";
const TAG_CRC: &str = "63";
const TAG_TIMESTAMP: &str = "99";

fn field(tag: &str, value: &str) -> String {
    format!("{tag}{:02}{value}", value.len())
}

fn truncated(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn format_amount(amount: f64) -> String {
    if amount.fract().abs() < f64::EPSILON {
        format!("{amount:.0}")
    } else {
        format!("{amount:.2}")
    }
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Build a dynamic (single-use) KHQR payload for the given amount under the
/// configured merchant profile.
pub fn build_payload(cfg: &BakongConfig, amount: f64, bill_number: &str) -> String {
    let mut payload = String::new();
    payload.push_str(&field(TAG_PAYLOAD_FORMAT, "01"));
    payload.push_str(&field(TAG_POI_METHOD, "12")); // dynamic QR
    payload.push_str(&field(TAG_MERCHANT_ACCOUNT, &field("00", &cfg.account)));
    payload.push_str(&field(TAG_MCC, "5999"));
    payload.push_str(&field(TAG_CURRENCY, cfg.currency.numeric_code()));
    payload.push_str(&field(TAG_AMOUNT, &format_amount(amount)));
    payload.push_str(&field(TAG_COUNTRY, "KH"));
    payload.push_str(&field(TAG_MERCHANT_NAME, &truncated(&cfg.merchant_name, 25)));
    payload.push_str(&field(TAG_MERCHANT_CITY, &truncated(&cfg.merchant_city, 15)));

    let mut additional = String::new();
    additional.push_str(&field("01", &truncated(bill_number, 25)));
    if !cfg.phone_number.is_empty() {
        additional.push_str(&field("02", &cfg.phone_number));
    }
    if !cfg.store_label.is_empty() {
        additional.push_str(&field("03", &truncated(&cfg.store_label, 25)));
    }
    if !cfg.terminal_label.is_empty() {
        additional.push_str(&field("07", &truncated(&cfg.terminal_label, 25)));
    }
    payload.push_str(&field(TAG_ADDITIONAL_DATA, &additional));

    let millis = chrono::Utc::now().timestamp_millis().to_string();
    payload.push_str(&field(TAG_TIMESTAMP, &field("00", &millis)));

    payload.push_str(TAG_CRC);
    payload.push_str("04");
    let crc = crc16_ccitt(payload.as_bytes());
    payload.push_str(&format!("{crc:04X}"));
    payload
}

/// Settlement correlation key: lowercase hex MD5 of the payload.
pub fn payload_digest(payload: &str) -> String {
    hex::encode(Md5::digest(payload.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Unknown => "UNKNOWN",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BakongError {
    #[error("payment network unreachable: {0}")]
    Network(String),
    #[error("unexpected payment network response")]
    Decode,
}

#[derive(Deserialize)]
struct CheckTransactionResponse {
    #[serde(rename = "responseCode")]
    response_code: i64,
}

/// Thin client for the Bakong open API. The status call carries a bounded
/// timeout; the network is the one dependency with unbounded latency.
#[derive(Clone)]
pub struct BakongClient {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
}

impl BakongClient {
    pub fn new(cfg: &BakongConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_token: cfg.api_token.clone(),
        })
    }

    /// Ask the network whether the transaction behind `digest` has settled.
    pub async fn check_transaction(&self, digest: &str) -> Result<PaymentStatus, BakongError> {
        let url = format!("{}/v1/check_transaction_by_md5", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "md5": digest }))
            .send()
            .await
            .map_err(|e| BakongError::Network(e.to_string()))?;
        let body: CheckTransactionResponse =
            resp.json().await.map_err(|_| BakongError::Decode)?;
        Ok(match body.response_code {
            0 => PaymentStatus::Paid,
            1 => PaymentStatus::Unpaid,
            _ => PaymentStatus::Unknown,
        })
    }
}
