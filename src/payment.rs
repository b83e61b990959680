use std::io::Cursor;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use metrics::increment_counter;
use qrcode::QrCode;
use rand::Rng;
use tracing::info;

use crate::config::BakongConfig;
use crate::khqr::{self, BakongClient, BakongError, PaymentStatus};
use crate::models::PaymentRecord;
use crate::repo::{Repo, RepoError};

#[derive(thiserror::Error, Debug)]
pub enum PaymentError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("product not found: {0}")]
    ProductNotFound(String),
    #[error("no payment record for digest")]
    RecordNotFound,
    #[error(transparent)]
    Network(#[from] BakongError),
    #[error("QR rendering failed: {0}")]
    Render(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct GeneratedQr {
    pub image_data_uri: String,
    pub digest: String,
    pub amount: f64,
}

/// Turns a cart into a payable QR and answers settlement queries for records
/// it has issued. Never caches settlement state.
pub struct PaymentQrService {
    repo: Arc<dyn Repo>,
    client: BakongClient,
    merchant: BakongConfig,
}

impl PaymentQrService {
    pub fn new(repo: Arc<dyn Repo>, client: BakongClient, merchant: BakongConfig) -> Self {
        Self { repo, client, merchant }
    }

    /// Resolve every product or fail; a cart naming an unknown id is a client
    /// error, not something to paper over by skipping the line item.
    pub async fn generate_qr(&self, product_ids: &[String]) -> Result<GeneratedQr, PaymentError> {
        if product_ids.is_empty() {
            return Err(PaymentError::EmptyCart);
        }
        let mut amount = 0.0;
        for id in product_ids {
            let product = self.repo.get_product(id).await.map_err(|e| match e {
                RepoError::NotFound => PaymentError::ProductNotFound(id.clone()),
                other => PaymentError::Repo(other),
            })?;
            amount += product.price;
        }

        let bill_number = format!("TRX{:08}", rand::thread_rng().gen_range(0..100_000_000u32));
        let payload = khqr::build_payload(&self.merchant, amount, &bill_number);
        let digest = khqr::payload_digest(&payload);

        // Persist before handing the QR out, so every issued code can be
        // resolved later by its digest.
        self.repo
            .create_payment(PaymentRecord {
                digest: digest.clone(),
                payload: payload.clone(),
                amount,
                created_at: Utc::now(),
            })
            .await?;

        let image_data_uri = render_png_data_uri(&payload)?;
        increment_counter!("payments_qr_generated_total");
        info!(%digest, amount, "generated payment QR");
        Ok(GeneratedQr { image_data_uri, digest, amount })
    }

    pub async fn check_status(
        &self,
        digest: &str,
    ) -> Result<(PaymentStatus, PaymentRecord), PaymentError> {
        let record = self
            .repo
            .find_payment(digest)
            .await?
            .ok_or(PaymentError::RecordNotFound)?;
        let status = self.client.check_transaction(digest).await?;
        increment_counter!("payments_status_checks_total");
        Ok((status, record))
    }
}

fn render_png_data_uri(payload: &str) -> Result<String, PaymentError> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| PaymentError::Render(e.to_string()))?;
    let img = code
        .render::<image::Luma<u8>>()
        .min_dimensions(320, 320)
        .build();
    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| PaymentError::Render(e.to_string()))?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}
