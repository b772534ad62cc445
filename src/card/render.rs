use crate::card::template::{CARD_HEIGHT, CARD_WIDTH};
use crate::config::CardConfig;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

const QR_SIZE: u32 = 180;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("qr encoding failed: {0}")]
    Qr(String),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("renderer exited with {0}")]
    Exit(String),
    #[error("render timed out after {0}s")]
    Timeout(u64),
    #[error("renderer produced no output")]
    NoOutput,
}

/// QR code for the product page, inlined as a PNG data URL so the
/// template needs no extra asset round trip.
pub fn qr_data_url(url: &str) -> Result<String, RenderError> {
    let code = QrCode::new(url.as_bytes()).map_err(|err| RenderError::Qr(err.to_string()))?;
    let qr = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_SIZE, QR_SIZE)
        .dark_color(Luma([0x1a]))
        .light_color(Luma([0xfe]))
        .build();
    let mut png = Vec::new();
    DynamicImage::ImageLuma8(qr)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| RenderError::Qr(err.to_string()))?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(&png)))
}

/// Screenshots the card HTML at exact print dimensions with headless
/// Chromium. The scratch directory is removed on every exit path; a hung
/// renderer is killed when the timeout drops the child.
pub async fn render_card_png(config: &CardConfig, html: &str) -> Result<Vec<u8>, RenderError> {
    let workdir = std::env::temp_dir().join(format!("rickhouse-card-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&workdir).await?;
    let input = workdir.join("card.html");
    let output = workdir.join("card.png");
    tokio::fs::write(&input, html).await?;

    debug!(
        target: "rickhouse.card",
        binary = %config.chrome_binary,
        workdir = %workdir.display(),
        "launching renderer"
    );
    let mut command = Command::new(&config.chrome_binary);
    command
        .arg("--headless")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--hide-scrollbars")
        .arg("--force-device-scale-factor=1")
        .arg(format!("--window-size={CARD_WIDTH},{CARD_HEIGHT}"))
        .arg(format!("--screenshot={}", output.display()))
        .arg(format!("file://{}", input.display()))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let waited = timeout(
        Duration::from_secs(config.render_timeout_secs),
        command.output(),
    )
    .await;

    let result = match waited {
        Err(_) => Err(RenderError::Timeout(config.render_timeout_secs)),
        Ok(Err(err)) => Err(RenderError::Io(err)),
        Ok(Ok(out)) if !out.status.success() => Err(RenderError::Exit(format!(
            "{}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        ))),
        Ok(Ok(_)) => match tokio::fs::read(&output).await {
            Ok(bytes) if !bytes.is_empty() => {
                info!(target: "rickhouse.card", size = bytes.len(), "card rendered");
                Ok(bytes)
            }
            _ => Err(RenderError::NoOutput),
        },
    };

    let _ = tokio::fs::remove_dir_all(&workdir).await;
    result
}
