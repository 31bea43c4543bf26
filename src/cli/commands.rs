use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::app::{AppContext, Result};
use crate::mailer::{DeliveryEngine, SmtpMailer};
use crate::media::MediaResolver;
use crate::sync::SyncEngine;

pub async fn sync(ctx: AppContext) -> Result<()> {
    let mailer = Arc::new(SmtpMailer::new(&ctx.config.smtp)?);
    let resolver = MediaResolver::new(ctx.config.download_root.clone(), ctx.downloader.clone());

    let mut engine = SyncEngine::new(
        ctx.provider.clone(),
        resolver,
        DeliveryEngine::new(mailer),
        ctx.cache,
        ctx.config.from.clone(),
        ctx.config.to.clone(),
    );

    let summary = engine.run().await?;
    println!(
        "Delivered {} new notifications, {} already seen",
        summary.delivered, summary.skipped
    );

    Ok(())
}

pub fn status(ctx: &AppContext) -> Result<()> {
    println!("Cache file: {}", ctx.config.cache_file.display());
    println!("Seen illustrations: {}", ctx.cache.seen_count());

    match ctx.cache.credential() {
        Some(cred) if cred.is_valid(Utc::now().timestamp()) => {
            let until = DateTime::<Utc>::from_timestamp(cred.expires_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| cred.expires_at.to_string());
            println!("Access token: valid until {until}");
        }
        Some(_) => println!("Access token: expired"),
        None => println!("Access token: none cached"),
    }

    Ok(())
}
