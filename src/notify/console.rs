//! Notification commands

use anyhow::{Context, Result};

use super::banner;
use crate::models::Notification;
use crate::session::Session;

fn print_notification(n: &Notification) {
    let marker = if n.is_read { " " } else { "*" };
    println!(
        "{} {} [{}] {}",
        marker,
        n.created_at.format("%Y-%m-%d %H:%M"),
        n.id,
        banner(n)
    );
}

/// List the newest notifications.
pub async fn list(limit: u32) -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;

    let mut center = session.notification_center().with_page_size(limit);
    center.mount(session.api()).await?;

    println!("\nNotifications ({} unread):", center.unread_count());
    println!("{:-<60}", "");

    if center.notifications().is_empty() {
        println!("  (no notifications)");
        return Ok(());
    }
    for n in center.notifications() {
        print_notification(n);
    }
    Ok(())
}

pub async fn mark_read(id: &str) -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;

    let mut center = session.notification_center();
    center.mount(session.api()).await?;

    if center.mark_read(session.api(), id).await? {
        println!("Marked as read. {} unread.", center.unread_count());
    } else {
        println!("Notification {} is not among your unread notifications.", id);
    }
    Ok(())
}

pub async fn mark_all_read() -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;

    let mut center = session.notification_center();
    center.mount(session.api()).await?;
    center.mark_all_read(session.api()).await?;
    println!("All notifications marked as read.");
    Ok(())
}

/// Stream pushed notifications until Ctrl-C.
pub async fn watch() -> Result<()> {
    let session = Session::load()?;
    session.ensure_signed_in()?;

    let mut center = session.notification_center();
    center.mount(session.api()).await?;

    session.connect_notifications()?;
    session
        .notification_connection()
        .wait_connected()
        .await
        .context("Could not reach the notification server")?;

    println!(
        "Watching notifications ({} unread)... (Ctrl-C to stop)",
        center.unread_count()
    );

    loop {
        tokio::select! {
            pushed = center.next_push() => {
                let n = pushed?;
                if !session.config().desktop_alerts {
                    print_notification(&n);
                }
                println!("  {} unread", center.unread_count());
            }
            _ = session.notification_connection().wait_disconnected() => {
                anyhow::bail!("Lost connection to the notification server");
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    session.notification_connection().disconnect().await;
    Ok(())
}
