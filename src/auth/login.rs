//! Login, logout and status commands

use anyhow::Result;

use super::LoginRoute;
use crate::api;
use crate::config::Config;
use crate::models::Role;
use crate::session::Session;

/// Sign in with email and password and persist the credentials.
pub async fn login(role: Role, email: &str, password: &str) -> Result<()> {
    let session = Session::load()?;
    let user = api::auth::login(session.api(), role, email, password).await?;

    println!("Logged in as {} <{}> ({}).", user.name, user.email, user.role.as_str());
    Ok(())
}

/// Disconnect and clear cached credentials.
pub async fn logout() -> Result<()> {
    let session = Session::load()?;
    let route = LoginRoute::for_role(session.store().role());
    session.logout().await;
    println!("Logged out. Sign in again with `{}`.", route.command());
    Ok(())
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let session = Session::load()?;
    let store = session.store();

    match store.user() {
        Some(user) => {
            println!("User:          {} <{}>", user.name, user.email);
            println!("Role:          {}", user.role.as_str());
        }
        None => println!("User:          none"),
    }

    match store.access_token() {
        Some(_) => println!("Access token:  present"),
        None => println!("Access token:  none"),
    }
    match store.refresh_token() {
        Some(_) => println!("Refresh token: present"),
        None => println!("Refresh token: none"),
    }

    println!("Gateway:       {}", session.config().gateway_url);
    if let Ok(path) = Config::credentials_path() {
        println!("Credentials:   {}", path.display());
    }

    if !store.is_logged_in() {
        let route = LoginRoute::for_role(store.role());
        println!("\nNot signed in. Run `{}`.", route.command());
    }
    Ok(())
}
