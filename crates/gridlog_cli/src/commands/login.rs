//! Interactive browser login: drives the platform's login form and stores
//! the harvested session.

use std::sync::Arc;
use std::time::Duration;

use console::{style, Term};
use gridlog::session::{
    BrowserAcquirer, BrowserAcquirerOptions, CredentialAcquirer, SessionError, SessionStore,
};

use crate::commands::shared::open_db;
use crate::config::Config;

pub(crate) async fn handle_login(
    config: &Config,
    database_url: &str,
    email: Option<String>,
    otp: Option<String>,
    keep_open: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let login_url = config
        .login_url()
        .ok_or("platform.base_url is not configured (set GRIDLOG_PLATFORM_BASE_URL)")?;

    let term = Term::stdout();

    let email = match email.or_else(|| config.platform.login_email.clone()) {
        Some(email) => email,
        None => {
            term.write_str("Email: ")?;
            term.read_line()?
        }
    };
    let email = email.trim().to_string();
    if email.is_empty() {
        return Err("an email address is required".into());
    }

    term.write_str("Password: ")?;
    let password = term.read_secure_line()?;
    if password.is_empty() {
        return Err("a password is required".into());
    }

    let mut options = BrowserAcquirerOptions::new(login_url);
    options.keep_open = keep_open;
    options.step_timeout = Duration::from_secs(45);
    let acquirer = BrowserAcquirer::new(options);

    println!(
        "{} in via {}...",
        style("Logging").green().bold(),
        style(&email).cyan()
    );

    let blob = match acquirer.acquire(&email, &password, otp.as_deref()).await {
        Ok(blob) => blob,
        Err(SessionError::OtpRequired) => {
            // Ask once and retry the whole flow with the code.
            term.write_str("One-time code: ")?;
            let code = term.read_line()?;
            let code = code.trim();
            if code.is_empty() {
                return Err(SessionError::OtpRequired.into());
            }
            acquirer.acquire(&email, &password, Some(code)).await?
        }
        Err(e) => return Err(e.into()),
    };

    let cookie_count = blob.cookies.len();
    let used_otp = blob.used_otp;

    let db = open_db(database_url).await?;
    let store = SessionStore::open(Arc::clone(&db)).await?;
    store.save(blob).await?;

    println!(
        "{} session stored ({} cookies{})",
        style("Success:").green().bold(),
        cookie_count,
        if used_otp { ", 2FA" } else { "" }
    );

    Ok(())
}
