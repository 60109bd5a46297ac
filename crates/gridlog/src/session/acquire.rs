//! Interactive credential acquisition.
//!
//! Minting a blob means driving a real login through a headless browser,
//! which is slow, visible, and sometimes asks for a one-time code. The
//! engine therefore only knows the [`CredentialAcquirer`] capability; tests
//! substitute a fake, and the chromiumoxide-backed [`BrowserAcquirer`] is an
//! implementation detail behind the `browser` feature.

use async_trait::async_trait;

use super::blob::CredentialBlob;
use super::error::SessionError;

/// Capability to mint a fresh credential blob through interactive login.
#[async_trait]
pub trait CredentialAcquirer: Send + Sync {
    /// Drive a full login sequence and return the harvested cookie set.
    ///
    /// Fails with [`SessionError::OtpRequired`] when the remote flow demands
    /// a one-time code and `otp_code` is `None`, and with
    /// [`SessionError::LoginRejected`] when the platform refuses the
    /// credentials; any other navigation or element failure fails the whole
    /// acquisition with no blob stored.
    async fn acquire(
        &self,
        email: &str,
        password: &str,
        otp_code: Option<&str>,
    ) -> Result<CredentialBlob, SessionError>;
}

#[cfg(feature = "browser")]
pub use browser::{BrowserAcquirer, BrowserAcquirerOptions};

#[cfg(feature = "browser")]
mod browser {
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::page::Page;
    use chrono::{DateTime, Utc};
    use futures::StreamExt;
    use rand::Rng;
    use tokio::sync::Mutex;

    use super::super::blob::{CredentialBlob, SessionCookie};
    use super::super::error::SessionError;
    use super::CredentialAcquirer;

    /// Options for the browser-backed acquirer.
    #[derive(Debug, Clone)]
    pub struct BrowserAcquirerOptions {
        /// Login page URL.
        pub login_url: String,
        /// Keep the browser window open after the flow (debug/inspect mode).
        /// Implies a headful browser.
        pub keep_open: bool,
        /// Upper bound for each navigation/element wait.
        pub step_timeout: Duration,
    }

    impl BrowserAcquirerOptions {
        pub fn new(login_url: impl Into<String>) -> Self {
            Self {
                login_url: login_url.into(),
                keep_open: false,
                step_timeout: Duration::from_secs(30),
            }
        }
    }

    /// Acquires credentials by driving a Chromium instance through the login
    /// form. The browser is exclusive: at most one acquisition runs at a
    /// time, and the instance is torn down on completion or error unless
    /// `keep_open` is set.
    pub struct BrowserAcquirer {
        options: BrowserAcquirerOptions,
        // Serializes acquisitions; the browser is a shared, exclusive resource.
        flow_lock: Mutex<()>,
    }

    impl BrowserAcquirer {
        pub fn new(options: BrowserAcquirerOptions) -> Self {
            Self {
                options,
                flow_lock: Mutex::new(()),
            }
        }

        /// A short human-ish pause between form interactions.
        async fn pause(&self) {
            let ms = rand::thread_rng().gen_range(120..400);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        async fn step<T>(
            &self,
            what: &str,
            fut: impl std::future::Future<Output = chromiumoxide::error::Result<T>>,
        ) -> Result<T, SessionError> {
            match tokio::time::timeout(self.options.step_timeout, fut).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(SessionError::Acquisition(format!("{what}: {e}"))),
                Err(_) => Err(SessionError::Acquisition(format!("{what}: timed out"))),
            }
        }

        async fn fill(&self, page: &Page, selector: &str, text: &str) -> Result<(), SessionError> {
            let element = self
                .step(selector, page.find_element(selector.to_string()))
                .await?;
            self.step(selector, element.click()).await?;
            self.pause().await;
            self.step(selector, element.type_str(text.to_string()))
                .await?;
            Ok(())
        }

        async fn submit(&self, page: &Page) -> Result<(), SessionError> {
            let button = self
                .step("submit button", page.find_element("button[type='submit']".to_string()))
                .await?;
            self.step("submit button", button.click()).await?;
            self.step("post-submit navigation", page.wait_for_navigation())
                .await?;
            Ok(())
        }

        async fn run_login(
            &self,
            browser: &Browser,
            email: &str,
            password: &str,
            otp_code: Option<&str>,
        ) -> Result<CredentialBlob, SessionError> {
            let page = self
                .step(
                    "open login page",
                    browser.new_page(self.options.login_url.as_str()),
                )
                .await?;
            self.step("login page load", page.wait_for_navigation())
                .await?;
            self.pause().await;

            self.fill(&page, "input[type='email']", email).await?;
            self.pause().await;
            self.fill(&page, "input[type='password']", password).await?;
            self.submit(&page).await?;

            // Some accounts get a one-time-code challenge after the password
            // step. Its absence is the common case, so a failed lookup here
            // just means no challenge.
            if let Ok(Ok(code_input)) = tokio::time::timeout(
                Duration::from_secs(3),
                page.find_element("input[autocomplete='one-time-code'], input[name='code']".to_string()),
            )
            .await
            {
                let code = otp_code.ok_or(SessionError::OtpRequired)?;
                tracing::debug!("login challenged for a one-time code");
                self.step("otp input", code_input.click()).await?;
                self.pause().await;
                self.step("otp input", code_input.type_str(code.to_string()))
                    .await?;
                self.submit(&page).await?;
            }

            // A rejected login re-renders the form in place, which still
            // satisfies the navigation wait and can leave pre-auth cookies
            // behind. A password field still on the page means rejection.
            if let Ok(Ok(_)) = tokio::time::timeout(
                Duration::from_secs(3),
                page.find_element("input[type='password']".to_string()),
            )
            .await
            {
                return Err(SessionError::LoginRejected);
            }

            let cookies = self.step("harvest cookies", page.get_cookies()).await?;
            if cookies.is_empty() {
                return Err(SessionError::Acquisition(
                    "login finished but no cookies were set".to_string(),
                ));
            }

            let cookies = cookies
                .into_iter()
                .map(|c| SessionCookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                    expires_at: expiry_from_epoch(c.expires),
                    http_only: c.http_only,
                    secure: c.secure,
                })
                .collect();

            Ok(CredentialBlob::minted(cookies, otp_code.is_some()))
        }
    }

    fn expiry_from_epoch(expires: f64) -> Option<DateTime<Utc>> {
        if expires <= 0.0 {
            return None;
        }
        DateTime::from_timestamp(expires as i64, 0)
    }

    #[async_trait]
    impl CredentialAcquirer for BrowserAcquirer {
        async fn acquire(
            &self,
            email: &str,
            password: &str,
            otp_code: Option<&str>,
        ) -> Result<CredentialBlob, SessionError> {
            let _exclusive = self.flow_lock.lock().await;

            let mut config = BrowserConfig::builder();
            if self.options.keep_open {
                config = config.with_head();
            }
            let config = config.build().map_err(SessionError::Acquisition)?;

            let (mut browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| SessionError::Acquisition(format!("browser launch: {e}")))?;

            // The handler must be polled for the CDP connection to make
            // progress; it ends when the browser goes away.
            let driver = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            let result = self.run_login(&browser, email, password, otp_code).await;

            if !(self.options.keep_open && result.is_ok()) {
                if let Err(e) = browser.close().await {
                    tracing::debug!(error = %e, "browser close failed");
                }
                let _ = browser.wait().await;
            }
            driver.abort();

            result
        }
    }
}
