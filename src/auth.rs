//! Pulsoid access-token handling
//!
//! Pulsoid issues tokens through an OAuth2 implicit grant that ends on a
//! web page showing the token, so first-run login is:
//! 1. Build the authorize URL with a random `state`
//! 2. Show it as text and as a terminal QR code
//! 3. Read the pasted token from stdin
//! 4. Persist it to the token file for later runs

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AuthSettings;
use crate::error::{Error, Result};

// ============================================================================
// Token storage
// ============================================================================

/// Plain-text token file
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(crate::config::expand_path(&settings.token_file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored token, or `None` when the file is missing or blank
    pub fn read(&self) -> Result<Option<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(Error::IoRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let token = content.trim();
        if token.is_empty() {
            debug!(path = %self.path.display(), "Token file is empty");
            return Ok(None);
        }
        Ok(Some(token.to_string()))
    }

    pub fn save(&self, token: &str) -> Result<()> {
        let write_error = |path: &Path, source| Error::IoWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
            }
        }
        fs::write(&self.path, token.trim()).map_err(|e| write_error(&self.path, e))?;

        info!(
            path = %self.path.display(),
            fingerprint = %token_fingerprint(token),
            "Token saved"
        );
        Ok(())
    }

    /// Remove the token file; returns whether one existed
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Token removed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(Error::IoWrite {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Short, stable identifier for a token that is safe to log
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.trim().as_bytes());
    hex::encode(&digest[..6])
}

// ============================================================================
// Authorization URL
// ============================================================================

/// OAuth2 implicit-grant URL that ends on a page displaying the token
pub fn authorization_url(settings: &AuthSettings) -> Result<Url> {
    let state = uuid::Uuid::new_v4().simple().to_string();

    Url::parse_with_params(
        &settings.authorize_url,
        &[
            ("client_id", settings.client_id.as_str()),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("response_type", "token"),
            ("scope", settings.scope.as_str()),
            ("state", state.as_str()),
            ("response_mode", "web_page"),
        ],
    )
    .map_err(|e| {
        Error::config_field_invalid("auth.authorize_url", format!("Invalid authorize URL: {}", e))
    })
}

// ============================================================================
// Interactive login
// ============================================================================

/// Print the authorization URL and QR code for the user to open
pub fn display_authorization(url: &Url) {
    println!();
    println!("=== Pulsoid Authorization ===");
    println!();
    println!("Open this URL in a browser, sign in and allow access:");
    println!();
    println!("  {}", url);
    println!();

    match qrcode::QrCode::new(url.as_str().as_bytes()) {
        Ok(code) => {
            let image = code
                .render::<char>()
                .quiet_zone(false)
                .module_dimensions(2, 1)
                .build();
            println!("{}", image);
        }
        Err(e) => {
            warn!(error = %e, "Failed to generate QR code");
            println!("  (QR code generation failed)");
        }
    }

    println!();
    println!("Pulsoid then shows an access token like xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx");
}

/// Read lines until a non-empty token arrives
fn prompt_for_token<R: BufRead, W: Write>(mut input: R, mut output: W) -> anyhow::Result<String> {
    loop {
        write!(output, "Paste the access token: ").context("Failed to write prompt")?;
        output.flush().context("Failed to flush prompt")?;

        let mut line = String::new();
        let read = input.read_line(&mut line).context("Failed to read token")?;
        if read == 0 {
            bail!("input closed before a token was entered");
        }

        let token = line.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
        writeln!(output, "The token cannot be empty.").context("Failed to write prompt")?;
    }
}

fn login_with<R: BufRead, W: Write>(
    settings: &AuthSettings,
    store: &TokenStore,
    input: R,
    output: W,
) -> anyhow::Result<String> {
    let url = authorization_url(settings)?;
    display_authorization(&url);

    let token = prompt_for_token(input, output)?;
    store
        .save(&token)
        .with_context(|| format!("Failed to store token at {}", store.path().display()))?;
    Ok(token)
}

/// Run the interactive login on the terminal and persist the result
pub fn interactive_login(settings: &AuthSettings, store: &TokenStore) -> Result<String> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    login_with(settings, store, stdin.lock(), stdout.lock())
        .map_err(|e| Error::auth(format!("{:#}", e)))
}

// ============================================================================
// Token provider
// ============================================================================

/// Source of the bearer token used by the stream client
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_valid_token(&self) -> Result<String>;
}

/// Explicit token, then the token file, then (optionally) interactive login
pub struct FileTokenProvider {
    explicit: Option<String>,
    store: TokenStore,
    settings: AuthSettings,
    interactive: bool,
}

impl FileTokenProvider {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            explicit: None,
            store: TokenStore::from_settings(settings),
            settings: settings.clone(),
            interactive: true,
        }
    }

    /// Token supplied on the command line or through the environment
    pub fn with_explicit_token(mut self, token: Option<String>) -> Self {
        self.explicit = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn get_valid_token(&self) -> Result<String> {
        if let Some(token) = &self.explicit {
            info!(fingerprint = %token_fingerprint(token), "Using token from command line");
            return Ok(token.clone());
        }

        if let Some(token) = self.store.read()? {
            info!(
                path = %self.store.path().display(),
                fingerprint = %token_fingerprint(&token),
                "Using stored token"
            );
            return Ok(token);
        }

        if !self.interactive {
            return Err(Error::auth(format!(
                "no token found at {}",
                self.store.path().display()
            )));
        }

        info!("No stored token, starting authorization");
        let settings = self.settings.clone();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || interactive_login(&settings, &store))
            .await
            .map_err(|e| Error::Internal(format!("Login task failed: {}", e)))?
    }
}
