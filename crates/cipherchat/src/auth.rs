//! Account operations: login, signup, password change.
//!
//! Passwords never leave the client in the clear. Every call fetches the
//! current server key and seals the password(s) to it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};
use zeroize::Zeroizing;

use cipherchat_core::{
    validate_password, validate_person_name, validate_username, UserId, ValidationError,
};
use cipherchat_keys::KeyStore;
use cipherchat_sync::{Identity, IdentityService, KeyExchange, SignupRequest};

use crate::error::Result;

/// A username and password, validated.
pub struct Credentials {
    username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> std::result::Result<Self, ValidationError> {
        let username = validate_username(username)?.to_string();
        let password = Zeroizing::new(validate_password(password)?.to_string());
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The fields of a new account, validated.
pub struct SignupForm {
    full_name: String,
    surname: String,
    email: String,
    username: String,
    password: Zeroizing<String>,
}

impl SignupForm {
    pub fn new(
        full_name: &str,
        surname: &str,
        email: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<Self, ValidationError> {
        Ok(Self {
            full_name: validate_person_name("full name", full_name)?.to_string(),
            surname: validate_person_name("surname", surname)?.to_string(),
            email: validate_person_name("email", email)?.to_string(),
            username: validate_username(username)?.to_string(),
            password: Zeroizing::new(validate_password(password)?.to_string()),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupForm")
            .field("full_name", &self.full_name)
            .field("surname", &self.surname)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A request to replace the current password.
pub struct PasswordChange {
    old: Zeroizing<String>,
    new: Zeroizing<String>,
}

impl PasswordChange {
    /// `confirm` must repeat `new`, and `new` must differ from `old`.
    /// All three are compared with surrounding whitespace trimmed.
    pub fn new(old: &str, new: &str, confirm: &str) -> std::result::Result<Self, ValidationError> {
        let (old, new, confirm) = (old.trim(), new.trim(), confirm.trim());
        if old.is_empty() {
            return Err(ValidationError::Empty {
                field: "old password",
            });
        }
        if confirm.is_empty() {
            return Err(ValidationError::Empty {
                field: "password confirmation",
            });
        }
        validate_password(new)?;
        if new != confirm {
            return Err(ValidationError::PasswordMismatch);
        }
        if new == old {
            return Err(ValidationError::PasswordUnchanged);
        }

        Ok(Self {
            old: Zeroizing::new(old.to_string()),
            new: Zeroizing::new(new.to_string()),
        })
    }
}

impl fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}

/// Account calls against the identity service.
pub struct AccountClient<B> {
    backend: Arc<B>,
    keys: KeyStore,
}

impl<B> AccountClient<B>
where
    B: IdentityService + KeyExchange,
{
    /// Create a client with a fresh key pair.
    pub fn new(backend: Arc<B>) -> Result<Self> {
        Ok(Self {
            backend,
            keys: KeyStore::generate_identity()?,
        })
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Fetch and cache the server's current public key.
    pub async fn refresh_server_key(&mut self) -> Result<()> {
        let pem = self.backend.server_public_key().await?;
        self.keys.set_server_public_key(&pem)?;
        Ok(())
    }

    /// Log in and return who the server now thinks we are.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<Identity> {
        self.refresh_server_key().await?;
        let wrapped = self.keys.wrap_for_server(credentials.password.as_bytes())?;

        self.backend.login(&credentials.username, &wrapped).await?;
        let identity = self.backend.who_am_i().await?;
        info!(user = %identity.id, username = %identity.username, "logged in");
        Ok(identity)
    }

    pub async fn signup(&mut self, form: &SignupForm) -> Result<()> {
        self.refresh_server_key().await?;
        let request = SignupRequest {
            full_name: form.full_name.clone(),
            surname: form.surname.clone(),
            email: form.email.clone(),
            username: form.username.clone(),
            wrapped_password: self.keys.wrap_for_server(form.password.as_bytes())?,
        };

        self.backend.signup(&request).await?;
        info!(username = %form.username, "account created");
        Ok(())
    }

    pub async fn change_password(&mut self, user: UserId, change: &PasswordChange) -> Result<()> {
        self.refresh_server_key().await?;
        let wrapped_old = self.keys.wrap_for_server(change.old.as_bytes())?;
        let wrapped_new = self.keys.wrap_for_server(change.new.as_bytes())?;

        self.backend
            .change_password(user, &wrapped_old, &wrapped_new)
            .await?;
        debug!(user = %user, "password changed");
        Ok(())
    }

    pub async fn who_am_i(&self) -> Result<Identity> {
        Ok(self.backend.who_am_i().await?)
    }

    /// End the server session and forget the server key.
    pub async fn logout(&mut self) -> Result<()> {
        self.backend.logout().await?;
        self.keys.clear_server_public_key();
        info!("logged out");
        Ok(())
    }
}
