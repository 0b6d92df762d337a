use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{Identity, Role, User};
use crate::crypto::{Crypto, opaque_token};
use crate::database::{Redemption, UserRepository};
use crate::error::{Result, ServerError};
use crate::mail::{MailManager, Template};
use crate::token::TokenManager;

/// Returned on successful login.
#[derive(Debug, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub token: String,
}

/// Account lifecycle: registration, confirmation, login, password reset.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    crypto: Arc<Crypto>,
    mail: MailManager,
    token: TokenManager,
    opaque_ttl: Duration,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        crypto: Arc<Crypto>,
        mail: MailManager,
        token: TokenManager,
        opaque_ttl: u64,
    ) -> Self {
        Self {
            repo,
            crypto,
            mail,
            token,
            opaque_ttl: Duration::seconds(opaque_ttl as i64),
        }
    }

    fn fresh_token(&self) -> (String, chrono::DateTime<Utc>) {
        (opaque_token(), Utc::now() + self.opaque_ttl)
    }

    /// Mail failures never fail the request.
    async fn notify(&self, template: Template, user: &User, token: &str) {
        if let Err(err) = self.mail.publish_event(template, user, token).await {
            tracing::error!(?template, error = %err, "cannot publish mail event");
        }
    }

    /// Create an unconfirmed account and send its confirmation token.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User> {
        let email = normalize_email(email);
        if self.repo.find_by_email(&email).await?.is_some() {
            return Err(ServerError::conflict("email"));
        }

        let password = self
            .crypto
            .pwd
            .hash_password(password)
            .map_err(|err| ServerError::internal("cannot hash password", err))?;
        let (token, expires_at) = self.fresh_token();

        let user = User {
            id: Uuid::new_v4(),
            email,
            name: name.trim().to_owned(),
            role: Role::Standard,
            password,
            confirmed: false,
            token: None,
            token_expires_at: None,
            created_at: Utc::now(),
        }
        .with_token(token.clone(), expires_at);

        self.repo.insert(&user).await?;
        metrics::counter!("accounts_registered_total").increment(1);
        tracing::info!(user = %user.id, "account registered");

        self.notify(Template::AccountConfirmation, &user, &token).await;
        Ok(user)
    }

    /// Mark the account confirmed. The token is single-use.
    pub async fn confirm(&self, token: &str) -> Result<()> {
        let user = self
            .repo
            .redeem_token(token, Utc::now(), &Redemption::Confirm)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        tracing::info!(user = %user.id, "account confirmed");
        Ok(())
    }

    /// Check credentials and issue a session token.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session> {
        let user = self
            .repo
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| ServerError::not_found("user"))?;

        if !user.confirmed {
            return Err(ServerError::NotConfirmed);
        }
        if !self.crypto.pwd.verify_password(password, &user.password) {
            return Err(ServerError::BadCredentials);
        }

        let token = self.token.create(&user.id)?;
        Ok(Session {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            token,
        })
    }

    /// Issue a reset token and mail it.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let user = self
            .repo
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| ServerError::not_found("user"))?;

        let (token, expires_at) = self.fresh_token();
        self.repo.issue_token(&user.id, &token, expires_at).await?;

        self.notify(Template::PasswordReset, &user, &token).await;
        Ok(())
    }

    /// Whether `token` can still be used for a reset.
    pub async fn check_reset_token(&self, token: &str) -> Result<()> {
        match self.repo.find_by_token(token).await? {
            Some(user) if user.token_is_live(Utc::now()) => Ok(()),
            _ => Err(ServerError::InvalidToken),
        }
    }

    /// Set a new password and burn the token.
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<()> {
        let hash = self
            .crypto
            .pwd
            .hash_password(password)
            .map_err(|err| ServerError::internal("cannot hash password", err))?;
        let user = self
            .repo
            .redeem_token(token, Utc::now(), &Redemption::Password(hash))
            .await?
            .ok_or(ServerError::InvalidToken)?;

        tracing::info!(user = %user.id, "password reset");
        Ok(())
    }

    /// Identity behind a session token.
    pub async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        let id = self.token.decode(token)?.user_id()?;
        Ok(self.repo.find_by_id(&id).await?.map(Identity::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Argon2;
    use crate::database::memory::MemoryUsers;

    fn service() -> (UserService, Arc<MemoryUsers>) {
        let repo = Arc::new(MemoryUsers::default());
        let crypto = Crypto::new(Some(Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap();

        let service = UserService::new(
            repo.clone(),
            Arc::new(crypto),
            MailManager::default(),
            TokenManager::new("https://dorado.test/", "secret", 3600),
            3600,
        );
        (service, repo)
    }

    #[tokio::test]
    async fn test_register_confirm_login() {
        let (users, _) = service();
        let ana = users
            .register("Ana", " Ana@Dorado.test ", "Jorge-Chavez-1960")
            .await
            .unwrap();
        assert_eq!(ana.email, "ana@dorado.test");

        assert!(matches!(
            users.authenticate("ana@dorado.test", "Jorge-Chavez-1960").await,
            Err(ServerError::NotConfirmed)
        ));

        let token = ana.token.clone().unwrap();
        users.confirm(&token).await.unwrap();
        assert!(matches!(
            users.confirm(&token).await,
            Err(ServerError::InvalidToken)
        ));

        assert!(matches!(
            users.authenticate("ana@dorado.test", "wrong").await,
            Err(ServerError::BadCredentials)
        ));
        let session = users
            .authenticate("ana@dorado.test", "Jorge-Chavez-1960")
            .await
            .unwrap();
        let identity = users.resolve(&session.token).await.unwrap().unwrap();
        assert_eq!(identity.id, ana.id);
        assert!(!identity.is_admin());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (users, _) = service();
        users.register("Ana", "ana@dorado.test", "password").await.unwrap();

        assert!(matches!(
            users.register("Ana B", "ANA@dorado.test", "password").await,
            Err(ServerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (users, _) = service();
        assert!(matches!(
            users.confirm("deadbeef").await,
            Err(ServerError::InvalidToken)
        ));
        assert!(users.check_reset_token("deadbeef").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (users, repo) = service();
        let ana = users
            .register("Ana", "ana@dorado.test", "password")
            .await
            .unwrap();
        let token = ana.token.clone().unwrap();

        repo.issue_token(&ana.id, &token, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert!(matches!(
            users.confirm(&token).await,
            Err(ServerError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_password_reset() {
        let (users, repo) = service();
        let ana = users
            .register("Ana", "ana@dorado.test", "old-password")
            .await
            .unwrap();
        users.confirm(ana.token.as_deref().unwrap()).await.unwrap();

        assert!(matches!(
            users.request_password_reset("nobody@dorado.test").await,
            Err(ServerError::NotFound(_))
        ));
        users.request_password_reset("ana@dorado.test").await.unwrap();

        let token = repo
            .find_by_id(&ana.id)
            .await
            .unwrap()
            .unwrap()
            .token
            .unwrap();
        users.check_reset_token(&token).await.unwrap();
        users.reset_password(&token, "new-password").await.unwrap();

        assert!(users.check_reset_token(&token).await.is_err());
        assert!(
            users
                .authenticate("ana@dorado.test", "new-password")
                .await
                .is_ok()
        );
        assert!(matches!(
            users.authenticate("ana@dorado.test", "old-password").await,
            Err(ServerError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn test_reset_token_is_single_use() {
        let (users, repo) = service();
        let ana = users
            .register("Ana", "ana@dorado.test", "old-password")
            .await
            .unwrap();
        users.confirm(ana.token.as_deref().unwrap()).await.unwrap();
        users.request_password_reset("ana@dorado.test").await.unwrap();
        let token = repo.find_by_id(&ana.id).await.unwrap().unwrap().token.unwrap();

        // both callers saw a live token before either redeemed it.
        users.check_reset_token(&token).await.unwrap();
        users.check_reset_token(&token).await.unwrap();
        let (first, second) = tokio::join!(
            users.reset_password(&token, "first-password"),
            users.reset_password(&token, "second-password"),
        );
        assert!(first.is_ok() ^ second.is_ok());
        assert!(matches!(
            first.err().or(second.err()),
            Some(ServerError::InvalidToken)
        ));

        let winner = if users
            .authenticate("ana@dorado.test", "first-password")
            .await
            .is_ok()
        {
            "first-password"
        } else {
            "second-password"
        };
        assert!(users.authenticate("ana@dorado.test", winner).await.is_ok());
        assert!(matches!(
            users.reset_password(&token, "third-password").await,
            Err(ServerError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_reset_request_keeps_confirmation() {
        let (users, repo) = service();
        let ana = users
            .register("Ana", "ana@dorado.test", "password")
            .await
            .unwrap();
        let confirmation = ana.token.clone().unwrap();
        users.confirm(&confirmation).await.unwrap();
        users.request_password_reset("ana@dorado.test").await.unwrap();

        let stored = repo.find_by_id(&ana.id).await.unwrap().unwrap();
        assert!(stored.confirmed);
        assert_ne!(stored.token, Some(confirmation.clone()));
        // the confirmation token cannot be replayed.
        assert!(matches!(
            users.confirm(&confirmation).await,
            Err(ServerError::InvalidToken)
        ));
        assert!(users.authenticate("ana@dorado.test", "password").await.is_ok());
    }
}
