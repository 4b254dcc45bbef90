use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        password::{self, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH},
        user, AccountStatus, AuthError, AuthService, AuthUser, Role, TokenPair,
    },
    db::{is_unique_violation, DbPool},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
    /// Defaults to `USER`
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserView {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserView,
    pub token: TokenPair,
}

/// Email rules attached to each role.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    pub staff_email_domain: String,
    pub admin_email: String,
}

impl RolePolicy {
    /// Check that `email` may register as `role`.
    pub fn check(&self, email: &str, role: Role) -> Result<(), ServiceError> {
        let is_admin_email = email == self.admin_email.to_lowercase();
        let is_staff_domain = email.ends_with(&format!("@{}", self.staff_email_domain.to_lowercase()));

        match role {
            Role::Admin if !is_admin_email => Err(ServiceError::ValidationError(
                "Admin accounts must use the designated admin email address".to_string(),
            )),
            Role::Staff if is_admin_email => Err(ServiceError::ValidationError(
                "This email is reserved for the administrator".to_string(),
            )),
            Role::Staff if !is_staff_domain => Err(ServiceError::ValidationError(format!(
                "Staff must use an email on the @{} domain",
                self.staff_email_domain
            ))),
            Role::User if is_staff_domain => Err(ServiceError::ValidationError(format!(
                "Customer accounts cannot use the @{} domain",
                self.staff_email_domain
            ))),
            _ => Ok(()),
        }
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) async fn hash_off_thread(plain: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| ServiceError::InternalError(format!("hashing task failed: {e}")))?
}

async fn verify_off_thread(plain: String, stored: String) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &stored))
        .await
        .map_err(|e| ServiceError::InternalError(format!("verification task failed: {e}")))
}

/// Signup, login and self-service account changes.
#[derive(Clone)]
pub struct AccountService {
    db_pool: Arc<DbPool>,
    auth: Arc<AuthService>,
    event_sender: EventSender,
    policy: RolePolicy,
}

impl AccountService {
    pub fn new(
        db_pool: Arc<DbPool>,
        auth: Arc<AuthService>,
        event_sender: EventSender,
        policy: RolePolicy,
    ) -> Self {
        Self {
            db_pool,
            auth,
            event_sender,
            policy,
        }
    }

    /// Insert an account without the signup email rules. Used for bootstrap
    /// accounts created from the command line.
    pub async fn create_account(
        &self,
        name: &str,
        email: &str,
        plain_password: &str,
        role: Role,
    ) -> Result<user::Model, ServiceError> {
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&plain_password.len()) {
            return Err(ServiceError::ValidationError(format!(
                "Password must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH} characters"
            )));
        }
        let password_hash = hash_off_thread(plain_password.to_string()).await?;

        let account = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            email: Set(normalize_email(email)),
            password_hash: Set(password_hash),
            role: Set(role),
            department: Set(None),
            status: Set(AccountStatus::Active),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("User already exists".to_string())
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        self.event_sender
            .send_or_log(Event::UserRegistered(account.id))
            .await;
        Ok(account)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn signup(&self, request: SignupRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let role = request.role.unwrap_or(Role::User);
        self.policy.check(&email, role)?;

        let account = self
            .create_account(&request.name, &email, &request.password, role)
            .await?;
        let token = self.auth.generate_token(&account)?;

        info!(user_id = %account.id, role = role.as_claim(), "Account created");
        Ok(AuthResponse {
            message: "User created successfully".to_string(),
            user: account.into(),
            token,
        })
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        let account = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db_pool)
            .await?;

        let Some(account) = account else {
            warn!(%email, "Login failed: unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };

        let verified = verify_off_thread(request.password, account.password_hash.clone()).await?;
        if !verified {
            warn!(user_id = %account.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }
        if account.status == AccountStatus::Inactive {
            warn!(user_id = %account.id, "Login refused: account inactive");
            return Err(ServiceError::Forbidden("Account is inactive".to_string()));
        }

        let token = self.auth.generate_token(&account)?;
        Ok(AuthResponse {
            message: "Login successful".to_string(),
            user: account.into(),
            token,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: ChangePasswordRequest,
    ) -> Result<MessageResponse, ServiceError> {
        request.validate()?;
        let account = self.find(user_id).await?;

        let verified =
            verify_off_thread(request.current_password, account.password_hash.clone()).await?;
        if !verified {
            warn!(%user_id, "Password change refused: wrong current password");
            return Err(ServiceError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }

        let password_hash = hash_off_thread(request.new_password).await?;
        let mut active: user::ActiveModel = account.into();
        active.password_hash = Set(password_hash);
        active.update(&*self.db_pool).await?;

        info!(%user_id, "Password changed");
        self.event_sender
            .send_or_log(Event::PasswordChanged(user_id))
            .await;
        Ok(MessageResponse {
            message: "Password updated successfully".to_string(),
        })
    }

    /// Reissue a token for a caller whose account still exists, is active and
    /// still holds the role the presented token claims.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn refresh(&self, caller: &AuthUser) -> Result<AuthResponse, ServiceError> {
        let user_id = caller.user_uuid()?;
        let account = user::Entity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("User not found".to_string()))?;

        if !caller.has_role(account.role.as_claim()) {
            warn!(%user_id, "Refresh refused: role changed since token was issued");
            return Err(ServiceError::Unauthorized("User role mismatch".to_string()));
        }
        if account.status == AccountStatus::Inactive {
            return Err(ServiceError::Unauthorized("Account is inactive".to_string()));
        }

        let token = self.auth.generate_token(&account)?;
        Ok(AuthResponse {
            message: "Token refreshed successfully".to_string(),
            user: account.into(),
            token,
        })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserView, ServiceError> {
        Ok(self.find(user_id).await?.into())
    }

    /// The new email must still satisfy the rules for the account's role.
    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserView, ServiceError> {
        request.validate()?;
        let account = self.find(user_id).await?;
        let email = normalize_email(&request.email);
        self.policy.check(&email, account.role)?;

        let mut active: user::ActiveModel = account.into();
        active.name = Set(request.name.trim().to_string());
        active.email = Set(email);
        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Email is already in use".to_string())
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        info!(%user_id, "Profile updated");
        Ok(updated.into())
    }

    async fn find(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }
}
