use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::accounts::{hash_off_thread, normalize_email, RolePolicy};
use crate::{
    auth::{user, AccountStatus, Role},
    db::{is_foreign_key_violation, is_unique_violation, DbPool},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateStaffRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(max = 100))]
    pub department: Option<String>,
    /// Initial password, handed to the staff member out of band
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateStaffRequest {
    #[validate(length(min = 1, max = 100, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub department: Option<String>,
    pub status: Option<AccountStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaffView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for StaffView {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            status: u.status,
            department: u.department,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StaffResponse {
    pub message: String,
    pub user: StaffView,
}

/// `Ravi Kumar` on `connectingbee.in` -> `ravikumar@connectingbee.in`
pub fn staff_email(name: &str, domain: &str) -> String {
    let local: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    format!("{}@{}", local, domain.to_lowercase())
}

/// Staff accounts managed by the administrator.
#[derive(Clone)]
pub struct StaffService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    policy: RolePolicy,
}

impl StaffService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, policy: RolePolicy) -> Self {
        Self {
            db_pool,
            event_sender,
            policy,
        }
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create(&self, request: CreateStaffRequest) -> Result<StaffResponse, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        self.policy.check(&email, Role::Staff)?;

        let expected = staff_email(&request.name, &self.policy.staff_email_domain);
        if email != expected {
            return Err(ServiceError::ValidationError(format!(
                "Staff email must be {expected}"
            )));
        }

        let password_hash = hash_off_thread(request.password).await?;
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(Role::Staff),
            department: Set(request.department),
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

        info!(staff_id = %created.id, "Staff account created");
        self.event_sender
            .send_or_log(Event::StaffCreated(created.id))
            .await;
        Ok(StaffResponse {
            message: "Staff user created successfully".to_string(),
            user: created.into(),
        })
    }

    pub async fn list(&self) -> Result<Vec<StaffView>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Role.eq(Role::Staff))
            .order_by_asc(user::Column::Name)
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .map(StaffView::from)
            .collect())
    }

    /// A new name also moves the account to the matching email address.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        staff_id: Uuid,
        request: UpdateStaffRequest,
    ) -> Result<StaffResponse, ServiceError> {
        request.validate()?;
        let existing = self.find(staff_id).await?;

        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = request.name {
            let email = staff_email(&name, &self.policy.staff_email_domain);
            self.policy.check(&email, Role::Staff)?;
            active.email = Set(email);
            active.name = Set(name.trim().to_string());
        }
        if let Some(department) = request.department {
            active.department = Set(Some(department).filter(|d| !d.trim().is_empty()));
        }
        if let Some(status) = request.status {
            active.status = Set(status);
        }

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Another account already uses that email".to_string())
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        info!(%staff_id, status = ?updated.status, "Staff account updated");
        self.event_sender
            .send_or_log(Event::StaffUpdated(staff_id))
            .await;
        Ok(StaffResponse {
            message: "Staff updated successfully".to_string(),
            user: updated.into(),
        })
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, staff_id: Uuid) -> Result<(), ServiceError> {
        self.find(staff_id).await?;

        user::Entity::delete_by_id(staff_id)
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ServiceError::Conflict(
                        "Staff account has orders; deactivate it instead".to_string(),
                    )
                } else {
                    ServiceError::DatabaseError(e)
                }
            })?;

        info!(%staff_id, "Staff account deleted");
        self.event_sender
            .send_or_log(Event::StaffRemoved(staff_id))
            .await;
        Ok(())
    }

    /// Only `STAFF` accounts are visible here.
    async fn find(&self, staff_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(staff_id)
            .one(&*self.db_pool)
            .await?
            .filter(|u| u.role == Role::Staff)
            .ok_or_else(|| ServiceError::NotFound("Staff user not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_email_strips_whitespace_and_case() {
        assert_eq!(
            staff_email("Ravi  Kumar", "ConnectingBee.in"),
            "ravikumar@connectingbee.in"
        );
        assert_eq!(staff_email("packer", "connectingbee.in"), "packer@connectingbee.in");
    }

    #[test]
    fn short_initial_password_is_rejected() {
        let request = CreateStaffRequest {
            name: "Ravi".into(),
            email: "ravi@connectingbee.in".into(),
            department: None,
            password: "1234".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn status_is_uppercase_on_the_wire() {
        let request: UpdateStaffRequest =
            serde_json::from_value(serde_json::json!({"status": "INACTIVE"})).unwrap();
        assert_eq!(request.status, Some(AccountStatus::Inactive));
        assert_eq!(request.name, None);
    }
}
