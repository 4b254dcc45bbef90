use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{db::is_foreign_key_violation, db::DbPool, entities::address, errors::ServiceError};

pub const DEFAULT_COUNTRY: &str = "India";

fn validate_pincode(pincode: &str) -> Result<(), ValidationError> {
    if (4..=10).contains(&pincode.len()) && pincode.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_pincode"))
    }
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if allowed && (7..=15).contains(&digits) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddressRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    #[validate(custom = "validate_pincode")]
    pub pincode: String,
    #[validate(length(min = 1, max = 255))]
    pub address1: String,
    #[validate(length(max = 255))]
    pub address2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 100))]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub pincode: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

impl From<address::Model> for AddressView {
    fn from(a: address::Model) -> Self {
        Self {
            id: a.id,
            name: a.name,
            phone: a.phone,
            pincode: a.pincode,
            address1: a.address1,
            address2: a.address2,
            city: a.city,
            state: a.state,
            country: a.country,
            created_at: a.created_at,
        }
    }
}

#[derive(Clone)]
pub struct AddressService {
    db_pool: Arc<DbPool>,
}

impl AddressService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<AddressView>, ServiceError> {
        Ok(address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .map(AddressView::from)
            .collect())
    }

    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        user_id: Uuid,
        request: CreateAddressRequest,
    ) -> Result<AddressView, ServiceError> {
        request.validate()?;

        let created = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            name: Set(request.name.trim().to_string()),
            phone: Set(request.phone.trim().to_string()),
            pincode: Set(request.pincode),
            address1: Set(request.address1),
            address2: Set(request.address2.filter(|a| !a.trim().is_empty())),
            city: Set(request.city),
            state: Set(request.state),
            country: Set(request
                .country
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string())),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        Ok(created.into())
    }

    /// Replace the fields of one of the caller's addresses.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        request: CreateAddressRequest,
    ) -> Result<AddressView, ServiceError> {
        request.validate()?;

        let existing = address::Entity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {address_id} not found")))?;

        let mut active: address::ActiveModel = existing.into();
        active.name = Set(request.name.trim().to_string());
        active.phone = Set(request.phone.trim().to_string());
        active.pincode = Set(request.pincode);
        active.address1 = Set(request.address1);
        active.address2 = Set(request.address2.filter(|a| !a.trim().is_empty()));
        active.city = Set(request.city);
        active.state = Set(request.state);
        active.country = Set(request
            .country
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()));

        Ok(active.update(&*self.db_pool).await?.into())
    }

    /// Delete one of the caller's addresses. Addresses used by orders are kept.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let result = address::Entity::delete_many()
            .filter(address::Column::Id.eq(address_id))
            .filter(address::Column::UserId.eq(user_id))
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ServiceError::Conflict("Address is referenced by existing orders".to_string())
                } else {
                    ServiceError::DatabaseError(e)
                }
            })?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Address {address_id} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateAddressRequest {
        CreateAddressRequest {
            name: "Asha Rao".into(),
            phone: "+91 98450 12345".into(),
            pincode: "560001".into(),
            address1: "12 MG Road".into(),
            address2: None,
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            country: None,
        }
    }

    #[test]
    fn accepts_well_formed_address() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_bad_phone_and_pincode() {
        let mut bad = request();
        bad.phone = "call me".into();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.pincode = "56-0001".into();
        assert!(bad.validate().is_err());
    }
}
