use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::pricing;
use crate::{
    db::DbPool,
    entities::{cart_item, product},
    errors::ServiceError,
};

pub const MAX_LINE_QUANTITY: i32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    /// Zero removes the line
    #[validate(range(min = 0, max = 1000, message = "Quantity must be between 0 and 1000"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub in_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub total: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    db_pool: Arc<DbPool>,
}

impl CartService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Cart lines priced at current catalog prices.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(&*self.db_pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut total = Decimal::ZERO;
        for (line, product) in rows {
            let Some(product) = product else { continue };
            let unit_price = pricing::round_money(product.price);
            let line_total = pricing::line_total(unit_price, line.quantity);
            total += line_total;
            items.push(CartLine {
                product_id: product.id,
                product_name: product.name,
                quantity: line.quantity,
                unit_price,
                line_total,
                in_stock: product.is_active && product.stock >= line.quantity,
            });
        }

        Ok(CartView { items, total })
    }

    async fn find_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<cart_item::Model>, ServiceError> {
        Ok(cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db_pool)
            .await?)
    }

    /// Add a product, or increase the quantity of an existing line.
    #[instrument(skip(self, request), fields(product_id = %request.product_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        request: AddCartItemRequest,
    ) -> Result<CartView, ServiceError> {
        request.validate()?;

        product::Entity::find_by_id(request.product_id)
            .one(&*self.db_pool)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", request.product_id)))?;

        match self.find_line(user_id, request.product_id).await? {
            Some(existing) => {
                let quantity = existing.quantity + request.quantity;
                if quantity > MAX_LINE_QUANTITY {
                    return Err(ServiceError::ValidationError(format!(
                        "Quantity cannot exceed {MAX_LINE_QUANTITY}"
                    )));
                }
                let mut active: cart_item::ActiveModel = existing.into();
                active.quantity = Set(quantity);
                active.update(&*self.db_pool).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(request.product_id),
                    quantity: Set(request.quantity),
                    ..Default::default()
                }
                .insert(&*self.db_pool)
                .await?;
            }
        }

        self.get(user_id).await
    }

    /// Set the quantity of a line. Zero removes it.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        UpdateCartItemRequest { quantity }.validate()?;

        if quantity == 0 {
            return self.remove_item(user_id, product_id).await;
        }

        let existing = self
            .find_line(user_id, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} is not in the cart")))?;
        let mut active: cart_item::ActiveModel = existing.into();
        active.quantity = Set(quantity);
        active.update(&*self.db_pool).await?;

        self.get(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<CartView, ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db_pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {product_id} is not in the cart"
            )));
        }
        self.get(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db_pool)
            .await?;
        Ok(())
    }
}
