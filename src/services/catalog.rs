use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::orders::MAX_PAGE_SIZE;
use super::pricing::round_money;
use crate::{
    db::DbPool,
    entities::{cart_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
};

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ValidationError::new("negative_price"));
    }
    if price.scale() > 2 && price.round_dp(2) != *price {
        return Err(ValidationError::new("price_precision"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Product name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

/// Fields left out keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Product name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SetStockRequest {
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<product::Model> for ProductView {
    fn from(p: product::Model) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            category: p.category,
            price: round_money(p.price),
            stock: p.stock,
            is_active: p.is_active,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<ProductView>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    /// URL-safe form of `name`
    pub id: String,
    pub name: String,
    pub product_count: i64,
}

#[derive(Debug, FromQueryResult)]
struct CategoryCount {
    category: Option<String>,
    product_count: i64,
}

/// `Raw Honey & Combs` -> `raw-honey-combs`
pub fn category_slug(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Active products, by name.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        category: Option<String>,
    ) -> Result<ProductPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);

        let mut query = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name);
        if let Some(category) = category.filter(|c| !c.is_empty()) {
            query = query.filter(product::Column::Category.eq(category));
        }

        let paginator = query.paginate(&*self.db_pool, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok(ProductPage {
            products: products.into_iter().map(ProductView::from).collect(),
            total,
            page,
            per_page,
        })
    }

    pub async fn get(&self, product_id: Uuid) -> Result<ProductView, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .filter(|p| p.is_active)
            .map(ProductView::from)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: CreateProductRequest) -> Result<ProductView, ServiceError> {
        request.validate()?;

        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            category: Set(request.category),
            price: Set(request.price),
            stock: Set(request.stock),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(product_id = %created.id, "Product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;
        Ok(created.into())
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductView, ServiceError> {
        request.validate()?;
        let existing = self.find_active(product_id).await?;

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
        }
        if let Some(category) = request.category {
            active.category = Set(Some(category).filter(|c| !c.trim().is_empty()));
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(stock) = request.stock {
            active.stock = Set(stock);
        }
        let updated = active.update(&*self.db_pool).await?;

        info!(%product_id, "Product updated");
        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;
        Ok(updated.into())
    }

    /// Withdraw a product from sale. The row stays so past order lines keep
    /// their reference; open cart lines for it are dropped.
    #[instrument(skip(self))]
    pub async fn delete(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find_active(product_id).await?;

        let txn = self.db_pool.begin().await?;
        let mut active: product::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.update(&txn).await?;
        let removed = cart_item::Entity::delete_many()
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(%product_id, cart_lines = removed.rows_affected, "Product withdrawn");
        self.event_sender
            .send_or_log(Event::ProductRemoved(product_id))
            .await;
        Ok(())
    }

    /// Categories in use by active products.
    pub async fn categories(&self) -> Result<Vec<CategoryView>, ServiceError> {
        let counts = product::Entity::find()
            .select_only()
            .column(product::Column::Category)
            .column_as(Expr::col(product::Column::Id).count(), "product_count")
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::Category.is_not_null())
            .group_by(product::Column::Category)
            .order_by_asc(product::Column::Category)
            .into_model::<CategoryCount>()
            .all(&*self.db_pool)
            .await?;

        Ok(counts
            .into_iter()
            .filter_map(|row| {
                let name = row.category.filter(|c| !c.trim().is_empty())?;
                Some(CategoryView {
                    id: category_slug(&name),
                    name,
                    product_count: row.product_count,
                })
            })
            .collect())
    }

    async fn find_active(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
    }

    /// Absolute stock level, as set by staff on restock or count.
    #[instrument(skip(self))]
    pub async fn set_stock(&self, product_id: Uuid, stock: i32) -> Result<ProductView, ServiceError> {
        SetStockRequest { stock }.validate()?;

        let existing = product::Entity::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let mut active: product::ActiveModel = existing.into();
        active.stock = Set(stock);
        let updated = active.update(&*self.db_pool).await?;

        info!(%product_id, stock, "Stock level set");
        self.event_sender
            .send_or_log(Event::ProductStockSet { product_id, stock })
            .await;
        Ok(updated.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(price: Decimal, stock: i32) -> CreateProductRequest {
        CreateProductRequest {
            name: "Filter coffee".into(),
            description: None,
            category: Some("beverages".into()),
            price,
            stock,
        }
    }

    #[test]
    fn accepts_valid_product() {
        assert!(request(dec!(99.00), 5).validate().is_ok());
        assert!(request(Decimal::ZERO, 0).validate().is_ok());
    }

    #[test]
    fn rejects_negative_price_and_stock() {
        assert!(request(dec!(-1.00), 5).validate().is_err());
        assert!(request(dec!(10.00), -1).validate().is_err());
    }

    #[test]
    fn partial_update_validates_only_given_fields() {
        assert!(UpdateProductRequest::default().validate().is_ok());
        let bad = UpdateProductRequest {
            price: Some(dec!(-5.00)),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = UpdateProductRequest {
            stock: Some(-1),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn category_slugs_are_url_safe() {
        assert_eq!(category_slug("Raw Honey & Combs"), "raw-honey-combs");
        assert_eq!(category_slug("honey"), "honey");
        assert_eq!(category_slug("  Bee-Wax  "), "bee-wax");
    }

    #[test]
    fn rejects_sub_cent_prices() {
        assert!(request(dec!(10.001), 1).validate().is_err());
        assert!(request(dec!(10.100), 1).validate().is_ok());
    }
}
