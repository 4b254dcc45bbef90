//! Stock reservation for checkout.
//!
//! Everything here runs on the caller's transaction. A reservation is
//! released by rolling that transaction back, so no partial decrement
//! survives a failed checkout.

use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;

/// One requested line: a product and how many units of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// A decremented line with the price captured from the locked row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Stock left after this reservation
    pub remaining: i32,
}

/// Sum quantities per product. Keys come out sorted, which is the order
/// rows are locked and updated in.
pub fn aggregate(lines: &[LineRequest]) -> Result<BTreeMap<Uuid, i32>, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one item is required".to_string(),
        ));
    }

    let mut totals: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be positive",
                line.product_id
            )));
        }
        let entry = totals.entry(line.product_id).or_insert(0);
        *entry = entry.checked_add(line.quantity).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Quantity for product {} is too large",
                line.product_id
            ))
        })?;
    }
    Ok(totals)
}

/// Validate and decrement stock for every line.
///
/// Rows are read `FOR UPDATE` in id order, all lines are checked before any
/// write, and each decrement is conditional on `stock >= quantity`.
#[instrument(skip(txn, lines), fields(lines = lines.len()))]
pub async fn reserve<C>(txn: &C, lines: &[LineRequest]) -> Result<Vec<ReservedLine>, ServiceError>
where
    C: ConnectionTrait,
{
    let wanted = aggregate(lines)?;
    let ids: Vec<Uuid> = wanted.keys().copied().collect();

    let locked: BTreeMap<Uuid, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(ids))
        .order_by_asc(product::Column::Id)
        .lock_exclusive()
        .all(txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    for (product_id, quantity) in &wanted {
        let row = locked
            .get(product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        if row.stock < *quantity {
            warn!(%product_id, requested = quantity, available = row.stock, "Insufficient stock");
            counter!("storefront_stock.rejections", 1);
            return Err(ServiceError::InsufficientStock(*product_id));
        }
    }

    let mut reserved = Vec::with_capacity(wanted.len());
    for (product_id, quantity) in wanted {
        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            warn!(%product_id, requested = quantity, "Conditional stock decrement matched no row");
            counter!("storefront_stock.rejections", 1);
            return Err(ServiceError::InsufficientStock(product_id));
        }

        // Present in `locked`: checked in the validation pass above.
        let row = &locked[&product_id];
        debug!(%product_id, quantity, remaining = row.stock - quantity, "Stock reserved");
        reserved.push(ReservedLine {
            product_id,
            product_name: row.name.clone(),
            quantity,
            unit_price: row.price,
            remaining: row.stock - quantity,
        });
    }

    Ok(reserved)
}
