use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BidId, CartItemId, OrderId, ProductId, RequestId, UserId};
use domain::{
    Bid, BidStatus, Cart, CartItem, LineOrigin, Money, Order, OrderStatus, PaymentStatus, Product,
    Request, RequestStatus, UserProfile,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::{
    BidFilter, OrderFilter, ProductFilter, RequestFilter, Result, StoreError,
    store::{MarketStore, UnitOfWork},
};

const PRODUCT_COLUMNS: &str = "id, supplier_id, title, description, category, images, unit, \
     price, original_price, price_tiers, options, variants, available, sold, moq, created_at, \
     updated_at";

const REQUEST_COLUMNS: &str = "id, request_number, buyer_id, product_name, description, \
     category, quantity, unit, target_price, max_budget, status, bid_count, accepted_bid, \
     accepted_at, expires_at, created_at, updated_at";

const BID_COLUMNS: &str = "b.id, b.request_id, b.supplier_id, b.supplier_name, b.product_id, \
     b.product_title, b.bid_price, b.original_price, b.quantity, b.delivery_time_days, \
     b.message, b.status, b.created_at, b.accepted_at, b.rejected_at, b.withdrawn_at";

const CART_ITEM_COLUMNS: &str = "id, product_id, supplier_id, product_title, image, selection, \
     quantity, unit_price, total_price, min_order_quantity, max_order_quantity, origin, added_at";

const ORDER_COLUMNS: &str = "id, order_number, buyer, supplier, products, total_amount, status, \
     payment_status, shipping_address, notes, created_at, updated_at";

/// PostgreSQL-backed marketplace store.
#[derive(Clone)]
pub struct PostgresMarketStore {
    pool: PgPool,
}

impl PostgresMarketStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MarketStore for PostgresMarketStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// A single PostgreSQL transaction. Dropping it without commit rolls back.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn count(row: &PgRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value)
        .map_err(|_| StoreError::Decode(format!("{column} out of range: {value}")))
}

fn optional_count(row: &PgRow, column: &str) -> Result<Option<u32>> {
    let value: Option<i64> = row.try_get(column)?;
    value
        .map(|v| u32::try_from(v).map_err(|_| StoreError::Decode(format!("{column} out of range: {v}"))))
        .transpose()
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::from_cents(row.try_get(column)?))
}

fn parsed<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::Decode(format!("{column}: {e}")))
}

/// Maps unique-constraint violations to conflicts. Deadlocks and
/// serialization failures become conflicts through `From<sqlx::Error>`.
fn conflict_on_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict(what());
    }
    StoreError::from(err)
}

fn row_to_user(row: PgRow) -> Result<UserProfile> {
    Ok(UserProfile {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: parsed(&row, "role")?,
        company: row.try_get("company")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        supplier_id: UserId::from_uuid(row.try_get::<Uuid, _>("supplier_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        images: row.try_get::<Json<Vec<String>>, _>("images")?.0,
        unit: row.try_get("unit")?,
        price: money(&row, "price")?,
        original_price: row
            .try_get::<Option<i64>, _>("original_price")?
            .map(Money::from_cents),
        price_tiers: row.try_get::<Json<_>, _>("price_tiers")?.0,
        options: row.try_get::<Json<_>, _>("options")?.0,
        variants: row.try_get::<Json<_>, _>("variants")?.0,
        available: count(&row, "available")?,
        sold: count(&row, "sold")?,
        moq: count(&row, "moq")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_request(row: PgRow) -> Result<Request> {
    let bid_count: i32 = row.try_get("bid_count")?;
    Ok(Request {
        id: RequestId::from_uuid(row.try_get::<Uuid, _>("id")?),
        request_number: row.try_get("request_number")?,
        buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
        product_name: row.try_get("product_name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        quantity: count(&row, "quantity")?,
        unit: row.try_get("unit")?,
        target_price: money(&row, "target_price")?,
        max_budget: money(&row, "max_budget")?,
        status: parsed(&row, "status")?,
        bid_count: u32::try_from(bid_count).unwrap_or(0),
        accepted_bid: row
            .try_get::<Option<Uuid>, _>("accepted_bid")?
            .map(BidId::from_uuid),
        accepted_at: row.try_get("accepted_at")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_bid(row: PgRow) -> Result<Bid> {
    Ok(Bid {
        id: BidId::from_uuid(row.try_get::<Uuid, _>("id")?),
        request_id: RequestId::from_uuid(row.try_get::<Uuid, _>("request_id")?),
        supplier_id: UserId::from_uuid(row.try_get::<Uuid, _>("supplier_id")?),
        supplier_name: row.try_get("supplier_name")?,
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        product_title: row.try_get("product_title")?,
        bid_price: money(&row, "bid_price")?,
        original_price: money(&row, "original_price")?,
        quantity: count(&row, "quantity")?,
        delivery_time_days: count(&row, "delivery_time_days")?,
        message: row.try_get("message")?,
        status: parsed(&row, "status")?,
        created_at: row.try_get("created_at")?,
        accepted_at: row.try_get("accepted_at")?,
        rejected_at: row.try_get("rejected_at")?,
        withdrawn_at: row.try_get("withdrawn_at")?,
    })
}

fn row_to_cart_item(row: PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        supplier_id: UserId::from_uuid(row.try_get::<Uuid, _>("supplier_id")?),
        product_title: row.try_get("product_title")?,
        image: row.try_get("image")?,
        selection: row.try_get::<Json<_>, _>("selection")?.0,
        quantity: count(&row, "quantity")?,
        unit_price: money(&row, "unit_price")?,
        total_price: money(&row, "total_price")?,
        min_order_quantity: count(&row, "min_order_quantity")?,
        max_order_quantity: optional_count(&row, "max_order_quantity")?,
        origin: row.try_get::<Json<LineOrigin>, _>("origin")?.0,
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: row.try_get("order_number")?,
        buyer: row.try_get::<Json<_>, _>("buyer")?.0,
        supplier: row.try_get::<Json<_>, _>("supplier")?.0,
        products: row.try_get::<Json<_>, _>("products")?.0,
        total_amount: money(&row, "total_amount")?,
        status: parsed(&row, "status")?,
        payment_status: parsed(&row, "payment_status")?,
        shipping_address: row.try_get("shipping_address")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PgUnitOfWork {
    async fn fetch_product(&mut self, id: ProductId, for_update: bool) -> Result<Option<Product>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1{lock}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_product).transpose()
    }

    async fn fetch_request(&mut self, id: RequestId, for_update: bool) -> Result<Option<Request>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1{lock}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_request).transpose()
    }

    async fn cart_item_by(&mut self, user_id: UserId, column: &str, value: Uuid) -> Result<Option<CartItem>> {
        let sql = format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE user_id = $1 AND {column} = $2"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_cart_item).transpose()
    }

    async fn touch_cart(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE carts SET updated_at = $2 WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_cart_item(&mut self, user_id: UserId, item: &CartItem, conflict: &str) -> Result<Option<CartItem>> {
        let sql = format!(
            r#"
            INSERT INTO cart_items
                (id, user_id, product_id, supplier_id, product_title, image, selection, quantity,
                 unit_price, total_price, min_order_quantity, max_order_quantity, origin, bid_id,
                 merge_key, added_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            {conflict}
            RETURNING {CART_ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(item.id.as_uuid())
            .bind(user_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.supplier_id.as_uuid())
            .bind(&item.product_title)
            .bind(&item.image)
            .bind(Json(&item.selection))
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .bind(item.total_price.cents())
            .bind(i64::from(item.min_order_quantity))
            .bind(item.max_order_quantity.map(i64::from))
            .bind(Json(&item.origin))
            .bind(item.bid_id().map(|id| id.as_uuid()))
            .bind(item.merge_key().map(|key| key.encode()))
            .bind(item.added_at)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_cart_item).transpose()
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn upsert_user(&mut self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, company, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email, role = EXCLUDED.role,
                company = EXCLUDED.company, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.id.as_uuid())
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(profile.role.as_str())
        .bind(&profile.company)
        .bind(profile.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_user(&mut self, id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT id, name, email, role, company, updated_at FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_user).transpose()
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        self.fetch_product(id, false).await
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        self.fetch_product(id, true).await
    }

    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE 1=1");
        let mut param_count = 0;
        if filter.supplier_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND supplier_id = ${param_count}"));
        }
        if filter.category.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND LOWER(category) = LOWER(${param_count})"));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if filter.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(id) = filter.supplier_id {
            query = query.bind(id.as_uuid());
        }
        if let Some(category) = &filter.category {
            query = query.bind(category.clone());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(row_to_product).collect()
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products
                (id, supplier_id, title, description, category, images, unit, price,
                 original_price, price_tiers, options, variants, available, sold, moq,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title, description = EXCLUDED.description,
                category = EXCLUDED.category, images = EXCLUDED.images, unit = EXCLUDED.unit,
                price = EXCLUDED.price, original_price = EXCLUDED.original_price,
                price_tiers = EXCLUDED.price_tiers, options = EXCLUDED.options,
                variants = EXCLUDED.variants, available = EXCLUDED.available,
                sold = EXCLUDED.sold, moq = EXCLUDED.moq, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.supplier_id.as_uuid())
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.category)
        .bind(Json(&product.images))
        .bind(&product.unit)
        .bind(product.price.cents())
        .bind(product.original_price.map(|p| p.cents()))
        .bind(Json(&product.price_tiers))
        .bind(Json(&product.options))
        .bind(Json(&product.variants))
        .bind(i64::from(product.available))
        .bind(i64::from(product.sold))
        .bind(i64::from(product.moq))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn decrement_availability(&mut self, id: ProductId, quantity: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET available = available - $2 WHERE id = $1 AND available >= $2",
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            tracing::debug!(%id, quantity, "availability decrement refused");
        }
        Ok(result.rows_affected() == 1)
    }

    async fn increment_sold(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET sold = sold + $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", id));
        }
        Ok(())
    }

    async fn restore_availability(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET available = available + $2, sold = GREATEST(sold - $2, 0)
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", id));
        }
        Ok(())
    }

    async fn insert_request(&mut self, request: &Request) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO requests
                (id, request_number, buyer_id, product_name, description, category, quantity,
                 unit, target_price, max_budget, status, bid_count, accepted_bid, accepted_at,
                 expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(&request.request_number)
        .bind(request.buyer_id.as_uuid())
        .bind(&request.product_name)
        .bind(&request.description)
        .bind(&request.category)
        .bind(i64::from(request.quantity))
        .bind(&request.unit)
        .bind(request.target_price.cents())
        .bind(request.max_budget.cents())
        .bind(request.status.as_str())
        .bind(i32::try_from(request.bid_count).unwrap_or(i32::MAX))
        .bind(request.accepted_bid.map(|id| id.as_uuid()))
        .bind(request.accepted_at)
        .bind(request.expires_at)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!("request number {} already exists", request.request_number)
            })
        })?;
        Ok(())
    }

    async fn request_number_taken(&mut self, number: &str) -> Result<bool> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM requests WHERE request_number = $1)")
                .bind(number)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(taken)
    }

    async fn get_request(&mut self, id: RequestId) -> Result<Option<Request>> {
        self.fetch_request(id, false).await
    }

    async fn lock_request(&mut self, id: RequestId) -> Result<Option<Request>> {
        self.fetch_request(id, true).await
    }

    async fn list_requests(&mut self, filter: &RequestFilter) -> Result<Vec<Request>> {
        let mut sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE 1=1");
        let mut param_count = 0;
        if filter.buyer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND buyer_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if filter.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(id) = filter.buyer_id {
            query = query.bind(id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(row_to_request).collect()
    }

    async fn update_request(&mut self, request: &Request, expected: RequestStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = $2, accepted_bid = $3, accepted_at = $4, updated_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.accepted_bid.map(|id| id.as_uuid()))
        .bind(request.accepted_at)
        .bind(request.updated_at)
        .bind(expected.as_str())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "request {} is no longer {expected}",
                request.id
            )));
        }
        Ok(())
    }

    async fn adjust_bid_count(&mut self, id: RequestId, delta: i32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE requests SET bid_count = GREATEST(bid_count + $2, 0) WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(delta)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("request", id));
        }
        Ok(())
    }

    async fn insert_bid(&mut self, bid: &Bid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bids
                (id, request_id, supplier_id, supplier_name, product_id, product_title,
                 bid_price, original_price, quantity, delivery_time_days, message, status,
                 created_at, accepted_at, rejected_at, withdrawn_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(bid.id.as_uuid())
        .bind(bid.request_id.as_uuid())
        .bind(bid.supplier_id.as_uuid())
        .bind(&bid.supplier_name)
        .bind(bid.product_id.as_uuid())
        .bind(&bid.product_title)
        .bind(bid.bid_price.cents())
        .bind(bid.original_price.cents())
        .bind(i64::from(bid.quantity))
        .bind(i64::from(bid.delivery_time_days))
        .bind(&bid.message)
        .bind(bid.status.as_str())
        .bind(bid.created_at)
        .bind(bid.accepted_at)
        .bind(bid.rejected_at)
        .bind(bid.withdrawn_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!(
                    "supplier {} already bid on request {}",
                    bid.supplier_id, bid.request_id
                )
            })
        })?;
        Ok(())
    }

    async fn get_bid(&mut self, id: BidId) -> Result<Option<Bid>> {
        let sql = format!("SELECT {BID_COLUMNS} FROM bids b WHERE b.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_bid).transpose()
    }

    async fn find_bid(
        &mut self,
        request_id: RequestId,
        supplier_id: UserId,
    ) -> Result<Option<Bid>> {
        let sql = format!(
            "SELECT {BID_COLUMNS} FROM bids b WHERE b.request_id = $1 AND b.supplier_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(request_id.as_uuid())
            .bind(supplier_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_bid).transpose()
    }

    async fn list_bids(&mut self, filter: &BidFilter) -> Result<Vec<Bid>> {
        let mut sql = format!(
            "SELECT {BID_COLUMNS} FROM bids b JOIN requests r ON r.id = b.request_id WHERE 1=1"
        );
        let mut param_count = 0;

        // Build dynamic query
        if filter.request_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND b.request_id = ${param_count}"));
        }
        if filter.supplier_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND b.supplier_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND b.status = ${param_count}"));
        }
        if filter.buyer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND r.buyer_id = ${param_count}"));
        }

        sql.push_str(" ORDER BY b.created_at ASC");

        if filter.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if filter.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(id) = filter.request_id {
            query = query.bind(id.as_uuid());
        }
        if let Some(id) = filter.supplier_id {
            query = query.bind(id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(id) = filter.buyer_id {
            query = query.bind(id.as_uuid());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset as i64);
        }

        let rows = query.fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(row_to_bid).collect()
    }

    async fn update_bid(&mut self, bid: &Bid, expected: BidStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE bids
            SET status = $2, accepted_at = $3, rejected_at = $4, withdrawn_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(bid.id.as_uuid())
        .bind(bid.status.as_str())
        .bind(bid.accepted_at)
        .bind(bid.rejected_at)
        .bind(bid.withdrawn_at)
        .bind(expected.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!("request {} already has an accepted bid", bid.request_id)
            })
        })?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "bid {} is no longer {expected}",
                bid.id
            )));
        }
        Ok(())
    }

    async fn reject_pending_bids(
        &mut self,
        request_id: RequestId,
        winner: BidId,
        now: DateTime<Utc>,
    ) -> Result<Vec<BidId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE bids
            SET status = 'rejected', rejected_at = $3
            WHERE request_id = $1 AND id <> $2 AND status = 'pending'
            RETURNING id
            "#,
        )
        .bind(request_id.as_uuid())
        .bind(winner.as_uuid())
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids.into_iter().map(BidId::from_uuid).collect())
    }

    async fn get_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        let Some(row) = sqlx::query("SELECT created_at, updated_at FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
        else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE user_id = $1 ORDER BY seq ASC"
        );
        let items = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(row_to_cart_item)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart {
            user_id,
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn upsert_cart(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (user_id, created_at, updated_at)
            VALUES ($1, $2, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        self.get_cart(user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", user_id))
    }

    async fn append_item(&mut self, user_id: UserId, item: &CartItem) -> Result<CartItem> {
        let inserted = match item.bid_id() {
            Some(_) => {
                self.insert_cart_item(
                    user_id,
                    item,
                    "ON CONFLICT (user_id, bid_id) WHERE bid_id IS NOT NULL DO NOTHING",
                )
                .await?
            }
            None => self.insert_cart_item(user_id, item, "").await?,
        };
        let stored = match (inserted, item.bid_id()) {
            (Some(stored), _) => stored,
            (None, Some(bid_id)) => self
                .cart_item_by(user_id, "bid_id", bid_id.as_uuid())
                .await?
                .ok_or_else(|| StoreError::not_found("cart item for bid", bid_id))?,
            (None, None) => return Err(StoreError::Conflict("cart item was not stored".into())),
        };
        self.touch_cart(user_id).await?;
        Ok(stored)
    }

    async fn merge_or_increment_item(
        &mut self,
        user_id: UserId,
        item: &CartItem,
    ) -> Result<CartItem> {
        if item.merge_key().is_none() {
            return self.append_item(user_id, item).await;
        }
        let stored = self
            .insert_cart_item(
                user_id,
                item,
                r#"ON CONFLICT (user_id, merge_key) WHERE merge_key IS NOT NULL DO UPDATE
                SET quantity = cart_items.quantity + EXCLUDED.quantity,
                    unit_price = EXCLUDED.unit_price,
                    total_price = EXCLUDED.unit_price * (cart_items.quantity + EXCLUDED.quantity),
                    min_order_quantity = EXCLUDED.min_order_quantity,
                    max_order_quantity = EXCLUDED.max_order_quantity"#,
            )
            .await?
            .ok_or_else(|| StoreError::Conflict("cart item was not stored".into()))?;
        self.touch_cart(user_id).await?;
        Ok(stored)
    }

    async fn set_item_quantity(
        &mut self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Option<CartItem>> {
        let sql = format!(
            r#"
            UPDATE cart_items
            SET quantity = $3, unit_price = $4, total_price = $4 * $3
            WHERE user_id = $1 AND id = $2
            RETURNING {CART_ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(item_id.as_uuid())
            .bind(i64::from(quantity))
            .bind(unit_price.cents())
            .fetch_optional(&mut *self.tx)
            .await?;
        let item = row.map(row_to_cart_item).transpose()?;
        if item.is_some() {
            self.touch_cart(user_id).await?;
        }
        Ok(item)
    }

    async fn remove_item(
        &mut self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>> {
        let sql = format!(
            "DELETE FROM cart_items WHERE user_id = $1 AND id = $2 RETURNING {CART_ITEM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(item_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        let item = row.map(row_to_cart_item).transpose()?;
        if item.is_some() {
            self.touch_cart(user_id).await?;
        }
        Ok(item)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, order_number, buyer_id, supplier_id, buyer, supplier, products,
                 total_amount, status, payment_status, shipping_address, notes, created_at,
                 updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.buyer.id.as_uuid())
        .bind(order.supplier.id.as_uuid())
        .bind(Json(&order.buyer))
        .bind(Json(&order.supplier))
        .bind(Json(&order.products))
        .bind(order.total_amount.cents())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.shipping_address)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || format!("order {} already exists", order.order_number))
        })?;
        Ok(())
    }

    async fn order_number_taken(&mut self, number: &str) -> Result<bool> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(number)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(taken)
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_order).transpose()
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;
        if filter.buyer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND buyer_id = ${param_count}"));
        }
        if filter.supplier_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND supplier_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(id) = filter.buyer_id {
            query = query.bind(id.as_uuid());
        }
        if let Some(id) = filter.supplier_id {
            query = query.bind(id.as_uuid());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn update_order(
        &mut self,
        order: &Order,
        expected_status: OrderStatus,
        expected_payment: PaymentStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, updated_at = $4
            WHERE id = $1 AND status = $5 AND payment_status = $6
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.updated_at)
        .bind(expected_status.as_str())
        .bind(expected_payment.as_str())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "order {} is no longer {expected_status}/{expected_payment}",
                order.id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        metrics::counter!("store_transactions_committed_total").increment(1);
        Ok(())
    }
}
