use super::{DealStore, DealTransaction, RepoResult};
use crate::error::RepositoryError;
use crate::models::{
    Deal, DealFilter, DealPage, DealSort, DealStatus, GroupBuyParticipant, PriceHistory, SortOrder,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;
use uuid::Uuid;

const DEAL_COLUMNS: &str = r#"
    id, merchant_id, title, description, category, deal_type,
    original_price, current_price, discount, target_participants,
    current_participants, cashback_amount, cashback_percentage,
    status, start_date, end_date, created_at, updated_at
"#;

const PARTICIPANT_COLUMNS: &str = r#"
    id, user_id, deal_id, quantity, price_at_join, current_price, status, joined_at
"#;

// Internal row structs; enum columns are TEXT in the schema
#[derive(sqlx::FromRow)]
struct DealRow {
    id: Uuid,
    merchant_id: Uuid,
    title: String,
    description: String,
    category: String,
    deal_type: String,
    original_price: Decimal,
    current_price: Decimal,
    discount: i32,
    target_participants: Option<i32>,
    current_participants: i32,
    cashback_amount: Option<Decimal>,
    cashback_percentage: Option<Decimal>,
    status: String,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DealRow> for Deal {
    type Error = RepositoryError;

    fn try_from(row: DealRow) -> Result<Self, Self::Error> {
        Ok(Deal {
            id: row.id,
            merchant_id: row.merchant_id,
            title: row.title,
            description: row.description,
            category: row.category,
            deal_type: row.deal_type.parse().map_err(RepositoryError::InvalidInput)?,
            original_price: row.original_price,
            current_price: row.current_price,
            discount: row.discount,
            target_participants: row.target_participants,
            current_participants: row.current_participants,
            cashback_amount: row.cashback_amount,
            cashback_percentage: row.cashback_percentage,
            status: row.status.parse().map_err(RepositoryError::InvalidInput)?,
            start_date: row.start_date,
            end_date: row.end_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: Uuid,
    user_id: Uuid,
    deal_id: Uuid,
    quantity: i32,
    price_at_join: Decimal,
    current_price: Decimal,
    status: String,
    joined_at: DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for GroupBuyParticipant {
    type Error = RepositoryError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(GroupBuyParticipant {
            id: row.id,
            user_id: row.user_id,
            deal_id: row.deal_id,
            quantity: row.quantity,
            price_at_join: row.price_at_join,
            current_price: row.current_price,
            status: row.status.parse().map_err(RepositoryError::InvalidInput)?,
            joined_at: row.joined_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PriceHistoryRow {
    id: Uuid,
    deal_id: Uuid,
    price: Decimal,
    participants: i32,
    timestamp: DateTime<Utc>,
}

impl From<PriceHistoryRow> for PriceHistory {
    fn from(row: PriceHistoryRow) -> Self {
        PriceHistory {
            id: row.id,
            deal_id: row.deal_id,
            price: row.price,
            participants: row.participants,
            timestamp: row.timestamp,
        }
    }
}

fn into_deals(rows: Vec<DealRow>) -> RepoResult<Vec<Deal>> {
    rows.into_iter().map(Deal::try_from).collect()
}

/// Shared WHERE clause of the listing and its count
fn push_listing_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &DealFilter, now: DateTime<Utc>) {
    builder.push(" WHERE status = 'ACTIVE' AND start_date <= ");
    builder.push_bind(now);
    builder.push(" AND (end_date IS NULL OR end_date >= ");
    builder.push_bind(now);
    builder.push(")");

    if let Some(deal_type) = filter.deal_type {
        builder.push(" AND deal_type = ");
        builder.push_bind(deal_type.as_str());
    }
    if let Some(category) = &filter.category {
        builder.push(" AND category = ");
        builder.push_bind(category.clone());
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search);
        builder.push(" AND (title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    if let Some(min) = filter.min_price {
        builder.push(" AND current_price >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filter.max_price {
        builder.push(" AND current_price <= ");
        builder.push_bind(max);
    }
    if let Some(min) = filter.min_discount {
        builder.push(" AND discount >= ");
        builder.push_bind(min);
    }
}

fn order_clause(filter: &DealFilter) -> &'static str {
    match (filter.sort_by, filter.sort_order) {
        (DealSort::CreatedAt, SortOrder::Asc) => " ORDER BY created_at ASC",
        (DealSort::CreatedAt, SortOrder::Desc) => " ORDER BY created_at DESC",
        (DealSort::Price, SortOrder::Asc) => " ORDER BY current_price ASC, created_at DESC",
        (DealSort::Price, SortOrder::Desc) => " ORDER BY current_price DESC, created_at DESC",
        (DealSort::Discount, SortOrder::Asc) => " ORDER BY discount ASC, created_at DESC",
        (DealSort::Discount, SortOrder::Desc) => " ORDER BY discount DESC, created_at DESC",
        (DealSort::Ending, _) => " ORDER BY end_date ASC NULLS LAST, created_at DESC",
    }
}

/// PostgreSQL-backed deal store
#[derive(Clone)]
pub struct PgDealStore {
    pool: PgPool,
}

impl PgDealStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DealStore for PgDealStore {
    async fn create_deal(&self, deal: &Deal) -> RepoResult<Deal> {
        let sql = format!(
            r#"
            INSERT INTO deals
            (id, merchant_id, title, description, category, deal_type, original_price,
             current_price, discount, target_participants, current_participants,
             cashback_amount, cashback_percentage, status, start_date, end_date,
             created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {}
            "#,
            DEAL_COLUMNS
        );

        let row = sqlx::query_as::<_, DealRow>(&sql)
            .bind(deal.id)
            .bind(deal.merchant_id)
            .bind(&deal.title)
            .bind(&deal.description)
            .bind(&deal.category)
            .bind(deal.deal_type.as_str())
            .bind(deal.original_price)
            .bind(deal.current_price)
            .bind(deal.discount)
            .bind(deal.target_participants)
            .bind(deal.current_participants)
            .bind(deal.cashback_amount)
            .bind(deal.cashback_percentage)
            .bind(deal.status.as_str())
            .bind(deal.start_date)
            .bind(deal.end_date)
            .bind(deal.created_at)
            .bind(deal.updated_at)
            .fetch_one(&self.pool)
            .await?;

        Deal::try_from(row)
    }

    async fn find_deal(&self, deal_id: Uuid) -> RepoResult<Option<Deal>> {
        let sql = format!("SELECT {} FROM deals WHERE id = $1", DEAL_COLUMNS);
        let row = sqlx::query_as::<_, DealRow>(&sql)
            .bind(deal_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Deal::try_from).transpose()
    }

    async fn list_deals(&self, filter: &DealFilter, now: DateTime<Utc>) -> RepoResult<DealPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM deals");
        push_listing_filter(&mut count, filter, now);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM deals", DEAL_COLUMNS));
        push_listing_filter(&mut select, filter, now);
        select.push(order_clause(filter));
        select.push(" LIMIT ");
        select.push_bind(i64::from(filter.limit));
        select.push(" OFFSET ");
        select.push_bind(filter.offset() as i64);

        let rows = select.build_query_as::<DealRow>().fetch_all(&self.pool).await?;

        Ok(DealPage {
            deals: into_deals(rows)?,
            total: total.max(0) as u64,
        })
    }

    async fn update_deal_status(
        &self,
        deal_id: Uuid,
        from: DealStatus,
        to: DealStatus,
    ) -> RepoResult<Option<Deal>> {
        let sql = format!(
            r#"
            UPDATE deals
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            DEAL_COLUMNS
        );

        let row = sqlx::query_as::<_, DealRow>(&sql)
            .bind(deal_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Deal::try_from).transpose()
    }

    async fn find_participants(&self, deal_id: Uuid) -> RepoResult<Vec<GroupBuyParticipant>> {
        let sql = format!(
            "SELECT {} FROM group_buy_participants WHERE deal_id = $1 ORDER BY joined_at DESC",
            PARTICIPANT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(deal_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(GroupBuyParticipant::try_from).collect()
    }

    async fn count_participants(&self, deal_id: Uuid) -> RepoResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM group_buy_participants WHERE deal_id = $1")
                .bind(deal_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn price_history(&self, deal_id: Uuid) -> RepoResult<Vec<PriceHistory>> {
        let rows = sqlx::query_as::<_, PriceHistoryRow>(
            r#"
            SELECT id, deal_id, price, participants, timestamp
            FROM price_history
            WHERE deal_id = $1
            ORDER BY timestamp ASC, participants ASC
            "#,
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PriceHistory::from).collect())
    }

    async fn begin(&self) -> RepoResult<Box<dyn DealTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgDealTransaction { tx }))
    }
}

/// A PostgreSQL transaction; rolled back on drop unless committed
pub struct PgDealTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DealTransaction for PgDealTransaction {
    async fn lock_deal(&mut self, deal_id: Uuid) -> RepoResult<Option<Deal>> {
        let sql = format!("SELECT {} FROM deals WHERE id = $1 FOR UPDATE", DEAL_COLUMNS);
        let row = sqlx::query_as::<_, DealRow>(&sql)
            .bind(deal_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Deal::try_from).transpose()
    }

    async fn find_participant(
        &mut self,
        deal_id: Uuid,
        user_id: Uuid,
    ) -> RepoResult<Option<GroupBuyParticipant>> {
        let sql = format!(
            "SELECT {} FROM group_buy_participants WHERE deal_id = $1 AND user_id = $2",
            PARTICIPANT_COLUMNS
        );
        let row = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(deal_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(GroupBuyParticipant::try_from).transpose()
    }

    async fn insert_participant(&mut self, participant: &GroupBuyParticipant) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO group_buy_participants
            (id, user_id, deal_id, quantity, price_at_join, current_price, status, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(participant.id)
        .bind(participant.user_id)
        .bind(participant.deal_id)
        .bind(participant.quantity)
        .bind(participant.price_at_join)
        .bind(participant.current_price)
        .bind(participant.status.as_str())
        .bind(participant.joined_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn increment_participants(&mut self, deal_id: Uuid) -> RepoResult<Deal> {
        let sql = format!(
            r#"
            UPDATE deals
            SET current_participants = current_participants + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            DEAL_COLUMNS
        );
        let row = sqlx::query_as::<_, DealRow>(&sql)
            .bind(deal_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Deal::try_from(row)
    }

    async fn break_already_applied(&mut self, deal_id: Uuid, target: i32) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM price_history
                WHERE deal_id = $1 AND participants >= $2
            )
            "#,
        )
        .bind(deal_id)
        .bind(target)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn apply_price(
        &mut self,
        deal_id: Uuid,
        price: Decimal,
        discount: i32,
    ) -> RepoResult<Deal> {
        let sql = format!(
            r#"
            UPDATE deals
            SET current_price = $2, discount = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            DEAL_COLUMNS
        );
        let row = sqlx::query_as::<_, DealRow>(&sql)
            .bind(deal_id)
            .bind(price)
            .bind(discount)
            .fetch_one(&mut *self.tx)
            .await?;

        Deal::try_from(row)
    }

    async fn reprice_active_participants(
        &mut self,
        deal_id: Uuid,
        price: Decimal,
    ) -> RepoResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE group_buy_participants
            SET current_price = $2
            WHERE deal_id = $1 AND status = 'ACTIVE'
            "#,
        )
        .bind(deal_id)
        .bind(price)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn append_price_history(&mut self, entry: &PriceHistory) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO price_history (id, deal_id, price, participants, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id)
        .bind(entry.deal_id)
        .bind(entry.price)
        .bind(entry.participants)
        .bind(entry.timestamp)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        let PgDealTransaction { tx } = *self;
        tx.commit().await?;
        debug!("Deal transaction committed");
        Ok(())
    }
}
