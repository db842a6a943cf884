pub mod errors;
pub mod models;
pub mod schema;

use std::collections::HashSet;

use anchor_core::anchor_store::AnchorStore;
use anchor_core::model::{Anchor, Cid, Request, RequestId, RequestStatus, Transaction};
use anchor_core::request_store::{RequestStore, RequestUpdate};
use anchor_core::transaction_store::TransactionStore;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

use errors::ConnectionPoolError;
use models::{AnchorRow, RequestRow, TransactionRow};

/// Postgres-backed implementation of the anchoring pipeline's three store
/// traits, all sharing one connection pool.
#[derive(Clone)]
pub struct Client {
    pub pool: Pool<ConnectionManager<PgConnection>>,
}

impl Client {
    pub fn new(dsn: &str) -> anyhow::Result<Self> {
        let manager = ConnectionManager::<PgConnection>::new(dsn);
        let pool = match Pool::builder().test_on_check_out(true).build(manager) {
            Ok(it) => it,
            Err(err) => return Err(ConnectionPoolError::PoolInitializationError(err.to_string()).into()),
        };
        Ok(Self { pool })
    }
}

fn terminal_statuses() -> [&'static str; 2] {
    ["COMPLETED", "FAILED"]
}

fn status_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "PENDING",
        RequestStatus::Ready => "READY",
        RequestStatus::Processing => "PROCESSING",
        RequestStatus::Completed => "COMPLETED",
        RequestStatus::Failed => "FAILED",
    }
}

#[async_trait::async_trait]
impl RequestStore for Client {
    async fn create_or_update(&self, request: Request) -> anyhow::Result<Request> {
        let conn = &mut self.pool.get()?;
        let row: RequestRow = request.into();
        let saved: RequestRow = diesel::insert_into(schema::requests::table)
            .values(&row)
            .on_conflict(schema::requests::cid)
            .do_update()
            .set(&row)
            .get_result(conn)?;
        Ok(saved.try_into()?)
    }

    async fn find_by_cid(&self, cid: &Cid) -> anyhow::Result<Option<Request>> {
        let conn = &mut self.pool.get()?;
        let row: Option<RequestRow> = schema::requests::table
            .filter(schema::requests::cid.eq(cid.as_str()))
            .first(conn)
            .optional()?;
        Ok(row.map(Request::try_from).transpose()?)
    }

    async fn find_by_status(&self, status: RequestStatus) -> anyhow::Result<Vec<Request>> {
        let conn = &mut self.pool.get()?;
        let rows: Vec<RequestRow> = schema::requests::table
            .filter(schema::requests::status.eq(status_str(status)))
            .load(conn)?;
        rows.into_iter().map(Request::try_from).collect::<Result<_, _>>().map_err(Into::into)
    }

    async fn count_by_status(&self, status: RequestStatus) -> anyhow::Result<usize> {
        let conn = &mut self.pool.get()?;
        let count: i64 = schema::requests::table
            .filter(schema::requests::status.eq(status_str(status)))
            .count()
            .get_result(conn)?;
        Ok(count as usize)
    }

    async fn find_and_mark_ready(
        &self,
        limit: usize,
        min_stream_count: usize,
        ready_retry_interval: chrono::Duration,
    ) -> anyhow::Result<Vec<Request>> {
        let conn = &mut self.pool.get()?;
        conn.transaction(|conn| {
            let pending_streams: i64 = schema::requests::table
                .filter(schema::requests::status.eq("PENDING"))
                .select(diesel::dsl::count_distinct(schema::requests::stream_id))
                .get_result(conn)?;

            let mut promoted: Vec<RequestRow> = Vec::new();

            if pending_streams as usize >= min_stream_count {
                let pending: Vec<RequestRow> = schema::requests::table
                    .filter(schema::requests::status.eq("PENDING"))
                    .order(schema::requests::created_at.asc())
                    .then_order_by(schema::requests::id.asc())
                    .for_update()
                    .skip_locked()
                    .load(conn)?;

                let mut seen_streams = HashSet::new();
                let mut to_promote = Vec::new();
                for row in pending {
                    if limit > 0 && seen_streams.len() >= limit && !seen_streams.contains(&row.stream_id) {
                        continue;
                    }
                    seen_streams.insert(row.stream_id.clone());
                    to_promote.push(row.id);
                }

                if !to_promote.is_empty() {
                    let now = Utc::now();
                    promoted.extend(
                        diesel::update(schema::requests::table)
                            .filter(schema::requests::id.eq_any(to_promote))
                            .set((
                                schema::requests::status.eq("READY"),
                                schema::requests::updated_at.eq(now),
                            ))
                            .get_results::<RequestRow>(conn)?,
                    );
                }
            }

            let stale_cutoff = Utc::now() - ready_retry_interval;
            let stale: Vec<RequestRow> = schema::requests::table
                .filter(schema::requests::status.eq("READY"))
                .filter(schema::requests::updated_at.lt(stale_cutoff))
                .for_update()
                .skip_locked()
                .load(conn)?;

            if !stale.is_empty() {
                let stale_ids: Vec<_> = stale.iter().map(|r| r.id).collect();
                let now = Utc::now();
                promoted.extend(
                    diesel::update(schema::requests::table)
                        .filter(schema::requests::id.eq_any(stale_ids))
                        .set(schema::requests::updated_at.eq(now))
                        .get_results::<RequestRow>(conn)?,
                );
            }

            promoted
                .into_iter()
                .map(Request::try_from)
                .collect::<Result<_, _>>()
                .map_err(|err: errors::PgSqlStoreError| {
                    diesel::result::Error::QueryBuilderError(err.to_string().into())
                })
        })
        .map_err(Into::into)
    }

    async fn update_requests(&self, update: RequestUpdate, ids: &[RequestId]) -> anyhow::Result<()> {
        let conn = &mut self.pool.get()?;
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let now = Utc::now();
        let new_status = status_str(update.status);

        let updated_ids: Vec<uuid::Uuid> = match update.message {
            Some(message) => diesel::update(schema::requests::table)
                .filter(schema::requests::id.eq_any(ids))
                .filter(schema::requests::status.ne_all(terminal_statuses()))
                .set((
                    schema::requests::status.eq(new_status),
                    schema::requests::updated_at.eq(now),
                    schema::requests::message.eq(message),
                ))
                .returning(schema::requests::id)
                .get_results(conn)?,
            None => diesel::update(schema::requests::table)
                .filter(schema::requests::id.eq_any(ids))
                .filter(schema::requests::status.ne_all(terminal_statuses()))
                .set((
                    schema::requests::status.eq(new_status),
                    schema::requests::updated_at.eq(now),
                ))
                .returning(schema::requests::id)
                .get_results(conn)?,
        };

        // Only rows this call actually transitioned (i.e. weren't already
        // terminal) get `pinned` flipped — a row left untouched above by the
        // terminal-state guard must not have its `pinned` flag touched either.
        if update.status == RequestStatus::Completed && !updated_ids.is_empty() {
            diesel::update(schema::requests::table)
                .filter(schema::requests::id.eq_any(updated_ids))
                .set(schema::requests::pinned.eq(true))
                .execute(conn)?;
        }

        Ok(())
    }

    async fn mark_unpinned(&self, ids: &[RequestId]) -> anyhow::Result<()> {
        let conn = &mut self.pool.get()?;
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        diesel::update(schema::requests::table)
            .filter(schema::requests::id.eq_any(ids))
            .set(schema::requests::pinned.eq(false))
            .execute(conn)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnchorStore for Client {
    async fn create(&self, anchor: Anchor) -> anyhow::Result<()> {
        let conn = &mut self.pool.get()?;
        let row: AnchorRow = anchor.into();
        diesel::insert_into(schema::anchors::table)
            .values(&row)
            .execute(conn)?;
        Ok(())
    }

    async fn find_by_request(&self, request_id: &RequestId) -> anyhow::Result<Option<Anchor>> {
        let conn = &mut self.pool.get()?;
        let row: Option<AnchorRow> = schema::anchors::table
            .filter(schema::anchors::request_id.eq(request_id.as_uuid()))
            .first(conn)
            .optional()?;
        Ok(row.map(Anchor::from))
    }
}

#[async_trait::async_trait]
impl TransactionStore for Client {
    async fn create(&self, transaction: Transaction) -> anyhow::Result<()> {
        let conn = &mut self.pool.get()?;
        let row: TransactionRow = transaction.into();
        diesel::insert_into(schema::transactions::table)
            .values(&row)
            .on_conflict(schema::transactions::tx_hash)
            .do_nothing()
            .execute(conn)?;
        Ok(())
    }
}
