use anchor_core::model::{Anchor, Cid, Request, RequestId, RequestStatus, StreamId, Transaction};
use diesel::prelude::*;

use crate::errors::PgSqlStoreError;

fn status_to_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "PENDING",
        RequestStatus::Ready => "READY",
        RequestStatus::Processing => "PROCESSING",
        RequestStatus::Completed => "COMPLETED",
        RequestStatus::Failed => "FAILED",
    }
}

fn status_from_str(raw: &str) -> Result<RequestStatus, PgSqlStoreError> {
    match raw {
        "PENDING" => Ok(RequestStatus::Pending),
        "READY" => Ok(RequestStatus::Ready),
        "PROCESSING" => Ok(RequestStatus::Processing),
        "COMPLETED" => Ok(RequestStatus::Completed),
        "FAILED" => Ok(RequestStatus::Failed),
        other => Err(PgSqlStoreError::UnknownStatus(other.to_string())),
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RequestRow {
    pub id: uuid::Uuid,
    pub cid: String,
    pub stream_id: String,
    pub status: String,
    pub message: Option<String>,
    pub pinned: bool,
    pub tx_failures: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Request> for RequestRow {
    fn from(request: Request) -> Self {
        RequestRow {
            id: request.id.as_uuid(),
            cid: request.cid.to_string(),
            stream_id: request.stream_id.to_string(),
            status: status_to_str(request.status).to_string(),
            message: request.message,
            pinned: request.pinned,
            tx_failures: request.tx_failures as i32,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

impl TryFrom<RequestRow> for Request {
    type Error = PgSqlStoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(Request {
            id: RequestId::from_uuid(row.id),
            cid: Cid::new(row.cid),
            stream_id: StreamId::new(row.stream_id),
            status: status_from_str(&row.status)?,
            message: row.message,
            pinned: row.pinned,
            tx_failures: row.tx_failures.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::anchors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AnchorRow {
    pub request_id: uuid::Uuid,
    pub proof_cid: String,
    pub path: String,
    pub cid: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Anchor> for AnchorRow {
    fn from(anchor: Anchor) -> Self {
        AnchorRow {
            request_id: anchor.request_id.as_uuid(),
            proof_cid: anchor.proof_cid.to_string(),
            path: anchor.path,
            cid: anchor.cid.to_string(),
            created_at: anchor.created_at,
        }
    }
}

impl From<AnchorRow> for Anchor {
    fn from(row: AnchorRow) -> Self {
        Anchor {
            request_id: RequestId::from_uuid(row.request_id),
            proof_cid: Cid::new(row.proof_cid),
            path: row.path,
            cid: Cid::new(row.cid),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransactionRow {
    pub tx_hash: String,
    pub chain_id: String,
    pub block_number: i64,
    pub block_timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<Transaction> for TransactionRow {
    fn from(transaction: Transaction) -> Self {
        TransactionRow {
            tx_hash: transaction.tx_hash,
            chain_id: transaction.chain_id,
            block_number: transaction.block_number as i64,
            block_timestamp: transaction.block_timestamp,
        }
    }
}
