//! Order ledger models and DTOs.

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use validator::Validate;

use cascade_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `orders` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub job_id: DbId,
    pub upstream_order_id: Option<DbId>,
    /// 0 = failed, 1 = running, 2 = complete.
    pub status_id: StatusId,
    /// Number of fan-outs this order has performed.
    pub run_times: i32,
    /// Fan-out generation of the upstream that created this order.
    pub generation: i32,
    pub input: Option<String>,
    pub output: Option<String>,
    pub run_handle: Option<String>,
    pub error_message: Option<String>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/orders/report`.
///
/// Creates the order when `name` is new, otherwise updates it. A `Complete`
/// status triggers the cascade to the job's children.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReportOrder {
    /// Child order names are the child job name plus a lineage suffix, so
    /// the limit leaves room beyond the job name limit.
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    pub job_id: DbId,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(alias = "status_id")]
    pub status: StatusId,
    pub output: Option<String>,
    /// Accepts `true`/`false` as well as `1`/`0`.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub force: bool,
}

/// Insert payload for a child order created by a fan-out.
#[derive(Debug, Clone)]
pub struct NewChildOrder<'a> {
    pub name: &'a str,
    pub job_id: DbId,
    pub upstream_order_id: DbId,
    pub generation: i32,
    pub input: Option<&'a str>,
}

/// DTO for `POST /api/v1/jobs/{id}/launch`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LaunchJob {
    #[validate(length(min = 1, max = 256))]
    pub order_name: String,
    /// Overrides the job's `input_params`.
    pub input: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// Query parameters for `GET /api/v1/orders`.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub job_id: Option<DbId>,
    pub status_id: Option<StatusId>,
    pub upstream_order_id: Option<DbId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Deserialize a boolean flag sent either as a JSON bool or as an integer.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

#[cfg(test)]
mod tests {
    use cascade_core::naming;

    use super::*;

    fn parse(json: &str) -> ReportOrder {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn force_accepts_bool_and_int() {
        let base = r#""name":"o","job_id":1,"status":2"#;
        assert!(parse(&format!("{{{base},\"force\":true}}")).force);
        assert!(parse(&format!("{{{base},\"force\":1}}")).force);
        assert!(!parse(&format!("{{{base},\"force\":0}}")).force);
        assert!(!parse(&format!("{{{base}}}")).force);
    }

    #[test]
    fn longest_child_order_name_can_be_reported() {
        let job_name = "j".repeat(naming::MAX_JOB_NAME_LEN);
        let mut report = parse(r#"{"name":"o","job_id":1,"status":2}"#);
        report.name = naming::child_order_name(&job_name, DbId::MAX, i32::MAX);
        assert!(report.validate().is_ok());

        report.name = "o".repeat(naming::MAX_ORDER_NAME_LEN + 1);
        assert!(report.validate().is_err());
    }

    #[test]
    fn status_id_alias() {
        let report = parse(r#"{"name":"o","job_id":1,"status_id":0}"#);
        assert_eq!(report.status, 0);
    }
}
