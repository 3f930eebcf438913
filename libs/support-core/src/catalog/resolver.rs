use crate::{
    CoreError,
    domain::{PhoneInput, UserId},
};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::warn;

/// Outcome of translating an operator-supplied phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "user_id", rename_all = "snake_case")]
pub enum Resolution {
    /// The phone field still holds the sentinel.
    NoInput,
    /// The primary database is not connected.
    Unavailable,
    NotFound,
    Resolved(UserId),
}

impl Resolution {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Resolution::Resolved(id) => Some(*id),
            _ => None,
        }
    }
}

/// Exact match on the stored phone number. When several profiles share a
/// number the lowest `userid` wins, and the collision is logged.
pub async fn resolve(phone: &PhoneInput, conn: Option<&MySqlPool>) -> Result<Resolution, CoreError> {
    let PhoneInput::Provided(number) = phone else {
        return Ok(Resolution::NoInput);
    };
    let Some(pool) = conn else {
        return Ok(Resolution::Unavailable);
    };

    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT userid
        FROM SEC_USER_PROFILE
        WHERE phonenumber = ?
        ORDER BY userid ASC
        LIMIT 2
        "#,
    )
    .bind(number.as_str())
    .fetch_all(pool)
    .await
    .map_err(|e| {
        warn!("DB error resolving phone number: {}", e);
        CoreError::Query(format!("user lookup failed: {e}"))
    })?;

    match ids.as_slice() {
        [] => Ok(Resolution::NotFound),
        [only] => Ok(Resolution::Resolved(*only)),
        [first, ..] => {
            warn!(
                phone = %number,
                chosen = first,
                "phone number matches more than one user; using the lowest userid"
            );
            Ok(Resolution::Resolved(*first))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::start_store;

    #[tokio::test]
    async fn resolution_is_stable_and_deterministic() {
        let (pool, _node) = start_store().await;

        let known = PhoneInput::parse("2213500061").unwrap();
        let first = resolve(&known, Some(&pool)).await.unwrap();
        let second = resolve(&known, Some(&pool)).await.unwrap();
        assert_eq!(first, Resolution::Resolved(1001));
        assert_eq!(first, second);

        let shared = PhoneInput::parse("5550000000").unwrap();
        assert_eq!(
            resolve(&shared, Some(&pool)).await.unwrap(),
            Resolution::Resolved(2001)
        );

        let unknown = PhoneInput::parse("9999999999").unwrap();
        assert_eq!(resolve(&unknown, Some(&pool)).await.unwrap(), Resolution::NotFound);
    }

    #[tokio::test]
    async fn sentinel_short_circuits_before_the_pool() {
        assert_eq!(resolve(&PhoneInput::NoInput, None).await.unwrap(), Resolution::NoInput);
    }

    #[tokio::test]
    async fn sentinel_never_queries_a_live_store() {
        let (pool, _node) = start_store().await;
        // Any lookup now fails, so only a short-circuit can succeed
        sqlx::query("DROP TABLE SEC_USER_PROFILE")
            .execute(&pool)
            .await
            .unwrap();

        for raw in ["0", "000", ""] {
            let input = PhoneInput::parse(raw).unwrap();
            assert_eq!(resolve(&input, Some(&pool)).await.unwrap(), Resolution::NoInput);
        }
        let real = PhoneInput::parse("2213500061").unwrap();
        assert!(matches!(resolve(&real, Some(&pool)).await, Err(CoreError::Query(_))));
    }

    #[test]
    fn serialized_shape() {
        assert_eq!(
            serde_json::to_value(Resolution::Resolved(7)).unwrap(),
            serde_json::json!({"status": "resolved", "user_id": 7})
        );
        assert_eq!(
            serde_json::to_value(Resolution::NotFound).unwrap(),
            serde_json::json!({"status": "not_found"})
        );
    }
}
