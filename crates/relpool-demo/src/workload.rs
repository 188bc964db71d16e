//! The demo's statements against a `users` table.

use anyhow::{Context, Result};
use relpool::{Pool, Row, Value};

const COUNT_USERS: &str = "SELECT COUNT(*) FROM users";
const LIST_USERS: &str = "SELECT id, name FROM users";
const TOUCH_USER: &str = "UPDATE users SET last_login = NOW() WHERE id = $1";

/// The user whose `last_login` is refreshed.
const TOUCHED_USER_ID: i64 = 1;

#[derive(Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl User {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_by_name("id").context("error reading user id")?,
            name: row.get_by_name("name").context("error reading user name")?,
        })
    }
}

/// Summary of one workload run.
#[derive(Debug, Default, PartialEq)]
pub struct Report {
    pub user_count: i64,
    pub users: Vec<User>,
    pub rows_affected: Option<u64>,
}

/// Run the statements on one explicitly acquired connection.
pub async fn explicit(pool: &Pool, update: bool) -> Result<Report> {
    let mut conn = pool.acquire().await.context("error acquiring connection")?;

    let user_count: i64 = conn
        .query_one(COUNT_USERS, &[])
        .await
        .context("error counting users")?
        .get(0)
        .context("error reading user count")?;
    tracing::info!(count = user_count, "user count");

    let users = conn
        .query(LIST_USERS, &[])
        .await
        .context("error querying users")?
        .iter()
        .map(User::from_row)
        .collect::<Result<Vec<_>>>()?;
    log_users(&users);

    let rows_affected = if update {
        let affected = conn
            .execute(TOUCH_USER, &[Value::Int(TOUCHED_USER_ID)])
            .await
            .context("error updating user")?;
        tracing::info!(rows_affected = affected, "rows affected");
        Some(affected)
    } else {
        None
    };

    conn.release();
    Ok(Report {
        user_count,
        users,
        rows_affected,
    })
}

/// Run the statements through the pool, one lease per statement.
pub async fn direct(pool: &Pool, update: bool) -> Result<Report> {
    let user_count: i64 = pool
        .query_one(COUNT_USERS, &[])
        .await
        .context("error executing query")?
        .get(0)
        .context("error reading user count")?;
    tracing::info!(count = user_count, "user count");

    let users = pool
        .query(LIST_USERS, &[])
        .await
        .context("error querying users")?
        .iter()
        .map(User::from_row)
        .collect::<Result<Vec<_>>>()?;
    log_users(&users);

    let rows_affected = if update {
        let affected = pool
            .execute(TOUCH_USER, &[Value::Int(TOUCHED_USER_ID)])
            .await
            .context("error updating user")?;
        tracing::info!(rows_affected = affected, "rows affected");
        Some(affected)
    } else {
        None
    };

    Ok(Report {
        user_count,
        users,
        rows_affected,
    })
}

fn log_users(users: &[User]) {
    for user in users {
        tracing::info!(id = user.id, name = %user.name, "user retrieved");
    }
}

/// Log a point-in-time snapshot of the pool.
pub fn log_pool_stats(pool: &Pool) {
    let status = pool.status();
    let metrics = pool.metrics();
    tracing::info!(
        total_connections = status.total,
        acquired_connections = status.in_use,
        idle_connections = status.idle,
        max_connections = status.max,
        connections_created = metrics.connections_created,
        checkouts = metrics.checkouts_successful,
        "pool stats"
    );
}
