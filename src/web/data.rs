use sqlx::{SqliteExecutor, SqlitePool};

use super::models::{NewStudent, StudentRow, UserRow};

pub async fn fetch_students(pool: &SqlitePool) -> sqlx::Result<Vec<StudentRow>> {
    sqlx::query_as::<_, StudentRow>(
        "SELECT id, firstname, lastname, email, phone FROM students ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

pub async fn fetch_student<'e, E>(executor: E, id: i64) -> sqlx::Result<Option<StudentRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, StudentRow>(
        "SELECT id, firstname, lastname, email, phone FROM students WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn insert_student<'e, E>(executor: E, student: &NewStudent) -> sqlx::Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT INTO students (firstname, lastname, email, phone) VALUES ($1, $2, $3, $4)",
    )
    .bind(&student.firstname)
    .bind(&student.lastname)
    .bind(&student.email)
    .bind(&student.phone)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update_student<'e, E>(executor: E, id: i64, student: &NewStudent) -> sqlx::Result<u64>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "UPDATE students SET firstname = $1, lastname = $2, email = $3, phone = $4 WHERE id = $5",
    )
    .bind(&student.firstname)
    .bind(&student.lastname)
    .bind(&student.email)
    .bind(&student.phone)
    .bind(id)
    .execute(executor)
    .await
    .map(|result| result.rows_affected())
}

pub async fn delete_student<'e, E>(executor: E, id: i64) -> sqlx::Result<u64>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await
        .map(|result| result.rows_affected())
}

pub async fn fetch_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(
        "SELECT id, username, password_hash FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

/// Inserts a user; a taken username surfaces as a unique-constraint
/// violation from the database.
pub async fn insert_user<'e, E>(executor: E, username: &str, password_hash: &str) -> sqlx::Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES ($1, $2)")
        .bind(username)
        .bind(password_hash)
        .execute(executor)
        .await?;

    Ok(result.last_insert_rowid())
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.message().starts_with("UNIQUE constraint failed")
        }
        _ => false,
    }
}
