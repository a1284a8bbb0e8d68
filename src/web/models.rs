use sqlx::FromRow;

#[derive(Clone, Debug, FromRow)]
pub struct StudentRow {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
}

#[derive(Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

/// Student fields after validation, trimmed and ready to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewStudent {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub phone: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
