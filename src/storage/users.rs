//! User persistence: accounts, role assignments, credential lookups.
//!
//! Password digests are written and compared by the callers (API auth
//! layer, CLI bootstrap); this store only moves them in and out.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::model::{RoleEntry, UserInput, UserRow};
use crate::storage::Pool;

/// Credential row used by login and password change. Unlike [`UserRow`]
/// this carries the stored digest and the owning organization.
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub uid: String,
    pub organization: i64,
    pub name: String,
    pub email: String,
    pub password_digest: String,
    pub roles: Vec<String>,
}

#[derive(Clone)]
pub struct UserStore {
    pool: Pool,
}

impl UserStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// All users of an organization with their roles, ordered by email.
    pub fn list(&self, organization: i64) -> Result<Vec<UserRow>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, uid, name, email FROM users
             WHERE organization = ?1 ORDER BY email ASC",
        )?;
        let rows = stmt.query_map([organization], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut users = Vec::new();
        for row in rows {
            let (id, uid, name, email) = row?;
            users.push(UserRow {
                uid,
                name,
                email,
                roles: roles_for(&conn, id)?,
            });
        }
        Ok(users)
    }

    /// One user with roles, scoped to the organization.
    pub fn get(&self, organization: i64, uid: &str) -> Result<Option<UserRow>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, uid, name, email FROM users
                 WHERE uid = ?1 AND organization = ?2",
                params![uid, organization],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, uid, name, email)) = row else {
            return Ok(None);
        };
        Ok(Some(UserRow {
            uid,
            name,
            email,
            roles: roles_for(&conn, id)?,
        }))
    }

    /// Insert a user and role assignments in one transaction.
    pub fn create(
        &self,
        organization: i64,
        input: &UserInput,
        password_digest: &str,
    ) -> Result<UserRow> {
        let uid = Uuid::new_v4().to_string();
        {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (uid, organization, name, email, password)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![uid, organization, input.name, input.email, password_digest],
            )?;
            let user_id = tx.last_insert_rowid();
            insert_roles(&tx, user_id, &input.roles)?;
            tx.commit()?;
        }
        self.get(organization, &uid)?
            .ok_or_else(|| anyhow::anyhow!("user vanished after insert: {uid}"))
    }

    /// Replace a user's fields and roles. A `None` digest keeps the
    /// stored password. Returns `None` when the uid does not resolve
    /// within the organization.
    pub fn update(
        &self,
        organization: i64,
        uid: &str,
        input: &UserInput,
        password_digest: Option<&str>,
    ) -> Result<Option<UserRow>> {
        {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            let user_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM users WHERE uid = ?1 AND organization = ?2",
                    params![uid, organization],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(user_id) = user_id else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE users SET name = ?2, email = ?3,
                        password = COALESCE(?4, password)
                 WHERE id = ?1",
                params![user_id, input.name, input.email, password_digest],
            )?;
            tx.execute("DELETE FROM users_roles WHERE user = ?1", [user_id])?;
            insert_roles(&tx, user_id, &input.roles)?;
            tx.commit()?;
        }
        self.get(organization, uid)
    }

    /// Delete a user (roles cascade). Returns the number of deleted rows.
    pub fn delete(&self, organization: i64, uid: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM users WHERE uid = ?1 AND organization = ?2",
            params![uid, organization],
        )?;
        Ok(deleted)
    }

    /// Credential lookup by email, across organizations (login has no
    /// session yet).
    pub fn find_by_email(&self, email: &str) -> Result<Option<UserAuth>> {
        let conn = self.pool.get()?;
        self.auth_row(
            &conn,
            "SELECT id, uid, organization, name, email, password FROM users WHERE email = ?1",
            email,
        )
    }

    /// Credential lookup by uid (password change for the logged-in user).
    pub fn find_auth(&self, uid: &str) -> Result<Option<UserAuth>> {
        let conn = self.pool.get()?;
        self.auth_row(
            &conn,
            "SELECT id, uid, organization, name, email, password FROM users WHERE uid = ?1",
            uid,
        )
    }

    /// Overwrite the stored digest. Returns whether the user existed.
    pub fn set_password(&self, uid: &str, password_digest: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE users SET password = ?2 WHERE uid = ?1",
            params![uid, password_digest],
        )?;
        Ok(changed == 1)
    }

    fn auth_row(&self, conn: &Connection, sql: &str, key: &str) -> Result<Option<UserAuth>> {
        let row = conn
            .query_row(sql, [key], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .optional()?;

        let Some((id, uid, organization, name, email, password_digest)) = row else {
            return Ok(None);
        };
        let roles = roles_for(conn, id)?
            .into_iter()
            .map(|entry| entry.role)
            .collect();
        Ok(Some(UserAuth {
            uid,
            organization,
            name,
            email,
            password_digest,
            roles,
        }))
    }
}

fn roles_for(conn: &Connection, user_id: i64) -> Result<Vec<RoleEntry>> {
    let mut stmt =
        conn.prepare("SELECT role FROM users_roles WHERE user = ?1 ORDER BY role ASC")?;
    let rows = stmt.query_map([user_id], |row| Ok(RoleEntry { role: row.get(0)? }))?;

    let mut roles = Vec::new();
    for row in rows {
        roles.push(row?);
    }
    Ok(roles)
}

fn insert_roles(tx: &rusqlite::Transaction<'_>, user_id: i64, roles: &[RoleEntry]) -> Result<()> {
    for entry in roles {
        tx.execute(
            "INSERT INTO users_roles (user, role) VALUES (?1, ?2)",
            params![user_id, entry.role],
        )?;
    }
    Ok(())
}
