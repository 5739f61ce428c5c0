//! Postgres-backed record store.
//!
//! Every query maps its rows explicitly onto a `keystone-auth` record type.
//! Required columns that come back NULL (or malformed) fail with
//! `StoreError::Mapping`; nullable grant flags coalesce to `false`.
//!
//! ## Expected schema
//!
//! | table | columns |
//! |-------|---------|
//! | `principals` | `id uuid`, `email text`, `nickname text NULL`, `credential text NULL`, `is_active bool`, `is_platform_super_admin bool`, `is_platform_system_admin bool`, `must_change_credential bool` |
//! | `organizations` | `id uuid`, `name text`, `slug text`, `status text` |
//! | `organization_memberships` | `id uuid`, `principal_id uuid`, `organization_id uuid`, `position_id uuid NULL`, `is_owner bool`, `status text` |
//! | `positions` | `id uuid`, `organization_id uuid`, `name text`, `default_role_id uuid NULL` |
//! | `role_grants` | `role_id uuid`, `module_code text`, `resource_type text`, `can_create bool NULL`, `can_read bool NULL`, `can_update bool NULL`, `can_delete bool NULL` |
//! | `position_grants` | same as `role_grants`, keyed by `position_id uuid` |
//! | `organization_modules` | `organization_id uuid`, `module_code text`, `status text` |
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database, code `23505` (unique violation) | `Conflict` |
//! | ColumnDecode / ColumnNotFound | `Mapping` |
//! | anything else (IO, TLS, pool, protocol) | `Unavailable` |

use std::str::FromStr;
use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use tracing::instrument;
use uuid::Uuid;

use keystone_auth::{
    Credential, Membership, MembershipStatus, ModuleCode, Organization, OrganizationStatus, Position,
    PositionOverrideGrant, Principal, ResolvedMembership, RoleGrant, normalize_identifier,
};
use keystone_core::{MembershipId, OrganizationId, PositionId, PrincipalId, RoleId};

use super::{NewPrincipal, RecordStore, StoreError};

const PRINCIPAL_COLUMNS: &str = "id, email, nickname, credential, is_active, \
     is_platform_super_admin, is_platform_system_admin, must_change_credential";

/// Postgres-backed record store. `Send + Sync`; clones share one pool.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self, identifier), err)]
    async fn find_active_principal(&self, identifier: &str) -> Result<Option<Principal>, StoreError> {
        let wanted = normalize_identifier(identifier);
        if wanted.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals \
             WHERE is_active AND (lower(email) = $1 OR lower(nickname) = $1) \
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(&wanted)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_active_principal", e))?;

        row.as_ref().map(principal_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn first_active_super_admin(&self) -> Result<Option<Principal>, StoreError> {
        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals \
             WHERE is_active AND is_platform_super_admin \
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("first_active_super_admin", e))?;

        row.as_ref().map(principal_from_row).transpose()
    }

    #[instrument(skip(self, principal_id), fields(principal_id = %principal_id), err)]
    async fn active_memberships(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<ResolvedMembership>, StoreError> {
        // No ORDER BY: "first active membership" is whatever Postgres yields.
        let rows = sqlx::query(
            r#"
            SELECT
                m.id              AS membership_id,
                m.principal_id    AS principal_id,
                m.organization_id AS organization_id,
                m.position_id     AS position_id,
                m.is_owner        AS is_owner,
                m.status          AS membership_status,
                o.name            AS organization_name,
                o.slug            AS organization_slug,
                o.status          AS organization_status,
                p.id              AS joined_position_id,
                p.organization_id AS position_organization_id,
                p.name            AS position_name,
                p.default_role_id AS default_role_id
            FROM organization_memberships m
            JOIN organizations o ON o.id = m.organization_id
            LEFT JOIN positions p ON p.id = m.position_id
            WHERE m.principal_id = $1 AND m.status = 'active'
            "#,
        )
        .bind(principal_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_memberships", e))?;

        rows.iter().map(membership_from_row).collect()
    }

    #[instrument(skip(self, role_id), fields(role_id = %role_id), err)]
    async fn role_grants(&self, role_id: RoleId) -> Result<Vec<RoleGrant>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT role_id, module_code, resource_type, can_create, can_read, can_update, can_delete
            FROM role_grants
            WHERE role_id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_grants", e))?;

        rows.iter()
            .map(|row| {
                Ok(RoleGrant {
                    role_id: RoleId::from_uuid(required(row, "role_id")?),
                    module_code: ModuleCode::from(required::<String>(row, "module_code")?),
                    resource_type: required::<String>(row, "resource_type")?.into(),
                    can_create: optional(row, "can_create")?,
                    can_read: optional(row, "can_read")?,
                    can_update: optional(row, "can_update")?,
                    can_delete: optional(row, "can_delete")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, position_id), fields(position_id = %position_id), err)]
    async fn position_overrides(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<PositionOverrideGrant>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT position_id, module_code, resource_type, can_create, can_read, can_update, can_delete
            FROM position_grants
            WHERE position_id = $1
            "#,
        )
        .bind(position_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("position_overrides", e))?;

        rows.iter()
            .map(|row| {
                Ok(PositionOverrideGrant {
                    position_id: PositionId::from_uuid(required(row, "position_id")?),
                    module_code: ModuleCode::from(required::<String>(row, "module_code")?),
                    resource_type: required::<String>(row, "resource_type")?.into(),
                    can_create: optional(row, "can_create")?,
                    can_read: optional(row, "can_read")?,
                    can_update: optional(row, "can_update")?,
                    can_delete: optional(row, "can_delete")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, organization_id), fields(organization_id = %organization_id), err)]
    async fn active_module_codes(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ModuleCode>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT module_code
            FROM organization_modules
            WHERE organization_id = $1 AND status = 'active'
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_module_codes", e))?;

        rows.iter()
            .map(|row| required::<String>(row, "module_code").map(ModuleCode::from))
            .collect()
    }

    #[instrument(skip(self, organization_id), fields(organization_id = %organization_id), err)]
    async fn organization_by_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query("SELECT id, name, slug, status FROM organizations WHERE id = $1")
            .bind(organization_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("organization_by_id", e))?;

        row.as_ref().map(organization_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query("SELECT id, name, slug, status FROM organizations WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("organization_by_slug", e))?;

        row.as_ref().map(organization_from_row).transpose()
    }

    #[instrument(skip(self, principal), err)]
    async fn insert_principal(&self, principal: NewPrincipal) -> Result<Principal, StoreError> {
        let NewPrincipal {
            email,
            nickname,
            credential,
            must_change_credential,
        } = principal;

        let sql = format!(
            "INSERT INTO principals ({PRINCIPAL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, TRUE, FALSE, FALSE, $5) \
             RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7())
            .bind(normalize_identifier(&email))
            .bind(nickname)
            .bind(credential.expose_plaintext())
            .bind(must_change_credential)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_principal", e))?;

        principal_from_row(&row)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn required<'r, T>(row: &'r PgRow, column: &'static str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    optional(row, column)?.ok_or_else(|| StoreError::Mapping {
        column,
        message: "required column is NULL".to_string(),
    })
}

fn optional<'r, T>(row: &'r PgRow, column: &'static str) -> Result<Option<T>, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(column)
        .map_err(|e| StoreError::Mapping {
            column,
            message: e.to_string(),
        })
}

fn parsed<T>(row: &PgRow, column: &'static str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = required(row, column)?;
    raw.parse::<T>().map_err(|e| StoreError::Mapping {
        column,
        message: e.to_string(),
    })
}

fn principal_from_row(row: &PgRow) -> Result<Principal, StoreError> {
    Ok(Principal {
        id: PrincipalId::from_uuid(required(row, "id")?),
        email: required(row, "email")?,
        nickname: optional(row, "nickname")?,
        is_active: required(row, "is_active")?,
        is_platform_super_admin: required(row, "is_platform_super_admin")?,
        is_platform_system_admin: required(row, "is_platform_system_admin")?,
        must_change_credential: optional(row, "must_change_credential")?.unwrap_or(false),
        // A NULL credential (e.g. an invited principal) never matches.
        credential: Credential::new(optional::<String>(row, "credential")?.unwrap_or_default()),
    })
}

fn organization_from_row(row: &PgRow) -> Result<Organization, StoreError> {
    Ok(Organization {
        id: OrganizationId::from_uuid(required(row, "id")?),
        name: required(row, "name")?,
        slug: required(row, "slug")?,
        status: parsed::<OrganizationStatus>(row, "status")?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<ResolvedMembership, StoreError> {
    let organization_id = OrganizationId::from_uuid(required(row, "organization_id")?);

    let organization = Organization {
        id: organization_id,
        name: required(row, "organization_name")?,
        slug: required(row, "organization_slug")?,
        status: parsed::<OrganizationStatus>(row, "organization_status")?,
    };

    let membership = Membership {
        id: MembershipId::from_uuid(required(row, "membership_id")?),
        principal_id: PrincipalId::from_uuid(required(row, "principal_id")?),
        organization_id,
        position_id: optional::<Uuid>(row, "position_id")?.map(PositionId::from_uuid),
        is_owner: optional(row, "is_owner")?.unwrap_or(false),
        status: parsed::<MembershipStatus>(row, "membership_status")?,
    };

    // Left join: a dangling position id yields no position rather than an error.
    let position = match optional::<Uuid>(row, "joined_position_id")? {
        Some(id) => Some(Position {
            id: PositionId::from_uuid(id),
            organization_id: OrganizationId::from_uuid(required(row, "position_organization_id")?),
            name: required(row, "position_name")?,
            default_role_id: optional::<Uuid>(row, "default_role_id")?.map(RoleId::from_uuid),
        }),
        None => None,
    };

    Ok(ResolvedMembership {
        organization,
        membership,
        position,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { index, source } => StoreError::Mapping {
            column: "unknown",
            message: format!("{operation}: column {index}: {source}"),
        },
        sqlx::Error::ColumnNotFound(name) => StoreError::Mapping {
            column: "unknown",
            message: format!("{operation}: column '{name}' not found"),
        },
        other => StoreError::Unavailable(format!("sqlx error in {operation}: {other}")),
    }
}
