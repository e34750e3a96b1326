use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::dashboard::{DashboardRecordRow, RecordFilter, RecordOrder, StatusCounts};
use crate::models::pagination::RecordWindow;
use crate::models::qr_code::{STATUS_ACTIVE, STATUS_PENDING};
use crate::service::search::ilike_pattern;

/// Shared `FROM`/`WHERE` of the record listing and its count. `$1` is the search pattern,
/// `$2` the owner filter; both are optional.
const RECORD_SOURCE: &str = r#"
    FROM qr_codes q
    LEFT JOIN profiles p ON p.user_id = q.user_id
    WHERE ($1::text IS NULL
           OR q.search_index ILIKE $1
           OR p.search_index ILIKE $1
           OR q.id::text ILIKE $1
           OR q.user_id::text ILIKE $1)
      AND ($2::uuid IS NULL OR q.user_id = $2)
"#;

impl PostgresRepository {
    pub async fn list_dashboard_records(&self, filter: &RecordFilter, order: RecordOrder, window: RecordWindow) -> Result<Vec<DashboardRecordRow>, AppError> {
        let pattern = filter.search_text.as_deref().map(ilike_pattern);

        // Sort column and direction come from closed enums, never from request text.
        let sql = format!(
            r#"
            SELECT
                q.id, q.name, q.user_id, q.password_hash, q.image_url, q.description, q.category,
                q.contact_options, q.phone_number, q.email, q.animal_name, q.animal_species,
                q.animal_breed, q.animal_feature, q.status, q.search_index, q.created_at, q.updated_at,
                p.first_name AS owner_first_name,
                p.last_name AS owner_last_name,
                p.email AS owner_email,
                p.phone AS owner_phone,
                p.street AS owner_street,
                p.postal_code AS owner_postal_code,
                p.city AS owner_city,
                p.country AS owner_country,
                (p.id IS NOT NULL) AS has_profile
            {RECORD_SOURCE}
            ORDER BY {column} {direction} NULLS LAST, q.id
            LIMIT $3 OFFSET $4
            "#,
            column = order.field.column(),
            direction = order.direction.keyword(),
        );

        let rows = sqlx::query_as::<_, DashboardRecordRow>(&sql)
            .bind(pattern)
            .bind(filter.user_id)
            .bind(window.limit())
            .bind(window.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn count_dashboard_records(&self, filter: &RecordFilter) -> Result<i64, AppError> {
        let pattern = filter.search_text.as_deref().map(ilike_pattern);

        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) {RECORD_SOURCE}"))
            .bind(pattern)
            .bind(filter.user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(total.0)
    }

    pub async fn qr_status_counts(&self) -> Result<StatusCounts, AppError> {
        let (inactive_count, active_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = $1),
                COUNT(*) FILTER (WHERE status = $2)
            FROM qr_codes
            "#,
        )
        .bind(STATUS_PENDING)
        .bind(STATUS_ACTIVE)
        .fetch_one(&self.pool)
        .await?;

        Ok(StatusCounts { inactive_count, active_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::qr_code::QrCodeRepository;
    use crate::database::user::password_hash;
    use crate::models::dashboard::{RecordSortField, SortDirection};
    use crate::models::qr_code::{NewQrCode, QrCodeFields};
    use uuid::Uuid;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn search_is_applied_before_pagination() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        let repo = PostgresRepository::new(&pool);

        let marker = format!("marker{}", Uuid::new_v4().simple());
        let (_, hash) = password_hash("123456").unwrap();
        for i in 0..3 {
            repo.create_qr_code(&NewQrCode {
                id: Uuid::new_v4(),
                user_id: None,
                password_hash: hash.clone(),
                image_url: format!("https://example.com/{i}.png"),
                fields: QrCodeFields::default(),
                search_index: format!("{marker} tier{i}"),
            })
            .await
            .unwrap();
        }

        let filter = RecordFilter::new(Some(marker.to_uppercase()), None);
        let order = RecordOrder {
            field: RecordSortField::CreatedAt,
            direction: SortDirection::Desc,
        };
        let window = RecordWindow::from_query(Some(1), Some(3)).unwrap();

        let rows = repo.list_dashboard_records(&filter, order, window).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(repo.count_dashboard_records(&filter).await.unwrap(), 3);
    }
}
