use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::application::repos::{RepoError, SequenceRepo};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl SequenceRepo for PostgresRepositories {
    async fn next_number(&self) -> Result<i64, RepoError> {
        let counters = self.layout().counters_table();
        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
        qb.push(counters);
        qb.push(" (name, value) VALUES (");
        qb.push_bind(self.layout().counter_name().to_string());
        qb.push(", 1) ON CONFLICT (name) DO UPDATE SET value = ");
        qb.push(counters);
        qb.push(".value + 1 RETURNING value");

        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
