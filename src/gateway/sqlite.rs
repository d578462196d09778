use super::{CardStoreGateway, GroupFilter};
use crate::model::{
    new_spread_from_i8, rev_order_from_i8, Card, CardId, DeckMeta, FactId, GroupConfig, GroupId,
    RevOrder, ReviewLogRow,
};
use crate::Error;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Sqlx { source: e.into() })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Builds a `col IN (?, ?, ...)` clause for a non-empty group filter, since
/// binding one placeholder per id (rather than one placeholder total) is
/// required for this to actually filter on more than a single id.
fn groups_clause(groups: &GroupFilter) -> String {
    if groups.0.is_empty() {
        String::new()
    } else {
        let placeholders = groups.0.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        format!("AND gid IN ({placeholders})")
    }
}

fn exclude_clause(exclude: &[CardId]) -> String {
    if exclude.is_empty() {
        String::new()
    } else {
        let placeholders = exclude.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        format!("AND id NOT IN ({placeholders})")
    }
}

#[async_trait]
impl CardStoreGateway for SqliteGateway {
    async fn count_new(&self, groups: &GroupFilter, limit: i64) -> Result<i64, Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT id FROM card WHERE queue = 0 {} LIMIT ?)",
            groups_clause(groups)
        );
        let mut query = sqlx::query_scalar(&sql);
        for gid in &groups.0 {
            query = query.bind(gid);
        }
        query = query.bind(limit);
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }

    async fn list_new(
        &self,
        groups: &GroupFilter,
        limit: i64,
    ) -> Result<Vec<(CardId, i64)>, Error> {
        let sql = format!(
            "SELECT id, due FROM card WHERE queue = 0 {} ORDER BY due ASC LIMIT ?",
            groups_clause(groups)
        );
        let mut query = sqlx::query_as(&sql);
        for gid in &groups.0 {
            query = query.bind(gid);
        }
        query = query.bind(limit);
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }

    async fn count_learning(
        &self,
        groups: &GroupFilter,
        due_before: i64,
        limit: i64,
    ) -> Result<i64, Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT id FROM card WHERE queue = 1 AND due < ? {} LIMIT ?)",
            groups_clause(groups)
        );
        let mut query = sqlx::query_scalar(&sql).bind(due_before);
        for gid in &groups.0 {
            query = query.bind(gid);
        }
        query = query.bind(limit);
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }

    async fn list_learning(
        &self,
        groups: &GroupFilter,
        due_before: i64,
        limit: i64,
    ) -> Result<Vec<(i64, CardId)>, Error> {
        let sql = format!(
            "SELECT due, id FROM card WHERE queue = 1 AND due < ? {} ORDER BY due ASC LIMIT ?",
            groups_clause(groups)
        );
        let mut query = sqlx::query_as(&sql).bind(due_before);
        for gid in &groups.0 {
            query = query.bind(gid);
        }
        query = query.bind(limit);
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }

    async fn count_review(
        &self,
        groups: &GroupFilter,
        today: i64,
        limit: i64,
    ) -> Result<i64, Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT id FROM card WHERE queue = 2 AND due <= ? {} LIMIT ?)",
            groups_clause(groups)
        );
        let mut query = sqlx::query_scalar(&sql).bind(today);
        for gid in &groups.0 {
            query = query.bind(gid);
        }
        query = query.bind(limit);
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }

    async fn list_review(
        &self,
        groups: &GroupFilter,
        today: i64,
        limit: i64,
        order: RevOrder,
    ) -> Result<Vec<CardId>, Error> {
        let order_by = match order {
            RevOrder::OldFirst => "ivl DESC",
            RevOrder::NewFirst => "ivl ASC",
            RevOrder::Due | RevOrder::Random => "due ASC",
        };
        let sql = format!(
            "SELECT id FROM card WHERE queue = 2 AND due <= ? {} ORDER BY {order_by} LIMIT ?",
            groups_clause(groups)
        );
        let mut query = sqlx::query_scalar(&sql).bind(today);
        for gid in &groups.0 {
            query = query.bind(gid);
        }
        query = query.bind(limit);
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }

    async fn sibling_review_dues(
        &self,
        fid: FactId,
        exclude_card: CardId,
    ) -> Result<Vec<i64>, Error> {
        sqlx::query_scalar(
            r"SELECT due FROM card WHERE fid = ? AND queue = 2 AND id != ?",
        )
        .bind(fid)
        .bind(exclude_card)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Sqlx { source: e })
    }

    async fn min_new_due_excluding(
        &self,
        exclude: &[CardId],
        start: i64,
    ) -> Result<Option<i64>, Error> {
        let not_in = exclude_clause(exclude);
        let sql = format!("SELECT MIN(due) FROM card WHERE queue = 0 AND due >= ? {not_in}");
        let mut query = sqlx::query_scalar(&sql).bind(start);
        for id in exclude {
            query = query.bind(id);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }

    async fn shift_new_cards(
        &self,
        exclude: &[CardId],
        low: i64,
        shift_by: i64,
        now: i64,
    ) -> Result<(), Error> {
        let not_in = exclude_clause(exclude);
        let sql = format!(
            "UPDATE card SET due = due + ?, modified_at = ? WHERE queue = 0 AND due >= ? {not_in}"
        );
        let mut query = sqlx::query(&sql).bind(shift_by).bind(now).bind(low);
        for id in exclude {
            query = query.bind(id);
        }
        query
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
        Ok(())
    }

    async fn get_group_config(&self, gid: GroupId) -> Result<Option<GroupConfig>, Error> {
        let row = sqlx::query(r"SELECT * FROM group_config WHERE gid = ?")
            .bind(gid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
        let Some(row) = row else {
            return Ok(None);
        };
        let new_delays: String = row.try_get("new_delays").map_err(|e| Error::Sqlx { source: e })?;
        let new_ints: String = row.try_get("new_ints").map_err(|e| Error::Sqlx { source: e })?;
        let lapse_delays: String = row
            .try_get("lapse_delays")
            .map_err(|e| Error::Sqlx { source: e })?;
        let new_ints: [i64; 3] = serde_json::from_str(&new_ints).unwrap_or([1, 4, 7]);
        Ok(Some(GroupConfig {
            gid: row.try_get("gid").map_err(|e| Error::Sqlx { source: e })?,
            new_delays: serde_json::from_str(&new_delays).unwrap_or_default(),
            new_ints,
            new_initial_factor: row
                .try_get("new_initial_factor")
                .map_err(|e| Error::Sqlx { source: e })?,
            lapse_delays: serde_json::from_str(&lapse_delays).unwrap_or_default(),
            lapse_mult: row.try_get("lapse_mult").map_err(|e| Error::Sqlx { source: e })?,
            lapse_relearn: row
                .try_get::<i64, _>("lapse_relearn")
                .map_err(|e| Error::Sqlx { source: e })?
                != 0,
            lapse_leech_fails: row
                .try_get::<i64, _>("lapse_leech_fails")
                .map_err(|e| Error::Sqlx { source: e })? as u32,
            lapse_leech_action: row
                .try_get::<i64, _>("lapse_leech_action")
                .map_err(|e| Error::Sqlx { source: e })? as u8,
            rev_ease4: row.try_get("rev_ease4").map_err(|e| Error::Sqlx { source: e })?,
            rev_min_space: row
                .try_get("rev_min_space")
                .map_err(|e| Error::Sqlx { source: e })?,
            rev_fuzz: row.try_get("rev_fuzz").map_err(|e| Error::Sqlx { source: e })?,
            max_taken_secs: row
                .try_get("max_taken_secs")
                .map_err(|e| Error::Sqlx { source: e })?,
        }))
    }

    async fn get_deck_meta(&self) -> Result<Option<DeckMeta>, Error> {
        let row = sqlx::query(r"SELECT * FROM deck_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(DeckMeta {
            created_at: row.try_get("created_at").map_err(|e| Error::Sqlx { source: e })?,
            new_per_day: row.try_get("new_per_day").map_err(|e| Error::Sqlx { source: e })?,
            new_today_day: row
                .try_get("new_today_day")
                .map_err(|e| Error::Sqlx { source: e })?,
            new_today_used: row
                .try_get("new_today_used")
                .map_err(|e| Error::Sqlx { source: e })?,
            new_spread: new_spread_from_i8(
                row.try_get("new_spread").map_err(|e| Error::Sqlx { source: e })?,
            ),
            new_today_reorder: row
                .try_get::<i64, _>("new_today_order")
                .map_err(|e| Error::Sqlx { source: e })?
                != 0,
            rev_order: rev_order_from_i8(
                row.try_get("rev_order").map_err(|e| Error::Sqlx { source: e })?,
            ),
            collapse_time_secs: row
                .try_get("collapse_time_secs")
                .map_err(|e| Error::Sqlx { source: e })?,
        }))
    }

    async fn update_deck_meta(&self, deck: &DeckMeta) -> Result<(), Error> {
        sqlx::query(
            r"INSERT INTO deck_meta
                (id, created_at, new_per_day, new_today_day, new_today_used, new_spread,
                 new_today_order, rev_order, collapse_time_secs)
              VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(id) DO UPDATE SET
                created_at = excluded.created_at,
                new_per_day = excluded.new_per_day,
                new_today_day = excluded.new_today_day,
                new_today_used = excluded.new_today_used,
                new_spread = excluded.new_spread,
                new_today_order = excluded.new_today_order,
                rev_order = excluded.rev_order,
                collapse_time_secs = excluded.collapse_time_secs",
        )
        .bind(deck.created_at)
        .bind(deck.new_per_day)
        .bind(deck.new_today_day)
        .bind(deck.new_today_used)
        .bind(deck.new_spread as i8)
        .bind(i64::from(deck.new_today_reorder))
        .bind(deck.rev_order as i8)
        .bind(deck.collapse_time_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
        Ok(())
    }

    async fn ensure_review_index(&self, order: RevOrder) -> Result<(), Error> {
        let columns = match order {
            RevOrder::OldFirst | RevOrder::NewFirst => "queue, due, gid, ivl",
            RevOrder::Due | RevOrder::Random => "queue, due, gid",
        };
        sqlx::query("DROP INDEX IF EXISTS ix_card_multi")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
        sqlx::query(&format!(
            "CREATE INDEX ix_card_multi ON card ({columns})"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
        Ok(())
    }

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, Error> {
        sqlx::query_as(r"SELECT * FROM card WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }

    async fn update_card(&self, card: &Card) -> Result<(), Error> {
        sqlx::query(
            r"UPDATE card SET queue = ?, type = ?, due = ?, ivl = ?, factor = ?, grade = ?,
              cycles = ?, lapses = ?, last_ivl = ?, edue = ?, reps = ?, modified_at = ?
              WHERE id = ?",
        )
        .bind(card.queue)
        .bind(card.card_type)
        .bind(card.due)
        .bind(card.ivl)
        .bind(card.factor)
        .bind(card.grade)
        .bind(card.cycles)
        .bind(card.lapses)
        .bind(card.last_ivl)
        .bind(card.edue)
        .bind(card.reps)
        .bind(card.modified_at)
        .bind(card.id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
        Ok(())
    }

    async fn update_cards(&self, cards: &[Card]) -> Result<(), Error> {
        for card in cards {
            self.update_card(card).await?;
        }
        Ok(())
    }

    async fn insert_review_log(&self, row: &ReviewLogRow) -> Result<bool, Error> {
        let result = sqlx::query(
            r"INSERT INTO review_log (time_ms, card_id, ease, ivl, last_ivl, factor, taken_ms, log_type)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.time_ms)
        .bind(row.card_id)
        .bind(row.ease)
        .bind(row.ivl)
        .bind(row.last_ivl)
        .bind(row.factor)
        .bind(row.taken_ms)
        .bind(row.log_type)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(Error::Sqlx { source: e }),
        }
    }

    async fn count_review_logs(&self, card_id: CardId) -> Result<i64, Error> {
        sqlx::query_scalar(r"SELECT COUNT(*) FROM review_log WHERE card_id = ?")
            .bind(card_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewSpread, Queue};

    #[sqlx::test]
    async fn round_trips_a_card(pool: SqlitePool) {
        sqlx::query(
            r"INSERT INTO group_config (gid, new_delays, new_ints, lapse_delays)
              VALUES (1, '[1,10]', '[1,4,7]', '[10]')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let gateway = SqliteGateway::new(pool);
        sqlx::query(r"INSERT INTO card (fid, gid, queue, type, due) VALUES (1, 1, 0, 0, 5)")
            .execute(gateway.pool())
            .await
            .unwrap();
        let card = gateway.get_card(1).await.unwrap().unwrap();
        assert_eq!(card.queue(), Queue::New);
        assert_eq!(card.due, 5);
    }

    #[sqlx::test]
    async fn duplicate_review_log_timestamp_is_reported_as_conflict(pool: SqlitePool) {
        sqlx::query(
            r"INSERT INTO group_config (gid, new_delays, new_ints, lapse_delays)
              VALUES (1, '[1,10]', '[1,4,7]', '[10]')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(r"INSERT INTO card (fid, gid, queue, type, due) VALUES (1, 1, 2, 2, 0)")
            .execute(&pool)
            .await
            .unwrap();
        let gateway = SqliteGateway::new(pool);
        let row = ReviewLogRow {
            time_ms: 1000,
            card_id: 1,
            ease: 3,
            ivl: 4,
            last_ivl: 1,
            factor: 2500,
            taken_ms: 500,
            log_type: 1,
        };
        assert!(gateway.insert_review_log(&row).await.unwrap());
        assert!(!gateway.insert_review_log(&row).await.unwrap());
    }

    #[sqlx::test]
    async fn list_new_respects_group_filter(pool: SqlitePool) {
        for gid in [1_i64, 2] {
            sqlx::query(
                r"INSERT INTO group_config (gid, new_delays, new_ints, lapse_delays)
                  VALUES (?, '[1,10]', '[1,4,7]', '[10]')",
            )
            .bind(gid)
            .execute(&pool)
            .await
            .unwrap();
        }
        sqlx::query(r"INSERT INTO card (fid, gid, queue, type, due) VALUES (1, 1, 0, 0, 1)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(r"INSERT INTO card (fid, gid, queue, type, due) VALUES (2, 2, 0, 0, 2)")
            .execute(&pool)
            .await
            .unwrap();
        let gateway = SqliteGateway::new(pool);
        let result = gateway
            .list_new(&GroupFilter(vec![1]), 200)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, 1);
    }

    #[sqlx::test]
    async fn deck_meta_round_trips_and_upserts(pool: SqlitePool) {
        let gateway = SqliteGateway::new(pool);
        assert!(gateway.get_deck_meta().await.unwrap().is_none());

        let deck = DeckMeta {
            created_at: 0,
            new_per_day: 20,
            new_today_day: 3,
            new_today_used: 5,
            new_spread: NewSpread::Last,
            new_today_reorder: true,
            rev_order: RevOrder::NewFirst,
            collapse_time_secs: 1200,
        };
        gateway.update_deck_meta(&deck).await.unwrap();
        let loaded = gateway.get_deck_meta().await.unwrap().unwrap();
        assert_eq!(loaded.new_today_used, 5);
        assert_eq!(loaded.new_spread, NewSpread::Last);
        assert_eq!(loaded.rev_order, RevOrder::NewFirst);
        assert!(loaded.new_today_reorder);

        let mut updated = deck;
        updated.new_today_used = 6;
        gateway.update_deck_meta(&updated).await.unwrap();
        let reloaded = gateway.get_deck_meta().await.unwrap().unwrap();
        assert_eq!(reloaded.new_today_used, 6);
    }
}
