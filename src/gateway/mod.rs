pub mod sqlite;

use crate::model::{Card, CardId, DeckMeta, FactId, GroupConfig, GroupId, RevOrder, ReviewLogRow};
use crate::Error;
use async_trait::async_trait;

/// Selects which groups a query should consider. Empty means "all groups".
#[derive(Clone, Debug, Default)]
pub struct GroupFilter(pub Vec<GroupId>);

impl GroupFilter {
    pub fn all() -> Self {
        Self(Vec::new())
    }
}

/// Storage boundary the scheduler is written against. The scheduler never
/// builds a SQL string out of caller-controlled values; every query here is
/// parameterized by the implementation.
#[async_trait]
pub trait CardStoreGateway: Send + Sync {
    async fn count_new(&self, groups: &GroupFilter, limit: i64) -> Result<i64, Error>;
    async fn list_new(
        &self,
        groups: &GroupFilter,
        limit: i64,
    ) -> Result<Vec<(CardId, i64)>, Error>;

    async fn count_learning(
        &self,
        groups: &GroupFilter,
        due_before: i64,
        limit: i64,
    ) -> Result<i64, Error>;
    async fn list_learning(
        &self,
        groups: &GroupFilter,
        due_before: i64,
        limit: i64,
    ) -> Result<Vec<(i64, CardId)>, Error>;

    async fn count_review(
        &self,
        groups: &GroupFilter,
        today: i64,
        limit: i64,
    ) -> Result<i64, Error>;
    /// `order` selects `ORDER BY`: `OldFirst`/`NewFirst` sort by `ivl`,
    /// `Due`/`Random` sort by `due` (random shuffling happens in the caller,
    /// seeded deterministically, so it stays testable without touching SQL).
    async fn list_review(
        &self,
        groups: &GroupFilter,
        today: i64,
        limit: i64,
        order: RevOrder,
    ) -> Result<Vec<CardId>, Error>;

    /// Due-days of review-queue siblings (same fact), excluding `exclude_card`.
    async fn sibling_review_dues(
        &self,
        fid: FactId,
        exclude_card: CardId,
    ) -> Result<Vec<i64>, Error>;

    /// Smallest `due` among new cards not in `exclude` that are `>= start`,
    /// used by `sortCards`'s `shift` option to find the colliding range.
    async fn min_new_due_excluding(
        &self,
        exclude: &[CardId],
        start: i64,
    ) -> Result<Option<i64>, Error>;
    /// Pushes every new card not in `exclude` with `due >= low` forward by
    /// `shift_by`, clearing space for a freshly sorted batch.
    async fn shift_new_cards(
        &self,
        exclude: &[CardId],
        low: i64,
        shift_by: i64,
        now: i64,
    ) -> Result<(), Error>;

    async fn get_group_config(&self, gid: GroupId) -> Result<Option<GroupConfig>, Error>;

    /// Loads the singleton `deck_meta` row so the day's new-card budget
    /// survives a process restart.
    async fn get_deck_meta(&self) -> Result<Option<DeckMeta>, Error>;
    async fn update_deck_meta(&self, deck: &DeckMeta) -> Result<(), Error>;

    /// Re-creates `ix_card_multi` with `ivl` appended when `order` needs it,
    /// so an interval-sorted review scan stays an index scan instead of a
    /// full table sort. Idempotent; safe to call on every `revOrder` change.
    async fn ensure_review_index(&self, order: RevOrder) -> Result<(), Error>;

    async fn get_card(&self, id: CardId) -> Result<Option<Card>, Error>;
    async fn update_card(&self, card: &Card) -> Result<(), Error>;
    async fn update_cards(&self, cards: &[Card]) -> Result<(), Error>;

    /// Returns `Ok(false)` on a primary-key collision so the caller can retry
    /// with a bumped timestamp rather than treating it as a hard failure.
    async fn insert_review_log(&self, row: &ReviewLogRow) -> Result<bool, Error>;
    async fn count_review_logs(&self, card_id: CardId) -> Result<i64, Error>;
}
