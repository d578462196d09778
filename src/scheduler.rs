//! Top-level facade: a scheduler instance owns a session's queues and caches
//! and is parameterized by a [`Clock`] and a [`CardStoreGateway`], so tests
//! can swap in a [`ManualClock`] and an in-memory SQLite pool.

use crate::answer::{answer_card, AnswerOutcome};
use crate::clock::Clock;
use crate::config::ConfigCache;
use crate::gateway::{CardStoreGateway, GroupFilter};
use crate::review_log::ReviewLogWriter;
use crate::model::{Card, DeckMeta, GroupConfig, Rating};
use crate::queue::{QueueBuilder, QueuedFrom, Selector, SessionState};
use crate::Error;
use crate::LibraryError;
use crate::SchedulerErrorKind;

pub struct Scheduler<'a> {
    gateway: &'a dyn CardStoreGateway,
    clock: &'a dyn Clock,
    deck: DeckMeta,
    queue_limit: i64,
    report_limit: i64,
    log_retry_delay_ms: u64,
    groups: GroupFilter,
    session: SessionState,
    configs: ConfigCache,
}

impl<'a> Scheduler<'a> {
    pub async fn new(
        gateway: &'a dyn CardStoreGateway,
        clock: &'a dyn Clock,
        deck: DeckMeta,
        queue_limit: i64,
        report_limit: i64,
        log_retry_delay_ms: u64,
        groups: GroupFilter,
    ) -> Result<Self, Error> {
        let now = clock.now().timestamp();
        let session =
            QueueBuilder::reset(gateway, &groups, &deck, queue_limit, report_limit, now).await?;
        Ok(Self {
            gateway,
            clock,
            deck,
            queue_limit,
            report_limit,
            log_retry_delay_ms,
            groups,
            session,
            configs: ConfigCache::default(),
        })
    }

    /// Loads `deck_meta` from storage instead of taking it from the caller,
    /// so a scheduler rebuilt after a restart keeps today's new-card count.
    pub async fn load(
        gateway: &'a dyn CardStoreGateway,
        clock: &'a dyn Clock,
        queue_limit: i64,
        report_limit: i64,
        log_retry_delay_ms: u64,
        groups: GroupFilter,
    ) -> Result<Self, Error> {
        let deck = gateway.get_deck_meta().await?.ok_or(Error::Library(
            LibraryError::InvalidConfig("no deck_meta row found".to_string()),
        ))?;
        Self::new(
            gateway,
            clock,
            deck,
            queue_limit,
            report_limit,
            log_retry_delay_ms,
            groups,
        )
        .await
    }

    async fn maybe_roll_day(&mut self) -> Result<(), Error> {
        let now = self.clock.now().timestamp();
        if self.session.calendar.is_stale(now) {
            self.configs.reset();
            self.session = QueueBuilder::reset(
                self.gateway,
                &self.groups,
                &self.deck,
                self.queue_limit,
                self.report_limit,
                now,
            )
            .await?;
        }
        Ok(())
    }

    pub async fn get_card(&mut self) -> Result<Option<(Card, QueuedFrom)>, Error> {
        self.maybe_roll_day().await?;
        let now = self.clock.now().timestamp();
        let picked = Selector::next(&mut self.session, now, self.deck.collapse_time_secs);
        match picked {
            Some((id, from)) => {
                let card = self
                    .gateway
                    .get_card(id)
                    .await?
                    .ok_or(Error::Library(LibraryError::Scheduler(
                        SchedulerErrorKind::NotFound(id),
                    )))?;
                if from == QueuedFrom::New {
                    self.deck.new_today_day = self.session.calendar.today;
                    self.deck.new_today_used += 1;
                    self.gateway.update_deck_meta(&self.deck).await?;
                }
                Ok(Some((card, from)))
            }
            None => Ok(None),
        }
    }

    async fn resolve_config(&mut self, gid: i64) -> Result<GroupConfig, Error> {
        if let Some(conf) = self.configs.get(gid) {
            return Ok(conf.clone());
        }
        let conf = self.gateway.get_group_config(gid).await?.ok_or(
            Error::Library(LibraryError::Scheduler(SchedulerErrorKind::MissingGroupConfig(
                gid,
            ))),
        )?;
        self.configs.insert(conf.clone());
        Ok(conf)
    }

    pub async fn answer_card(
        &mut self,
        mut card: Card,
        rating: Rating,
        taken_ms: i64,
    ) -> Result<AnswerOutcome, Error> {
        let conf = self.resolve_config(card.gid).await?;
        let now = self.clock.now().timestamp();
        let log_writer = ReviewLogWriter::new(self.gateway, self.log_retry_delay_ms);
        self.session.reps += 1;
        answer_card(
            self.gateway,
            &log_writer,
            &mut card,
            &conf,
            &self.session.calendar,
            now,
            rating,
            taken_ms,
        )
        .await
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::sqlite::SqliteGateway;
    use crate::model::NewSpread::Distribute;
    use crate::model::RevOrder::Due;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use sqlx::SqlitePool;

    fn test_deck() -> DeckMeta {
        DeckMeta {
            created_at: 0,
            new_per_day: 20,
            new_today_day: 0,
            new_today_used: 0,
            new_spread: Distribute,
            new_today_reorder: false,
            rev_order: Due,
            collapse_time_secs: 1200,
        }
    }

    #[sqlx::test]
    async fn new_card_graduates_after_two_hard_answers(pool: SqlitePool) {
        sqlx::query(
            r"INSERT INTO group_config (gid, new_delays, new_ints, lapse_delays)
              VALUES (1, '[1,10]', '[1,4,7]', '[10]')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(r"INSERT INTO card (fid, gid, queue, type, due) VALUES (1, 1, 0, 0, 0)")
            .execute(&pool)
            .await
            .unwrap();

        let gateway = SqliteGateway::new(pool);
        let clock = ManualClock::new(DateTime::from_timestamp(0, 0).unwrap());
        let mut scheduler = Scheduler::new(
            &gateway,
            &clock,
            test_deck(),
            200,
            1000,
            10,
            GroupFilter::all(),
        )
        .await
        .unwrap();

        let (card, from) = scheduler.get_card().await.unwrap().unwrap();
        assert_eq!(from, QueuedFrom::New);
        scheduler
            .answer_card(card, Rating::Hard, 1_000)
            .await
            .unwrap();

        let card = gateway.get_card(1).await.unwrap().unwrap();
        assert_eq!(card.queue(), crate::model::Queue::Learning);
        assert_eq!(card.grade, 1);

        clock.advance(601);
        scheduler
            .answer_card(card, Rating::Hard, 1_000)
            .await
            .unwrap();

        let card = gateway.get_card(1).await.unwrap().unwrap();
        assert_eq!(card.queue(), crate::model::Queue::Review);
        assert_eq!(card.ivl, 1);
        assert_eq!(card.factor, 2500);
    }
}
