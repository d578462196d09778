//! Administrative operations: suspend, unsuspend, bury, forget, reschedule,
//! and new-card repositioning. Each mutates a batch of cards and persists
//! them through the gateway in one pass.

use crate::gateway::CardStoreGateway;
use crate::model::{Card, CardId, CardType, Queue};
use crate::Error;
use itertools::Itertools;
use rand::Rng;

/// `suspendCards`: first restores any learning-queue cards (so a card mid
/// relearn doesn't get stuck there forever while suspended), then suspends.
pub fn suspend(cards: &mut [Card]) {
    for card in cards.iter_mut() {
        if card.queue() == Queue::Learning && card.card_type() == CardType::Review {
            card.due = card.edue;
            card.set_queue(Queue::Review);
        }
        card.set_queue(Queue::Suspended);
    }
}

/// `unsuspendCards`: restores `queue` from the persisted `type`. A no-op for
/// any card that is not currently suspended.
pub fn unsuspend(cards: &mut [Card]) {
    for card in cards.iter_mut() {
        if card.queue() == Queue::Suspended {
            card.queue = card.card_type;
        }
    }
}

/// `buryFact`: hides every card of a fact for the rest of the session.
pub fn bury(cards: &mut [Card]) {
    for card in cards.iter_mut() {
        card.set_queue(Queue::Buried);
    }
}

/// `onClose`: reverts `Buried`/`TempSuspended` cards back to their type.
pub fn unbury_all(cards: &mut [Card]) {
    for card in cards.iter_mut() {
        if matches!(card.queue(), Queue::Buried | Queue::TempSuspended) {
            card.queue = card.card_type;
        }
    }
}

/// `removeFailed`: restores lapsed-but-relearning cards back to review,
/// undoing an in-progress relearn.
pub fn remove_failed(cards: &mut [Card]) {
    for card in cards.iter_mut() {
        if card.queue() == Queue::Learning && card.card_type() == CardType::Review {
            card.due = card.edue;
            card.set_queue(Queue::Review);
        }
    }
}

/// `forgetCards`: resets to a fresh new card. `order_base` is the current
/// maximum new-card `due` ordinal so forgotten cards sort after existing new
/// cards; pass `shuffle_seed` to randomize order instead of preserving it.
pub fn forget(cards: &mut [Card], order_base: i64, shuffle_seed: Option<u64>) {
    let mut order_offsets: Vec<i64> = (1..=cards.len() as i64).collect();
    if let Some(seed) = shuffle_seed {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        order_offsets.shuffle(&mut rng);
    }
    for (card, offset) in cards.iter_mut().zip(order_offsets) {
        card.set_card_type(CardType::New);
        card.set_queue(Queue::New);
        card.ivl = 0;
        card.due = order_base + offset;
    }
}

/// `reschedCards`: assigns each card a uniformly random interval in
/// `[imin, imax]` and moves it straight to the review queue.
pub fn resched(cards: &mut [Card], today: i64, imin: i64, imax: i64) {
    let mut rng = rand::thread_rng();
    for card in cards.iter_mut() {
        let r = if imin >= imax {
            imin
        } else {
            rng.gen_range(imin..=imax)
        };
        card.set_card_type(CardType::Review);
        card.set_queue(Queue::Review);
        card.ivl = r.max(1);
        card.due = today + card.ivl;
    }
}

/// `sortCards`: produces a stable ordering for new cards grouped by fact, so
/// siblings stay adjacent. Empty input is a no-op; the reference
/// implementation this was ported from reads past the end of its loop
/// variable in that case.
///
/// `shuffle_seed` randomizes fact order before assigning dues instead of
/// sorting by `fid` ascending (used by `randomizeCards`). `shift`, when
/// true, pushes any new card outside this batch whose `due` collides with
/// the freshly assigned range out of the way first, via `now` for the
/// touched cards' `modified_at`.
pub async fn sort_new_cards(
    gateway: &dyn CardStoreGateway,
    cards: &mut [Card],
    start: i64,
    step: i64,
    shuffle_seed: Option<u64>,
    shift: bool,
    now: i64,
) -> Result<(), Error> {
    if cards.is_empty() {
        return Ok(());
    }
    let by_fact = cards
        .iter()
        .enumerate()
        .map(|(idx, card)| (card.fid, idx))
        .into_group_map();
    let mut fact_ids: Vec<_> = by_fact.keys().copied().collect();
    fact_ids.sort_unstable();
    if let Some(seed) = shuffle_seed {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        fact_ids.shuffle(&mut rng);
    }

    let mut due = start;
    let mut dues = vec![0_i64; cards.len()];
    for fid in &fact_ids {
        for &idx in &by_fact[fid] {
            dues[idx] = due;
            due += step;
        }
    }
    let high = due - step;

    if shift {
        let excluded: Vec<CardId> = cards.iter().map(|card| card.id).collect();
        if let Some(low) = gateway.min_new_due_excluding(&excluded, start).await? {
            let shift_by = high - low + 1;
            gateway
                .shift_new_cards(&excluded, low, shift_by, now)
                .await?;
        }
    }

    for (card, due) in cards.iter_mut().zip(dues) {
        card.due = due;
    }
    Ok(())
}

pub async fn persist(gateway: &dyn CardStoreGateway, cards: &[Card]) -> Result<(), Error> {
    gateway.update_cards(cards).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::sqlite::SqliteGateway;
    use sqlx::SqlitePool;

    fn new_card(id: CardId, fid: i64) -> Card {
        Card {
            id,
            fid,
            queue: Queue::New as i8,
            card_type: CardType::New as i8,
            ..Card::default()
        }
    }

    #[test]
    fn suspend_then_unsuspend_restores_queue() {
        let mut cards = vec![Card {
            queue: Queue::Review as i8,
            card_type: CardType::Review as i8,
            ..Card::default()
        }];
        suspend(&mut cards);
        assert_eq!(cards[0].queue(), Queue::Suspended);
        unsuspend(&mut cards);
        assert_eq!(cards[0].queue(), Queue::Review);
    }

    #[test]
    fn bury_then_unbury_all_restores_type() {
        let mut cards = vec![Card {
            queue: Queue::Review as i8,
            card_type: CardType::Review as i8,
            ..Card::default()
        }];
        bury(&mut cards);
        assert_eq!(cards[0].queue(), Queue::Buried);
        unbury_all(&mut cards);
        assert_eq!(cards[0].queue(), Queue::Review);
    }

    #[test]
    fn forget_resets_to_new_and_offsets_due() {
        let mut cards = vec![Card {
            queue: Queue::Review as i8,
            card_type: CardType::Review as i8,
            ivl: 30,
            ..Card::default()
        }];
        forget(&mut cards, 100, None);
        assert_eq!(cards[0].queue(), Queue::New);
        assert_eq!(cards[0].ivl, 0);
        assert_eq!(cards[0].due, 101);
    }

    #[test]
    fn resched_clamps_interval_to_at_least_one_day() {
        let mut cards = vec![Card::default()];
        resched(&mut cards, 10, 0, 0);
        assert_eq!(cards[0].ivl, 1);
        assert_eq!(cards[0].due, 11);
        assert_eq!(cards[0].queue(), Queue::Review);
    }

    #[sqlx::test]
    async fn sort_new_cards_keeps_siblings_adjacent(pool: SqlitePool) {
        let gateway = SqliteGateway::new(pool);
        let mut cards = vec![new_card(1, 2), new_card(2, 1), new_card(3, 2)];
        sort_new_cards(&gateway, &mut cards, 0, 1, None, false, 0)
            .await
            .unwrap();
        // fid 1 sorts before fid 2, and both cards of fid 2 stay adjacent.
        assert_eq!(cards[1].due, 0);
        assert!((cards[0].due - cards[2].due).abs() == 1);
    }

    #[sqlx::test]
    async fn sort_new_cards_handles_empty_input(pool: SqlitePool) {
        let gateway = SqliteGateway::new(pool);
        let mut cards: Vec<Card> = Vec::new();
        sort_new_cards(&gateway, &mut cards, 0, 1, None, false, 0)
            .await
            .unwrap();
        assert!(cards.is_empty());
    }

    #[sqlx::test]
    async fn sort_new_cards_with_shuffle_seed_keeps_fact_blocks_intact(pool: SqlitePool) {
        let gateway = SqliteGateway::new(pool);
        let mut cards = vec![
            new_card(1, 1),
            new_card(2, 1),
            new_card(3, 2),
            new_card(4, 3),
            new_card(5, 3),
        ];
        sort_new_cards(&gateway, &mut cards, 0, 1, Some(7), false, 0)
            .await
            .unwrap();
        // Shuffling reorders fact blocks, but each fact's cards still land on
        // a contiguous run of dues regardless of which block it was assigned.
        let mut by_fid: std::collections::HashMap<i64, Vec<i64>> = std::collections::HashMap::new();
        for card in &cards {
            by_fid.entry(card.fid).or_default().push(card.due);
        }
        for dues in by_fid.values_mut() {
            dues.sort_unstable();
            for window in dues.windows(2) {
                assert_eq!(window[1] - window[0], 1);
            }
        }
        let mut all_dues: Vec<i64> = cards.iter().map(|c| c.due).collect();
        all_dues.sort_unstable();
        assert_eq!(all_dues, vec![0, 1, 2, 3, 4]);
    }

    #[sqlx::test]
    async fn sort_new_cards_with_shift_pushes_colliding_card_forward(pool: SqlitePool) {
        sqlx::query(
            r"INSERT INTO group_config (gid, new_delays, new_ints, lapse_delays)
              VALUES (1, '[1,10]', '[1,4,7]', '[10]')",
        )
        .execute(&pool)
        .await
        .unwrap();
        // A new card outside this batch already sits at due=0, colliding
        // with the range this call is about to assign.
        sqlx::query(r"INSERT INTO card (id, fid, gid, queue, type, due) VALUES (99, 50, 1, 0, 0, 0)")
            .execute(&pool)
            .await
            .unwrap();
        let gateway = SqliteGateway::new(pool);
        let mut cards = vec![new_card(1, 1), new_card(2, 2)];
        sort_new_cards(&gateway, &mut cards, 0, 1, None, true, 1_000)
            .await
            .unwrap();
        assert_eq!(cards[0].due, 0);
        assert_eq!(cards[1].due, 1);
        let bystander = gateway.get_card(99).await.unwrap().unwrap();
        // Pushed forward by high - low + 1 = 1 - 0 + 1 = 2.
        assert_eq!(bystander.due, 2);
        assert_eq!(bystander.modified_at, 1_000);
    }
}
