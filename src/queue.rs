//! Queue construction and selection (`reset`/`getCard`). Three queues: a new
//! queue (materialized front-to-back, popped smallest-due-first), a review
//! queue (ordered per [`RevOrder`]), and a learning queue kept as a min-heap
//! keyed by absolute due second so the soonest-due card pops first.

use crate::clock::DayCalendar;
use crate::gateway::{CardStoreGateway, GroupFilter};
use crate::model::{CardId, DeckMeta, NewSpread, RevOrder};
use crate::Error;
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug)]
pub struct SessionState {
    pub calendar: DayCalendar,
    pub new_queue: Vec<(CardId, i64)>,
    pub review_queue: Vec<CardId>,
    pub learning_heap: BinaryHeap<Reverse<(i64, CardId)>>,
    pub new_count: i64,
    pub review_count: i64,
    pub learning_count: i64,
    pub reps: i64,
    pub new_card_modulus: i64,
    pub new_spread: NewSpread,
    pub new_today_reorder: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            calendar: DayCalendar::default(),
            new_queue: Vec::new(),
            review_queue: Vec::new(),
            learning_heap: BinaryHeap::new(),
            new_count: 0,
            review_count: 0,
            learning_count: 0,
            reps: 0,
            new_card_modulus: 0,
            new_spread: NewSpread::Distribute,
            new_today_reorder: false,
        }
    }
}

/// What `getCard` returned and which queue it came from, so the answer
/// handler can dispatch without re-deriving state from the card row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueuedFrom {
    New,
    Learning,
    Review,
}

pub struct QueueBuilder;

impl QueueBuilder {
    /// Rebuilds all three queues from scratch. Called on session start, an
    /// explicit reset request, or a detected day rollover.
    pub async fn reset(
        gateway: &dyn CardStoreGateway,
        groups: &GroupFilter,
        deck: &DeckMeta,
        queue_limit: i64,
        report_limit: i64,
        now: i64,
    ) -> Result<SessionState, Error> {
        let calendar = DayCalendar::compute(deck.created_at, now);
        gateway.ensure_review_index(deck.rev_order).await?;

        let new_today_used = if deck.new_today_day == calendar.today {
            deck.new_today_used
        } else {
            0
        };
        let new_limit = (deck.new_per_day - new_today_used).max(0).min(report_limit);

        let new_count = gateway.count_new(groups, new_limit).await?;
        let mut new_queue = gateway.list_new(groups, queue_limit.min(new_limit)).await?;
        // Pop smallest-due-first by popping from the back.
        new_queue.reverse();

        let review_count = gateway
            .count_review(groups, calendar.today, report_limit)
            .await?;
        let mut review_queue = gateway
            .list_review(groups, calendar.today, queue_limit, deck.rev_order)
            .await?;
        order_review_queue(&mut review_queue, deck.rev_order, calendar.today);

        let learning_count = gateway
            .count_learning(groups, calendar.day_cutoff, report_limit)
            .await?;
        let learning_rows = gateway
            .list_learning(groups, calendar.day_cutoff, queue_limit)
            .await?;
        let learning_heap = learning_rows
            .into_iter()
            .map(|(due, id)| Reverse((due, id)))
            .collect::<BinaryHeap<_>>();

        let new_card_modulus = if deck.new_spread == NewSpread::Distribute
            && new_count > 0
            && review_count > 0
        {
            (2_i64).max((new_count + review_count) / new_count)
        } else {
            0
        };

        Ok(SessionState {
            calendar,
            new_queue,
            review_queue,
            learning_heap,
            new_count,
            review_count,
            learning_count,
            reps: 0,
            new_card_modulus,
            new_spread: deck.new_spread,
            new_today_reorder: deck.new_today_reorder,
        })
    }
}

fn order_review_queue(queue: &mut [CardId], order: RevOrder, today: i64) {
    if order == RevOrder::Random {
        #[allow(clippy::cast_sign_loss)]
        let mut rng = StdRng::seed_from_u64(today as u64);
        queue.shuffle(&mut rng);
    }
}

pub struct Selector;

impl Selector {
    /// Mirrors `getCard`'s selection order: due learning cards, new-card
    /// interleaving, review cards, remaining new cards, then collapse-phase
    /// learning cards.
    pub fn next(state: &mut SessionState, now: i64, collapse_time_secs: i64) -> Option<(CardId, QueuedFrom)> {
        if let Some(id) = Self::pop_due_learning(state, now) {
            return Some((id, QueuedFrom::Learning));
        }
        if Self::time_for_new_card(state) {
            if let Some(id) = Self::pop_new(state) {
                return Some((id, QueuedFrom::New));
            }
        }
        if let Some(id) = Self::pop_review(state) {
            return Some((id, QueuedFrom::Review));
        }
        if let Some(id) = Self::pop_new(state) {
            return Some((id, QueuedFrom::New));
        }
        if let Some(id) = Self::pop_due_learning(state, now + collapse_time_secs) {
            return Some((id, QueuedFrom::Learning));
        }
        None
    }

    fn pop_due_learning(state: &mut SessionState, due_before: i64) -> Option<CardId> {
        match state.learning_heap.peek() {
            Some(Reverse((due, _))) if *due < due_before => {
                let Reverse((_, id)) = state.learning_heap.pop().unwrap();
                Some(id)
            }
            _ => None,
        }
    }

    /// Pops the next new card. When `new_today_reorder` is set, siblings
    /// (same `due`) remaining at the back of the queue are rotated to the
    /// front so they don't surface back-to-back, stopping once only one
    /// fact's worth of cards is left.
    fn pop_new(state: &mut SessionState) -> Option<CardId> {
        let (id, due) = state.new_queue.pop()?;
        if state.new_today_reorder {
            let mut remaining = state.new_queue.len();
            while let Some(&(_, last_due)) = state.new_queue.last() {
                if last_due != due {
                    break;
                }
                let sibling = state.new_queue.pop().unwrap();
                state.new_queue.insert(0, sibling);
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
        }
        Some(id)
    }

    fn pop_review(state: &mut SessionState) -> Option<CardId> {
        if state.review_queue.is_empty() {
            None
        } else {
            Some(state.review_queue.remove(0))
        }
    }

    fn time_for_new_card(state: &SessionState) -> bool {
        if state.new_queue.is_empty() {
            return false;
        }
        match state.new_spread {
            // First: always preempt reviews while new cards remain.
            NewSpread::First => true,
            // Last: never preempt; new cards only surface once reviews run dry.
            NewSpread::Last => state.review_queue.is_empty(),
            NewSpread::Distribute => {
                state.new_card_modulus == 0
                    || (state.reps > 0 && state.reps % state.new_card_modulus == 0)
            }
        }
    }
}
