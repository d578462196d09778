//! This file should match with the migrations file. These types should follow <https://docs.rs/sqlx/latest/sqlx/sqlite/types/index.html>.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type CardId = i64;
pub type FactId = i64;
pub type GroupId = i64;

/// Where a card currently lives. Distinct from [`CardType`], which survives
/// transient moves into `Buried`/`Suspended` and back.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, sqlx::Type, strum::Display,
)]
#[repr(i8)]
pub enum Queue {
    TempSuspended = -3,
    Buried = -2,
    Suspended = -1,
    New = 0,
    Learning = 1,
    Review = 2,
}

/// The kind of card, persisted across `Buried`/`Suspended` moves so `onClose`
/// and `unsuspend` know what queue to restore into.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, sqlx::Type, strum::Display,
)]
#[repr(i8)]
pub enum CardType {
    New = 0,
    Learning = 1,
    Review = 2,
}

#[derive(
    Clone, Copy, Debug, Eq, PartialEq, sqlx::Type, strum::Display, strum_macros::EnumIter,
)]
#[repr(u8)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl TryFrom<u8> for Rating {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            _ => Err(()),
        }
    }
}

/// `log_type` column values for [`ReviewLogRow`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[repr(i8)]
pub enum LogType {
    Learning = 0,
    Review = 1,
    Relearning = 2,
    Cram = 3,
}

#[derive(Clone, Debug, Default, Deserialize, FromRow, Serialize)]
pub struct Card {
    pub id: CardId,
    pub fid: FactId,
    pub gid: GroupId,
    pub queue: i8,
    #[sqlx(rename = "type")]
    pub card_type: i8,
    pub due: i64,
    pub ivl: i64,
    pub factor: i64,
    pub grade: i64,
    pub cycles: i64,
    pub lapses: i64,
    pub last_ivl: i64,
    pub edue: i64,
    pub reps: i64,
    pub modified_at: i64,
}

impl Card {
    pub fn queue(&self) -> Queue {
        queue_from_i8(self.queue)
    }

    pub fn card_type(&self) -> CardType {
        card_type_from_i8(self.card_type)
    }

    pub fn set_queue(&mut self, queue: Queue) {
        self.queue = queue as i8;
    }

    pub fn set_card_type(&mut self, card_type: CardType) {
        self.card_type = card_type as i8;
    }
}

/// Converts a raw `queue` column value, falling back to `New` for anything
/// outside the known discriminants rather than panicking on corrupt data.
pub fn queue_from_i8(value: i8) -> Queue {
    match value {
        -3 => Queue::TempSuspended,
        -2 => Queue::Buried,
        -1 => Queue::Suspended,
        1 => Queue::Learning,
        2 => Queue::Review,
        _ => Queue::New,
    }
}

pub fn card_type_from_i8(value: i8) -> CardType {
    match value {
        1 => CardType::Learning,
        2 => CardType::Review,
        _ => CardType::New,
    }
}

/// One row per answer, append-only. Column order is part of the external
/// contract: readers outside this crate depend on positional layout, not
/// field names.
#[derive(Clone, Debug, Default, Deserialize, FromRow, Serialize)]
pub struct ReviewLogRow {
    pub time_ms: i64,
    pub card_id: CardId,
    pub ease: i64,
    pub ivl: i64,
    pub last_ivl: i64,
    pub factor: i64,
    pub taken_ms: i64,
    pub log_type: i8,
}

/// Per-group scheduling configuration, cached by the resolver and reloaded
/// with [`crate::config::ConfigCache::reset`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GroupConfig {
    pub gid: GroupId,
    pub new_delays: Vec<i64>,
    pub new_ints: [i64; 3],
    pub new_initial_factor: i64,
    pub lapse_delays: Vec<i64>,
    pub lapse_mult: f64,
    pub lapse_relearn: bool,
    pub lapse_leech_fails: u32,
    pub lapse_leech_action: u8,
    pub rev_ease4: f64,
    pub rev_min_space: i64,
    pub rev_fuzz: f64,
    pub max_taken_secs: i64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            gid: 0,
            new_delays: vec![1, 10],
            new_ints: [1, 4, 7],
            new_initial_factor: 2500,
            lapse_delays: vec![10],
            lapse_mult: 0.0,
            lapse_relearn: true,
            lapse_leech_fails: 8,
            lapse_leech_action: 0,
            rev_ease4: 1.3,
            rev_min_space: 1,
            rev_fuzz: 0.05,
            max_taken_secs: 60,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NewSpread {
    Distribute = 0,
    Last = 1,
    First = 2,
}

pub fn new_spread_from_i8(value: i8) -> NewSpread {
    match value {
        1 => NewSpread::Last,
        2 => NewSpread::First,
        _ => NewSpread::Distribute,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RevOrder {
    OldFirst = 0,
    NewFirst = 1,
    Due = 2,
    Random = 3,
}

pub fn rev_order_from_i8(value: i8) -> RevOrder {
    match value {
        0 => RevOrder::OldFirst,
        1 => RevOrder::NewFirst,
        3 => RevOrder::Random,
        _ => RevOrder::Due,
    }
}

/// The deck-wide, singleton queue configuration (`qconf`).
#[derive(Clone, Debug)]
pub struct DeckMeta {
    pub created_at: i64,
    pub new_per_day: i64,
    pub new_today_day: i64,
    pub new_today_used: i64,
    pub new_spread: NewSpread,
    pub new_today_reorder: bool,
    pub rev_order: RevOrder,
    pub collapse_time_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn rating_round_trips_through_try_from() {
        for rating in Rating::iter() {
            assert_eq!(Rating::try_from(rating as u8), Ok(rating));
        }
    }
}
