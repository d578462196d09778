//! Answer handling: the per-card state machine invoked once a grade comes
//! back for whatever `getCard` returned. Mirrors `answerCard` /
//! `_answerLrnCard` / `_answerRevCard` / `_rescheduleLapse`.

use crate::clock::DayCalendar;
use crate::gateway::CardStoreGateway;
use crate::interval::{
    adjust_for_siblings, delay_for_grade, graduating_interval, lapse_interval, next_ease_factor,
    next_review_interval,
};
use crate::leech::check_leech;
use crate::review_log::ReviewLogWriter;
use crate::model::{Card, CardType, GroupConfig, LogType, Queue, Rating, ReviewLogRow};
use crate::{Error, LibraryError, SchedulerErrorKind};
use log::{debug, info};
use rand::Rng;

pub struct LeechEvent {
    pub card_id: i64,
    pub suspended: bool,
}

pub struct AnswerOutcome {
    pub leech: Option<LeechEvent>,
}

/// Applies one answer to `card`, persisting the card update and the review
/// log row. `taken_ms` is the caller-measured time spent on the card before
/// the timer stopped.
pub async fn answer_card(
    gateway: &dyn CardStoreGateway,
    log_writer: &ReviewLogWriter<'_>,
    card: &mut Card,
    conf: &GroupConfig,
    calendar: &DayCalendar,
    now: i64,
    rating: Rating,
    taken_ms: i64,
) -> Result<AnswerOutcome, Error> {
    card.reps += 1;

    if card.queue() == Queue::New {
        card.set_queue(Queue::Learning);
        card.set_card_type(CardType::Learning);
    }

    let outcome = match card.queue() {
        Queue::Learning => {
            answer_learning(card, conf, calendar, now, rating, log_writer, taken_ms).await?;
            AnswerOutcome { leech: None }
        }
        Queue::Review => {
            answer_review(
                gateway, card, conf, calendar, now, rating, log_writer, taken_ms,
            )
            .await?
        }
        other => {
            card.set_queue(Queue::Learning);
            return Err(Error::Library(LibraryError::Scheduler(
                SchedulerErrorKind::InvalidQueueState(card.id, other),
            )));
        }
    };

    card.modified_at = now;
    gateway.update_card(card).await?;
    Ok(outcome)
}

async fn answer_learning(
    card: &mut Card,
    conf: &GroupConfig,
    calendar: &DayCalendar,
    now: i64,
    rating: Rating,
    log_writer: &ReviewLogWriter<'_>,
    taken_ms: i64,
) -> Result<(), Error> {
    let relearning = card.card_type() == CardType::Review;
    let delays: &[i64] = if relearning {
        &conf.lapse_delays
    } else {
        &conf.new_delays
    };

    // Captured before `grade` is mutated below, so the logged `last_ivl`
    // reflects the step the card was actually answered from.
    let pre_answer_grade = card.grade;

    let ivl_for_log: i64;
    match rating {
        Rating::Good => {
            graduate(card, conf, true, calendar, now);
            ivl_for_log = card.ivl;
        }
        Rating::Hard if card.grade + 1 >= delays.len() as i64 => {
            graduate(card, conf, false, calendar, now);
            ivl_for_log = card.ivl;
        }
        _ => {
            card.cycles += 1;
            if matches!(rating, Rating::Hard) {
                card.grade += 1;
            } else {
                card.grade = 0;
            }
            let mut delay = delay_for_grade(delays, card.grade);
            if card.due < now {
                let mut rng = rand::thread_rng();
                let factor: f64 = rng.gen_range(1.0..=1.25);
                #[allow(clippy::cast_possible_truncation)]
                {
                    delay = (delay as f64 * factor) as i64;
                }
            }
            card.due = now + delay;
            ivl_for_log = -delay;
        }
    }

    let last_ivl = -delay_for_grade(delays, (pre_answer_grade - 1).max(0));
    let log_type = if relearning {
        LogType::Relearning
    } else {
        LogType::Learning
    };
    log_writer
        .write(ReviewLogRow {
            time_ms: now * 1000,
            card_id: card.id,
            ease: rating as i64,
            ivl: ivl_for_log,
            last_ivl,
            factor: card.factor,
            taken_ms: taken_ms.min(conf.max_taken_secs * 1000),
            log_type: log_type as i8,
        })
        .await?;
    Ok(())
}

fn graduate(card: &mut Card, conf: &GroupConfig, early: bool, calendar: &DayCalendar, _now: i64) {
    if card.card_type() == CardType::Review {
        // Relearning card regaining its place; interval is kept, due restored.
        card.due = card.edue;
    } else {
        let ivl = graduating_interval(conf, early, card.cycles);
        card.ivl = ivl;
        card.due = calendar.today + ivl;
        card.factor = conf.new_initial_factor;
    }
    card.set_queue(Queue::Review);
    card.set_card_type(CardType::Review);
}

async fn answer_review(
    gateway: &dyn CardStoreGateway,
    card: &mut Card,
    conf: &GroupConfig,
    calendar: &DayCalendar,
    now: i64,
    rating: Rating,
    log_writer: &ReviewLogWriter<'_>,
    taken_ms: i64,
) -> Result<AnswerOutcome, Error> {
    let last_ivl = card.ivl;
    let mut leech = None;

    if matches!(rating, Rating::Again) {
        card.lapses += 1;
        let (new_ivl, new_factor) = lapse_interval(card.ivl, card.factor, conf.lapse_mult);
        card.ivl = new_ivl;
        card.factor = new_factor;
        card.due = calendar.today + card.ivl;

        if conf.lapse_relearn {
            card.edue = card.due;
            card.due = now + delay_for_grade(&conf.lapse_delays, 0);
            card.set_queue(Queue::Learning);
            // `card_type` stays Review so the next learning transition uses
            // lapse-conf and logs as relearning.
        }

        if let Some(hit) = check_leech(card, conf.lapse_leech_fails, conf.lapse_leech_action) {
            info!("card {} flagged as a leech (lapses={})", card.id, card.lapses);
            if hit.should_suspend {
                card.set_queue(Queue::Suspended);
            }
            leech = Some(LeechEvent {
                card_id: card.id,
                suspended: hit.should_suspend,
            });
        }
    } else {
        let ease = rating as u8;
        let late = (calendar.today - card.due).max(0);
        let ideal = next_review_interval(card.ivl, card.factor, late, ease, conf);
        let siblings = gateway.sibling_review_dues(card.fid, card.id).await?;
        card.ivl = adjust_for_siblings(
            calendar.today,
            ideal,
            &siblings,
            conf.rev_min_space,
            conf.rev_fuzz,
        );
        card.factor = next_ease_factor(card.factor, ease);
        card.due = calendar.today + card.ivl;
    }

    log_writer
        .write(ReviewLogRow {
            time_ms: now * 1000,
            card_id: card.id,
            ease: rating as i64,
            ivl: card.ivl,
            last_ivl,
            factor: card.factor,
            taken_ms: taken_ms.min(conf.max_taken_secs * 1000),
            log_type: LogType::Review as i8,
        })
        .await?;

    debug!("card {} reviewed, new interval {}", card.id, card.ivl);
    Ok(AnswerOutcome { leech })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Card;

    fn conf() -> GroupConfig {
        GroupConfig::default()
    }

    #[test]
    fn graduation_sets_review_queue_and_initial_factor() {
        let mut card = Card {
            cycles: 0,
            ..Card::default()
        };
        let calendar = DayCalendar {
            today: 5,
            day_cutoff: 0,
        };
        graduate(&mut card, &conf(), false, &calendar, 0);
        assert_eq!(card.queue(), Queue::Review);
        assert_eq!(card.card_type(), CardType::Review);
        assert_eq!(card.ivl, conf().new_ints[0]);
        assert_eq!(card.due, 5 + conf().new_ints[0]);
        assert_eq!(card.factor, conf().new_initial_factor);
    }

    #[test]
    fn relearning_graduation_restores_saved_due() {
        let mut card = Card {
            card_type: CardType::Review as i8,
            edue: 42,
            ivl: 11,
            ..Card::default()
        };
        let calendar = DayCalendar::default();
        graduate(&mut card, &conf(), false, &calendar, 0);
        assert_eq!(card.due, 42);
        assert_eq!(card.ivl, 11);
    }
}
