use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::user::User;

/// The calendar view every time-sensitive evaluator receives.
///
/// `today` is the user's current date, already resolved in their timezone
/// by the caller. `fast_forward` is the administrative override: every day
/// counts as elapsed and one validation credit is always available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayContext {
    pub today: NaiveDate,
    #[serde(default)]
    pub fast_forward: bool,
}

impl DayContext {
    #[must_use]
    pub const fn on(today: NaiveDate) -> Self {
        Self {
            today,
            fast_forward: false,
        }
    }

    #[must_use]
    pub const fn fast_forward(today: NaiveDate) -> Self {
        Self {
            today,
            fast_forward: true,
        }
    }
}

/// Snapshot of the validation throttle for display and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedger {
    pub days_elapsed: i64,
    pub validated: usize,
    pub credits: u32,
}

/// Calendar slot of chapter `number` (1-based) for a journey started on `start`.
#[must_use]
pub fn chapter_date(start: NaiveDate, number: u32) -> NaiveDate {
    start
        .checked_add_days(Days::new(u64::from(number.saturating_sub(1))))
        .unwrap_or(NaiveDate::MAX)
}

/// Whole days between the journey start and today; 0 without a journey.
/// Negative when the start date lies in the future.
#[must_use]
pub fn days_elapsed(user: &User, day: &DayContext) -> i64 {
    user.start_date
        .map_or(0, |start| day.today.signed_duration_since(start).num_days())
}

/// True once `date` is completely over, or always under the override.
#[must_use]
pub fn is_day_elapsed(date: NaiveDate, day: &DayContext) -> bool {
    day.fast_forward || date < day.today
}

/// Chapters that may still be validated: elapsed days minus validated
/// chapters, clamped at zero. Each validation implicitly spends one.
#[must_use]
pub fn validation_credits(user: &User, day: &DayContext) -> u32 {
    if user.start_date.is_none() {
        return 0;
    }
    if day.fast_forward {
        return 1;
    }
    let validated = i64::try_from(user.validated_count()).unwrap_or(i64::MAX);
    let remaining = days_elapsed(user, day).saturating_sub(validated).max(0);
    u32::try_from(remaining).unwrap_or(u32::MAX)
}

#[must_use]
pub fn credit_ledger(user: &User, day: &DayContext) -> CreditLedger {
    CreditLedger {
        days_elapsed: days_elapsed(user, day),
        validated: user.validated_count(),
        credits: validation_credits(user, day),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::JourneyDefinition;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn user_started(start: NaiveDate) -> User {
        let mut user = User::new("eve");
        user.start_date = Some(start);
        user.active_journey_data = Some(JourneyDefinition::empty_template("Days", 6));
        user
    }

    #[test]
    fn chapter_dates_are_daily_slots() {
        let start = date(2024, 2, 28);
        assert_eq!(chapter_date(start, 1), start);
        assert_eq!(chapter_date(start, 2), date(2024, 2, 29));
        assert_eq!(chapter_date(start, 3), date(2024, 3, 1));
        assert_eq!(chapter_date(start, 0), start);
    }

    #[test]
    fn credits_follow_elapsed_days_minus_validations() {
        let mut user = user_started(date(2024, 1, 1));
        let day = DayContext::on(date(2024, 1, 6));
        assert_eq!(days_elapsed(&user, &day), 5);
        assert_eq!(validation_credits(&user, &day), 5);

        for number in 1..=2 {
            user.chapter_record_mut(number).unwrap().validated = true;
        }
        assert_eq!(validation_credits(&user, &day), 3);

        for number in 3..=6 {
            user.chapter_record_mut(number).unwrap().validated = true;
        }
        assert_eq!(validation_credits(&user, &day), 0);
        let ledger = credit_ledger(&user, &day);
        assert_eq!(ledger.validated, 6);
        assert_eq!(ledger.days_elapsed, 5);
    }

    #[test]
    fn credits_are_zero_without_journey_or_before_start() {
        let user = User::new("fin");
        let day = DayContext::fast_forward(date(2024, 1, 1));
        assert_eq!(validation_credits(&user, &day), 0);

        let future = user_started(date(2024, 5, 1));
        let day = DayContext::on(date(2024, 4, 28));
        assert_eq!(days_elapsed(&future, &day), -3);
        assert_eq!(validation_credits(&future, &day), 0);
        assert_eq!(validation_credits(&future, &DayContext::fast_forward(day.today)), 1);
    }

    #[test]
    fn day_elapsed_only_after_the_date() {
        let day = DayContext::on(date(2024, 6, 10));
        assert!(is_day_elapsed(date(2024, 6, 9), &day));
        assert!(!is_day_elapsed(date(2024, 6, 10), &day));
        assert!(is_day_elapsed(date(2024, 6, 10), &DayContext::fast_forward(day.today)));
    }
}
