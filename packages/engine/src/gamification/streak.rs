//! Daily streak transitions.
//!
//! The canonical day boundary is the UTC calendar day. Consecutive days
//! extend the streak, a gap resets it to one, and a repeat on the same day
//! changes nothing. `max_streak` only ever ratchets up.

use chrono::NaiveDate;

use crate::models::UserProfile;

/// Apply one day of verified activity to the profile's streak state.
///
/// Also anchors `last_activity_date` and resets the `daily_actions`
/// counter when the day rolled over. Returns whether the streak value
/// changed, so the caller knows to broadcast a `STREAK_UPDATE`.
pub fn touch(profile: &mut UserProfile, today: NaiveDate) -> bool {
    let previous = profile.streak;
    match profile.last_activity_date.map(|d| (today - d).num_days()) {
        Some(0) => {}
        Some(1) => {
            profile.streak += 1;
            profile.daily_actions = 0;
        }
        _ => {
            profile.streak = 1;
            profile.daily_actions = 0;
        }
    }
    profile.last_activity_date = Some(today);
    profile.max_streak = profile.max_streak.max(profile.streak);
    profile.streak != previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_activity_starts_at_one() {
        let mut profile = UserProfile::new("u1", Utc::now());
        assert!(touch(&mut profile, date(2024, 3, 1)));
        assert_eq!(profile.streak, 1);
        assert_eq!(profile.max_streak, 1);
        assert_eq!(profile.last_activity_date, Some(date(2024, 3, 1)));
    }

    #[test]
    fn test_consecutive_day_extends() {
        let mut profile = UserProfile::new("u1", Utc::now());
        touch(&mut profile, date(2024, 3, 1));
        assert!(touch(&mut profile, date(2024, 3, 2)));
        assert_eq!(profile.streak, 2);
        assert_eq!(profile.max_streak, 2);
    }

    #[test]
    fn test_same_day_repeat_is_unchanged() {
        let mut profile = UserProfile::new("u1", Utc::now());
        touch(&mut profile, date(2024, 3, 1));
        profile.daily_actions = 4;
        assert!(!touch(&mut profile, date(2024, 3, 1)));
        assert_eq!(profile.streak, 1);
        // Same day: the daily counter keeps counting.
        assert_eq!(profile.daily_actions, 4);
    }

    #[test]
    fn test_gap_resets_to_one_but_max_ratchets() {
        let mut profile = UserProfile::new("u1", Utc::now());
        touch(&mut profile, date(2024, 3, 1));
        touch(&mut profile, date(2024, 3, 2));
        touch(&mut profile, date(2024, 3, 3));
        assert_eq!(profile.streak, 3);

        assert!(touch(&mut profile, date(2024, 3, 10)));
        assert_eq!(profile.streak, 1);
        assert_eq!(profile.max_streak, 3);
    }

    #[test]
    fn test_rollover_resets_daily_actions() {
        let mut profile = UserProfile::new("u1", Utc::now());
        touch(&mut profile, date(2024, 3, 1));
        profile.daily_actions = 9;
        touch(&mut profile, date(2024, 3, 2));
        assert_eq!(profile.daily_actions, 0);
    }
}
