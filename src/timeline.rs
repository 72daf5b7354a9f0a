//! Day-grouped projection of a persona's message timeline.
//!
//! Pure derived state: given the message sequence, annotate each entry
//! with whether it opens a new calendar day. Re-derivable at any time,
//! no I/O, no mutation of the input.

use crate::model::Message;
use chrono::{Local, NaiveDate};

/// One render-ready timeline entry.
#[derive(Debug, Clone)]
pub struct TimelineEntry<'a> {
    pub message: &'a Message,
    /// True when this is the first message of its local calendar day,
    /// i.e. a day separator belongs before it.
    pub starts_new_day: bool,
}

/// Annotate a message sequence with day-separator flags.
///
/// Calendar dates are compared in local time. The first message always
/// starts a new day.
pub fn annotate_days(messages: &[Message]) -> Vec<TimelineEntry<'_>> {
    let mut previous: Option<NaiveDate> = None;
    messages
        .iter()
        .map(|message| {
            let date = local_date(message);
            let starts_new_day = previous != Some(date);
            previous = Some(date);
            TimelineEntry {
                message,
                starts_new_day,
            }
        })
        .collect()
}

fn local_date(message: &Message) -> NaiveDate {
    message.created_at.with_timezone(&Local).date_naive()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::model::{Message, Role};
    use chrono::{Duration, TimeZone, Utc};

    fn message_at(ts: chrono::DateTime<Utc>) -> Message {
        Message {
            role: Role::User,
            parts: vec!["x".into()],
            accent: None,
            created_at: ts,
            streaming: false,
        }
    }

    #[test]
    fn empty_timeline_has_no_entries() {
        assert!(annotate_days(&[]).is_empty());
    }

    #[test]
    fn first_message_starts_a_day() {
        let msgs = vec![message_at(Utc::now())];
        let entries = annotate_days(&msgs);
        assert!(entries[0].starts_new_day);
    }

    #[test]
    fn same_day_messages_share_one_separator() {
        let base = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let msgs = vec![
            message_at(base),
            message_at(base + Duration::minutes(5)),
            message_at(base + Duration::hours(2)),
        ];
        let flags: Vec<bool> = annotate_days(&msgs)
            .iter()
            .map(|e| e.starts_new_day)
            .collect();
        assert_eq!(flags, vec![true, false, false]);
    }

    #[test]
    fn day_change_emits_separator() {
        let base = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let msgs = vec![
            message_at(base),
            message_at(base + Duration::days(1)),
            message_at(base + Duration::days(1) + Duration::minutes(1)),
            message_at(base + Duration::days(3)),
        ];
        let flags: Vec<bool> = annotate_days(&msgs)
            .iter()
            .map(|e| e.starts_new_day)
            .collect();
        assert_eq!(flags, vec![true, true, false, true]);
    }

    #[test]
    fn projection_is_idempotent() {
        let base = Utc.with_ymd_and_hms(2025, 6, 10, 23, 50, 0).unwrap();
        let msgs = vec![
            message_at(base),
            message_at(base + Duration::hours(1)),
            message_at(base + Duration::hours(26)),
        ];
        let first: Vec<bool> = annotate_days(&msgs)
            .iter()
            .map(|e| e.starts_new_day)
            .collect();
        let second: Vec<bool> = annotate_days(&msgs)
            .iter()
            .map(|e| e.starts_new_day)
            .collect();
        assert_eq!(first, second);
    }
}
