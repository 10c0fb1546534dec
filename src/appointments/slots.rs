use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{macros::time, Duration, Time};

/// One of the two fixed daily booking windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "time_slot", rename_all = "lowercase")]
pub enum TimeSlot {
    Morning,
    Afternoon,
}

/// Minutes consumed by every booking.
pub const BOOKING_INTERVAL_MINUTES: i64 = 30;

impl TimeSlot {
    /// Booking window as `[start, end)`. The end is exclusive: a time equal
    /// to the end does not fit.
    pub fn window(self) -> (Time, Time) {
        match self {
            TimeSlot::Morning => (time!(8:00), time!(11:30)),
            TimeSlot::Afternoon => (time!(13:00), time!(17:30)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("the {0} slot is fully booked for that date")]
pub struct SlotFull(pub TimeSlot);

/// Time of day for the booking at position `occupancy` within the slot's
/// window: `start + 30min * occupancy`, full once that reaches the end.
pub fn allocate(slot: TimeSlot, occupancy: i64) -> Result<Time, SlotFull> {
    let (start, end) = slot.window();
    let minutes = minute_of_day(start) + BOOKING_INTERVAL_MINUTES * occupancy;
    if occupancy < 0 || minutes >= minute_of_day(end) {
        return Err(SlotFull(slot));
    }
    // Bounds-checked above, so this stays within the same day.
    Ok(start + Duration::minutes(BOOKING_INTERVAL_MINUTES * occupancy))
}

/// Next bookable time given the latest time already booked in the slot's
/// (date, slot) pair, or `None` when the slot is empty.
///
/// Allocation only moves forward from the high-water mark: sequential
/// bookings still climb in 30-minute steps from the window start, and
/// deleting an earlier booking never re-opens its offset for the next
/// caller, so an occupied time can never be computed twice.
pub fn next_after(slot: TimeSlot, last_booked: Option<Time>) -> Result<Time, SlotFull> {
    let Some(last) = last_booked else {
        return allocate(slot, 0);
    };
    let (start, _) = slot.window();
    let position =
        (minute_of_day(last) - minute_of_day(start)) / BOOKING_INTERVAL_MINUTES + 1;
    allocate(slot, position.max(0))
}

fn minute_of_day(t: Time) -> i64 {
    i64::from(t.hour()) * 60 + i64::from(t.minute())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morning_times_step_in_half_hours_from_eight() {
        for n in 0..7 {
            let t = allocate(TimeSlot::Morning, n).expect("within window");
            let expected_minutes = 8 * 60 + 30 * n;
            assert_eq!(i64::from(t.hour()) * 60 + i64::from(t.minute()), expected_minutes);
        }
    }

    #[test]
    fn morning_is_full_at_the_exclusive_boundary() {
        // 7th booking is the last one (11:00); offset 7 would land on 11:30.
        assert_eq!(allocate(TimeSlot::Morning, 6), Ok(time!(11:00)));
        assert_eq!(allocate(TimeSlot::Morning, 7), Err(SlotFull(TimeSlot::Morning)));
        assert_eq!(allocate(TimeSlot::Morning, 100), Err(SlotFull(TimeSlot::Morning)));
    }

    #[test]
    fn afternoon_window_holds_nine_bookings() {
        assert_eq!(allocate(TimeSlot::Afternoon, 0), Ok(time!(13:00)));
        assert_eq!(allocate(TimeSlot::Afternoon, 8), Ok(time!(17:00)));
        assert_eq!(
            allocate(TimeSlot::Afternoon, 9),
            Err(SlotFull(TimeSlot::Afternoon))
        );
    }

    #[test]
    fn sequential_bookings_are_strictly_increasing_until_exhaustion() {
        let mut last = None;
        let mut count = 0;
        loop {
            match allocate(TimeSlot::Morning, count) {
                Ok(t) => {
                    if let Some(prev) = last {
                        assert!(t > prev);
                        assert_eq!(t - prev, Duration::minutes(30));
                    }
                    last = Some(t);
                    count += 1;
                }
                Err(_) => break,
            }
        }
        assert_eq!(count, 7);
        assert_eq!(last, Some(time!(11:00)));
    }

    #[test]
    fn negative_occupancy_is_rejected() {
        assert!(allocate(TimeSlot::Morning, -1).is_err());
    }

    #[test]
    fn empty_slot_allocates_the_window_start() {
        assert_eq!(next_after(TimeSlot::Morning, None), Ok(time!(8:00)));
        assert_eq!(next_after(TimeSlot::Afternoon, None), Ok(time!(13:00)));
    }

    #[test]
    fn allocation_moves_forward_from_the_latest_booking() {
        // Bookings at 08:00, 08:30 and 09:00, then the 08:00 one is
        // cancelled. The survivors' latest time is 09:00, so the next
        // booking gets 09:30 rather than colliding with 09:00.
        assert_eq!(next_after(TimeSlot::Morning, Some(time!(9:00))), Ok(time!(9:30)));
    }

    #[test]
    fn freed_earlier_times_are_never_reused() {
        // Whatever was cancelled below the high-water mark, the next time
        // is always strictly after it.
        for offset in 0..6 {
            let last = allocate(TimeSlot::Morning, offset).expect("within window");
            let next = next_after(TimeSlot::Morning, Some(last)).expect("room left");
            assert_eq!(next - last, Duration::minutes(30));
        }
    }

    #[test]
    fn slot_is_full_once_the_last_time_is_booked() {
        assert_eq!(
            next_after(TimeSlot::Morning, Some(time!(11:00))),
            Err(SlotFull(TimeSlot::Morning))
        );
        assert_eq!(
            next_after(TimeSlot::Afternoon, Some(time!(17:00))),
            Err(SlotFull(TimeSlot::Afternoon))
        );
    }

    #[test]
    fn reallocating_next_to_one_other_booking_lands_after_it() {
        // An update that keeps its own (date, slot) pair ignores its own row;
        // with one other booking at 08:30 the re-allocated time is 09:00,
        // not a conflict.
        assert_eq!(next_after(TimeSlot::Morning, Some(time!(8:30))), Ok(time!(9:00)));
    }

    #[test]
    fn stale_time_below_the_window_start_clamps_to_the_start() {
        assert_eq!(next_after(TimeSlot::Afternoon, Some(time!(7:00))), Ok(time!(13:00)));
    }

    #[test]
    fn full_error_names_the_slot() {
        assert_eq!(
            SlotFull(TimeSlot::Afternoon).to_string(),
            "the afternoon slot is fully booked for that date"
        );
    }

    #[test]
    fn slot_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TimeSlot::Morning).expect("serialize"),
            "\"morning\""
        );
        let slot: TimeSlot = serde_json::from_str("\"afternoon\"").expect("deserialize");
        assert_eq!(slot, TimeSlot::Afternoon);
    }
}
