// libs/appointment-cell/src/services/availability.rs
use chrono::Duration;

use crate::models::Appointment;
use crate::services::interval::{saturating_add, saturating_sub, TimeInterval};

/// Free gaps of at least `slot_duration` inside `window`.
///
/// `appointments` must be sorted by start time. The window's open and close
/// act as zero-length bookings that carry no buffer; real bookings are padded
/// by `buffer` on both sides.
pub fn free_gaps(
    window: &TimeInterval,
    appointments: &[Appointment],
    buffer: Duration,
    slot_duration: Duration,
) -> Vec<TimeInterval> {
    let mut gaps = Vec::new();
    let mut cursor = window.start();

    for apt in appointments {
        let blocked_from = saturating_sub(apt.start_time, buffer);
        let blocked_until = saturating_add(apt.end_time(), buffer);

        let gap_end = blocked_from.min(window.end());
        if gap_end > cursor && gap_end - cursor >= slot_duration {
            gaps.push(TimeInterval::from_trusted(cursor, gap_end));
        }

        cursor = cursor.max(blocked_until);
        if cursor >= window.end() {
            return gaps;
        }
    }

    if window.end() > cursor && window.end() - cursor >= slot_duration {
        gaps.push(TimeInterval::from_trusted(cursor, window.end()));
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, hour, minute, 0).unwrap()
    }

    fn booked(start: DateTime<Utc>, minutes: i64) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            start_time: start,
            duration_minutes: minutes,
            status: AppointmentStatus::Scheduled,
            notes: String::new(),
            created_at: start,
            updated_at: start,
        }
    }

    fn window() -> TimeInterval {
        TimeInterval::new(at(9, 0), at(12, 0)).unwrap()
    }

    fn bounds(gaps: &[TimeInterval]) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        gaps.iter().map(|g| (g.start(), g.end())).collect()
    }

    #[test]
    fn test_single_booking_leaves_two_gaps() {
        let gaps = free_gaps(
            &window(),
            &[booked(at(10, 0), 30)],
            Duration::minutes(30),
            Duration::minutes(30),
        );
        assert_eq!(bounds(&gaps), vec![(at(9, 0), at(9, 30)), (at(11, 0), at(12, 0))]);
    }

    #[test]
    fn test_empty_day_is_one_gap() {
        let gaps = free_gaps(&window(), &[], Duration::minutes(30), Duration::minutes(30));
        assert_eq!(bounds(&gaps), vec![(at(9, 0), at(12, 0))]);
    }

    #[test]
    fn test_short_gaps_are_skipped() {
        let gaps = free_gaps(
            &window(),
            &[booked(at(9, 20), 30), booked(at(11, 0), 30)],
            Duration::minutes(30),
            Duration::minutes(30),
        );
        // 09:00-08:50 is empty, 10:20-10:30 is too short, 12:00 close is blocked.
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_booking_straddling_open_pushes_cursor() {
        let gaps = free_gaps(
            &window(),
            &[booked(at(8, 0), 90)],
            Duration::minutes(30),
            Duration::minutes(60),
        );
        assert_eq!(bounds(&gaps), vec![(at(10, 0), at(12, 0))]);
    }
}
