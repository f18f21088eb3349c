#[cfg(test)]
mod cron_utils_tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, TimeZone, Timelike, Utc};
    use keeper_core::models::CronFields;
    use keeper_core::traits::TriggerOptions;
    use keeper_dispatcher::cron_utils::*;

    fn options(grace_minutes: u64, coalesce: bool) -> TriggerOptions {
        TriggerOptions {
            misfire_grace: StdDuration::from_secs(grace_minutes * 60),
            max_instances: 999,
            coalesce,
        }
    }

    #[test]
    fn test_cron_scheduler_creation() {
        assert!(CronScheduler::new("0 0 0 * * *").is_ok());
        assert!(CronScheduler::new("invalid").is_err());
        assert!(CronScheduler::from_fields(&CronFields::default()).is_ok());
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(CronScheduler::validate_cron_expression("0 */5 * * * *").is_ok());
        assert!(CronScheduler::validate_cron_expression("0 0 9-17 * * MON-FRI").is_ok());
        assert!(CronScheduler::validate_cron_expression("0 0 0 32 * *").is_err());
        assert!(CronScheduler::validate_cron_expression("").is_err());
    }

    #[test]
    fn test_next_execution_time_from_fields() {
        let scheduler =
            CronScheduler::from_fields(&CronFields::new("30", "2", "*", "*", "*")).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let next = scheduler.next_execution_time(&from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 2, 30, 0).unwrap());
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_weekday_zero_is_monday() {
        // 2024-01-01 是周一
        let scheduler =
            CronScheduler::from_fields(&CronFields::new("0", "8", "*", "0", "*")).unwrap();
        let from = Utc.with_ymd_and_hms(2023, 12, 30, 0, 0, 0).unwrap();

        let next = scheduler.next_execution_time(&from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_weekend_and_whole_week_ranges_are_schedulable() {
        // 2024-01-05 是周五
        let from = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();

        for dow in ["5-6", "sat-sun"] {
            let scheduler =
                CronScheduler::from_fields(&CronFields::new("0", "3", "*", dow, "*")).unwrap();
            let upcoming = scheduler.upcoming_times(&from, 3);
            assert_eq!(upcoming[0], Utc.with_ymd_and_hms(2024, 1, 6, 3, 0, 0).unwrap());
            assert_eq!(upcoming[1], Utc.with_ymd_and_hms(2024, 1, 7, 3, 0, 0).unwrap());
            assert_eq!(upcoming[2], Utc.with_ymd_and_hms(2024, 1, 13, 3, 0, 0).unwrap());
        }

        let every_day =
            CronScheduler::from_fields(&CronFields::new("0", "3", "*", "0-6", "*")).unwrap();
        let upcoming = every_day.upcoming_times(&from, 3);
        assert_eq!(upcoming[0], Utc.with_ymd_and_hms(2024, 1, 6, 3, 0, 0).unwrap());
        assert_eq!(upcoming[2], Utc.with_ymd_and_hms(2024, 1, 8, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_upcoming_times() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();

        let upcoming = scheduler.upcoming_times(&from, 3);
        assert_eq!(upcoming.len(), 3);
        assert_eq!(upcoming[0].hour(), 13);
        assert_eq!(upcoming[2].hour(), 15);
    }

    #[test]
    fn test_due_fire_on_time() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let last_checked = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();

        let due = scheduler.due_fire_times(&last_checked, &now, &options(60, true));
        assert_eq!(due.fires, vec![now]);
        assert_eq!(due.misfired, 0);
        assert_eq!(due.coalesced, 0);
    }

    #[test]
    fn test_missed_fires_are_coalesced() {
        let scheduler = CronScheduler::new("0 */10 * * * *").unwrap();
        let last_checked = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let now = last_checked + Duration::minutes(35);

        let due = scheduler.due_fire_times(&last_checked, &now, &options(60, true));
        assert_eq!(due.fires, vec![last_checked + Duration::minutes(30)]);
        assert_eq!(due.coalesced, 2);

        let due = scheduler.due_fire_times(&last_checked, &now, &options(60, false));
        assert_eq!(due.fires.len(), 3);
    }

    #[test]
    fn test_fires_beyond_grace_are_dropped() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let last_checked = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 5, 30, 0).unwrap();

        let due = scheduler.due_fire_times(&last_checked, &now, &options(60, true));
        // 01:00..=04:00 超出一小时宽限期，05:00 仍可执行
        assert_eq!(due.misfired, 4);
        assert_eq!(
            due.fires,
            vec![Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap()]
        );
    }
}
