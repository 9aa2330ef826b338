//! Unit tests for cron schedules and manual triggers

use chrono::{DateTime, Duration, TimeZone, Utc};
use periodic_backup::managers::scheduler::{CronSchedule, ManualTrigger, Scheduler, TRIGGER_FILE_NAME};
use rstest::rstest;
use test_utils::*;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[rstest]
#[case::daily("0 8 * * *", at(2026, 6, 1, 8, 0), at(2026, 6, 2, 8, 0))]
#[case::monthly("15 3 1 * *", at(2026, 6, 1, 3, 15), at(2026, 7, 1, 3, 15))]
#[case::weekdays("0 22 * * 1-5", at(2026, 6, 5, 22, 0), at(2026, 6, 8, 22, 0))]
#[case::every_ten_minutes("*/10 * * * *", at(2026, 6, 1, 23, 55), at(2026, 6, 2, 0, 0))]
fn test_next_after(#[case] expression: &str, #[case] from: DateTime<Utc>, #[case] expected: DateTime<Utc>) {
    let schedule = CronSchedule::parse(expression).unwrap();
    assert_eq!(schedule.next_after(&from), Some(expected));
}

#[test]
fn test_schedule_from_config() {
    let config = ConfigBuilder::minimal().with_cron("30 1 * * 0").build();
    let schedule = CronSchedule::parse(&config.global.cron).unwrap();

    assert_eq!(schedule.expression(), "30 1 * * 0");
    assert_eq!(schedule.to_string(), "30 1 * * 0");
    // 2026-06-07 is a Sunday
    assert!(schedule.matches(&at(2026, 6, 7, 1, 30)));
}

#[test]
fn test_impossible_date_never_runs() {
    let schedule = CronSchedule::parse("0 0 31 2 *").unwrap();
    assert_eq!(schedule.next_after(&at(2026, 1, 1, 0, 0)), None);
}

#[test]
fn test_trigger_lives_in_temp_directory() {
    let ctx = TestContext::with_sample_tree();
    let trigger = ManualTrigger::new(ctx.work_dir());

    assert_eq!(trigger.path(), ctx.work_dir().join(TRIGGER_FILE_NAME));
    assert!(!trigger.take());

    trigger.fire().unwrap();
    assert!(trigger.is_pending());
    assert!(trigger.take());
    assert!(!trigger.is_pending());
}

#[test]
fn test_trigger_in_finished_minute_waits() {
    let ctx = TestContext::with_sample_tree();
    let trigger = ManualTrigger::new(ctx.work_dir());
    let mut scheduler = Scheduler::new(CronSchedule::parse("0 8 * * *").unwrap(), Some(trigger.clone()));
    let eight = at(2026, 6, 1, 8, 0);

    assert!(scheduler.should_run(&eight));

    trigger.fire().unwrap();
    assert!(!scheduler.should_run(&(eight + Duration::seconds(40))));
    assert!(trigger.is_pending());

    assert!(scheduler.should_run(&(eight + Duration::minutes(1))));
    assert!(!trigger.is_pending());
}
