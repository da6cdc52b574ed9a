// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 礼拜时间表 (静态表, 不做天文计算)

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, Utc};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prayer {
    Subuh,
    Dzuhur,
    Ashar,
    Maghrib,
    Isya,
}

impl Prayer {
    pub const ALL: [Prayer; 5] = [
        Prayer::Subuh,
        Prayer::Dzuhur,
        Prayer::Ashar,
        Prayer::Maghrib,
        Prayer::Isya,
    ];
}

impl fmt::Display for Prayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Prayer::Subuh => "Subuh",
            Prayer::Dzuhur => "Dzuhur",
            Prayer::Ashar => "Ashar",
            Prayer::Maghrib => "Maghrib",
            Prayer::Isya => "Isya",
        };
        f.write_str(name)
    }
}

/// 单日时间表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub date: NaiveDate,
    pub subuh: NaiveTime,
    pub dzuhur: NaiveTime,
    pub ashar: NaiveTime,
    pub maghrib: NaiveTime,
    pub isya: NaiveTime,
}

impl DailySchedule {
    pub fn time_of(&self, prayer: Prayer) -> NaiveTime {
        match prayer {
            Prayer::Subuh => self.subuh,
            Prayer::Dzuhur => self.dzuhur,
            Prayer::Ashar => self.ashar,
            Prayer::Maghrib => self.maghrib,
            Prayer::Isya => self.isya,
        }
    }

    /// (prayer, start) in chronological order
    pub fn entries(&self) -> impl Iterator<Item = (Prayer, NaiveDateTime)> + '_ {
        Prayer::ALL
            .into_iter()
            .map(|p| (p, self.date.and_time(self.time_of(p))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingPrayer {
    pub prayer: Prayer,
    pub at: NaiveDateTime,
    pub remaining: TimeDelta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerSchedule {
    days: Vec<DailySchedule>,
}

impl PrayerSchedule {
    pub fn new(mut days: Vec<DailySchedule>) -> Self {
        days.sort_by_key(|d| d.date);
        Self { days }
    }

    /// Load a JSON array of daily rows.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read schedule {}", path.display()))?;
        let days: Vec<DailySchedule> = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse schedule {}", path.display()))?;
        info!("🕌 时间表已加载: {} ({} 天)", path.display(), days.len());
        Ok(Self::new(days))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DailySchedule> {
        self.days
            .binary_search_by_key(&date, |d| d.date)
            .ok()
            .map(|i| &self.days[i])
    }

    /// 下一次礼拜; 今天的 Isya 之后查找表中后续日期
    pub fn next_prayer(&self, now: NaiveDateTime) -> Option<UpcomingPrayer> {
        self.days
            .iter()
            .filter(|d| d.date >= now.date())
            .flat_map(DailySchedule::entries)
            .find(|(_, at)| *at > now)
            .map(|(prayer, at)| UpcomingPrayer {
                prayer,
                at,
                remaining: at - now,
            })
    }

    /// 今天已开始的最近一次礼拜
    pub fn current_prayer(&self, now: NaiveDateTime) -> Option<(Prayer, NaiveDateTime)> {
        self.day(now.date())?
            .entries()
            .filter(|(_, at)| *at <= now)
            .last()
    }
}

/// 倒计时 HH:MM:SS, 负值按零处理
pub fn format_countdown(remaining: TimeDelta) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn offset(utc_offset_hours: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_hours.clamp(-23, 23) * 3600).unwrap_or_else(|| Utc.fix())
}

/// 看板本地时间
pub fn local_now(utc_offset_hours: i32) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset(utc_offset_hours))
}

/// 时间字符串, 用于截图文件名
pub fn gen_time_string(delimiter: &str, utc_offset_hours: i32) -> String {
    let t_now = local_now(utc_offset_hours);
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    fn row(day: u32) -> DailySchedule {
        DailySchedule {
            date: d(day),
            subuh: t(4, 20),
            dzuhur: t(11, 45),
            ashar: t(15, 5),
            maghrib: t(17, 50),
            isya: t(19, 0),
        }
    }

    fn schedule() -> PrayerSchedule {
        PrayerSchedule::new(vec![row(20), row(19)])
    }

    #[test]
    fn test_next_prayer_same_day() {
        let now = d(19).and_time(t(12, 0));
        let next = schedule().next_prayer(now).unwrap();
        assert_eq!(next.prayer, Prayer::Ashar);
        assert_eq!(next.remaining, TimeDelta::minutes(185));
    }

    #[test]
    fn test_next_prayer_rolls_to_tomorrow() {
        let now = d(19).and_time(t(20, 0));
        let next = schedule().next_prayer(now).unwrap();
        assert_eq!(next.prayer, Prayer::Subuh);
        assert_eq!(next.at, d(20).and_time(t(4, 20)));
    }

    #[test]
    fn test_next_prayer_past_table() {
        assert!(schedule().next_prayer(d(20).and_time(t(23, 0))).is_none());
    }

    #[test]
    fn test_current_prayer() {
        let s = schedule();
        assert_eq!(
            s.current_prayer(d(19).and_time(t(15, 5))).map(|(p, _)| p),
            Some(Prayer::Ashar)
        );
        assert!(s.current_prayer(d(19).and_time(t(3, 0))).is_none());
        assert!(s.current_prayer(d(25).and_time(t(12, 0))).is_none());
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(TimeDelta::seconds(3 * 3600 + 5 * 60 + 9)), "03:05:09");
        assert_eq!(format_countdown(TimeDelta::seconds(-5)), "00:00:00");
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jadwal.json");
        fs::write(
            &path,
            r#"[{"date":"2026-10-19","subuh":"04:20:00","dzuhur":"11:45:00","ashar":"15:05:00","maghrib":"17:50:00","isya":"19:00:00"}]"#,
        )
        .unwrap();
        let s = PrayerSchedule::load(&path).unwrap();
        assert_eq!(s.day(d(19)), Some(&row(19)));
    }

    #[test]
    fn test_gen_time_string() {
        let s = gen_time_string("-", 7);
        assert_eq!(s.split('-').count(), 7);
    }
}
