//! Provider condition-code table.
//!
//! Maps the provider's weather codes (`d00`..`d302`) to a normalized
//! condition plus the nominal sky label, precipitation rate (mm/h) and
//! cloud coverage (%) used when a forecast row carries only the code.

use serde::Serialize;

/// Normalized weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    Sunny,
    Partlycloudy,
    Cloudy,
    Rainy,
    LightningRainy,
    Hail,
    SnowyRainy,
    Pouring,
    Snowy,
    Fog,
    Windy,
    Exceptional,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Sunny => "sunny",
            Condition::Partlycloudy => "partlycloudy",
            Condition::Cloudy => "cloudy",
            Condition::Rainy => "rainy",
            Condition::LightningRainy => "lightning-rainy",
            Condition::Hail => "hail",
            Condition::SnowyRainy => "snowy-rainy",
            Condition::Pouring => "pouring",
            Condition::Snowy => "snowy",
            Condition::Fog => "fog",
            Condition::Windy => "windy",
            Condition::Exceptional => "exceptional",
        }
    }
}

/// Everything the table knows about one code.
#[derive(Debug, Clone, Copy)]
pub struct ConditionInfo {
    pub condition: Condition,
    pub skycon: &'static str,
    /// Nominal precipitation rate in mm/h for forecast rows.
    pub precipitation: f64,
    /// Nominal cloud coverage in percent.
    pub cloud_coverage: u8,
    pub name: &'static str,
}

macro_rules! info {
    ($condition:ident, $skycon:literal, $precip:literal, $cloud:literal, $name:literal) => {
        ConditionInfo {
            condition: Condition::$condition,
            skycon: $skycon,
            precipitation: $precip,
            cloud_coverage: $cloud,
            name: $name,
        }
    };
}

/// Look up a provider code like `d07`. Unknown codes return `None`; callers
/// skip the row rather than guess.
pub fn condition_info(code: &str) -> Option<&'static ConditionInfo> {
    let info = match code {
        "d00" => &info!(Sunny, "CLEAR_DAY", 0.0, 10, "晴"),
        "d01" => &info!(Partlycloudy, "PARTLY_CLOUDY_DAY", 0.0, 50, "多云"),
        "d02" => &info!(Cloudy, "CLOUDY", 0.0, 80, "阴"),
        "d03" => &info!(Rainy, "MODERATE_RAIN", 0.1, 70, "阵雨"),
        "d04" => &info!(LightningRainy, "LIGHT_RAIN", 0.1, 80, "雷阵雨"),
        "d05" => &info!(Hail, "LIGHT_RAIN", 0.2, 80, "雷阵雨伴有冰雹"),
        "d06" => &info!(SnowyRainy, "LIGHT_SNOW", 0.5, 90, "雨夹雪"),
        "d07" => &info!(Rainy, "LIGHT_RAIN", 0.5, 90, "小雨"),
        "d08" => &info!(Rainy, "MODERATE_RAIN", 1.0, 100, "中雨"),
        "d09" => &info!(Rainy, "HEAVY_RAIN", 2.0, 100, "大雨"),
        "d10" => &info!(Pouring, "STORM_RAIN", 4.0, 100, "暴雨"),
        "d11" => &info!(Pouring, "STORM_RAIN", 10.0, 100, "大暴雨"),
        "d12" => &info!(Pouring, "STORM_RAIN", 20.0, 100, "特大暴雨"),
        "d13" => &info!(Snowy, "LIGHT_SNOW", 0.1, 90, "阵雪"),
        "d14" => &info!(Snowy, "LIGHT_SNOW", 0.25, 90, "小雪"),
        "d15" => &info!(Snowy, "MODERATE_SNOW", 0.5, 100, "中雪"),
        "d16" => &info!(Snowy, "HEAVY_SNOW", 1.0, 100, "大雪"),
        "d17" => &info!(Snowy, "STORM_SNOW", 2.0, 100, "暴雪"),
        "d18" => &info!(Fog, "LIGHT_HAZE", 0.0, 80, "雾"),
        "d19" => &info!(Hail, "LIGHT_RAIN", 0.5, 100, "冻雨"),
        "d20" => &info!(Exceptional, "SAND", 0.0, 70, "沙尘暴"),
        "d21" => &info!(Rainy, "MODERATE_RAIN", 0.8, 90, "小到中雨"),
        "d22" => &info!(Rainy, "HEAVY_RAIN", 1.5, 100, "中到大雨"),
        "d23" => &info!(Pouring, "STORM_RAIN", 3.0, 100, "大到暴雨"),
        "d24" => &info!(Pouring, "STORM_RAIN", 7.0, 100, "暴雨到大暴雨"),
        "d25" => &info!(Pouring, "STORM_RAIN", 15.0, 100, "大暴雨到特大暴雨"),
        "d26" => &info!(Snowy, "MODERATE_SNOW", 0.35, 90, "小到中雪"),
        "d27" => &info!(Snowy, "HEAVY_SNOW", 0.75, 100, "中到大雪"),
        "d28" => &info!(Snowy, "STORM_SNOW", 1.5, 100, "大到暴雪"),
        "d29" => &info!(Windy, "DUST", 0.0, 60, "浮尘"),
        "d30" => &info!(Windy, "DUST", 0.0, 60, "扬沙"),
        "d31" => &info!(Exceptional, "SAND", 0.0, 80, "强沙尘暴"),
        "d32" => &info!(Fog, "FOG", 0.0, 90, "浓雾"),
        "d49" => &info!(Fog, "FOG", 0.0, 100, "强浓雾"),
        "d53" => &info!(Fog, "LIGHT_HAZE", 0.0, 90, "霾"),
        "d54" => &info!(Fog, "MODERATE_HAZE", 0.0, 90, "中度霾"),
        "d55" => &info!(Fog, "HEAVY_HAZE", 0.0, 100, "重度霾"),
        "d56" => &info!(Fog, "HEAVY_HAZE", 0.0, 100, "严重霾"),
        "d57" => &info!(Fog, "FOG", 0.0, 100, "大雾"),
        "d58" => &info!(Fog, "FOG", 0.0, 100, "特强浓雾"),
        "d301" => &info!(Rainy, "MODERATE_RAIN", 1.0, 100, "雨"),
        "d302" => &info!(Snowy, "MODERATE_SNOW", 0.5, 100, "雪"),
        _ => return None,
    };
    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        let info = condition_info("d00").unwrap();
        assert_eq!(info.condition, Condition::Sunny);
        assert_eq!(info.condition.as_str(), "sunny");

        let info = condition_info("d10").unwrap();
        assert_eq!(info.condition, Condition::Pouring);
        assert!((info.precipitation - 4.0).abs() < f64::EPSILON);

        let info = condition_info("d302").unwrap();
        assert_eq!(info.name, "雪");
    }

    #[test]
    fn test_unknown_code_is_none() {
        assert!(condition_info("d99").is_none());
        assert!(condition_info("").is_none());
        assert!(condition_info("n00").is_none());
    }
}
