/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a random UUID v4 string for use as resource ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `YYYYMMDD` of the given Unix millis (UTC), used in order numbers
pub fn date_stamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format("%Y%m%d")
        .to_string()
}
