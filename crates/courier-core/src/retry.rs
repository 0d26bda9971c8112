use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 失败重试的冷却策略
///
/// 任务执行失败且重试预算未耗尽时，由该策略计算下一次进入
/// 可抢占池的时间，避免失败任务被立刻再次抢占。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// 固定间隔
    Fixed { interval_seconds: u64 },
    /// 指数退避，带随机抖动以避免雷群效应
    Exponential {
        base_interval_seconds: u64,
        max_interval_seconds: u64,
        backoff_multiplier: f64,
        /// 抖动范围（0.0-1.0）
        jitter_factor: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base_interval_seconds: 60,
            max_interval_seconds: 3600,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 计算第 retry_count 次失败后的冷却时长
    pub fn next_delay(&self, retry_count: i32) -> Duration {
        match self {
            RetryPolicy::Fixed { interval_seconds } => Duration::seconds(*interval_seconds as i64),
            RetryPolicy::Exponential {
                base_interval_seconds,
                max_interval_seconds,
                backoff_multiplier,
                jitter_factor,
            } => {
                let base = *base_interval_seconds as f64;
                let max = *max_interval_seconds as f64;

                let exponential = base * backoff_multiplier.powi(retry_count.max(0));
                let capped = exponential.min(max);

                let jitter = capped * jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
                let final_interval = (capped + jitter).max(base);

                Duration::seconds(final_interval as i64)
            }
        }
    }

    pub fn next_time(&self, retry_count: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.next_delay(retry_count)
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            RetryPolicy::Fixed { interval_seconds } => {
                if *interval_seconds == 0 {
                    return Err("retry.interval_seconds 必须大于0".to_string());
                }
            }
            RetryPolicy::Exponential {
                base_interval_seconds,
                max_interval_seconds,
                backoff_multiplier,
                jitter_factor,
            } => {
                if *base_interval_seconds == 0 {
                    return Err("retry.base_interval_seconds 必须大于0".to_string());
                }
                if max_interval_seconds < base_interval_seconds {
                    return Err("retry.max_interval_seconds 不能小于基础间隔".to_string());
                }
                if *backoff_multiplier < 1.0 {
                    return Err("retry.backoff_multiplier 不能小于1.0".to_string());
                }
                if !(0.0..=1.0).contains(jitter_factor) {
                    return Err("retry.jitter_factor 必须在0.0到1.0之间".to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::Fixed {
            interval_seconds: 30,
        };
        assert_eq!(policy.next_delay(0).num_seconds(), 30);
        assert_eq!(policy.next_delay(5).num_seconds(), 30);
    }

    #[test]
    fn test_exponential_delay_grows_and_caps() {
        let policy = RetryPolicy::Exponential {
            base_interval_seconds: 10,
            max_interval_seconds: 100,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(policy.next_delay(0).num_seconds(), 10);
        assert_eq!(policy.next_delay(1).num_seconds(), 20);
        assert_eq!(policy.next_delay(2).num_seconds(), 40);
        // 超过上限后封顶
        assert_eq!(policy.next_delay(10).num_seconds(), 100);
    }

    #[test]
    fn test_exponential_delay_with_jitter_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for retry_count in 0..6 {
            let delay = policy.next_delay(retry_count).num_seconds();
            assert!(delay >= 60, "冷却不应低于基础间隔: {delay}");
            // 上限3600，抖动10%
            assert!(delay <= 3960, "冷却超过上限加抖动: {delay}");
        }
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::Fixed {
            interval_seconds: 0
        }
        .validate()
        .is_err());
        assert!(RetryPolicy::Exponential {
            base_interval_seconds: 60,
            max_interval_seconds: 10,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
        .validate()
        .is_err());
    }
}
